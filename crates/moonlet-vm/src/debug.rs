//! Variable descriptions for error messages, tracebacks and `where`.

use crate::callinfo::CallFrame;
use crate::vm::Vm;
use moonlet_compiler::chunk::{Chunk, Constant};
use moonlet_compiler::opcode::OpCode;
use moonlet_core::error::{FrameInfo, Traceback};
use moonlet_core::string::StringInterner;

/// Where an operand of a failing instruction came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Site {
    Register(u8),
    Upvalue(u8),
    ForIterator,
    Unknown,
}

impl Vm {
    /// ` (local 'x')`-style suffix for an operand of the running instruction.
    pub(crate) fn describe(&self, site: Site) -> String {
        let Some(frame) = self.frames.last() else {
            return String::new();
        };
        if frame.proto == self.trampoline_proto {
            return String::new();
        }
        let chunk = &self.protos[frame.proto].chunk;
        let pc = frame.pc.saturating_sub(1);
        let info = match site {
            Site::Register(reg) => register_info(chunk, pc, reg, &self.strings),
            Site::Upvalue(idx) => chunk
                .upvalues
                .get(idx as usize)
                .map(|u| format!("upvalue '{}'", self.strings.get_lossy(u.name))),
            Site::ForIterator => Some("for iterator 'for iterator'".to_string()),
            Site::Unknown => None,
        };
        info.map(|i| format!(" ({i})")).unwrap_or_default()
    }

    fn is_trampoline(&self, frame: &CallFrame) -> bool {
        frame.proto == self.trampoline_proto
    }

    /// `chunk:line: ` of the frame at `level` (1 = innermost), or empty.
    pub fn where_at(&self, level: usize) -> String {
        if level == 0 || level > self.frames.len() {
            return String::new();
        }
        let frame = &self.frames[self.frames.len() - level];
        if self.is_trampoline(frame) {
            return String::new();
        }
        let chunk = &self.protos[frame.proto].chunk;
        format!("{}:{}: ", chunk.source, chunk.line_at(frame.pc.saturating_sub(1)))
    }

    /// Active frames of the running thread, innermost first.
    pub fn traceback_frames(&self) -> Traceback {
        let frames = self
            .frames
            .iter()
            .rev()
            .filter(|f| !self.is_trampoline(f))
            .map(|f| {
                let chunk = &self.protos[f.proto].chunk;
                FrameInfo {
                    function: function_description(chunk),
                    source: chunk.source.to_string(),
                    line: Some(chunk.line_at(f.pc.saturating_sub(1))),
                }
            })
            .collect();
        Traceback { frames }
    }
}

/// `main chunk`, `function 'name'` or `function <chunk:line>`.
pub fn function_description(chunk: &Chunk) -> String {
    if chunk.is_main() {
        "main chunk".to_string()
    } else if let Some(name) = &chunk.name {
        format!("function '{name}'")
    } else {
        format!("function <{}:{}>", chunk.source, chunk.line_defined)
    }
}

fn constant_name(chunk: &Chunk, idx: usize, strings: &StringInterner) -> Option<String> {
    match chunk.constants.get(idx)? {
        Constant::String(s) => Some(strings.get_lossy(*s).into_owned()),
        Constant::Number(_) => None,
    }
}

/// Describe the value in `reg` just before `pc` executes.
fn register_info(chunk: &Chunk, pc: usize, reg: u8, strings: &StringInterner) -> Option<String> {
    if let Some(name) = chunk.local_name(reg, pc) {
        return Some(format!("local '{}'", strings.get_lossy(name)));
    }
    let setter = find_setter(chunk, pc, reg)?;
    let inst = chunk.code[setter];
    match inst.opcode() {
        OpCode::Move if inst.b() < inst.a() => chunk
            .local_name(inst.b(), setter)
            .map(|n| format!("local '{}'", strings.get_lossy(n))),
        OpCode::GetTabUp => {
            let key = constant_name(chunk, inst.c() as usize, strings)?;
            let env = chunk
                .upvalues
                .get(inst.b() as usize)
                .is_some_and(|u| strings.get_bytes(u.name) == b"_ENV");
            Some(if env { format!("global '{key}'") } else { format!("field '{key}'") })
        }
        OpCode::GetField => {
            let key = constant_name(chunk, inst.c() as usize, strings)?;
            Some(format!("field '{key}'"))
        }
        OpCode::GetUpval => chunk
            .upvalues
            .get(inst.b() as usize)
            .map(|u| format!("upvalue '{}'", strings.get_lossy(u.name))),
        OpCode::LoadK => {
            let k = constant_name(chunk, inst.bx() as usize, strings)?;
            Some(format!("constant '{k}'"))
        }
        OpCode::Self_ if inst.k() => {
            let key = constant_name(chunk, inst.c() as usize, strings)?;
            Some(format!("method '{key}'"))
        }
        _ => None,
    }
}

/// Last instruction before `last_pc` that wrote `reg`, ignoring writes that
/// a forward jump may have skipped.
fn find_setter(chunk: &Chunk, last_pc: usize, reg: u8) -> Option<usize> {
    let mut last_pc = last_pc.min(chunk.code.len());
    if chunk
        .code
        .get(last_pc)
        .is_some_and(|i| matches!(i.opcode(), OpCode::MMBin | OpCode::MMBinK))
    {
        // The arithmetic instruction before MMBIN did not complete.
        last_pc = last_pc.saturating_sub(1);
    }
    let reg = reg as usize;
    let mut setter = None;
    let mut jump_target = 0usize;
    for pc in 0..last_pc {
        let inst = chunk.code[pc];
        let a = inst.a() as usize;
        let writes = match inst.opcode() {
            OpCode::LoadNil => (a..=a + inst.b() as usize).contains(&reg),
            OpCode::TForCall => reg >= a,
            OpCode::Call | OpCode::TailCall | OpCode::VarArg => reg >= a,
            OpCode::Self_ => reg == a || reg == a + 1,
            OpCode::ForPrep | OpCode::ForLoop => (a..=a + 3).contains(&reg),
            OpCode::Jmp => {
                let dest = pc as i64 + 1 + inst.get_sj() as i64;
                if dest > pc as i64 && dest <= last_pc as i64 && dest as usize > jump_target {
                    jump_target = dest as usize;
                }
                false
            }
            op => writes_register_a(op) && reg == a,
        };
        if writes {
            setter = if pc < jump_target { None } else { Some(pc) };
        }
    }
    setter
}

fn writes_register_a(op: OpCode) -> bool {
    use OpCode::*;
    matches!(
        op,
        Move | LoadI
            | LoadK
            | LoadFalse
            | LFalseSkip
            | LoadTrue
            | GetUpval
            | GetTabUp
            | GetTable
            | GetI
            | GetField
            | NewTable
            | AddK
            | SubK
            | MulK
            | ModK
            | PowK
            | DivK
            | IDivK
            | Add
            | Sub
            | Mul
            | Mod
            | Pow
            | Div
            | IDiv
            | BAnd
            | BOr
            | BXor
            | Shl
            | Shr
            | Unm
            | BNot
            | Not
            | Len
            | Concat
            | Closure
            | TestSet
    )
}
