//! Compiled function: bytecode, constants, nested functions and debug info.
use crate::opcode::Instruction;
use crate::token::Span;
use moonlet_core::string::StringId;
use std::rc::Rc;

/// A constant-pool entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constant {
    Number(f64),
    String(StringId),
}

impl Constant {
    /// Pool identity: numbers compare by bit pattern so NaN and -0 dedupe
    /// only with themselves.
    fn same(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            _ => false,
        }
    }
}

/// How a closure obtains one of its upvalues when it is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpvalDesc {
    pub name: StringId,
    /// True: register `index` of the enclosing function.
    /// False: upvalue `index` of the enclosing closure.
    pub in_stack: bool,
    pub index: u8,
}

/// Debug record of a local variable's register and live range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVar {
    pub name: StringId,
    pub reg: u8,
    /// First pc where the variable is active.
    pub start_pc: u32,
    /// First pc where the variable is dead.
    pub end_pc: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    /// Source position of each instruction.
    pub positions: Vec<Span>,
    pub constants: Vec<Constant>,
    pub upvalues: Vec<UpvalDesc>,
    pub children: Vec<Rc<Chunk>>,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
    /// Display name of the source unit (`[string "..."]`, file name).
    pub source: Rc<str>,
    /// Function name for tracebacks, when statically known.
    pub name: Option<String>,
    /// Line of the `function` keyword; 0 for a main chunk.
    pub line_defined: u32,
    pub last_line: u32,
    pub locals: Vec<LocalVar>,
}

impl Chunk {
    pub fn new(source: Rc<str>) -> Self {
        Chunk {
            source,
            max_stack_size: 2,
            ..Default::default()
        }
    }

    pub fn emit(&mut self, inst: Instruction, span: Span) -> usize {
        let pc = self.code.len();
        self.code.push(inst);
        self.positions.push(span);
        pc
    }

    /// Add a constant, reusing an existing identical entry.
    pub fn add_constant(&mut self, k: Constant) -> usize {
        if let Some(i) = self.constants.iter().position(|c| c.same(&k)) {
            return i;
        }
        self.constants.push(k);
        self.constants.len() - 1
    }

    pub fn line_at(&self, pc: usize) -> u32 {
        self.positions.get(pc).map_or(0, |s| s.line)
    }

    /// Name of the local variable held in `reg` at `pc`, if any.
    pub fn local_name(&self, reg: u8, pc: usize) -> Option<StringId> {
        let pc = pc as u32;
        self.locals
            .iter()
            .rev()
            .find(|l| l.reg == reg && l.start_pc <= pc && pc < l.end_pc)
            .map(|l| l.name)
    }

    pub fn is_main(&self) -> bool {
        self.line_defined == 0
    }
}
