/// Bytecode listing in the style of `luac -l`.
use crate::chunk::{Chunk, Constant};
use crate::opcode::{Instruction, InstructionFormat, OpCode};
use moonlet_core::number::format_number;
use moonlet_core::string::StringInterner;
use std::fmt::Write;

/// Render a chunk and all nested functions.
pub fn disassemble(chunk: &Chunk, strings: &StringInterner) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_chunk(&mut out, chunk, strings);
    out
}

fn write_chunk(out: &mut String, chunk: &Chunk, strings: &StringInterner) -> std::fmt::Result {
    let kind = if chunk.is_main() { "main" } else { "function" };
    writeln!(
        out,
        "\n{kind} <{}:{},{}> ({} instructions)",
        chunk.source,
        chunk.line_defined,
        chunk.last_line,
        chunk.code.len()
    )?;
    let vararg = if chunk.is_vararg { "+" } else { "" };
    writeln!(
        out,
        "{}{vararg} params, {} slots, {} upvalues, {} locals, {} constants, {} functions",
        chunk.num_params,
        chunk.max_stack_size,
        chunk.upvalues.len(),
        chunk.locals.len(),
        chunk.constants.len(),
        chunk.children.len(),
    )?;

    for (pc, inst) in chunk.code.iter().enumerate() {
        match chunk.line_at(pc) {
            0 => write!(out, "\t{}\t[-]\t", pc + 1)?,
            line => write!(out, "\t{}\t[{line}]\t", pc + 1)?,
        }
        write_instruction(out, pc, inst, chunk, strings)?;
        writeln!(out)?;
    }

    writeln!(out, "constants ({}):", chunk.constants.len())?;
    for (i, k) in chunk.constants.iter().enumerate() {
        writeln!(out, "\t{i}\t{}", constant_text(k, strings))?;
    }
    writeln!(out, "locals ({}):", chunk.locals.len())?;
    for (i, local) in chunk.locals.iter().enumerate() {
        writeln!(
            out,
            "\t{i}\t{}\t{}\t{}",
            strings.get_lossy(local.name),
            local.start_pc + 1,
            local.end_pc + 1
        )?;
    }
    writeln!(out, "upvalues ({}):", chunk.upvalues.len())?;
    for (i, up) in chunk.upvalues.iter().enumerate() {
        writeln!(
            out,
            "\t{i}\t{}\t{}\t{}",
            strings.get_lossy(up.name),
            u8::from(up.in_stack),
            up.index
        )?;
    }

    for child in &chunk.children {
        write_chunk(out, child, strings)?;
    }
    Ok(())
}

fn constant_text(k: &Constant, strings: &StringInterner) -> String {
    match k {
        Constant::Number(n) => format_number(*n),
        Constant::String(id) => format!("{:?}", strings.get_lossy(*id)),
    }
}

fn write_instruction(
    out: &mut String,
    pc: usize,
    inst: &Instruction,
    chunk: &Chunk,
    strings: &StringInterner,
) -> std::fmt::Result {
    let op = inst.opcode();
    write!(out, "{:<10}", op.name())?;
    let konst = |idx: usize| {
        chunk
            .constants
            .get(idx)
            .map_or_else(|| "?".to_string(), |k| constant_text(k, strings))
    };

    match op.format() {
        InstructionFormat::IABC => {
            write!(out, "{} {} {}", inst.a(), inst.b(), inst.c())?;
            if inst.k() {
                write!(out, "k")?;
            }
            match op {
                OpCode::GetField | OpCode::GetTabUp => write!(out, "\t; {}", konst(inst.c() as usize))?,
                OpCode::SetField | OpCode::SetTabUp | OpCode::EqK => {
                    write!(out, "\t; {}", konst(inst.b() as usize))?
                }
                OpCode::Self_ if inst.k() => write!(out, "\t; {}", konst(inst.c() as usize))?,
                OpCode::AddK
                | OpCode::SubK
                | OpCode::MulK
                | OpCode::ModK
                | OpCode::PowK
                | OpCode::DivK
                | OpCode::IDivK => write!(out, "\t; {}", konst(inst.c() as usize))?,
                _ => {}
            }
        }
        InstructionFormat::IABx => {
            write!(out, "{} {}", inst.a(), inst.bx())?;
            match op {
                OpCode::LoadK => write!(out, "\t; {}", konst(inst.bx() as usize))?,
                OpCode::Closure => write!(out, "\t; function [{}]", inst.bx())?,
                OpCode::ForLoop | OpCode::TForLoop => {
                    write!(out, "\t; to {}", pc + 2 - inst.bx() as usize)?
                }
                OpCode::ForPrep | OpCode::TForPrep => {
                    write!(out, "\t; to {}", pc + inst.bx() as usize + 2)?
                }
                _ => {}
            }
        }
        InstructionFormat::IAsBx => write!(out, "{} {}", inst.a(), inst.sbx())?,
        InstructionFormat::IAx => write!(out, "{}", inst.ax_field())?,
        InstructionFormat::IsJ => {
            let offset = inst.get_sj();
            let target = pc as i64 + 2 + offset as i64;
            write!(out, "{offset}\t; to {target}")?;
        }
    }
    Ok(())
}
