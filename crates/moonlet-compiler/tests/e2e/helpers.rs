use moonlet_compiler::chunk::{Chunk, Constant};
use moonlet_compiler::compiler::compile;
use moonlet_compiler::opcode::OpCode;
use moonlet_core::string::StringInterner;
use std::rc::Rc;

/// Compile a Lua source string and return the chunk with its interner.
pub fn compile_str(source: &str) -> (Rc<Chunk>, StringInterner) {
    let mut strings = StringInterner::new();
    let chunk = compile(source.as_bytes(), "=test", &mut strings).unwrap_or_else(|e| {
        panic!("compile failed: {e}\nsource:\n{source}");
    });
    (chunk, strings)
}

/// Compile a Lua source string and expect an error; returns the full
/// `chunk:line: message` text.
pub fn compile_str_err(source: &str) -> String {
    let mut strings = StringInterner::new();
    match compile(source.as_bytes(), "=test", &mut strings) {
        Err(e) => e.to_string(),
        Ok(_) => panic!("expected compile error, got success\nsource:\n{source}"),
    }
}

pub fn has_opcode(chunk: &Chunk, op: OpCode) -> bool {
    chunk.code.iter().any(|i| i.opcode() == op)
}

pub fn count_opcode(chunk: &Chunk, op: OpCode) -> usize {
    chunk.code.iter().filter(|i| i.opcode() == op).count()
}

#[allow(dead_code)]
pub fn find_opcode(chunk: &Chunk, op: OpCode) -> Option<usize> {
    chunk.code.iter().position(|i| i.opcode() == op)
}

/// True if any string constant of `chunk` equals `text`.
pub fn has_string_constant(chunk: &Chunk, text: &str, strings: &StringInterner) -> bool {
    chunk.constants.iter().any(|k| match k {
        Constant::String(id) => strings.get_bytes(*id) == text.as_bytes(),
        Constant::Number(_) => false,
    })
}

#[allow(dead_code)]
pub fn has_number_constant(chunk: &Chunk, n: f64) -> bool {
    chunk
        .constants
        .iter()
        .any(|k| matches!(k, Constant::Number(v) if v.to_bits() == n.to_bits()))
}
