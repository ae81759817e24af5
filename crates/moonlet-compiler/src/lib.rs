//! Moonlet compiler: lexer, parser and bytecode generator for Lua 5.4.
//!
//! Source text is tokenized by [`lexer::Lexer`], parsed into an
//! [`ast::Chunk`] and lowered to register bytecode ([`chunk::Chunk`]).

pub mod ast;
pub mod chunk;
pub mod compiler;
pub mod disasm;
pub mod error;
pub mod lexer;
pub mod opcode;
pub mod parser;
pub mod token;

pub use chunk::{Chunk, Constant};
pub use compiler::{compile, compile_ast};
pub use error::CompileError;
