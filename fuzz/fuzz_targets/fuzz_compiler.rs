#![no_main]

use libfuzzer_sys::fuzz_target;
use moonlet_compiler::{compile, CompileError};
use moonlet_core::string::StringInterner;

fuzz_target!(|data: &[u8]| {
    let mut strings = StringInterner::new();
    match compile(data, "=fuzz", &mut strings) {
        Ok(chunk) => {
            let _ = moonlet_compiler::disasm::disassemble(&chunk, &strings);
        }
        Err(CompileError::Syntax { line, .. } | CompileError::Semantic { line, .. }) => {
            assert!(line >= 1);
        }
    }
});
