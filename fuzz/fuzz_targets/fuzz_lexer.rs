#![no_main]

use libfuzzer_sys::fuzz_target;
use moonlet_compiler::lexer::Lexer;
use moonlet_compiler::token::Token;
use moonlet_core::string::StringInterner;

// Any byte sequence either tokenizes to <eof> or yields an error.
fuzz_target!(|data: &[u8]| {
    let mut strings = StringInterner::new();
    let mut lexer = Lexer::new(data, "=fuzz", &mut strings);
    while let Ok(tok) = lexer.advance() {
        if tok.token == Token::Eof {
            break;
        }
    }
});
