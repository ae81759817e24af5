//! Pull-based lexer for Lua 5.4.
//!
//! Tokens are produced one at a time from a cursor over the source bytes.
//! The lexer keeps one token of lookahead (`current`) plus the raw text of
//! that token for "near '...'" diagnostics.
use crate::error::CompileError;
use crate::token::{Span, SpannedToken, Token};
use moonlet_core::number::str_to_number;
use moonlet_core::string::StringInterner;

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    chunk: String,
    current: Result<SpannedToken, CompileError>,
    current_text: String,
    pub strings: &'a mut StringInterner,
    /// Line of the last consumed token.
    pub lastline: u32,
}

impl<'a> Lexer<'a> {
    /// Create a lexer; `chunk` is the display name used in diagnostics.
    pub fn new(source: &'a [u8], chunk: &str, strings: &'a mut StringInterner) -> Self {
        let mut lexer = Lexer {
            source,
            pos: 0,
            line: 1,
            column: 1,
            chunk: chunk.to_string(),
            current: Ok(SpannedToken {
                token: Token::Eof,
                span: Span::new(1, 1),
            }),
            current_text: String::new(),
            strings,
            lastline: 1,
        };
        // Skip a leading `#!` line.
        if source.starts_with(b"#") {
            while let Some(ch) = lexer.peek() {
                if ch == b'\n' || ch == b'\r' {
                    break;
                }
                lexer.advance_char();
            }
        }
        lexer.current = lexer.scan_token();
        lexer
    }

    /// Peek at the current token without consuming.
    pub fn current(&self) -> Result<&SpannedToken, &CompileError> {
        self.current.as_ref()
    }

    /// Raw source text of the current token.
    pub fn current_text(&self) -> &str {
        &self.current_text
    }

    /// Consume the current token and scan the next one.
    pub fn advance(&mut self) -> Result<SpannedToken, CompileError> {
        if let Ok(tok) = &self.current {
            self.lastline = tok.span.line;
        }
        let next = self.scan_token();
        std::mem::replace(&mut self.current, next)
    }

    /// The current token formatted for a "near ..." diagnostic.
    pub fn near(&self) -> String {
        match &self.current {
            Ok(tok) if tok.token == Token::Eof => "<eof>".to_string(),
            _ => format!("'{}'", self.current_text),
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn chunk(&self) -> &str {
        &self.chunk
    }

    fn error(&self, span: Span, message: String) -> CompileError {
        CompileError::Syntax {
            chunk: self.chunk.clone(),
            line: span.line,
            column: span.column,
            message,
        }
    }

    // ---- Internal scanning ----

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn here(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn advance_char(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        match ch {
            b'\n' | b'\r' => {
                // \r\n and \n\r count as one newline
                let other = if ch == b'\n' { b'\r' } else { b'\n' };
                if self.peek() == Some(other) {
                    self.pos += 1;
                }
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += 1,
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), CompileError> {
        loop {
            while self.peek().is_some_and(is_space) {
                self.advance_char();
            }
            if self.peek() == Some(b'-') && self.peek_at(1) == Some(b'-') {
                let start = self.here();
                self.advance_char();
                self.advance_char();
                if let Some(level) = self.check_long_bracket() {
                    self.skip_long_bracket_open(level);
                    self.scan_long_string_content(level, start, "comment")?;
                    continue;
                }
                while let Some(ch) = self.peek() {
                    if ch == b'\n' || ch == b'\r' {
                        break;
                    }
                    self.advance_char();
                }
                continue;
            }
            return Ok(());
        }
    }

    /// Check if current position starts a long bracket `[=*[`. Returns the level if so.
    fn check_long_bracket(&self) -> Option<usize> {
        if self.peek() != Some(b'[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(level + 1) == Some(b'=') {
            level += 1;
        }
        (self.peek_at(level + 1) == Some(b'[')).then_some(level)
    }

    fn skip_long_bracket_open(&mut self, level: usize) {
        for _ in 0..level + 2 {
            self.advance_char();
        }
    }

    fn scan_token(&mut self) -> Result<SpannedToken, CompileError> {
        self.skip_whitespace_and_comments()?;
        let start = self.pos;
        let result = self.scan_token_inner();
        self.current_text = if self.pos > start {
            String::from_utf8_lossy(&self.source[start..self.pos]).into_owned()
        } else {
            "<eof>".to_string()
        };
        result
    }

    fn single(&mut self, token: Token, span: Span) -> Result<SpannedToken, CompileError> {
        self.advance_char();
        Ok(SpannedToken { token, span })
    }

    /// One-char token, or the two-char token if the next byte is `second`.
    fn pair(
        &mut self,
        second: u8,
        long: Token,
        short: Token,
        span: Span,
    ) -> Result<SpannedToken, CompileError> {
        self.advance_char();
        if self.peek() == Some(second) {
            self.advance_char();
            Ok(SpannedToken { token: long, span })
        } else {
            Ok(SpannedToken { token: short, span })
        }
    }

    fn scan_token_inner(&mut self) -> Result<SpannedToken, CompileError> {
        let span = self.here();
        let Some(ch) = self.peek() else {
            return Ok(SpannedToken {
                token: Token::Eof,
                span,
            });
        };
        match ch {
            b'+' => self.single(Token::Plus, span),
            b'-' => self.single(Token::Minus, span),
            b'*' => self.single(Token::Star, span),
            b'^' => self.single(Token::Caret, span),
            b'%' => self.single(Token::Percent, span),
            b'&' => self.single(Token::Ampersand, span),
            b'|' => self.single(Token::Pipe, span),
            b'(' => self.single(Token::LParen, span),
            b')' => self.single(Token::RParen, span),
            b'{' => self.single(Token::LBrace, span),
            b'}' => self.single(Token::RBrace, span),
            b']' => self.single(Token::RBracket, span),
            b';' => self.single(Token::Semi, span),
            b',' => self.single(Token::Comma, span),
            b'#' => self.single(Token::Hash, span),
            b'/' => self.pair(b'/', Token::FloorDiv, Token::Slash, span),
            b'=' => self.pair(b'=', Token::Equal, Token::Assign, span),
            b'~' => self.pair(b'=', Token::NotEqual, Token::Tilde, span),
            b':' => self.pair(b':', Token::DoubleColon, Token::Colon, span),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.advance_char();
                    self.single(Token::ShiftLeft, span)
                } else {
                    self.pair(b'=', Token::LessEq, Token::Less, span)
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.advance_char();
                    self.single(Token::ShiftRight, span)
                } else {
                    self.pair(b'=', Token::GreaterEq, Token::Greater, span)
                }
            }
            b'.' => {
                if self.peek_at(1) == Some(b'.') {
                    self.advance_char();
                    if self.peek_at(1) == Some(b'.') {
                        self.advance_char();
                        self.single(Token::DotDotDot, span)
                    } else {
                        self.single(Token::DotDot, span)
                    }
                } else if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number(span)
                } else {
                    self.single(Token::Dot, span)
                }
            }
            b'[' => match self.check_long_bracket() {
                Some(level) => {
                    self.skip_long_bracket_open(level);
                    let content = self.scan_long_string_content(level, span, "string")?;
                    let id = self.strings.intern(&content);
                    Ok(SpannedToken {
                        token: Token::String(id),
                        span,
                    })
                }
                None => self.single(Token::LBracket, span),
            },
            b'"' | b'\'' => self.scan_short_string(span),
            b'0'..=b'9' => self.scan_number(span),
            _ if is_ident_start(ch) => self.scan_name(span),
            _ => {
                self.advance_char();
                let near = if ch.is_ascii_graphic() {
                    format!("'{}'", ch as char)
                } else {
                    format!("'<\\{ch}>'")
                };
                Err(self.error(span, format!("unexpected symbol near {near}")))
            }
        }
    }

    fn scan_name(&mut self, span: Span) -> Result<SpannedToken, CompileError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.advance_char();
        }
        let name = &self.source[start..self.pos];
        let token = match Token::keyword_from_bytes(name) {
            Some(keyword) => keyword,
            None => Token::Name(self.strings.intern(name)),
        };
        Ok(SpannedToken { token, span })
    }

    /// Read a numeral the way Lua does: greedily take digits, dots and
    /// exponent signs, then let the number parser validate the whole text.
    fn scan_number(&mut self, span: Span) -> Result<SpannedToken, CompileError> {
        let start = self.pos;
        let mut exponent = [b'e', b'E'];
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.advance_char();
            self.advance_char();
            exponent = [b'p', b'P'];
        }
        loop {
            match self.peek() {
                Some(c) if exponent.contains(&c) => {
                    self.advance_char();
                    if matches!(self.peek(), Some(b'+' | b'-')) {
                        self.advance_char();
                    }
                }
                Some(c) if c.is_ascii_hexdigit() || c == b'.' => {
                    self.advance_char();
                }
                _ => break,
            }
        }
        // A trailing letter makes the numeral malformed rather than two tokens.
        while self.peek().is_some_and(is_ident_continue) {
            self.advance_char();
        }
        let text = &self.source[start..self.pos];
        match str_to_number(text) {
            Some(n) => Ok(SpannedToken {
                token: Token::Number(n),
                span,
            }),
            None => Err(self.error(
                span,
                format!("malformed number near '{}'", String::from_utf8_lossy(text)),
            )),
        }
    }

    /// "near" text for string errors: the string so far, capped.
    fn string_near(&self, start: usize, include_current: bool) -> String {
        let end = if include_current {
            (self.pos + 1).min(self.source.len())
        } else {
            self.pos
        };
        let raw = &self.source[start..end];
        let raw = &raw[..raw.len().min(50)];
        format!("'{}'", String::from_utf8_lossy(raw))
    }

    fn scan_short_string(&mut self, span: Span) -> Result<SpannedToken, CompileError> {
        let start = self.pos;
        let quote = self.peek().unwrap_or(b'"');
        self.advance_char();
        let mut buf = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(span, "unfinished string near <eof>".to_string()));
                }
                Some(b'\n' | b'\r') => {
                    let near = self.string_near(start, false);
                    return Err(self.error(span, format!("unfinished string near {near}")));
                }
                Some(ch) if ch == quote => {
                    self.advance_char();
                    break;
                }
                Some(b'\\') => {
                    self.advance_char();
                    self.scan_escape(start, span, &mut buf)?;
                }
                Some(ch) => {
                    self.advance_char();
                    buf.push(ch);
                }
            }
        }
        let id = self.strings.intern(&buf);
        Ok(SpannedToken {
            token: Token::String(id),
            span,
        })
    }

    fn escape_error(&self, start: usize, span: Span, what: &str) -> CompileError {
        let near = self.string_near(start, true);
        self.error(span, format!("{what} near {near}"))
    }

    /// Decode one escape sequence; the backslash is already consumed.
    fn scan_escape(&mut self, start: usize, span: Span, buf: &mut Vec<u8>) -> Result<(), CompileError> {
        let Some(ch) = self.peek() else {
            return Err(self.error(span, "unfinished string near <eof>".to_string()));
        };
        let simple = match ch {
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0C),
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'v' => Some(0x0B),
            b'\\' => Some(b'\\'),
            b'\'' => Some(b'\''),
            b'"' => Some(b'"'),
            b'\n' | b'\r' => Some(b'\n'),
            _ => None,
        };
        if let Some(byte) = simple {
            self.advance_char();
            buf.push(byte);
            return Ok(());
        }
        match ch {
            b'x' => {
                self.advance_char();
                let mut value = 0u8;
                for _ in 0..2 {
                    match self.peek().and_then(hex_value) {
                        Some(d) => {
                            value = (value << 4) | d;
                            self.advance_char();
                        }
                        None => {
                            return Err(self.escape_error(start, span, "hexadecimal digit expected"))
                        }
                    }
                }
                buf.push(value);
            }
            b'u' => {
                self.advance_char();
                if self.peek() != Some(b'{') {
                    return Err(self.escape_error(start, span, "missing '{' in \\u{xxxx}"));
                }
                self.advance_char();
                let mut code: u64 = 0;
                let mut digits = 0;
                while let Some(d) = self.peek().and_then(hex_value) {
                    code = code * 16 + d as u64;
                    digits += 1;
                    if code > 0x7FFF_FFFF {
                        return Err(self.escape_error(start, span, "UTF-8 value too large"));
                    }
                    self.advance_char();
                }
                if digits == 0 {
                    return Err(self.escape_error(start, span, "hexadecimal digit expected"));
                }
                if self.peek() != Some(b'}') {
                    return Err(self.escape_error(start, span, "missing '}' in \\u{xxxx}"));
                }
                self.advance_char();
                encode_utf8_lua(code as u32, buf);
            }
            b'z' => {
                self.advance_char();
                while self.peek().is_some_and(is_space) {
                    self.advance_char();
                }
            }
            b'0'..=b'9' => {
                let mut value: u32 = 0;
                for _ in 0..3 {
                    match self.peek() {
                        Some(d) if d.is_ascii_digit() => {
                            value = value * 10 + (d - b'0') as u32;
                            self.advance_char();
                        }
                        _ => break,
                    }
                }
                if value > 255 {
                    return Err(self.escape_error(start, span, "decimal escape too large"));
                }
                buf.push(value as u8);
            }
            _ => return Err(self.escape_error(start, span, "invalid escape sequence")),
        }
        Ok(())
    }

    /// Body of a long string or comment, after the opening bracket.
    fn scan_long_string_content(
        &mut self,
        level: usize,
        open: Span,
        what: &str,
    ) -> Result<Vec<u8>, CompileError> {
        let mut buf = Vec::new();
        // A newline right after the opening bracket is skipped.
        if matches!(self.peek(), Some(b'\n' | b'\r')) {
            self.advance_char();
        }
        loop {
            match self.peek() {
                None => {
                    let here = self.here();
                    return Err(self.error(
                        here,
                        format!(
                            "unfinished long {what} (starting at line {}) near <eof>",
                            open.line
                        ),
                    ));
                }
                Some(b']') if self.check_closing_long_bracket(level) => {
                    self.skip_long_bracket_open(level);
                    return Ok(buf);
                }
                Some(b'\n' | b'\r') => {
                    self.advance_char();
                    buf.push(b'\n');
                }
                Some(ch) => {
                    self.advance_char();
                    buf.push(ch);
                }
            }
        }
    }

    fn check_closing_long_bracket(&self, level: usize) -> bool {
        self.peek() == Some(b']')
            && (1..=level).all(|i| self.peek_at(i) == Some(b'='))
            && self.peek_at(level + 1) == Some(b']')
    }
}

fn is_space(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

fn hex_value(ch: u8) -> Option<u8> {
    (ch as char).to_digit(16).map(|d| d as u8)
}

/// UTF-8 encoding extended to 6 bytes for values up to 0x7FFFFFFF.
fn encode_utf8_lua(code: u32, buf: &mut Vec<u8>) {
    if code < 0x80 {
        buf.push(code as u8);
        return;
    }
    let mut tail = Vec::with_capacity(5);
    let mut rest = code;
    // Largest value that fits in the lead byte for the current length.
    let mut lead_max = 0x3F;
    while rest > lead_max {
        tail.push(0x80 | (rest & 0x3F) as u8);
        rest >>= 6;
        lead_max >>= 1;
    }
    let lead_prefix = !((lead_max << 1) | 1) as u8;
    buf.push(lead_prefix | rest as u8);
    buf.extend(tail.iter().rev());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lex_tokens(source: &str) -> Vec<Token> {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(source.as_bytes(), "test", &mut strings);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.advance().unwrap();
            if tok.token == Token::Eof {
                break;
            }
            tokens.push(tok.token);
        }
        tokens
    }

    fn lex_single(source: &str) -> Token {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(source.as_bytes(), "test", &mut strings);
        lexer.advance().unwrap().token
    }

    fn lex_string(source: &str) -> Vec<u8> {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(source.as_bytes(), "test", &mut strings);
        let tok = lexer.advance().unwrap();
        match tok.token {
            Token::String(id) => lexer.strings.get_bytes(id).to_vec(),
            other => panic!("expected string, got {other:?}"),
        }
    }

    fn lex_error(source: &str) -> CompileError {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(source.as_bytes(), "test", &mut strings);
        loop {
            match lexer.advance() {
                Err(e) => return e,
                Ok(tok) if tok.token == Token::Eof => panic!("expected error, got EOF"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_all_keywords() {
        let keywords = [
            ("and", Token::And),
            ("break", Token::Break),
            ("do", Token::Do),
            ("else", Token::Else),
            ("elseif", Token::ElseIf),
            ("end", Token::End),
            ("false", Token::False),
            ("for", Token::For),
            ("function", Token::Function),
            ("goto", Token::Goto),
            ("if", Token::If),
            ("in", Token::In),
            ("local", Token::Local),
            ("nil", Token::Nil),
            ("not", Token::Not),
            ("or", Token::Or),
            ("repeat", Token::Repeat),
            ("return", Token::Return),
            ("then", Token::Then),
            ("true", Token::True),
            ("until", Token::Until),
            ("while", Token::While),
        ];
        for (src, expected) in &keywords {
            assert_eq!(lex_single(src), *expected, "keyword: {src}");
        }
    }

    #[test]
    fn test_keyword_prefix_is_name() {
        assert!(matches!(lex_single("ender"), Token::Name(_)));
        assert!(matches!(lex_single("_G"), Token::Name(_)));
    }

    #[test]
    fn test_decimal_numbers() {
        assert_eq!(lex_single("0"), Token::Number(0.0));
        assert_eq!(lex_single("42"), Token::Number(42.0));
        assert_eq!(lex_single("3.25"), Token::Number(3.25));
        assert_eq!(lex_single(".5"), Token::Number(0.5));
        assert_eq!(lex_single("1e10"), Token::Number(1e10));
        assert_eq!(lex_single("2.5E-3"), Token::Number(2.5e-3));
    }

    #[test]
    fn test_hex_numbers() {
        assert_eq!(lex_single("0xff"), Token::Number(255.0));
        assert_eq!(lex_single("0X1F"), Token::Number(31.0));
        assert_eq!(lex_single("0x1p4"), Token::Number(16.0));
        assert_eq!(lex_single("0x.8"), Token::Number(0.5));
        assert_eq!(lex_single("0xA.8p1"), Token::Number(21.0));
    }

    #[test]
    fn test_simple_strings() {
        assert_eq!(lex_string("\"hello\""), b"hello");
        assert_eq!(lex_string("'world'"), b"world");
        assert_eq!(lex_string("''"), b"");
    }

    #[test]
    fn test_escapes() {
        assert_eq!(lex_string(r#""\a\b\f\n\r\t\v""#), b"\x07\x08\x0C\n\r\t\x0B");
        assert_eq!(lex_string(r#""\\\"\'""#), b"\\\"'");
        assert_eq!(lex_string(r#""\x41\x62""#), b"Ab");
        assert_eq!(lex_string(r#""\65\066\0""#), b"AB\0");
        assert_eq!(lex_string("\"a\\\nb\""), b"a\nb");
        assert_eq!(lex_string("\"a\\z   \n  b\""), b"ab");
    }

    #[test]
    fn test_escape_unicode() {
        assert_eq!(lex_string(r#""\u{48}""#), b"H");
        assert_eq!(lex_string(r#""\u{E9}""#), "é".as_bytes());
        assert_eq!(lex_string(r#""\u{20AC}""#), "€".as_bytes());
        assert_eq!(lex_string(r#""\u{1F600}""#), "😀".as_bytes());
        assert_eq!(lex_string(r#""\u{7FFFFFFF}""#), &[0xFD, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF]);
    }

    #[test]
    fn test_long_strings() {
        assert_eq!(lex_string("[[hello]]"), b"hello");
        assert_eq!(lex_string("[==[a]]b]=]c]==]"), b"a]]b]=]c");
        assert_eq!(lex_string("[[\nfirst]]"), b"first");
        assert_eq!(lex_string("[[a\r\nb]]"), b"a\nb");
        assert_eq!(lex_string(r"[[no\nescape]]"), br"no\nescape");
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex_tokens("+ - * / // % ^ # & ~ | << >> == ~= <= >= < > = ( ) { } [ ] :: ; : , . .. ..."),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::FloorDiv,
                Token::Percent,
                Token::Caret,
                Token::Hash,
                Token::Ampersand,
                Token::Tilde,
                Token::Pipe,
                Token::ShiftLeft,
                Token::ShiftRight,
                Token::Equal,
                Token::NotEqual,
                Token::LessEq,
                Token::GreaterEq,
                Token::Less,
                Token::Greater,
                Token::Assign,
                Token::LParen,
                Token::RParen,
                Token::LBrace,
                Token::RBrace,
                Token::LBracket,
                Token::RBracket,
                Token::DoubleColon,
                Token::Semi,
                Token::Colon,
                Token::Comma,
                Token::Dot,
                Token::DotDot,
                Token::DotDotDot,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(lex_tokens("-- line\n1"), vec![Token::Number(1.0)]);
        assert_eq!(lex_tokens("--[[ block\n ]] 2"), vec![Token::Number(2.0)]);
        assert_eq!(lex_tokens("--[==[ ]] ]==] 3"), vec![Token::Number(3.0)]);
        assert_eq!(lex_tokens("--[ not long\n4"), vec![Token::Number(4.0)]);
    }

    #[test]
    fn test_shebang_skipped() {
        assert_eq!(lex_tokens("#!/usr/bin/lua\nreturn"), vec![Token::Return]);
    }

    #[test]
    fn test_line_tracking() {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(b"a\nb\r\nc\n\rd\re", "test", &mut strings);
        let lines: Vec<u32> = (0..5).map(|_| lexer.advance().unwrap().span.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_column_tracking() {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(b"local  x", "test", &mut strings);
        assert_eq!(lexer.advance().unwrap().span, Span::new(1, 1));
        assert_eq!(lexer.advance().unwrap().span, Span::new(1, 8));
    }

    #[test]
    fn test_error_unfinished_string() {
        let e = lex_error("\"abc");
        assert_eq!(e.message(), "unfinished string near <eof>");
        let e = lex_error("\"abc\nx\"");
        assert_eq!(e.message(), "unfinished string near '\"abc'");
    }

    #[test]
    fn test_error_unfinished_long_string() {
        let e = lex_error("x = [[\nabc");
        assert_eq!(
            e.message(),
            "unfinished long string (starting at line 1) near <eof>"
        );
        let e = lex_error("--[[ never closed");
        assert!(e.message().starts_with("unfinished long comment"));
    }

    #[test]
    fn test_error_escapes() {
        assert!(lex_error(r#""\q""#).message().starts_with("invalid escape sequence"));
        assert!(lex_error(r#""\300""#).message().starts_with("decimal escape too large"));
        assert!(lex_error(r#""\xZZ""#).message().starts_with("hexadecimal digit expected"));
    }

    #[test]
    fn test_error_malformed_number() {
        assert_eq!(lex_error("3x").message(), "malformed number near '3x'");
        assert_eq!(lex_error("0x").message(), "malformed number near '0x'");
        assert_eq!(lex_error("1e").message(), "malformed number near '1e'");
        assert_eq!(lex_error("1..2").message(), "malformed number near '1..2'");
    }

    #[test]
    fn test_error_unexpected_symbol() {
        let e = lex_error("a = $");
        assert_eq!(e.message(), "unexpected symbol near '$'");
        assert_eq!(e.to_string(), "test:1: unexpected symbol near '$'");
    }

    #[test]
    fn test_negative_number_is_two_tokens() {
        assert_eq!(lex_tokens("-1"), vec![Token::Minus, Token::Number(1.0)]);
    }

    #[test]
    fn test_number_then_concat() {
        assert_eq!(
            lex_tokens("1 .. 2"),
            vec![Token::Number(1.0), Token::DotDot, Token::Number(2.0)]
        );
    }

    #[test]
    fn test_name_interning() {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(b"foo foo", "test", &mut strings);
        let a = lexer.advance().unwrap().token;
        let b = lexer.advance().unwrap().token;
        assert_eq!(a, b);
    }

    #[test]
    fn test_eof_repeated() {
        let mut strings = StringInterner::new();
        let mut lexer = Lexer::new(b"", "test", &mut strings);
        assert_eq!(lexer.advance().unwrap().token, Token::Eof);
        assert_eq!(lexer.advance().unwrap().token, Token::Eof);
    }

    #[test]
    fn test_current_text_for_diagnostics() {
        let mut strings = StringInterner::new();
        let lexer = Lexer::new(b"  1.000 x", "test", &mut strings);
        assert_eq!(lexer.current_text(), "1.000");
    }

    proptest! {
        #[test]
        fn prop_numeric_literal_roundtrip(n in proptest::num::f64::POSITIVE | proptest::num::f64::ZERO) {
            for text in [format!("{n:?}"), format!("{n:e}")] {
                prop_assert_eq!(lex_single(&text), Token::Number(n));
            }
        }

        #[test]
        fn prop_hex_integer_literal(n in 0u32..u32::MAX) {
            prop_assert_eq!(lex_single(&format!("0x{n:x}")), Token::Number(n as f64));
        }

        #[test]
        fn prop_never_panics(src in "\\PC{0,64}") {
            let mut strings = StringInterner::new();
            let mut lexer = Lexer::new(src.as_bytes(), "fuzz", &mut strings);
            for _ in 0..200 {
                match lexer.advance() {
                    Ok(tok) if tok.token == Token::Eof => break,
                    Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
    }
}
