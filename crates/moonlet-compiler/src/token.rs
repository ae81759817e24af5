//! Lexical tokens and source positions.
//!
//! Positions are what error messages and line info are built from: a
//! [`Span`] is the position of the first byte of a token, and AST nodes
//! reuse the span of the token that starts them.

use moonlet_core::string::StringId;
use std::fmt;

/// Where a token starts.
///
/// `line` counts from 1 and advances on `\n`, `\r`, `\r\n` or `\n\r`.
/// `column` counts bytes from 1 at the start of each line, so multibyte
/// UTF-8 characters occupy several columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    /// Position of code that has no source text, such as builtin trampolines.
    pub const NONE: Span = Span { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Span { line, column }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Reserved words and their tokens.
const KEYWORDS: [(&str, Token); 22] = [
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

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    And,
    Break,
    Do,
    Else,
    ElseIf,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    /// Numeric literal, already converted. Integer and float syntax both
    /// land here since every number is an `f64`.
    Number(f64),
    /// String literal with escapes resolved, interned.
    String(StringId),
    /// Identifier, interned.
    Name(StringId),

    Plus,
    Minus,
    Star,
    Slash,
    FloorDiv,
    Percent,
    Caret,
    Hash,
    Ampersand,
    Tilde,
    Pipe,
    ShiftLeft,
    ShiftRight,
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleColon,
    Semi,
    Colon,
    Comma,
    Dot,
    DotDot,
    DotDotDot,

    Eof,
}

impl Token {
    /// The keyword spelled by `word`, if it is reserved.
    pub fn keyword_from_bytes(word: &[u8]) -> Option<Token> {
        KEYWORDS
            .iter()
            .find(|(text, _)| text.as_bytes() == word)
            .map(|(_, token)| token.clone())
    }

    /// Fixed source text of keywords and punctuation. Literals, names and
    /// end of input have none.
    pub fn text(&self) -> Option<&'static str> {
        if let Some((text, _)) = KEYWORDS.iter().find(|(_, token)| token == self) {
            return Some(*text);
        }
        let text = match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::FloorDiv => "//",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Hash => "#",
            Token::Ampersand => "&",
            Token::Tilde => "~",
            Token::Pipe => "|",
            Token::ShiftLeft => "<<",
            Token::ShiftRight => ">>",
            Token::Equal => "==",
            Token::NotEqual => "~=",
            Token::Less => "<",
            Token::LessEq => "<=",
            Token::Greater => ">",
            Token::GreaterEq => ">=",
            Token::Assign => "=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::DoubleColon => "::",
            Token::Semi => ";",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::DotDot => "..",
            Token::DotDotDot => "...",
            _ => return None,
        };
        Some(text)
    }

    /// Tokens that close a block. A `return` must be followed by one of
    /// these, optionally after a `;`.
    pub fn is_block_end(&self) -> bool {
        matches!(self, Token::Else | Token::ElseIf | Token::End | Token::Until | Token::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.text() {
            return f.write_str(text);
        }
        match self {
            Token::Number(n) => f.write_str(&moonlet_core::number::format_number(*n)),
            Token::String(_) => f.write_str("<string>"),
            Token::Name(_) => f.write_str("<name>"),
            _ => f.write_str("<eof>"),
        }
    }
}
