//! Compile-time diagnostics.
use thiserror::Error;

/// Maximum length of a displayed chunk name.
const ID_SIZE: usize = 60;

/// Errors from lexing, parsing and code generation. The first error is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Malformed source (lexer or parser).
    #[error("{chunk}:{line}: {message}")]
    Syntax {
        chunk: String,
        line: u32,
        column: u32,
        message: String,
    },
    /// Well-formed source that cannot be compiled (`break` outside a loop,
    /// unknown goto label, assignment to a const variable, limits).
    #[error("{chunk}:{line}: {message}")]
    Semantic {
        chunk: String,
        line: u32,
        column: u32,
        message: String,
    },
}

impl CompileError {
    pub fn message(&self) -> &str {
        match self {
            CompileError::Syntax { message, .. } | CompileError::Semantic { message, .. } => message,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            CompileError::Syntax { line, .. } | CompileError::Semantic { line, .. } => *line,
        }
    }

    pub fn column(&self) -> u32 {
        match self {
            CompileError::Syntax { column, .. } | CompileError::Semantic { column, .. } => *column,
        }
    }

    pub fn chunk(&self) -> &str {
        match self {
            CompileError::Syntax { chunk, .. } | CompileError::Semantic { chunk, .. } => chunk,
        }
    }
}

/// Display form of a chunk name: `=name` is used verbatim, `@file` is a
/// file name, anything else is source text shown as `[string "..."]`.
pub fn chunk_display_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix('=') {
        rest.chars().take(ID_SIZE - 1).collect()
    } else if let Some(file) = name.strip_prefix('@') {
        if file.len() < ID_SIZE {
            file.to_string()
        } else {
            let tail: String = file
                .chars()
                .rev()
                .take(ID_SIZE - 4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("...{tail}")
        }
    } else {
        let first_line = name.lines().next().unwrap_or("");
        let budget = ID_SIZE - "[string \"...\"]".len();
        if first_line.len() < name.len() || first_line.chars().count() > budget {
            let cut: String = first_line.chars().take(budget).collect();
            format!("[string \"{cut}...\"]")
        } else {
            format!("[string \"{first_line}\"]")
        }
    }
}
