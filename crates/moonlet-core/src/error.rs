//! Runtime error type shared by the VM, the native boundary and the libraries.
use crate::table::TableError;
use crate::value::LuaValue;
use std::fmt;

/// One active call frame, innermost first in a [`Traceback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Function description, e.g. `function 'fib'`, `main chunk`, `field 'insert'`.
    pub function: String,
    /// Short chunk name (`[string "..."]`, file name, or `[builtin]`).
    pub source: String,
    /// Current line, when known.
    pub line: Option<u32>,
}

/// Ordered list of the frames active when an error was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Traceback {
    pub frames: Vec<FrameInfo>,
}

impl Traceback {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for Traceback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stack traceback:")?;
        for frame in &self.frames {
            match frame.line {
                Some(line) => write!(f, "\n\t{}:{}: in {}", frame.source, line, frame.function)?,
                None => write!(f, "\n\t{}: in {}", frame.source, frame.function)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LuaError {
    /// Message not yet prefixed with a source position; the VM adds
    /// `chunk:line:` of the raising Lua frame when it unwinds.
    #[error("{0}")]
    Runtime(String),
    /// An arbitrary value raised by `error(v)` or an already positioned message.
    #[error("(error object is a {} value)", .0.type_name())]
    Value(LuaValue),
    #[error("cancelled")]
    Cancelled,
    #[error("stack overflow")]
    StackOverflow,
    #[error("module '{name}' not found:{searched}")]
    ModuleNotFound { name: String, searched: String },
    /// An error that left the VM, with the frames that were active.
    #[error("{error}")]
    Traced {
        error: Box<LuaError>,
        traceback: Traceback,
    },
}

impl LuaError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        LuaError::Runtime(msg.into())
    }

    /// `bad argument #n to 'name' (msg)`.
    pub fn bad_argument(arg: usize, func: &str, msg: impl fmt::Display) -> Self {
        LuaError::Runtime(format!("bad argument #{arg} to '{func}' ({msg})"))
    }

    /// Strip any traceback wrapper.
    pub fn root(&self) -> &LuaError {
        match self {
            LuaError::Traced { error, .. } => error.root(),
            other => other,
        }
    }

    pub fn into_root(self) -> LuaError {
        match self {
            LuaError::Traced { error, .. } => error.into_root(),
            other => other,
        }
    }

    pub fn traceback(&self) -> Option<&Traceback> {
        match self {
            LuaError::Traced { traceback, .. } => Some(traceback),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), LuaError::Cancelled)
    }
}

impl From<TableError> for LuaError {
    fn from(e: TableError) -> Self {
        LuaError::Runtime(e.to_string())
    }
}
