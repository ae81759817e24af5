//! Errors surfaced to embedding hosts.

use moonlet_compiler::CompileError;
use moonlet_core::error::LuaError;
use moonlet_vm::Vm;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// An error that escaped every `pcall`, with the Lua stack at the
    /// point it was raised. Displays the message, then the traceback on
    /// the following lines.
    #[error("{message}{}", with_newline(.traceback))]
    Runtime {
        message: String,
        traceback: Option<String>,
    },
    #[error("module '{name}' not found:{searched}")]
    ModuleNotFound { name: String, searched: String },
    #[error("cancelled")]
    Cancelled,
    #[error("cannot open {path}: {source}")]
    Io { path: String, source: std::io::Error },
}

impl Error {
    pub(crate) fn from_lua(vm: &Vm, e: LuaError) -> Self {
        match e.root() {
            LuaError::Cancelled => Error::Cancelled,
            LuaError::ModuleNotFound { name, searched } => Error::ModuleNotFound {
                name: name.clone(),
                searched: searched.clone(),
            },
            _ => Error::Runtime {
                message: vm.error_message(&e),
                traceback: e.traceback().map(|tb| tb.to_string()),
            },
        }
    }

    pub fn traceback(&self) -> Option<&str> {
        match self {
            Error::Runtime { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

fn with_newline(traceback: &Option<String>) -> String {
    traceback.as_deref().map(|tb| format!("\n{tb}")).unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
