//! Moonlet: an embeddable Lua 5.4 engine.
//!
//! [`State`] bundles the compiler, the interpreter and the standard
//! libraries behind a small host API. Lua code runs on the caller's thread;
//! natives may be async, in which case [`State::run`] awaits them on the
//! host's executor and a [`CancellationToken`] can stop the call from any
//! thread.
//!
//! ```no_run
//! use moonlet::{CancellationToken, State};
//!
//! let mut state = State::new();
//! state.open_libs();
//! let token = CancellationToken::new();
//! let out = futures::executor::block_on(state.do_string("return 6 * 7", "=demo", &token)).unwrap();
//! assert_eq!(state.to_string_lossy(out[0]), "42");
//! ```

pub mod config;
pub mod error;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::{Library, State};

pub use moonlet_compiler::CompileError;
pub use moonlet_core::error::LuaError;
pub use moonlet_core::native::{AsyncCompletion, CancellationToken, NativeContext, NativeFuture};
pub use moonlet_core::value::LuaValue;
pub use moonlet_vm::{FileModuleLoader, MemoryModuleLoader, ModuleLoader, ModuleSource};

/// Version reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
