//! Moonlet virtual machine: register-based bytecode interpreter, coroutines,
//! garbage collector and the base, coroutine and package libraries.

pub mod arith;
pub mod base_lib;
pub mod callinfo;
pub mod coerce;
pub mod compare;
pub mod coroutine_lib;
pub mod debug;
pub mod dispatch;
pub mod gc;
pub mod loader;
pub mod metamethod;
pub mod vm;

pub use base_lib::open_base;
pub use coroutine_lib::open_coroutine;
pub use loader::{open_package, FileModuleLoader, MemoryModuleLoader, ModuleLoader, ModuleSource};
pub use moonlet_core::error::LuaError;
pub use vm::{CaptureBuffer, ThreadStatus, Vm, VmConfig};

