//! Moonlet core types: values, strings, tables, the heap and the native
//! function boundary.

pub mod error;
pub mod gc;
pub mod native;
pub mod number;
pub mod string;
pub mod table;
pub mod value;

pub use error::{FrameInfo, LuaError, Traceback};
pub use gc::{GcIdx, Heap};
pub use native::{CancellationToken, NativeContext, NativeFunction, Runtime};
pub use string::{StringId, StringInterner};
pub use table::LuaTable;
pub use value::{LuaFunction, LuaValue, ThreadId};
