//! Moonlet standard library: `math`, `string`, `table`, `os` and `io.write`.
//!
//! Every library is written against the [`Runtime`] trait, so this crate
//! depends only on `moonlet-core`; the VM passes itself in when opening.

pub mod format;
pub mod io_lib;
pub mod math;
pub mod os_lib;
pub mod pattern;
pub mod string_lib;
pub mod table_lib;

pub use io_lib::open_io;
pub use math::open_math;
pub use os_lib::open_os;
pub use string_lib::open_string;
pub use table_lib::open_table;

use moonlet_core::gc::GcIdx;
use moonlet_core::native::Runtime;
use moonlet_core::table::LuaTable;
use moonlet_core::value::LuaValue;

/// Open every library in this crate.
pub fn open(rt: &mut dyn Runtime) {
    open_math(rt);
    open_string(rt);
    open_table(rt);
    open_os(rt);
    open_io(rt);
    tracing::debug!("standard library opened");
}

/// Create a library table and bind it as a global.
pub(crate) fn library(rt: &mut dyn Runtime, name: &str) -> GcIdx<LuaTable> {
    let table = rt.heap_mut().alloc_table(0, 16);
    let globals = rt.globals();
    set_field(rt, globals, name, LuaValue::Table(table));
    table
}

pub(crate) fn set_field(rt: &mut dyn Runtime, table: GcIdx<LuaTable>, name: &str, value: LuaValue) {
    let key = rt.strings_mut().intern(name.as_bytes());
    rt.heap_mut().table_mut(table).set_str(key, value);
}
