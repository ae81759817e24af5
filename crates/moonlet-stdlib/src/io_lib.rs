//! `io.write` onto the VM's output sink.

use crate::library;
use moonlet_core::error::LuaError;
use moonlet_core::native::{register_fn, NativeContext, Runtime};
use moonlet_core::number::format_number;
use moonlet_core::value::LuaValue;

pub fn open_io(rt: &mut dyn Runtime) {
    let io = library(rt, "io");
    register_fn(rt, io, "write", write);
}

fn write(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let mut buf = Vec::new();
    for i in 0..ctx.arg_count() {
        match ctx.arg(i) {
            LuaValue::String(s) => buf.extend_from_slice(ctx.bytes_of(s)),
            LuaValue::Number(n) => buf.extend_from_slice(format_number(n).as_bytes()),
            _ => return Err(ctx.type_error(i, "string")),
        }
    }
    ctx.rt
        .stdout()
        .write_all(&buf)
        .map_err(|e| LuaError::runtime(e.to_string()))?;
    Ok(0)
}
