//! `os` library: clock, time and environment lookup. Dates are UTC.

use crate::library;
use moonlet_core::error::LuaError;
use moonlet_core::gc::GcIdx;
use moonlet_core::native::{register_fn, NativeContext, Runtime};
use moonlet_core::number::to_integer_exact;
use moonlet_core::table::LuaTable;
use moonlet_core::value::LuaValue;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub fn open_os(rt: &mut dyn Runtime) {
    let os = library(rt, "os");
    let start = Instant::now();
    register_fn(rt, os, "clock", move |ctx: &mut NativeContext<'_>| {
        Ok(ctx.ret(&[LuaValue::Number(start.elapsed().as_secs_f64())]))
    });
    register_fn(rt, os, "time", time);
    register_fn(rt, os, "getenv", |ctx: &mut NativeContext<'_>| {
        let name = ctx.check_bytes(0)?;
        let value = std::str::from_utf8(&name).ok().and_then(|n| std::env::var(n).ok());
        match value {
            Some(v) => ctx.push_str(&v),
            None => ctx.push(LuaValue::Nil),
        }
        Ok(1)
    });
}

fn time(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = match ctx.arg(0) {
        LuaValue::Nil => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            return Ok(ctx.ret(&[LuaValue::Number(now as f64)]));
        }
        _ => ctx.check_table(0)?,
    };
    let year = field(ctx, t, "year", None)?;
    let month = field(ctx, t, "month", None)?;
    let day = field(ctx, t, "day", None)?;
    let hour = field(ctx, t, "hour", Some(12))?;
    let min = field(ctx, t, "min", Some(0))?;
    let sec = field(ctx, t, "sec", Some(0))?;
    let stamp = timestamp(year, month, day, hour, min, sec);
    Ok(ctx.ret(&[LuaValue::Number(stamp as f64)]))
}

/// Integer field of a date table; missing fields take `default` or fail.
fn field(ctx: &mut NativeContext<'_>, t: GcIdx<LuaTable>, name: &str, default: Option<i64>) -> Result<i64, LuaError> {
    let key = ctx.intern(name);
    match ctx.rt.heap().table(t).get_str(key) {
        LuaValue::Nil => default.ok_or_else(|| LuaError::runtime(format!("field '{name}' missing in date table"))),
        LuaValue::Number(n) => to_integer_exact(n)
            .filter(|v| i32::try_from(*v).is_ok())
            .ok_or_else(|| LuaError::runtime(format!("field '{name}' is not an integer or is out-of-bound"))),
        _ => Err(LuaError::runtime(format!("field '{name}' is not an integer"))),
    }
}

/// Seconds since the epoch for a UTC calendar time; out-of-range fields
/// carry into the next unit (month 13 is January of the next year).
pub fn timestamp(year: i64, month: i64, day: i64, hour: i64, min: i64, sec: i64) -> i64 {
    let m0 = month - 1;
    let year = year + m0.div_euclid(12);
    let month = m0.rem_euclid(12) + 1;
    let days = days_from_civil(year, month, 1) + day - 1;
    days * 86_400 + hour * 3_600 + min * 60 + sec
}

/// Days since 1970-01-01 of a proleptic Gregorian date.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
