//! `table` library. Element access goes through the metamethod-aware
//! runtime operations; tables without a metatable take the raw fast path.

use crate::library;
use moonlet_core::error::LuaError;
use moonlet_core::gc::GcIdx;
use moonlet_core::native::{register_fn, NativeContext, Runtime};
use moonlet_core::number::{format_number, to_integer_exact};
use moonlet_core::table::LuaTable;
use moonlet_core::value::LuaValue;

/// Cap on values produced by a single `unpack`.
const MAX_UNPACK: i64 = 1_000_000;

pub fn open_table(rt: &mut dyn Runtime) {
    let table = library(rt, "table");
    register_fn(rt, table, "insert", insert);
    register_fn(rt, table, "remove", remove);
    register_fn(rt, table, "concat", concat);
    register_fn(rt, table, "pack", pack);
    register_fn(rt, table, "unpack", unpack);
    register_fn(rt, table, "move", move_);
    register_fn(rt, table, "sort", sort);
}

fn is_raw(ctx: &NativeContext<'_>, t: GcIdx<LuaTable>) -> bool {
    ctx.rt.heap().table(t).metatable.is_none()
}

/// `#t` honoring `__len`.
fn length_of(ctx: &mut NativeContext<'_>, t: GcIdx<LuaTable>) -> Result<i64, LuaError> {
    if is_raw(ctx, t) {
        return Ok(ctx.rt.heap().table(t).array_length() as i64);
    }
    match ctx.rt.length(LuaValue::Table(t))? {
        LuaValue::Number(n) => to_integer_exact(n).ok_or_else(|| LuaError::runtime("object length is not an integer")),
        _ => Err(LuaError::runtime("object length is not an integer")),
    }
}

fn get(ctx: &mut NativeContext<'_>, t: GcIdx<LuaTable>, i: i64) -> Result<LuaValue, LuaError> {
    if is_raw(ctx, t) {
        return Ok(ctx.rt.heap().table(t).get_int(i));
    }
    ctx.rt.index(LuaValue::Table(t), LuaValue::Number(i as f64))
}

fn set(ctx: &mut NativeContext<'_>, t: GcIdx<LuaTable>, i: i64, v: LuaValue) -> Result<(), LuaError> {
    if is_raw(ctx, t) {
        ctx.rt.heap_mut().table_mut(t).set_int(i, v);
        return Ok(());
    }
    ctx.rt.set_index(LuaValue::Table(t), LuaValue::Number(i as f64), v)
}

fn insert(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let n = length_of(ctx, t)?;
    match ctx.arg_count() {
        2 => {
            let v = ctx.arg(1);
            set(ctx, t, n + 1, v)?;
        }
        3 => {
            let pos = ctx.check_integer(1)?;
            if pos < 1 || pos > n + 1 {
                return Err(ctx.arg_error(1, "position out of bounds"));
            }
            let v = ctx.arg(2);
            if is_raw(ctx, t) {
                ctx.rt.heap_mut().table_mut(t).insert(pos as usize, v);
            } else {
                for i in (pos..=n).rev() {
                    let moved = get(ctx, t, i)?;
                    set(ctx, t, i + 1, moved)?;
                }
                set(ctx, t, pos, v)?;
            }
        }
        _ => return Err(LuaError::runtime("wrong number of arguments to 'insert'")),
    }
    Ok(0)
}

fn remove(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let n = length_of(ctx, t)?;
    let pos = ctx.opt_integer(1, n)?;
    if pos != n && (pos < 1 || pos > n + 1) {
        return Err(ctx.arg_error(1, "position out of bounds"));
    }
    if is_raw(ctx, t) && pos >= 1 && pos <= n {
        let removed = ctx.rt.heap_mut().table_mut(t).remove_at(pos as usize);
        return Ok(ctx.ret(&[removed]));
    }
    let removed = get(ctx, t, pos)?;
    let mut i = pos;
    while i < n {
        let next = get(ctx, t, i + 1)?;
        set(ctx, t, i, next)?;
        i += 1;
    }
    set(ctx, t, i, LuaValue::Nil)?;
    Ok(ctx.ret(&[removed]))
}

fn concat(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let sep = match ctx.opt_string(1)? {
        Some(s) => ctx.bytes_of(s).to_vec(),
        None => Vec::new(),
    };
    let first = ctx.opt_integer(2, 1)?;
    let last = match ctx.arg(3) {
        LuaValue::Nil => length_of(ctx, t)?,
        _ => ctx.check_integer(3)?,
    };
    let mut out = Vec::new();
    let mut i = first;
    while i <= last {
        match get(ctx, t, i)? {
            LuaValue::String(s) => out.extend_from_slice(ctx.bytes_of(s)),
            LuaValue::Number(n) => out.extend_from_slice(format_number(n).as_bytes()),
            other => {
                return Err(LuaError::runtime(format!(
                    "invalid value (at index {i}) in table for 'concat' (a {} value)",
                    other.type_name()
                )))
            }
        }
        if i < last {
            out.extend_from_slice(&sep);
        }
        i += 1;
    }
    ctx.push_bytes(&out);
    Ok(1)
}

fn pack(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let n = ctx.arg_count();
    let t = ctx.rt.heap_mut().alloc_table(n, 1);
    for i in 0..n {
        let v = ctx.arg(i);
        ctx.rt.heap_mut().table_mut(t).set_int(i as i64 + 1, v);
    }
    let key = ctx.intern("n");
    ctx.rt.heap_mut().table_mut(t).set_str(key, LuaValue::from(n));
    Ok(ctx.ret(&[LuaValue::Table(t)]))
}

fn unpack(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let first = ctx.opt_integer(1, 1)?;
    let last = match ctx.arg(2) {
        LuaValue::Nil => length_of(ctx, t)?,
        _ => ctx.check_integer(2)?,
    };
    if first > last {
        return Ok(0);
    }
    if last.saturating_sub(first) >= MAX_UNPACK {
        return Err(LuaError::runtime("too many results to unpack"));
    }
    for i in first..=last {
        let v = get(ctx, t, i)?;
        ctx.push(v);
    }
    Ok((last - first + 1) as usize)
}

/// `table.move(a1, f, e, t [, a2])`.
fn move_(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let src = ctx.check_table(0)?;
    let f = ctx.check_integer(1)?;
    let e = ctx.check_integer(2)?;
    let t = ctx.check_integer(3)?;
    let dst = match ctx.arg(4) {
        LuaValue::Nil => src,
        _ => ctx.check_table(4)?,
    };
    if e >= f {
        if f <= 0 && e >= i64::MAX + f {
            return Err(ctx.arg_error(2, "too many elements to move"));
        }
        if t > i64::MAX - (e - f) {
            return Err(ctx.arg_error(3, "destination wrap around"));
        }
        let forward = t > e || t <= f || src != dst;
        let span = e - f;
        for k in 0..=span {
            let k = if forward { k } else { span - k };
            let v = get(ctx, src, f + k)?;
            set(ctx, dst, t + k, v)?;
        }
    }
    Ok(ctx.ret(&[LuaValue::Table(dst)]))
}

fn sort(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let comparator = match ctx.arg(1) {
        LuaValue::Nil => None,
        _ => Some(LuaValue::Function(ctx.check_function(1)?)),
    };
    let n = length_of(ctx, t)?;
    if n > i32::MAX as i64 {
        return Err(ctx.arg_error(0, "array too big"));
    }
    let mut values = Vec::with_capacity(n.max(0) as usize);
    for i in 1..=n {
        values.push(get(ctx, t, i)?);
    }
    let rt = &mut *ctx.rt;
    let mut less = |a: LuaValue, b: LuaValue| -> Result<bool, LuaError> {
        match comparator {
            Some(f) => Ok(rt.call(f, &[a, b])?.first().is_some_and(LuaValue::is_truthy)),
            None => rt.less_than(a, b),
        }
    };
    merge_sort(&mut values, &mut less)?;
    for (i, v) in values.into_iter().enumerate() {
        set(ctx, t, i as i64 + 1, v)?;
    }
    Ok(0)
}

/// Stable merge sort with a fallible comparison; the first comparator
/// error aborts the sort.
fn merge_sort<T: Copy, F>(v: &mut [T], less: &mut F) -> Result<(), LuaError>
where
    F: FnMut(T, T) -> Result<bool, LuaError>,
{
    const INSERTION_MAX: usize = 12;
    if v.len() <= INSERTION_MAX {
        for i in 1..v.len() {
            let mut j = i;
            while j > 0 && less(v[j], v[j - 1])? {
                v.swap(j, j - 1);
                j -= 1;
            }
        }
        return Ok(());
    }
    let mid = v.len() / 2;
    merge_sort(&mut v[..mid], less)?;
    merge_sort(&mut v[mid..], less)?;
    let mut merged = Vec::with_capacity(v.len());
    let (mut i, mut j) = (0, mid);
    while i < mid && j < v.len() {
        if less(v[j], v[i])? {
            merged.push(v[j]);
            j += 1;
        } else {
            merged.push(v[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&v[i..mid]);
    merged.extend_from_slice(&v[j..]);
    v.copy_from_slice(&merged);
    Ok(())
}
