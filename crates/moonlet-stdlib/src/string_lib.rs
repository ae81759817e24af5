//! `string` library. Strings get a shared metatable whose `__index` is this
//! table, so `s:upper()` works.

use crate::format::{self, Spec};
use crate::library;
use crate::pattern::{find_plain, is_plain, Capture, Match, Matcher, PatternError};
use moonlet_core::error::LuaError;
use moonlet_core::native::{native_value, register_fn, NativeContext, NativeFunction, Runtime};
use moonlet_core::number::format_number;
use moonlet_core::value::LuaValue;
use std::cell::RefCell;
use std::rc::Rc;

const MAX_STRING_SIZE: usize = i32::MAX as usize;

pub fn open_string(rt: &mut dyn Runtime) {
    let string = library(rt, "string");
    register_fn(rt, string, "len", len);
    register_fn(rt, string, "sub", sub);
    register_fn(rt, string, "upper", |ctx: &mut NativeContext<'_>| {
        let s = ctx.check_bytes(0)?;
        ctx.push_bytes(&s.to_ascii_uppercase());
        Ok(1)
    });
    register_fn(rt, string, "lower", |ctx: &mut NativeContext<'_>| {
        let s = ctx.check_bytes(0)?;
        ctx.push_bytes(&s.to_ascii_lowercase());
        Ok(1)
    });
    register_fn(rt, string, "rep", rep);
    register_fn(rt, string, "reverse", |ctx: &mut NativeContext<'_>| {
        let mut s = ctx.check_bytes(0)?;
        s.reverse();
        ctx.push_bytes(&s);
        Ok(1)
    });
    register_fn(rt, string, "byte", byte);
    register_fn(rt, string, "char", char);
    register_fn(rt, string, "format", format);
    register_fn(rt, string, "find", |ctx: &mut NativeContext<'_>| find(ctx, true));
    register_fn(rt, string, "match", |ctx: &mut NativeContext<'_>| find(ctx, false));
    register_fn(rt, string, "gmatch", gmatch);
    register_fn(rt, string, "gsub", gsub);

    let meta = rt.heap_mut().alloc_table(0, 1);
    let index = rt.strings_mut().intern(b"__index");
    rt.heap_mut().table_mut(meta).set_str(index, LuaValue::Table(string));
    rt.set_string_metatable(Some(meta));
}

/// 1-based start position: negatives count from the end, clamped to 1.
fn start_index(pos: i64, len: usize) -> usize {
    if pos > 0 {
        pos as usize
    } else if pos == 0 || pos.unsigned_abs() as usize > len {
        1
    } else {
        len - pos.unsigned_abs() as usize + 1
    }
}

/// 1-based end position, clamped to `len`.
fn end_index(pos: i64, len: usize) -> usize {
    if pos > len as i64 {
        len
    } else if pos >= 0 {
        pos as usize
    } else if pos.unsigned_abs() as usize > len {
        0
    } else {
        len - pos.unsigned_abs() as usize + 1
    }
}

fn pattern_error(e: PatternError) -> LuaError {
    LuaError::runtime(e.to_string())
}

fn len(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let s = ctx.check_string(0)?;
    let n = ctx.bytes_of(s).len();
    Ok(ctx.ret(&[LuaValue::from(n)]))
}

fn sub(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let s = ctx.check_bytes(0)?;
    let i = start_index(ctx.opt_integer(1, 1)?, s.len());
    let j = end_index(ctx.opt_integer(2, -1)?, s.len());
    if i <= j {
        ctx.push_bytes(&s[i - 1..j]);
    } else {
        ctx.push_str("");
    }
    Ok(1)
}

fn rep(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let s = ctx.check_bytes(0)?;
    let n = ctx.check_integer(1)?;
    let sep = match ctx.opt_string(2)? {
        Some(id) => ctx.bytes_of(id).to_vec(),
        None => Vec::new(),
    };
    if n <= 0 {
        ctx.push_str("");
        return Ok(1);
    }
    let n = n as usize;
    let total = (s.len() + sep.len())
        .checked_mul(n)
        .filter(|&t| t <= MAX_STRING_SIZE)
        .ok_or_else(|| LuaError::runtime("resulting string too large"))?;
    let mut out = Vec::with_capacity(total);
    for k in 0..n {
        if k > 0 {
            out.extend_from_slice(&sep);
        }
        out.extend_from_slice(&s);
    }
    ctx.push_bytes(&out);
    Ok(1)
}

fn byte(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let s = ctx.check_bytes(0)?;
    let first = ctx.opt_integer(1, 1)?;
    let i = start_index(first, s.len());
    let j = end_index(ctx.opt_integer(2, first)?, s.len());
    if i > j {
        return Ok(0);
    }
    for &b in &s[i - 1..j] {
        ctx.push(LuaValue::from(b as i32));
    }
    Ok(j - i + 1)
}

fn char(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let mut out = Vec::with_capacity(ctx.arg_count());
    for i in 0..ctx.arg_count() {
        let c = ctx.check_integer(i)?;
        let b = u8::try_from(c).map_err(|_| ctx.arg_error(i, "value out of range"))?;
        out.push(b);
    }
    ctx.push_bytes(&out);
    Ok(1)
}

fn pad_bytes(spec: &Spec, body: &[u8]) -> Vec<u8> {
    let fill = spec.width.saturating_sub(body.len());
    let mut out = Vec::with_capacity(body.len() + fill);
    if !spec.left {
        out.resize(fill, b' ');
    }
    out.extend_from_slice(body);
    if spec.left {
        out.resize(out.len() + fill, b' ');
    }
    out
}

fn format(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let fmt = ctx.check_bytes(0)?;
    let mut out = Vec::with_capacity(fmt.len());
    let mut arg = 0;
    let mut i = 0;
    while i < fmt.len() {
        let c = fmt[i];
        i += 1;
        if c != b'%' {
            out.push(c);
            continue;
        }
        if fmt.get(i) == Some(&b'%') {
            out.push(b'%');
            i += 1;
            continue;
        }
        let spec = format::parse_spec(&fmt, &mut i).map_err(LuaError::Runtime)?;
        arg += 1;
        if arg >= ctx.arg_count() {
            return Err(ctx.arg_error(arg, "no value"));
        }
        match spec.conv {
            b'c' => {
                let b = ctx.check_integer(arg)? as u8;
                out.extend_from_slice(&pad_bytes(&spec, &[b]));
            }
            b'd' | b'i' => {
                let n = ctx.check_integer(arg)?;
                out.extend_from_slice(format::integer(&spec, n).as_bytes());
            }
            b'u' | b'o' | b'x' | b'X' => {
                let n = ctx.check_integer(arg)?;
                out.extend_from_slice(format::unsigned(&spec, n).as_bytes());
            }
            b'a' | b'A' | b'e' | b'E' | b'f' | b'F' | b'g' | b'G' => {
                let n = ctx.check_number(arg)?;
                out.extend_from_slice(format::float(&spec, n).as_bytes());
            }
            b'q' => match ctx.arg(arg) {
                LuaValue::String(s) => out.extend_from_slice(&format::quote_string(ctx.bytes_of(s))),
                LuaValue::Number(n) => out.extend_from_slice(format::quote_number(n).as_bytes()),
                v @ (LuaValue::Nil | LuaValue::Boolean(_)) => {
                    out.extend_from_slice(v.display(ctx.rt.strings()).to_string().as_bytes())
                }
                _ => return Err(ctx.arg_error(arg, "value has no literal form")),
            },
            b's' => {
                let s = ctx.rt.tostring(ctx.arg(arg))?;
                let bytes = ctx.bytes_of(s);
                let body = match spec.precision {
                    Some(p) => &bytes[..p.min(bytes.len())],
                    None => bytes,
                };
                let padded = pad_bytes(&spec, body);
                out.extend_from_slice(&padded);
            }
            other => {
                return Err(LuaError::runtime(format!(
                    "invalid conversion '%{}' to 'format'",
                    other as char
                )))
            }
        }
    }
    ctx.push_bytes(&out);
    Ok(1)
}

/// Intern a capture: spans become strings, positions 1-based numbers.
fn capture_value(ctx: &mut NativeContext<'_>, src: &[u8], cap: Capture) -> LuaValue {
    match cap {
        Capture::Span(s, e) => LuaValue::String(ctx.rt.strings_mut().intern(&src[s..e])),
        Capture::Position(p) => LuaValue::from(p + 1),
    }
}

fn push_captures(ctx: &mut NativeContext<'_>, src: &[u8], m: &Match) -> usize {
    let values = m.values();
    for &cap in &values {
        let v = capture_value(ctx, src, cap);
        ctx.push(v);
    }
    values.len()
}

/// Shared body of `string.find` (positions and captures) and `string.match`
/// (captures only).
fn find(ctx: &mut NativeContext<'_>, positions: bool) -> Result<usize, LuaError> {
    let src = ctx.check_bytes(0)?;
    let pat = ctx.check_bytes(1)?;
    let init = start_index(ctx.opt_integer(2, 1)?, src.len());
    if init > src.len() + 1 {
        return Ok(ctx.ret(&[LuaValue::Nil]));
    }
    if positions && (ctx.arg(3).is_truthy() || is_plain(&pat)) {
        return Ok(match find_plain(&src, &pat, init - 1) {
            Some(at) => ctx.ret(&[LuaValue::from(at + 1), LuaValue::from(at + pat.len())]),
            None => ctx.ret(&[LuaValue::Nil]),
        });
    }
    let found = Matcher::new(&src, &pat).find(init - 1).map_err(pattern_error)?;
    let Some(m) = found else {
        return Ok(ctx.ret(&[LuaValue::Nil]));
    };
    if positions {
        ctx.push(LuaValue::from(m.start + 1));
        ctx.push(LuaValue::from(m.end));
        let mut count = 2;
        for &cap in &m.captures {
            let v = capture_value(ctx, &src, cap);
            ctx.push(v);
            count += 1;
        }
        Ok(count)
    } else {
        Ok(push_captures(ctx, &src, &m))
    }
}

struct GmatchState {
    src: Vec<u8>,
    pat: Vec<u8>,
    pos: usize,
    last_end: Option<usize>,
}

fn gmatch(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let src = ctx.check_bytes(0)?;
    let pat = ctx.check_bytes(1)?;
    let init = start_index(ctx.opt_integer(2, 1)?, src.len());
    let state = Rc::new(RefCell::new(GmatchState {
        pos: (init - 1).min(src.len() + 1),
        src,
        pat,
        last_end: None,
    }));
    let iter = NativeFunction::new("gmatch_iterator", move |ctx: &mut NativeContext<'_>| {
        let mut st = state.borrow_mut();
        let GmatchState { src, pat, pos, last_end } = &mut *st;
        let mut matcher = Matcher::new(src, pat);
        while *pos <= src.len() {
            if let Some(m) = matcher.match_at(*pos, 0).map_err(pattern_error)? {
                if Some(m.end) != *last_end {
                    *pos = m.end;
                    *last_end = Some(m.end);
                    return Ok(push_captures(ctx, src, &m));
                }
            }
            *pos += 1;
        }
        Ok(0)
    });
    let f = native_value(ctx.rt, iter);
    Ok(ctx.ret(&[f]))
}

fn gsub(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let src = ctx.check_bytes(0)?;
    let pat = ctx.check_bytes(1)?;
    let repl = ctx.arg(2);
    let template = match repl {
        LuaValue::String(_) | LuaValue::Number(_) => Some(ctx.check_bytes(2)?),
        LuaValue::Table(_) | LuaValue::Function(_) => None,
        other => {
            return Err(ctx.arg_error(
                2,
                format_args!("string/function/table expected, got {}", other.type_name()),
            ))
        }
    };
    let max = ctx.opt_integer(3, src.len() as i64 + 1)?;

    let mut matcher = Matcher::new(&src, &pat);
    let (anchored, p) = matcher.anchor();
    let mut out = Vec::with_capacity(src.len());
    let mut pos = 0;
    let mut last_end = None;
    let mut count = 0i64;
    while count < max {
        let hit = matcher.match_at(pos, p).map_err(pattern_error)?;
        match hit {
            Some(m) if Some(m.end) != last_end => {
                count += 1;
                append_replacement(ctx, &src, &m, repl, template.as_deref(), &mut out)?;
                pos = m.end;
                last_end = Some(m.end);
            }
            _ if pos < src.len() => {
                out.push(src[pos]);
                pos += 1;
            }
            _ => break,
        }
        if anchored {
            break;
        }
    }
    out.extend_from_slice(&src[pos.min(src.len())..]);
    ctx.push_bytes(&out);
    Ok(ctx.ret(&[LuaValue::Number(count as f64)]) + 1)
}

fn append_replacement(
    ctx: &mut NativeContext<'_>,
    src: &[u8],
    m: &Match,
    repl: LuaValue,
    template: Option<&[u8]>,
    out: &mut Vec<u8>,
) -> Result<(), LuaError> {
    if let Some(template) = template {
        return expand_template(src, m, template, out);
    }
    let values = m.values();
    let value = match repl {
        LuaValue::Table(_) => {
            let key = capture_value(ctx, src, values[0]);
            ctx.rt.index(repl, key)?
        }
        _ => {
            let args: Vec<LuaValue> = values.iter().map(|&c| capture_value(ctx, src, c)).collect();
            ctx.rt.call(repl, &args)?.first().copied().unwrap_or(LuaValue::Nil)
        }
    };
    match value {
        LuaValue::Nil | LuaValue::Boolean(false) => out.extend_from_slice(&src[m.start..m.end]),
        LuaValue::String(s) => out.extend_from_slice(ctx.bytes_of(s)),
        LuaValue::Number(n) => out.extend_from_slice(format_number(n).as_bytes()),
        other => {
            return Err(LuaError::runtime(format!(
                "invalid replacement value (a {})",
                other.type_name()
            )))
        }
    }
    Ok(())
}

fn expand_template(src: &[u8], m: &Match, template: &[u8], out: &mut Vec<u8>) -> Result<(), LuaError> {
    let mut i = 0;
    while i < template.len() {
        let c = template[i];
        i += 1;
        if c != b'%' {
            out.push(c);
            continue;
        }
        match template.get(i) {
            Some(b'%') => out.push(b'%'),
            Some(d) if d.is_ascii_digit() => {
                let idx = (d - b'0') as usize;
                let cap = m.capture(idx).map_err(|_| {
                    LuaError::runtime(format!("invalid capture index %{idx} in replacement string"))
                })?;
                match cap {
                    Capture::Span(s, e) => out.extend_from_slice(&src[s..e]),
                    Capture::Position(p) => out.extend_from_slice(format_number((p + 1) as f64).as_bytes()),
                }
            }
            _ => return Err(LuaError::runtime("invalid use of '%' in replacement string")),
        }
        i += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_index_clamps() {
        assert_eq!(start_index(1, 5), 1);
        assert_eq!(start_index(0, 5), 1);
        assert_eq!(start_index(-2, 5), 4);
        assert_eq!(start_index(-9, 5), 1);
        assert_eq!(start_index(9, 5), 9);
    }

    #[test]
    fn test_end_index_clamps() {
        assert_eq!(end_index(-1, 5), 5);
        assert_eq!(end_index(9, 5), 5);
        assert_eq!(end_index(0, 5), 0);
        assert_eq!(end_index(-9, 5), 0);
    }

    #[test]
    fn test_expand_template() {
        let m = Matcher::new(b"hello world", b"(o)()").find(0).unwrap().unwrap();
        let mut out = Vec::new();
        expand_template(b"hello world", &m, b"[%1|%2|%0|%%]", &mut out).unwrap();
        assert_eq!(out, b"[o|6|o|%]");
    }

    #[test]
    fn test_expand_template_errors() {
        let m = Matcher::new(b"abc", b"b").find(0).unwrap().unwrap();
        let mut out = Vec::new();
        let err = expand_template(b"abc", &m, b"%2", &mut out).unwrap_err();
        assert_eq!(err.to_string(), "invalid capture index %2 in replacement string");
        let err = expand_template(b"abc", &m, b"%x", &mut out).unwrap_err();
        assert_eq!(err.to_string(), "invalid use of '%' in replacement string");
    }

    #[test]
    fn test_pad_bytes() {
        let spec = Spec {
            width: 5,
            ..Spec::default()
        };
        assert_eq!(pad_bytes(&spec, b"ab"), b"   ab");
        let left = Spec {
            width: 5,
            left: true,
            ..Spec::default()
        };
        assert_eq!(pad_bytes(&left, b"ab"), b"ab   ");
    }
}
