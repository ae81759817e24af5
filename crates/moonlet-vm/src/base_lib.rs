//! Base library: the global functions every chunk sees.
//!
//! `pcall`, `xpcall` and the coroutine entry points are intrinsics the
//! interpreter loop runs itself; everything else here is an ordinary native.

use crate::vm::Vm;
use moonlet_core::error::{LuaError, Traceback};
use moonlet_core::native::{native_value, register_fn, register_native, Intrinsic, NativeContext, NativeFunction};
use moonlet_core::number::str_to_number;
use moonlet_core::value::LuaValue;

pub(crate) fn vm_of<'c>(ctx: &'c mut NativeContext<'_>) -> Result<&'c mut Vm, LuaError> {
    let name = ctx.name.clone();
    ctx.rt
        .as_any_mut()
        .downcast_mut::<Vm>()
        .ok_or_else(|| LuaError::runtime(format!("'{name}' needs a moonlet VM")))
}

/// Install the base functions, `_G`, `_VERSION` and `debug.traceback`.
pub fn open_base(vm: &mut Vm) {
    let g = vm.globals;
    register_fn(vm, g, "print", print);
    register_fn(vm, g, "type", lua_type);
    register_fn(vm, g, "tostring", tostring);
    register_fn(vm, g, "tonumber", tonumber);
    register_fn(vm, g, "select", select);
    register_fn(vm, g, "rawget", rawget);
    register_fn(vm, g, "rawset", rawset);
    register_fn(vm, g, "rawequal", rawequal);
    register_fn(vm, g, "rawlen", rawlen);
    register_fn(vm, g, "setmetatable", setmetatable);
    register_fn(vm, g, "getmetatable", getmetatable);
    register_fn(vm, g, "assert", assert);
    register_fn(vm, g, "error", error);
    register_fn(vm, g, "collectgarbage", collectgarbage);
    register_fn(vm, g, "load", load);
    register_fn(vm, g, "loadfile", loadfile);
    register_fn(vm, g, "dofile", dofile);

    let next = register_fn(vm, g, "next", next);
    register_native(vm, g, NativeFunction::new("pairs", pairs).with_upvalue(next));
    let iter = native_value(vm, NativeFunction::new("ipairs_iter", ipairs_iter));
    register_native(vm, g, NativeFunction::new("ipairs", ipairs).with_upvalue(iter));

    register_native(vm, g, NativeFunction::intrinsic("pcall", Intrinsic::Pcall));
    register_native(vm, g, NativeFunction::intrinsic("xpcall", Intrinsic::Xpcall));

    vm.set_global("_G", LuaValue::Table(g));
    let version = vm.intern("Lua 5.4");
    vm.set_global("_VERSION", LuaValue::String(version));

    let debug = vm.heap.alloc_table(0, 4);
    register_fn(vm, debug, "traceback", traceback);
    vm.set_global("debug", LuaValue::Table(debug));
}

fn print(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let mut line = Vec::new();
    for i in 0..ctx.arg_count() {
        if i > 0 {
            line.push(b'\t');
        }
        let v = ctx.arg(i);
        let s = ctx.rt.tostring(v)?;
        line.extend_from_slice(ctx.rt.strings().get_bytes(s));
    }
    line.push(b'\n');
    ctx.rt
        .stdout()
        .write_all(&line)
        .map_err(|e| LuaError::runtime(format!("print: {e}")))?;
    Ok(0)
}

fn lua_type(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let v = ctx.check_any(0)?;
    ctx.push_str(v.type_name());
    Ok(1)
}

fn tostring(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let v = ctx.check_any(0)?;
    let s = ctx.rt.tostring(v)?;
    Ok(ctx.ret(&[LuaValue::String(s)]))
}

/// Digits of `text` in `base`, with optional sign and surrounding spaces.
/// Overflow wraps like integer arithmetic.
fn parse_in_base(text: &[u8], base: u32) -> Option<f64> {
    let text = std::str::from_utf8(text).ok()?.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() {
        return None;
    }
    let mut n: i64 = 0;
    for c in digits.chars() {
        let d = c.to_digit(base)?;
        n = n.wrapping_mul(base as i64).wrapping_add(d as i64);
    }
    Some(if negative { n.wrapping_neg() } else { n } as f64)
}

fn tonumber(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    if ctx.arg(1).is_nil() {
        let result = match ctx.check_any(0)? {
            v @ LuaValue::Number(_) => v,
            LuaValue::String(s) => str_to_number(ctx.bytes_of(s)).map_or(LuaValue::Nil, LuaValue::Number),
            _ => LuaValue::Nil,
        };
        return Ok(ctx.ret(&[result]));
    }
    let base = ctx.check_integer(1)?;
    if !(2..=36).contains(&base) {
        return Err(ctx.arg_error(1, "base out of range"));
    }
    let LuaValue::String(s) = ctx.arg(0) else {
        return Err(ctx.type_error(0, "string"));
    };
    let result = parse_in_base(ctx.bytes_of(s), base as u32).map_or(LuaValue::Nil, LuaValue::Number);
    Ok(ctx.ret(&[result]))
}

fn select(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let total = ctx.arg_count() as i64;
    if let LuaValue::String(s) = ctx.arg(0) {
        if ctx.bytes_of(s) == b"#" {
            return Ok(ctx.ret(&[LuaValue::Number((total - 1) as f64)]));
        }
    }
    let n = ctx.check_integer(0)?;
    let n = if n < 0 { total + n } else { n.min(total) };
    if n < 1 {
        return Err(ctx.arg_error(0, "index out of range"));
    }
    let values = ctx.args()[n as usize..].to_vec();
    Ok(ctx.ret(&values))
}

fn next(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let key = ctx.arg(1);
    match ctx.rt.heap().table(t).next(key) {
        Ok(Some((k, v))) => Ok(ctx.ret(&[k, v])),
        Ok(None) => Ok(ctx.ret(&[LuaValue::Nil])),
        Err(e) => Err(LuaError::runtime(e.to_string())),
    }
}

fn pairs(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let v = ctx.check_any(0)?;
    let handler = {
        let vm = vm_of(ctx)?;
        vm.metamethod(v, vm.names.pairs)
    };
    if !handler.is_nil() {
        let mut results = ctx.rt.call(handler, &[v])?;
        results.resize(3, LuaValue::Nil);
        return Ok(ctx.ret(&results));
    }
    if !matches!(v, LuaValue::Table(_)) {
        return Err(ctx.type_error(0, "table"));
    }
    let next = ctx.upvalue;
    Ok(ctx.ret(&[next, v, LuaValue::Nil]))
}

fn ipairs(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let v = ctx.check_any(0)?;
    let iter = ctx.upvalue;
    Ok(ctx.ret(&[iter, v, LuaValue::Number(0.0)]))
}

fn ipairs_iter(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let i = ctx.check_integer(1)? + 1;
    let key = LuaValue::Number(i as f64);
    let obj = ctx.arg(0);
    let v = ctx.rt.index(obj, key)?;
    if v.is_nil() {
        Ok(ctx.ret(&[LuaValue::Nil]))
    } else {
        Ok(ctx.ret(&[key, v]))
    }
}

fn rawget(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let v = ctx.rt.heap().table(t).get(ctx.arg(1));
    Ok(ctx.ret(&[v]))
}

fn rawset(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let key = ctx.check_any(1)?;
    let value = ctx.check_any(2)?;
    ctx.rt
        .heap_mut()
        .table_mut(t)
        .set(key, value)
        .map_err(|e| LuaError::runtime(e.to_string()))?;
    Ok(ctx.ret(&[LuaValue::Table(t)]))
}

fn rawequal(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let a = ctx.check_any(0)?;
    let b = ctx.check_any(1)?;
    Ok(ctx.ret(&[LuaValue::Boolean(a == b)]))
}

fn rawlen(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let n = match ctx.arg(0) {
        LuaValue::Table(t) => ctx.rt.heap().table(t).array_length(),
        LuaValue::String(s) => ctx.bytes_of(s).len(),
        _ => return Err(ctx.arg_error(0, "table or string expected")),
    };
    Ok(ctx.ret(&[LuaValue::Number(n as f64)]))
}

fn setmetatable(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let t = ctx.check_table(0)?;
    let mt = match ctx.arg(1) {
        LuaValue::Nil => None,
        LuaValue::Table(mt) => Some(mt),
        _ => return Err(ctx.type_error(1, "nil or table")),
    };
    let vm = vm_of(ctx)?;
    if let Some(current) = vm.heap.table(t).metatable {
        if !vm.heap.table(current).get_str(vm.names.metatable).is_nil() {
            return Err(LuaError::runtime("cannot change a protected metatable"));
        }
    }
    vm.heap.table_mut(t).metatable = mt;
    Ok(ctx.ret(&[LuaValue::Table(t)]))
}

fn getmetatable(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let v = ctx.check_any(0)?;
    let vm = vm_of(ctx)?;
    let result = match vm.metatable(v) {
        Some(mt) => {
            let guard = vm.heap.table(mt).get_str(vm.names.metatable);
            if guard.is_nil() {
                LuaValue::Table(mt)
            } else {
                guard
            }
        }
        None => LuaValue::Nil,
    };
    Ok(ctx.ret(&[result]))
}

fn assert(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let v = ctx.check_any(0)?;
    if v.is_truthy() {
        let all = ctx.args().to_vec();
        return Ok(ctx.ret(&all));
    }
    if ctx.arg_count() >= 2 {
        Err(LuaError::Value(ctx.arg(1)))
    } else {
        Err(LuaError::runtime("assertion failed!"))
    }
}

fn error(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let v = ctx.arg(0);
    let level = ctx.opt_integer(1, 1)?;
    if let (LuaValue::String(s), 1..) = (v, level) {
        let prefix = ctx.rt.where_(level as usize);
        if !prefix.is_empty() {
            let mut text = prefix.into_bytes();
            text.extend_from_slice(ctx.bytes_of(s));
            let positioned = ctx.rt.strings_mut().intern(&text);
            return Err(LuaError::Value(LuaValue::String(positioned)));
        }
    }
    Err(LuaError::Value(v))
}

fn collectgarbage(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let option = match ctx.opt_string(0)? {
        Some(s) => String::from_utf8_lossy(ctx.bytes_of(s)).into_owned(),
        None => "collect".to_string(),
    };
    let vm = vm_of(ctx)?;
    let result = match option.as_str() {
        // The cycle runs as soon as this native returns.
        "collect" => {
            vm.request_gc();
            LuaValue::Number(0.0)
        }
        "step" => {
            vm.request_gc();
            LuaValue::Boolean(true)
        }
        "count" => LuaValue::Number(vm.memory_kb()),
        "isrunning" => LuaValue::Boolean(vm.gc_running()),
        "stop" => {
            vm.set_gc_running(false);
            LuaValue::Number(0.0)
        }
        "restart" => {
            vm.set_gc_running(true);
            LuaValue::Number(0.0)
        }
        "incremental" | "generational" => LuaValue::String(vm.intern("incremental")),
        other => return Err(ctx.arg_error(0, format_args!("invalid option '{other}'"))),
    };
    Ok(ctx.ret(&[result]))
}

/// Compile `source` and push the function, or nil and the message.
fn push_loaded(
    ctx: &mut NativeContext<'_>,
    source: &[u8],
    chunk_name: &str,
    mode: &str,
    env: Option<LuaValue>,
) -> Result<usize, LuaError> {
    let binary = source.first() == Some(&0x1b);
    let refusal = match (binary, mode.contains('b'), mode.contains('t')) {
        (true, false, _) => Some(format!("attempt to load a binary chunk (mode is '{mode}')")),
        (true, true, _) => Some("binary chunks are not supported".to_string()),
        (false, _, false) => Some(format!("attempt to load a text chunk (mode is '{mode}')")),
        _ => None,
    };
    if let Some(msg) = refusal {
        ctx.push(LuaValue::Nil);
        ctx.push_str(&msg);
        return Ok(2);
    }
    let vm = vm_of(ctx)?;
    let f = match vm.compile(source, chunk_name) {
        Ok(chunk) => match env {
            Some(env) => vm.load_with_env(chunk, env),
            None => vm.load(chunk),
        },
        Err(e) => {
            let msg = LuaValue::String(vm.intern(&e.to_string()));
            return Ok(ctx.ret(&[LuaValue::Nil, msg]));
        }
    };
    Ok(ctx.ret(&[f]))
}

fn load(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let (source, default_name) = match ctx.arg(0) {
        LuaValue::String(s) => {
            let bytes = ctx.bytes_of(s).to_vec();
            let name = String::from_utf8_lossy(&bytes).into_owned();
            (bytes, name)
        }
        LuaValue::Function(_) => {
            let reader = ctx.arg(0);
            let mut bytes = Vec::new();
            loop {
                let piece = ctx.rt.call(reader, &[])?;
                match piece.first().copied().unwrap_or(LuaValue::Nil) {
                    LuaValue::Nil => break,
                    LuaValue::String(s) if ctx.bytes_of(s).is_empty() => break,
                    LuaValue::String(s) => bytes.extend_from_slice(ctx.bytes_of(s)),
                    _ => {
                        ctx.push(LuaValue::Nil);
                        ctx.push_str("reader function must return a string");
                        return Ok(2);
                    }
                }
            }
            (bytes, "=(load)".to_string())
        }
        _ => return Err(ctx.type_error(0, "string")),
    };
    let chunk_name = match ctx.opt_string(1)? {
        Some(s) => String::from_utf8_lossy(ctx.bytes_of(s)).into_owned(),
        None => default_name,
    };
    let mode = match ctx.opt_string(2)? {
        Some(s) => String::from_utf8_lossy(ctx.bytes_of(s)).into_owned(),
        None => "bt".to_string(),
    };
    let env = (ctx.arg_count() >= 4).then(|| ctx.arg(3));
    push_loaded(ctx, &source, &chunk_name, &mode, env)
}

fn read_script(ctx: &mut NativeContext<'_>, index: usize) -> Result<Result<(Vec<u8>, String), String>, LuaError> {
    use std::io::Read;

    match ctx.opt_string(index)? {
        Some(s) => {
            let path = String::from_utf8_lossy(ctx.bytes_of(s)).into_owned();
            Ok(std::fs::read(&path)
                .map(|bytes| (bytes, format!("@{path}")))
                .map_err(|e| format!("cannot open {path}: {e}")))
        }
        None => {
            let mut bytes = Vec::new();
            Ok(std::io::stdin()
                .read_to_end(&mut bytes)
                .map(|_| (bytes, "=stdin".to_string()))
                .map_err(|e| format!("cannot read stdin: {e}")))
        }
    }
}

fn loadfile(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let (source, chunk_name) = match read_script(ctx, 0)? {
        Ok(found) => found,
        Err(msg) => {
            ctx.push(LuaValue::Nil);
            ctx.push_str(&msg);
            return Ok(2);
        }
    };
    let mode = match ctx.opt_string(1)? {
        Some(s) => String::from_utf8_lossy(ctx.bytes_of(s)).into_owned(),
        None => "bt".to_string(),
    };
    let env = (ctx.arg_count() >= 3).then(|| ctx.arg(2));
    push_loaded(ctx, &source, &chunk_name, &mode, env)
}

fn dofile(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let (source, chunk_name) = read_script(ctx, 0)?.map_err(LuaError::runtime)?;
    let vm = vm_of(ctx)?;
    let chunk = vm.compile(&source, &chunk_name).map_err(|e| {
        let msg = vm.intern(&e.to_string());
        LuaError::Value(LuaValue::String(msg))
    })?;
    let f = vm.load(chunk);
    let results = vm.call(f, &[])?;
    Ok(ctx.ret(&results))
}

/// `debug.traceback([msg [, level]])`.
fn traceback(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let msg = ctx.arg(0);
    if !matches!(msg, LuaValue::Nil | LuaValue::String(_) | LuaValue::Number(_)) {
        return Ok(ctx.ret(&[msg]));
    }
    let level = ctx.opt_integer(1, 1)?.max(1) as usize;
    let frames = ctx.traceback().frames.into_iter().skip(level - 1).collect();
    let trace = Traceback { frames };
    let text = match msg {
        LuaValue::Nil => trace.to_string(),
        m => format!("{}\n{trace}", m.display(ctx.rt.strings())),
    };
    ctx.push_str(&text);
    Ok(1)
}
