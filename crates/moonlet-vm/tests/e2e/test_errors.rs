use super::helpers::*;
use moonlet_core::error::LuaError;

// ---- pcall / error ----

#[test]
fn test_pcall_catches_positioned_error() {
    run_check_strs(
        "return pcall(function() error('boom') end)",
        &["false", "test:1: boom"],
    );
}

#[test]
fn test_pcall_success_passes_values_through() {
    run_check_strs("return pcall(function(a, b) return a, b end, 1, 'x')", &["true", "1", "x"]);
}

#[test]
fn test_error_level_two_blames_caller() {
    run_check_strs(
        "local function check(x) if not x then error('bad input', 2) end end
         local function user()
           check(false)
         end
         local ok, e = pcall(user)
         return e",
        &["test:3: bad input"],
    );
}

#[test]
fn test_error_level_zero_has_no_position() {
    run_check_strs("local ok, e = pcall(error, 'plain', 0) return e", &["plain"]);
}

#[test]
fn test_error_with_table_value() {
    run_check_nums(
        "local ok, e = pcall(function() error({code = 7}) end)
         return e.code",
        &[7.0],
    );
}

#[test]
fn test_nested_pcall() {
    run_check_strs(
        "local ok, e = pcall(function()
           local ok2, e2 = pcall(error, 'inner', 0)
           error('outer: ' .. e2, 0)
         end)
         return ok, e",
        &["false", "outer: inner"],
    );
}

#[test]
fn test_assert_messages() {
    run_check_strs(
        "local a, b = pcall(assert, false)
         local c, d = pcall(assert, nil, 'custom')
         return b:find('assertion failed!', 1, true) ~= nil, d, select('#', assert(1, 2, 3))",
        &["true", "custom", "3"],
    );
}

#[test]
fn test_runtime_error_names_variable() {
    let e = run_lua_err("local t = nil\nreturn t.x");
    assert_eq!(e, "test:2: attempt to index a nil value (local 't')");
    let e = run_lua_err("undefined_fn()");
    assert_eq!(e, "test:1: attempt to call a nil value (global 'undefined_fn')");
    let e = run_lua_err("local t = {}\nreturn t.a.b");
    assert_eq!(e, "test:2: attempt to index a nil value (field 'a')");
}

// ---- xpcall ----

#[test]
fn test_xpcall_handler_sees_error() {
    run_check_strs(
        "return xpcall(function() error('oops', 0) end, function(m) return 'handled: ' .. m end)",
        &["false", "handled: oops"],
    );
}

#[test]
fn test_xpcall_with_traceback() {
    let r = run_lua_strs(
        "local function inner() error('deep') end
         local function outer() inner() end
         return xpcall(outer, debug.traceback)",
    );
    assert_eq!(r[0], "false");
    assert!(r[1].starts_with("test:1: deep\nstack traceback:"), "{}", r[1]);
    assert!(r[1].contains("in local 'inner'") || r[1].contains("in function 'inner'"), "{}", r[1]);
}

#[test]
fn test_xpcall_passes_arguments() {
    run_check_nums("local ok, v = xpcall(function(a, b) return a * b end, print, 6, 7) return v", &[42.0]);
}

#[test]
fn test_xpcall_handler_error_becomes_result() {
    run_check_strs(
        "local ok, e = xpcall(function() error('first', 0) end, function() error('second', 0) end)
         return ok, e",
        &["false", "second"],
    );
}

// ---- Uncaught errors ----

#[test]
fn test_uncaught_error_carries_traceback() {
    let mut vm = new_vm();
    let chunk = vm
        .compile(b"local function f()\n  error('fail')\nend\nf()", "=main")
        .expect("compiles");
    let f = vm.load(chunk);
    let err = vm.call(f, &[]).unwrap_err();
    assert_eq!(vm.error_message(&err), "main:2: fail");
    let traceback = err.traceback().expect("traceback").to_string();
    assert!(traceback.starts_with("stack traceback:"), "{traceback}");
    assert!(traceback.contains("main:2:"), "{traceback}");
    assert!(traceback.contains("main:4:"), "{traceback}");
}

#[test]
fn test_vm_usable_after_error() {
    let mut vm = new_vm();
    assert!(exec(&mut vm, "x = 1 error('stop')").is_err());
    let r = exec(&mut vm, "return x + 1").expect("second run");
    assert_num(&r, 0, 2.0);
}

#[test]
fn test_calling_non_function_from_host() {
    let mut vm = new_vm();
    let err = vm.call(moonlet_core::value::LuaValue::Number(1.0), &[]).unwrap_err();
    assert!(matches!(err.root(), LuaError::Runtime(m) if m.contains("attempt to call a number value")));
}

// ---- Compile errors ----

#[test]
fn test_goto_errors_reported_by_load() {
    run_check_strs(
        "local f1, e1 = load('goto nowhere')
         local f2, e2 = load('goto l local x ::l:: print(x)')
         return f1, string.find(e1, \"no visible label 'nowhere'\", 1, true) ~= nil,
                f2, string.find(e2, \"jumps into the scope of local 'x'\", 1, true) ~= nil",
        &["nil", "true", "nil", "true"],
    );
}

#[test]
fn test_syntax_error_from_host() {
    let mut vm = new_vm();
    let err = vm.compile(b"local = 1", "=bad").unwrap_err();
    assert!(err.to_string().starts_with("bad:1:"), "{err}");
}

#[test]
fn test_const_assignment_rejected() {
    run_check_strs(
        "local f, e = load('local x <const> = 1 x = 2')
         return string.find(e, \"attempt to assign to const variable 'x'\", 1, true) ~= nil",
        &["true"],
    );
}

#[test]
fn test_break_outside_loop_rejected() {
    run_check_strs("local f, e = load('break') return f == nil", &["true"]);
}

#[test]
fn test_deep_nesting_rejected_by_load() {
    run_check_strs(
        "local parens = string.rep('(', 5000) .. '1' .. string.rep(')', 5000)
         local f1, e1 = load('return ' .. parens)
         local f2, e2 = load('return ' .. string.rep('{', 100000))
         local ok, f3, e3 = pcall(load, string.rep('do ', 300) .. string.rep('end ', 300))
         local f4 = load('return ' .. string.rep('(', 50) .. '1' .. string.rep(')', 50))
         return f1, string.find(e1, 'chunk has too many C levels', 1, true) ~= nil,
                f2, string.find(e2, 'chunk has too many C levels', 1, true) ~= nil,
                ok, f3, string.find(e3, 'chunk has too many C levels', 1, true) ~= nil,
                f4()",
        &["nil", "true", "nil", "true", "true", "nil", "true", "1"],
    );
}
