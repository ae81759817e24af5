use super::helpers::*;

// ---- Expressions ----

#[test]
fn test_return_one_plus_two() {
    let r = run_lua("return 1+2");
    assert_eq!(r.len(), 1);
    assert_num(&r, 0, 3.0);
}

#[test]
fn test_arithmetic_operators() {
    run_check_nums(
        "return 7 // 2, 7 % 3, -7 % 3, 2 ^ 10, 7 / 2, -(3)",
        &[3.0, 1.0, 2.0, 1024.0, 3.5, -3.0],
    );
}

#[test]
fn test_float_modulo_and_floor_division() {
    run_check_nums("return 5.5 % 2, -5.5 // 2, 1 // 0 == math.huge and 1 or 0", &[1.5, -3.0, 1.0]);
}

#[test]
fn test_bitwise_operators() {
    run_check_nums(
        "return 6 & 3, 6 | 3, 6 ~ 3, ~0, 1 << 4, 256 >> 4",
        &[2.0, 7.0, 5.0, -1.0, 16.0, 16.0],
    );
}

#[test]
fn test_bitwise_on_fraction_fails() {
    let e = run_lua_err("return 1.5 | 0");
    assert!(e.contains("number has no integer representation"), "{e}");
}

#[test]
fn test_string_coercion_in_arithmetic() {
    run_check_nums("return '10' + 5, '0x10' * 1, 10 .. '' == '10' and 1 or 0", &[15.0, 16.0, 1.0]);
}

#[test]
fn test_comparison_and_logic() {
    run_check_strs(
        "return 1 < 2, 'a' < 'b', nil or 'x', false and 1, 1 and 2, not nil, 1 == 1.0",
        &["true", "true", "x", "false", "2", "true", "true"],
    );
}

#[test]
fn test_concat_and_length() {
    run_check_strs("return 'a' .. 1 .. 'b', #'hello', #{1, 2, 3}", &["a1b", "5", "3"]);
}

#[test]
fn test_number_formatting() {
    run_check_strs(
        "return tostring(1e15), tostring(0.1), tostring(-0.0), tostring(1/0), tostring(2^53)",
        &["1e+15", "0.1", "-0", "inf", "9.007199254741e+15"],
    );
}

// ---- Control flow ----

#[test]
fn test_numeric_for_with_step() {
    run_check_nums(
        "local s = 0
         for i = 10, 1, -3 do s = s + i end
         return s",
        &[22.0],
    );
}

#[test]
fn test_float_for_loop() {
    run_check_nums(
        "local n = 0
         for x = 0, 1, 0.25 do n = n + 1 end
         return n",
        &[5.0],
    );
}

#[test]
fn test_for_zero_step_fails() {
    let e = run_lua_err("for i = 1, 10, 0 do end");
    assert!(e.contains("'for' step is zero"), "{e}");
}

#[test]
fn test_while_repeat_break() {
    run_check_nums(
        "local i, j = 0, 0
         while true do i = i + 1 if i == 5 then break end end
         repeat local k = j j = j + 1 until k >= 3
         return i, j",
        &[5.0, 4.0],
    );
}

#[test]
fn test_goto_continue() {
    run_check_nums(
        "local s = 0
         for i = 1, 10 do
           if i % 2 == 0 then goto continue end
           s = s + i
           ::continue::
         end
         return s",
        &[25.0],
    );
}

#[test]
fn test_generic_for_pairs_and_ipairs() {
    run_check_nums(
        "local t = {10, 20, 30, x = 1, y = 2}
         local a, n = 0, 0
         for _, v in ipairs(t) do a = a + v end
         for k in pairs(t) do n = n + 1 end
         return a, n",
        &[60.0, 5.0],
    );
}

#[test]
fn test_pairs_order_array_then_insertion() {
    run_check_strs(
        "local t = {}
         t.z = 1 t[1] = 'a' t.a = 2 t[2] = 'b' t.m = 3
         local keys = {}
         for k in pairs(t) do keys[#keys + 1] = tostring(k) end
         return table.concat(keys, ',')",
        &["1,2,z,a,m"],
    );
}

#[test]
fn test_next_while_clearing_fields() {
    run_check_nums(
        "local t = {a = 1, b = 2, c = 3, d = 4}
         local n = 0
         for k in pairs(t) do t[k] = nil n = n + 1 end
         return n, next(t) == nil and 1 or 0",
        &[4.0, 1.0],
    );
}

// ---- Functions ----

#[test]
fn test_varargs_and_select() {
    run_check_nums(
        "local function f(...)
           local a, b = ...
           return select('#', ...), a + b, select(-1, ...)
         end
         return f(1, 2, 3)",
        &[3.0, 3.0, 3.0],
    );
}

#[test]
fn test_multiple_returns_adjust() {
    run_check_nums(
        "local function f() return 1, 2, 3 end
         local t = {f(), f()}
         local a, b = (f())
         return #t, a, b == nil and 1 or 0",
        &[4.0, 1.0, 1.0],
    );
}

#[test]
fn test_method_calls_and_self() {
    run_check_nums(
        "local obj = {n = 0}
         function obj:add(k) self.n = self.n + k return self end
         obj:add(2):add(3)
         return obj.n",
        &[5.0],
    );
}

#[test]
fn test_deep_recursion_within_limit() {
    run_check_nums(
        "local function sum(n) if n == 0 then return 0 end return n + sum(n - 1) end
         return sum(10000)",
        &[50005000.0],
    );
}

#[test]
fn test_tail_calls_do_not_grow_stack() {
    run_check_nums(
        "local function loop(n) if n == 0 then return 'done' end return loop(n - 1) end
         return loop(1000000) == 'done' and 1 or 0",
        &[1.0],
    );
}

#[test]
fn test_stack_overflow_is_catchable() {
    run_check_strs(
        "local function f() return 1 + f() end
         local ok, e = pcall(f)
         return ok, string.find(e, 'stack overflow', 1, true) ~= nil",
        &["false", "true"],
    );
}

#[test]
fn test_modulo_by_zero_is_nan() {
    run_check_nums("local z = 0 local m = 1 % z return m ~= m and 1 or 0, -1 // z == -math.huge and 1 or 0", &[1.0, 1.0]);
}

// ---- Globals ----

#[test]
fn test_env_and_globals() {
    run_check_nums(
        "x = 5
         local g = _G
         g.y = x * 2
         return y, _ENV.x",
        &[10.0, 5.0],
    );
}

#[test]
fn test_load_with_custom_env() {
    run_check_nums(
        "local env = {v = 41}
         local f = load('return v + 1', 'chunk', 't', env)
         return f()",
        &[42.0],
    );
}
