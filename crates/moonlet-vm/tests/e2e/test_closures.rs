use super::helpers::*;

#[test]
fn test_counter_keeps_state() {
    run_check_nums(
        "local function counter()
           local n = 0
           return function() n = n + 1 return n end
         end
         local c1, c2 = counter(), counter()
         c1() c1()
         return c1(), c2()",
        &[3.0, 1.0],
    );
}

#[test]
fn test_sibling_closures_share_upvalue() {
    run_check_nums(
        "local function pair()
           local v = 0
           return function(x) v = x end, function() return v end
         end
         local set, get = pair()
         set(17)
         return get()",
        &[17.0],
    );
}

#[test]
fn test_upvalue_survives_frame_exit() {
    run_check_nums(
        "local f
         do
           local hidden = 'abc'
           f = function() return #hidden end
         end
         local junk = {1, 2, 3, 4, 5}
         return f()",
        &[3.0],
    );
}

#[test]
fn test_loop_creates_fresh_binding_per_iteration() {
    run_check_nums(
        "local fs = {}
         for i = 1, 3 do fs[i] = function() return i end end
         return fs[1](), fs[2](), fs[3]()",
        &[1.0, 2.0, 3.0],
    );
}

#[test]
fn test_while_body_locals_are_fresh() {
    run_check_nums(
        "local fs, i = {}, 0
         while i < 3 do
           i = i + 1
           local j = i * 10
           fs[i] = function() j = j + 1 return j end
         end
         fs[1]()
         return fs[1](), fs[2](), fs[3]()",
        &[12.0, 21.0, 31.0],
    );
}

#[test]
fn test_nested_upvalues_through_levels() {
    run_check_nums(
        "local function outer()
           local x = 1
           return function()
             return function() x = x * 2 return x end
           end
         end
         local mid = outer()
         local a, b = mid(), mid()
         a()
         return b()",
        &[4.0],
    );
}

#[test]
fn test_recursive_local_function() {
    run_check_nums(
        "local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end
         return fib(20)",
        &[6765.0],
    );
}

#[test]
fn test_closure_over_parameter_and_vararg() {
    run_check_nums(
        "local function bind(f, ...)
           local bound = table.pack(...)
           return function(...)
             local args, extra = {table.unpack(bound, 1, bound.n)}, table.pack(...)
             for i = 1, extra.n do args[bound.n + i] = extra[i] end
             return f(table.unpack(args, 1, bound.n + extra.n))
           end
         end
         local add3 = function(a, b, c) return a + b + c end
         return bind(add3, 1, 2)(3)",
        &[6.0],
    );
}

#[test]
fn test_unpack_before_last_argument_is_truncated() {
    run_check_nums(
        "local function count(...) return select('#', ...), (...) end
         return count(table.unpack({7, 8, 9}), 'x')",
        &[2.0, 7.0],
    );
}

#[test]
fn test_closures_in_coroutine_outlive_it() {
    run_check_nums(
        "local co = coroutine.create(function()
           local n = 5
           coroutine.yield(function() n = n + 1 return n end)
         end)
         local _, inc = coroutine.resume(co)
         coroutine.resume(co)
         return inc(), inc(), coroutine.status(co) == 'dead' and 1 or 0",
        &[6.0, 7.0, 1.0],
    );
}
