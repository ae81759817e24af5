use super::helpers::*;

#[test]
fn test_yield_twice_then_return() {
    run_check_strs(
        "local co = coroutine.create(function(a)
           local b = coroutine.yield(a + 1)
           local c = coroutine.yield(b * 2)
           return c .. '!'
         end)
         local _, r1 = coroutine.resume(co, 1)
         local _, r2 = coroutine.resume(co, 10)
         local _, r3 = coroutine.resume(co, 'end')
         local ok, r4 = coroutine.resume(co)
         return r1, r2, r3, ok, r4",
        &["2", "20", "end!", "false", "cannot resume dead coroutine"],
    );
}

#[test]
fn test_status_transitions() {
    run_check_strs(
        "local co
         local inner
         co = coroutine.create(function()
           inner = coroutine.status(co)
           coroutine.yield()
         end)
         local s1 = coroutine.status(co)
         coroutine.resume(co)
         local s2 = coroutine.status(co)
         coroutine.resume(co)
         return s1, inner, s2, coroutine.status(co)",
        &["suspended", "running", "suspended", "dead"],
    );
}

#[test]
fn test_normal_status_of_resumer() {
    run_check_strs(
        "local outer
         outer = coroutine.create(function()
           local inner = coroutine.create(function() return coroutine.status(outer) end)
           local _, s = coroutine.resume(inner)
           return s
         end)
         local _, s = coroutine.resume(outer)
         return s",
        &["normal"],
    );
}

#[test]
fn test_wrap_generator() {
    run_check_nums(
        "local gen = coroutine.wrap(function()
           for i = 1, 4 do coroutine.yield(i * i) end
         end)
         local sum = 0
         for i = 1, 4 do sum = sum + gen() end
         return sum",
        &[30.0],
    );
}

#[test]
fn test_wrap_propagates_errors_with_position() {
    let e = run_lua_err(
        "local f = coroutine.wrap(function() error('inside') end)
         f()",
    );
    assert!(e.contains("inside"), "{e}");
}

#[test]
fn test_error_inside_coroutine_is_returned_by_resume() {
    run_check_strs(
        "local co = coroutine.create(function() local x = nil return x.y end)
         local ok, e = coroutine.resume(co)
         return ok, e, coroutine.status(co)",
        &["false", "test:1: attempt to index a nil value (local 'x')", "dead"],
    );
}

#[test]
fn test_yield_across_pcall() {
    run_check_strs(
        "local co = coroutine.create(function()
           local ok, v = pcall(function()
             local got = coroutine.yield('paused')
             error('after ' .. got, 0)
           end)
           return ok, v
         end)
         local _, first = coroutine.resume(co)
         local _, ok, v = coroutine.resume(co, 'resume')
         return first, ok, v",
        &["paused", "false", "after resume"],
    );
}

#[test]
fn test_yield_from_nested_lua_calls() {
    run_check_nums(
        "local function deep(n) if n == 0 then return coroutine.yield(1) end return deep(n - 1) + 1 end
         local co = coroutine.create(function() return deep(50) end)
         local _, y = coroutine.resume(co)
         local _, r = coroutine.resume(co, 100)
         return y, r",
        &[1.0, 150.0],
    );
}

#[test]
fn test_yield_outside_coroutine_fails() {
    run_check_strs(
        "local ok, e = pcall(coroutine.yield, 1)
         return ok, string.find(e, 'outside a coroutine', 1, true) ~= nil",
        &["false", "true"],
    );
}

#[test]
fn test_yield_through_sort_comparator_fails() {
    run_check_strs(
        "local co = coroutine.create(function()
           table.sort({3, 2, 1}, function(a, b) coroutine.yield() return a < b end)
         end)
         local ok, e = coroutine.resume(co)
         return ok, string.find(e, 'C-call boundary', 1, true) ~= nil",
        &["false", "true"],
    );
}

#[test]
fn test_resume_running_coroutine_fails() {
    run_check_strs(
        "local co
         co = coroutine.create(function() return coroutine.resume(co) end)
         local _, ok, e = coroutine.resume(co)
         return ok, e",
        &["false", "cannot resume non-suspended coroutine"],
    );
}

#[test]
fn test_running_and_isyieldable() {
    run_check_strs(
        "local _, main = coroutine.running()
         local co = coroutine.create(function()
           local _, m = coroutine.running()
           return coroutine.isyieldable(), m
         end)
         local _, y, m = coroutine.resume(co)
         return main, coroutine.isyieldable(), y, m",
        &["true", "false", "true", "false"],
    );
}

#[test]
fn test_close_suspended_coroutine_runs_pending_close() {
    run_check_strs(
        "local closed = false
         local co = coroutine.create(function()
           local r <close> = setmetatable({}, {__close = function() closed = true end})
           coroutine.yield()
         end)
         coroutine.resume(co)
         local ok = coroutine.close(co)
         return ok, closed, coroutine.status(co)",
        &["true", "true", "dead"],
    );
}

#[test]
fn test_many_coroutines() {
    run_check_nums(
        "local total = 0
         for i = 1, 500 do
           local co = coroutine.wrap(function(x) local y = coroutine.yield(x + 1) return y * 2 end)
           total = total + co(i) + co(1)
         end
         return total",
        &[126750.0],
    );
}
