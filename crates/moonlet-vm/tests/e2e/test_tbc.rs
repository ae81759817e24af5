use super::helpers::*;

const CLOSER: &str = "
    local log = {}
    local function closer(name)
      return setmetatable({}, {__close = function(_, err)
        log[#log + 1] = name .. (err and ('(' .. tostring(err) .. ')') or '')
      end})
    end
";

fn with_closer(body: &str) -> String {
    format!("{CLOSER}\n{body}")
}

#[test]
fn test_close_order_is_reverse_declaration() {
    run_check_strs(
        &with_closer(
            "do
               local a <close> = closer('a')
               local b <close> = closer('b')
               local c <close> = closer('c')
             end
             return table.concat(log, ' ')",
        ),
        &["c b a"],
    );
}

#[test]
fn test_close_on_return() {
    run_check_strs(
        &with_closer(
            "local function f()
               local x <close> = closer('x')
               return 'value'
             end
             local v = f()
             return v, table.concat(log, ' ')",
        ),
        &["value", "x"],
    );
}

#[test]
fn test_close_on_break_and_goto() {
    run_check_strs(
        &with_closer(
            "for i = 1, 3 do
               local r <close> = closer('loop' .. i)
               if i == 2 then break end
             end
             do
               local g <close> = closer('g')
               goto out
             end
             ::out::
             return table.concat(log, ' ')",
        ),
        &["loop1 loop2 g"],
    );
}

#[test]
fn test_close_receives_error() {
    run_check_strs(
        &with_closer(
            "local ok, e = pcall(function()
               local r <close> = closer('r')
               error('bad', 0)
             end)
             return ok, e, table.concat(log, ' ')",
        ),
        &["false", "bad", "r(bad)"],
    );
}

#[test]
fn test_close_error_replaces_original() {
    run_check_strs(
        "local ok, e = pcall(function()
           local r <close> = setmetatable({}, {__close = function() error('from close', 0) end})
           error('original', 0)
         end)
         return ok, e",
        &["false", "from close"],
    );
}

#[test]
fn test_nil_and_false_are_ignored() {
    run_check_nums(
        "do
           local a <close> = nil
           local b <close> = false
         end
         return 1",
        &[1.0],
    );
}

#[test]
fn test_non_closable_value_fails() {
    let e = run_lua_err("local x <close> = {}");
    assert!(e.contains("variable 'x' got a non-closable value"), "{e}");
}

#[test]
fn test_generic_for_closes_fourth_value() {
    run_check_strs(
        &with_closer(
            "local function iter()
               local i = 0
               return function() i = i + 1 if i <= 2 then return i end end, nil, nil, closer('iter')
             end
             local seen = 0
             for v in iter() do seen = seen + v end
             for v in iter() do break end
             return seen, table.concat(log, ' ')",
        ),
        &["3", "iter iter"],
    );
}

#[test]
fn test_close_inside_coroutine_on_error() {
    run_check_strs(
        &with_closer(
            "local co = coroutine.create(function()
               local r <close> = closer('co')
               coroutine.yield()
               error('die', 0)
             end)
             coroutine.resume(co)
             local ok, e = coroutine.resume(co)
             return ok, e, table.concat(log, ' ')",
        ),
        &["false", "die", "co(die)"],
    );
}
