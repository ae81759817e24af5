use super::helpers::*;

// ---- Arithmetic ----

#[test]
fn test_add_metamethod() {
    run_check_nums(
        "local mt = {__add = function(a, b) return 42 end}
         local t = setmetatable({}, mt)
         return t + 1, 1 + t",
        &[42.0, 42.0],
    );
}

#[test]
fn test_vector_arithmetic() {
    run_check_nums(
        "local V = {}
         V.__index = V
         local function new(x, y) return setmetatable({x = x, y = y}, V) end
         V.__add = function(a, b) return new(a.x + b.x, a.y + b.y) end
         V.__mul = function(a, k) return new(a.x * k, a.y * k) end
         V.__unm = function(a) return new(-a.x, -a.y) end
         local v = -(new(1, 2) + new(3, 4)) * 2
         return v.x, v.y",
        &[-8.0, -12.0],
    );
}

#[test]
fn test_bitwise_metamethods() {
    run_check_nums(
        "local mt = {__band = function() return 1 end, __shl = function() return 2 end, __bnot = function() return 3 end}
         local t = setmetatable({}, mt)
         return t & 1, 1 << t, ~t",
        &[1.0, 2.0, 3.0],
    );
}

#[test]
fn test_arith_on_table_without_metamethod_fails() {
    let e = run_lua_err("local t = {} return t + 1");
    assert!(e.contains("attempt to perform arithmetic on a table value (local 't')"), "{e}");
}

// ---- Indexing ----

#[test]
fn test_index_function_and_chain() {
    run_check_nums(
        "local base = {a = 1}
         local mid = setmetatable({b = 2}, {__index = base})
         local top = setmetatable({}, {__index = mid})
         local dyn = setmetatable({}, {__index = function(t, k) return k * 2 end})
         return top.a, top.b, dyn[21]",
        &[1.0, 2.0, 42.0],
    );
}

#[test]
fn test_newindex_redirects_and_rawset_bypasses() {
    run_check_nums(
        "local store = {}
         local t = setmetatable({}, {__newindex = store})
         t.x = 5
         rawset(t, 'y', 6)
         return store.x, rawget(t, 'x') == nil and 1 or 0, t.y",
        &[5.0, 1.0, 6.0],
    );
}

#[test]
fn test_string_methods_via_metatable() {
    run_check_strs("local s = 'hello' return s:upper(), ('x'):rep(3), #s:sub(2)", &["HELLO", "xxx", "4"]);
}

// ---- Comparison ----

#[test]
fn test_eq_lt_le() {
    run_check_strs(
        "local mt = {}
         mt.__eq = function(a, b) return a.v == b.v end
         mt.__lt = function(a, b) return a.v < b.v end
         mt.__le = function(a, b) return a.v <= b.v end
         local a = setmetatable({v = 1}, mt)
         local b = setmetatable({v = 1}, mt)
         local c = setmetatable({v = 2}, mt)
         return a == b, a ~= c, a < c, c <= a, c > a, rawequal(a, b)",
        &["true", "true", "true", "false", "true", "false"],
    );
}

#[test]
fn test_compare_mixed_types_fails() {
    let e = run_lua_err("return 1 < 'x'");
    assert!(e.contains("attempt to compare number with string"), "{e}");
}

// ---- Other events ----

#[test]
fn test_concat_metamethod() {
    run_check_strs(
        "local t = setmetatable({}, {__concat = function(a, b)
           return (type(a) == 'table' and 'T' or a) .. (type(b) == 'table' and 'T' or b)
         end})
         return t .. 'x', 'y' .. t, 1 .. t",
        &["Tx", "yT", "1T"],
    );
}

#[test]
fn test_call_metamethod() {
    run_check_nums(
        "local callable = setmetatable({k = 10}, {__call = function(self, a, b) return self.k + a + b end})
         return callable(1, 2)",
        &[13.0],
    );
}

#[test]
fn test_tostring_and_name() {
    run_check_strs(
        "local p = setmetatable({}, {__tostring = function() return 'point' end})
         local q = setmetatable({}, {__name = 'Widget'})
         return tostring(p), tostring(q):sub(1, 8)",
        &["point", "Widget: "],
    );
}

#[test]
fn test_len_metamethod() {
    run_check_nums(
        "local t = setmetatable({1, 2}, {__len = function() return 99 end})
         return #t, rawlen(t)",
        &[99.0, 2.0],
    );
}

#[test]
fn test_metatable_protection() {
    run_check_strs(
        "local t = setmetatable({}, {__metatable = 'locked'})
         local ok, e = pcall(setmetatable, t, {})
         return getmetatable(t), ok, string.find(e, 'protected metatable', 1, true) ~= nil",
        &["locked", "false", "true"],
    );
}

#[test]
fn test_close_metamethod_runs_on_scope_exit() {
    run_check_strs(
        "local log = {}
         do
           local a <close> = setmetatable({}, {__close = function() log[#log + 1] = 'a' end})
           local b <close> = setmetatable({}, {__close = function() log[#log + 1] = 'b' end})
         end
         return table.concat(log)",
        &["ba"],
    );
}

#[test]
fn test_pairs_metamethod() {
    run_check_nums(
        "local t = setmetatable({}, {__pairs = function(t)
           return function(_, k) if not k then return 1, 10 end end, t, nil
         end})
         local sum = 0
         for k, v in pairs(t) do sum = sum + k + v end
         return sum",
        &[11.0],
    );
}
