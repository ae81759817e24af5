use super::helpers::*;

// ---- insert / remove ----

#[test]
fn test_remove_first_shifts_down() {
    run_check_nums(
        "local t = {1, 2, 3}
         table.remove(t, 1)
         return t[1], t[2], #t",
        &[2.0, 3.0, 2.0],
    );
}

#[test]
fn test_remove_returns_value_and_defaults_to_last() {
    run_check_nums(
        "local t = {10, 20, 30}
         local last = table.remove(t)
         local first = table.remove(t, 1)
         return last, first, #t",
        &[30.0, 10.0, 1.0],
    );
}

#[test]
fn test_remove_from_empty() {
    run_check_strs("local t = {} return table.remove(t), #t", &["nil", "0"]);
}

#[test]
fn test_insert_append_and_middle() {
    run_check_strs(
        "local t = {'a', 'c'}
         table.insert(t, 'd')
         table.insert(t, 2, 'b')
         return table.concat(t)",
        &["abcd"],
    );
}

#[test]
fn test_insert_out_of_bounds() {
    let e = run_lua_err("table.insert({1, 2}, 5, 'x')");
    assert!(e.contains("bad argument #2 to 'insert' (position out of bounds)"), "{e}");
}

#[test]
fn test_insert_wrong_arity() {
    let e = run_lua_err("table.insert({}, 1, 2, 3)");
    assert!(e.contains("wrong number of arguments to 'insert'"), "{e}");
}

#[test]
fn test_insert_respects_metamethods() {
    run_check_nums(
        "local log = {}
         local proxy = setmetatable({}, {
           __len = function() return #log end,
           __index = function(_, k) return log[k] end,
           __newindex = function(_, k, v) rawset(log, k, v) end,
         })
         table.insert(proxy, 5)
         table.insert(proxy, 6)
         return #log, log[2]",
        &[2.0, 6.0],
    );
}

// ---- concat / pack / unpack / move ----

#[test]
fn test_concat_ranges_and_numbers() {
    run_check_strs(
        "local t = {1, 'two', 3.5}
         return table.concat(t, ', '), table.concat(t, '-', 2, 3), table.concat({}, 'x'), table.concat(t, '', 3, 2)",
        &["1, two, 3.5", "two-3.5", "", ""],
    );
}

#[test]
fn test_concat_invalid_value() {
    let e = run_lua_err("return table.concat({1, {}, 3})");
    assert!(e.contains("invalid value (at index 2) in table for 'concat'"), "{e}");
}

#[test]
fn test_pack_and_unpack() {
    run_check_nums(
        "local p = table.pack(1, nil, 3)
         local a, b, c = table.unpack({1, 2, 3}, 2)
         return p.n, p[3], a, b, c == nil and 1 or 0, select('#', table.unpack({}, 1, 3))",
        &[3.0, 3.0, 2.0, 3.0, 1.0, 3.0],
    );
}

#[test]
fn test_unpack_too_many() {
    let e = run_lua_err("return table.unpack({}, 1, 1e8)");
    assert!(e.contains("too many results to unpack"), "{e}");
}

#[test]
fn test_move_overlapping_and_other_table() {
    run_check_strs(
        "local t = {1, 2, 3, 4, 5}
         table.move(t, 1, 3, 3)
         local dst = table.move({'a', 'b'}, 1, 2, 2, {'z'})
         return table.concat(t, ','), table.concat(dst, ',')",
        &["1,2,1,2,3", "z,a,b"],
    );
}

// ---- sort ----

#[test]
fn test_sort_default_and_comparator() {
    run_check_strs(
        "local a = {5, 2, 8, 1, 9, 3}
         table.sort(a)
         local b = {'pear', 'apple', 'fig'}
         table.sort(b, function(x, y) return #x < #y end)
         return table.concat(a, ' '), table.concat(b, ' ')",
        &["1 2 3 5 8 9", "fig pear apple"],
    );
}

#[test]
fn test_sort_records_by_field() {
    run_check_strs(
        "local people = {{n = 'c', age = 30}, {n = 'a', age = 20}, {n = 'b', age = 25}}
         table.sort(people, function(x, y) return x.age > y.age end)
         local out = {}
         for i, p in ipairs(people) do out[i] = p.n end
         return table.concat(out)",
        &["cba"],
    );
}

#[test]
fn test_sort_large_reverse() {
    run_check_nums(
        "local t = {}
         for i = 1, 1000 do t[i] = 1001 - i end
         table.sort(t)
         for i = 2, #t do if t[i - 1] > t[i] then return 0 end end
         return t[1], t[1000]",
        &[1.0, 1000.0],
    );
}

#[test]
fn test_sort_mixed_types_fails() {
    let e = run_lua_err("table.sort({1, 'x', 2})");
    assert!(e.contains("attempt to compare"), "{e}");
}

#[test]
fn test_sort_comparator_error_propagates() {
    run_check_strs(
        "local ok, e = pcall(table.sort, {3, 1, 2}, function() error('cmp', 0) end)
         return ok, e",
        &["false", "cmp"],
    );
}
