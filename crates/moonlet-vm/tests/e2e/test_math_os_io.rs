use super::helpers::*;

// ---- math ----

#[test]
fn test_math_basics() {
    run_check_nums(
        "return math.floor(-3.5), math.ceil(3.2), math.abs(-4), math.max(3, 9, 1), math.min(3, 9, 1), math.sqrt(16)",
        &[-4.0, 4.0, 4.0, 9.0, 1.0, 4.0],
    );
}

#[test]
fn test_math_fmod_and_modf() {
    run_check_nums(
        "local i, f = math.modf(-3.25)
         return math.fmod(7, 3), math.fmod(-7, 3), i, f",
        &[1.0, -1.0, -3.0, -0.25],
    );
}

#[test]
fn test_math_integer_helpers() {
    run_check_strs(
        "return math.tointeger(3.0), math.tointeger(3.5), math.type(1), math.type('1'), math.ult(1, -1)",
        &["3", "nil", "integer", "nil", "true"],
    );
}

#[test]
fn test_math_constants() {
    run_check_strs(
        "return math.huge, -math.huge, math.pi > 3.14 and math.pi < 3.15, math.maxinteger > 0",
        &["inf", "-inf", "true", "true"],
    );
}

#[test]
fn test_math_log_bases() {
    run_check_nums("return math.log(8, 2), math.log(100, 10), math.exp(0)", &[3.0, 2.0, 1.0]);
}

#[test]
fn test_random_ranges() {
    run_check_strs(
        "math.randomseed(42)
         for _ = 1, 200 do
           local f = math.random()
           if f < 0 or f >= 1 then return 'float' end
           local d = math.random(6)
           if d < 1 or d > 6 or d % 1 ~= 0 then return 'die' end
           local r = math.random(-3, 3)
           if r < -3 or r > 3 then return 'range' end
         end
         return 'ok'",
        &["ok"],
    );
}

#[test]
fn test_randomseed_is_deterministic() {
    run_check_strs(
        "math.randomseed(7)
         local a = {math.random(1000), math.random(1000), math.random(1000)}
         math.randomseed(7)
         local b = {math.random(1000), math.random(1000), math.random(1000)}
         return a[1] == b[1] and a[2] == b[2] and a[3] == b[3]",
        &["true"],
    );
}

#[test]
fn test_random_empty_interval() {
    let e = run_lua_err("return math.random(5, 1)");
    assert!(e.contains("interval is empty"), "{e}");
}

// ---- os ----

#[test]
fn test_os_time_of_date_table() {
    run_check_nums(
        "return os.time({year = 2000, month = 1, day = 1, hour = 0}), os.time({year = 1970, month = 1, day = 2})",
        &[946_684_800.0, 129_600.0],
    );
}

#[test]
fn test_os_time_missing_field() {
    let e = run_lua_err("return os.time({year = 2000})");
    assert!(e.contains("field 'month' missing in date table"), "{e}");
}

#[test]
fn test_os_clock_and_now() {
    run_check_strs(
        "local c = os.clock()
         return type(c), c >= 0, os.time() > 1600000000",
        &["number", "true", "true"],
    );
}

#[test]
fn test_os_getenv_missing() {
    run_check_strs("return os.getenv('MOONLET_TEST_SURELY_UNSET_VARIABLE')", &["nil"]);
}

// ---- output ----

#[test]
fn test_print_separates_with_tabs() {
    let out = run_lua_output("print(1, 'two', nil, true) print()");
    assert_eq!(out, "1\ttwo\tnil\ttrue\n\n");
}

#[test]
fn test_print_uses_tostring_metamethod() {
    let out = run_lua_output("print(setmetatable({}, {__tostring = function() return 'obj' end}))");
    assert_eq!(out, "obj\n");
}

#[test]
fn test_io_write_no_newline() {
    let out = run_lua_output("io.write('a', 1, 2.5, '\\n') io.write('b')");
    assert_eq!(out, "a12.5\nb");
}

#[test]
fn test_io_write_rejects_tables() {
    let e = run_lua_err("io.write({})");
    assert!(e.contains("bad argument #1 to 'write' (string expected, got table)"), "{e}");
}

#[test]
fn test_output_interleaves_in_order() {
    let out = run_lua_output(
        "for i = 1, 3 do io.write(i, ':') print(i * i) end",
    );
    assert_eq!(out, "1:1\n2:4\n3:9\n");
}
