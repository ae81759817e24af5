use super::helpers::*;

// ---- Basic functions ----

#[test]
fn test_sub_with_negative_indices() {
    run_check_strs(
        "local s = 'hello world'
         return s:sub(1, 5), s:sub(-5), s:sub(-100, 2), s:sub(8, 3), s:sub(0)",
        &["hello", "world", "he", "", "hello world"],
    );
}

#[test]
fn test_byte_char_roundtrip() {
    run_check_strs(
        "local a, b, c = string.byte('ABC', 1, -1)
         return a, c, string.char(72, 105), string.byte('')",
        &["65", "67", "Hi"],
    );
}

#[test]
fn test_char_out_of_range() {
    let e = run_lua_err("return string.char(256)");
    assert!(e.contains("bad argument #1 to 'char' (value out of range)"), "{e}");
}

#[test]
fn test_rep_reverse_case() {
    run_check_strs(
        "return ('ab'):rep(3, '-'), ('abc'):reverse(), ('MiXeD'):lower(), ('x'):rep(0)",
        &["ab-ab-ab", "cba", "mixed", ""],
    );
}

#[test]
fn test_len_counts_bytes() {
    run_check_nums("return string.len('\\0a\\0'), #'\\u{48}\\u{49}'", &[3.0, 2.0]);
}

// ---- find / match ----

#[test]
fn test_find_plain_and_pattern() {
    run_check_strs(
        "local s, e = string.find('a.b.c', '.', 1, true)
         return s, e, string.find('hello', 'l+')",
        &["2", "2", "3", "4"],
    );
}

#[test]
fn test_find_returns_captures() {
    run_check_strs("return string.find('key = value', '(%w+)%s*=%s*(%w+)')", &["1", "11", "key", "value"]);
}

#[test]
fn test_find_init_beyond_end() {
    run_check_strs("return string.find('abc', '', 10), string.find('abc', '', 4)", &["nil", "4", "3"]);
}

#[test]
fn test_match_anchors_and_positions() {
    run_check_strs(
        "local p, q = string.match('hello', '()ll()')
         return string.match('  trim  ', '^%s*(.-)%s*$'), p, q, string.match('abc', '^b')",
        &["trim", "3", "5", "nil"],
    );
}

#[test]
fn test_balanced_and_frontier() {
    run_check_strs(
        "return string.match('f(a(b)c) x', '%b()'), string.match('THE (quick) fox', '%f[%a]%a+', 5)",
        &["(a(b)c)", "quick"],
    );
}

#[test]
fn test_backreference() {
    run_check_strs("return string.match('say \"hi\" now', '([\"\\'])(.-)%1')", &["\"", "hi"]);
}

#[test]
fn test_malformed_pattern_errors() {
    let e = run_lua_err("return string.find('x', '[a')");
    assert!(e.contains("malformed pattern (missing ']')"), "{e}");
    let e = run_lua_err("return string.find('x', '%')");
    assert!(e.contains("malformed pattern (ends with '%')"), "{e}");
}

// ---- gmatch / gsub ----

#[test]
fn test_gmatch_words() {
    run_check_strs(
        "local out = {}
         for w in string.gmatch('one two  three', '%a+') do out[#out + 1] = w end
         return table.concat(out, ',')",
        &["one,two,three"],
    );
}

#[test]
fn test_gmatch_pairs() {
    run_check_strs(
        "local out = {}
         for k, v in ('a=1, b=2'):gmatch('(%w+)=(%w+)') do out[#out + 1] = k .. v end
         return table.concat(out, ' ')",
        &["a1 b2"],
    );
}

#[test]
fn test_gmatch_empty_matches() {
    run_check_nums(
        "local n = 0
         for _ in ('abc'):gmatch('') do n = n + 1 end
         return n",
        &[4.0],
    );
}

#[test]
fn test_gsub_string_table_function() {
    run_check_strs(
        "local a, n = string.gsub('hello world', 'o', '0')
         local b = ('$name is $age'):gsub('%$(%w+)', {name = 'Ann', age = 30})
         local c = ('1 2 3'):gsub('%d', function(d) return d * 2 end)
         local d = ('abc'):gsub('%w', '%0%0', 2)
         return a, n, b, c, d",
        &["hell0 w0rld", "2", "Ann is 30", "2 4 6", "aabbc"],
    );
}

#[test]
fn test_gsub_false_keeps_original() {
    run_check_strs(
        "return (('a b c'):gsub('%a', function(x) if x == 'b' then return false end return x:upper() end))",
        &["A b C"],
    );
}

#[test]
fn test_gsub_bad_replacement() {
    let e = run_lua_err("return ('abc'):gsub('a', '%2')");
    assert!(e.contains("invalid capture index %2 in replacement string"), "{e}");
}

// ---- format ----

#[test]
fn test_format_numbers() {
    run_check_strs(
        "return string.format('%d|%5.2f|%-4d|%05d|%x|%X|%o', 42, 3.14159, 7, -42, 255, 255, 8)",
        &["42| 3.14|7   |-0042|ff|FF|10"],
    );
}

#[test]
fn test_format_floats_and_general() {
    run_check_strs(
        "return string.format('%g %g %g %.3e', 100000, 1e20, 0.5, 12345.678)",
        &["100000 1e+20 0.5 1.235e+04"],
    );
}

#[test]
fn test_format_strings_and_quote() {
    run_check_strs(
        "return string.format('[%s] [%10s] [%-5s] [%.2s]', 'x', 'right', 'l', 'abc'),
                string.format('%q', 'a\\nb\"c'),
                string.format('%s %s', nil, true)",
        &["[x] [     right] [l    ] [ab]", "\"a\\\nb\\\"c\"", "nil true"],
    );
}

#[test]
fn test_format_uses_tostring_metamethod() {
    run_check_strs(
        "local p = setmetatable({}, {__tostring = function() return 'P' end})
         return string.format('%s!', p)",
        &["P!"],
    );
}

#[test]
fn test_format_integer_rejects_fraction() {
    let e = run_lua_err("return string.format('%d', 1.5)");
    assert!(e.contains("bad argument #2 to 'format' (number has no integer representation)"), "{e}");
}

#[test]
fn test_format_missing_argument() {
    let e = run_lua_err("return string.format('%d %d', 1)");
    assert!(e.contains("bad argument #3 to 'format'"), "{e}");
}

#[test]
fn test_format_percent_literal() {
    run_check_strs("return string.format('100%%')", &["100%"]);
}

#[test]
fn test_multiple_results_truncated_before_last() {
    run_check_strs(
        "return string.find('hello', 'l+'), string.match('hello', '()ll()')",
        &["3", "3", "5"],
    );
}
