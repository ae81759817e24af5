use super::helpers::*;

#[test]
fn e2e_error_unfinished_string() {
    let err = compile_str_err("local x = \"hello");
    assert_eq!(err, "test:1: unfinished string near <eof>");
}

#[test]
fn e2e_error_unfinished_long_string() {
    let err = compile_str_err("x = [[\nabc");
    assert!(err.contains("unfinished long string (starting at line 1) near <eof>"), "{err}");
}

#[test]
fn e2e_error_break_outside_loop() {
    assert_eq!(compile_str_err("break"), "test:1: break outside a loop at line 1");
}

#[test]
fn e2e_error_duplicate_label() {
    let err = compile_str_err("::x::\n::x::");
    assert_eq!(err, "test:2: label 'x' already defined on line 1");
}

#[test]
fn e2e_error_goto_missing_label() {
    let err = compile_str_err("do goto out end");
    assert!(err.contains("no visible label 'out' for goto"), "{err}");
}

#[test]
fn e2e_error_goto_into_local_scope() {
    let err = compile_str_err("goto skip\nlocal a = 1\n::skip::\nprint(a)");
    assert!(err.contains("jumps into the scope of local 'a'"), "{err}");
}

#[test]
fn e2e_error_unexpected_symbol() {
    let err = compile_str_err("return )");
    assert!(err.contains("unexpected symbol near ')'"), "{err}");
}

#[test]
fn e2e_error_malformed_number() {
    let err = compile_str_err("local x = 1e");
    assert!(err.contains("malformed number near '1e'"), "{err}");
}

#[test]
fn e2e_error_invalid_escape() {
    let err = compile_str_err("local x = \"\\q\"");
    assert!(err.contains("invalid escape sequence"), "{err}");
}

#[test]
fn e2e_error_missing_end_names_opener() {
    let err = compile_str_err("if true then\nx = 1\n");
    assert!(err.contains("'end' expected (to close 'if' at line 1) near <eof>"), "{err}");
}

#[test]
fn e2e_error_expected_then() {
    let err = compile_str_err("if true do end");
    assert!(err.contains("'then' expected near 'do'"), "{err}");
}

#[test]
fn e2e_error_vararg_outside_vararg_function() {
    let err = compile_str_err("function f() return ... end");
    assert!(err.contains("cannot use '...' outside a vararg function"), "{err}");
}

#[test]
fn e2e_error_expression_not_statement() {
    let err = compile_str_err("42");
    assert!(err.contains("syntax error") || err.contains("unexpected symbol"), "{err}");
}

#[test]
fn e2e_error_assign_to_const() {
    let err = compile_str_err("local limit <const> = 10\nlimit = 11");
    assert_eq!(err, "test:2: attempt to assign to const variable 'limit'");
}

#[test]
fn e2e_error_assign_to_close_variable() {
    let err = compile_str_err("local h <close> = nil\nh = 1");
    assert!(err.contains("attempt to assign to const variable 'h'"), "{err}");
}

#[test]
fn e2e_error_unknown_attribute() {
    let err = compile_str_err("local x <frozen> = 1");
    assert!(err.contains("unknown attribute 'frozen'"), "{err}");
}

#[test]
fn e2e_error_multiple_close_variables() {
    let err = compile_str_err("local a <close>, b <close> = nil, nil");
    assert!(err.contains("multiple to-be-closed variables"), "{err}");
}

#[test]
fn e2e_error_too_many_locals() {
    let names: Vec<String> = (0..210).map(|i| format!("v{i}")).collect();
    let err = compile_str_err(&format!("local {}", names.join(", ")));
    assert!(err.contains("too many local variables (limit is 200) in main function"), "{err}");
}

#[test]
fn e2e_error_line_number_tracks_source() {
    let err = compile_str_err("local a = 1\nlocal b = 2\nlocal c = = 3");
    assert!(err.starts_with("test:3:"), "{err}");
}
