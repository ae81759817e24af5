use super::helpers::*;
use moonlet_compiler::opcode::OpCode;

#[test]
fn e2e_function_expression_creates_closure() {
    let (chunk, _) = compile_str("local f = function() end");
    assert!(has_opcode(&chunk, OpCode::Closure));
    assert_eq!(chunk.children.len(), 1);
    assert!(has_opcode(&chunk.children[0], OpCode::Return0));
}

#[test]
fn e2e_params_and_vararg() {
    let (chunk, _) = compile_str("local function f(a, b, ...) return select('#', ...) end");
    let f = &chunk.children[0];
    assert_eq!(f.num_params, 2);
    assert!(f.is_vararg);
    assert_eq!(f.code[0].opcode(), OpCode::VarArgPrep);
    assert_eq!(f.code[0].a(), 2);
}

#[test]
fn e2e_function_lines() {
    let (chunk, _) = compile_str("local x\nlocal function f()\n  return 1\nend");
    let f = &chunk.children[0];
    assert_eq!(f.line_defined, 2);
    assert_eq!(f.last_line, 4);
    assert!(!f.is_main());
}

#[test]
fn e2e_function_names() {
    let (chunk, _) = compile_str("function a.b.c() end function M:m() end local function g() end");
    let names: Vec<_> = chunk.children.iter().map(|c| c.name.clone()).collect();
    assert_eq!(
        names,
        vec![Some("a.b.c".to_string()), Some("M:m".to_string()), Some("g".to_string())]
    );
}

#[test]
fn e2e_method_has_self_param() {
    let (chunk, strings) = compile_str("function obj:get() return self end");
    let m = &chunk.children[0];
    assert_eq!(m.num_params, 1);
    assert_eq!(strings.get_lossy(m.locals[0].name), "self");
}

#[test]
fn e2e_recursive_local_function_is_upvalue() {
    let (chunk, _) = compile_str("local function fact(n) if n <= 1 then return 1 end return n * fact(n - 1) end");
    let f = &chunk.children[0];
    assert_eq!(f.upvalues.len(), 1);
    assert!(f.upvalues[0].in_stack);
}

#[test]
fn e2e_global_function_uses_env() {
    let (chunk, strings) = compile_str("function greet() end");
    assert!(has_opcode(&chunk, OpCode::SetTabUp));
    assert!(has_string_constant(&chunk, "greet", &strings));
}

#[test]
fn e2e_env_upvalue_threaded_through_nesting() {
    let (chunk, strings) = compile_str("local function outer() return function() return print end end");
    let inner = &chunk.children[0].children[0];
    assert_eq!(strings.get_lossy(inner.upvalues[0].name), "_ENV");
    assert!(!inner.upvalues[0].in_stack);
}

#[test]
fn e2e_shared_upvalue_between_closures() {
    let (chunk, _) = compile_str(
        "local count = 0\nlocal function inc() count = count + 1 end\nlocal function get() return count end",
    );
    assert_eq!(chunk.children[0].upvalues[0].index, chunk.children[1].upvalues[0].index);
}

#[test]
fn e2e_tail_call_from_function() {
    let (chunk, _) = compile_str("local function f(x) return g(x) end");
    assert!(has_opcode(&chunk.children[0], OpCode::TailCall));
}

#[test]
fn e2e_method_tail_call() {
    let (chunk, _) = compile_str("local function f(o) return o:step() end");
    let f = &chunk.children[0];
    assert!(has_opcode(f, OpCode::Self_));
    assert!(has_opcode(f, OpCode::TailCall));
}

#[test]
fn e2e_multret_argument_forwarding() {
    let (chunk, _) = compile_str("local function f(...) return g(1, ...) end");
    let f = &chunk.children[0];
    let call = find_opcode(f, OpCode::TailCall).unwrap();
    assert_eq!(f.code[call].b(), 0);
}

#[test]
fn e2e_deeply_nested_functions() {
    let (chunk, _) = compile_str(
        "local a = 1\nlocal function f1()\n  local function f2()\n    local function f3() return a end\n    return f3\n  end\n  return f2\nend",
    );
    let f3 = &chunk.children[0].children[0].children[0];
    assert_eq!(f3.upvalues.len(), 1);
}
