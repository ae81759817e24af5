use super::helpers::*;
use moonlet_compiler::opcode::OpCode;

#[test]
fn e2e_local_declaration() {
    let (chunk, _) = compile_str("local x = 42");
    assert!(has_opcode(&chunk, OpCode::LoadI));
}

#[test]
fn e2e_local_nil_default() {
    let (chunk, _) = compile_str("local x, y, z");
    let at = find_opcode(&chunk, OpCode::LoadNil).unwrap();
    assert_eq!(chunk.code[at].b(), 2);
}

#[test]
fn e2e_local_fewer_values() {
    let (chunk, _) = compile_str("local a, b, c = 1");
    assert!(has_opcode(&chunk, OpCode::LoadI));
    assert!(has_opcode(&chunk, OpCode::LoadNil));
}

#[test]
fn e2e_local_call_fills_remaining() {
    let (chunk, _) = compile_str("local a, b, c = f()");
    let call = find_opcode(&chunk, OpCode::Call).unwrap();
    assert_eq!(chunk.code[call].c(), 4);
    assert!(!has_opcode(&chunk, OpCode::LoadNil));
}

#[test]
fn e2e_extra_values_evaluated() {
    let (chunk, _) = compile_str("local a = 1, f()");
    let call = find_opcode(&chunk, OpCode::Call).unwrap();
    assert_eq!(chunk.code[call].c(), 2);
}

#[test]
fn e2e_local_shadowing_reads_outer() {
    let (chunk, _) = compile_str("local x = 1 local x = x + 1 return x");
    assert_eq!(chunk.locals.len(), 2);
}

#[test]
fn e2e_if_elseif_else() {
    let (chunk, _) = compile_str(
        "local n = ... if n < 0 then n = -1 elseif n == 0 then n = 0 else n = 1 end return n",
    );
    assert!(has_opcode(&chunk, OpCode::Lt));
    assert!(has_opcode(&chunk, OpCode::EqK));
    assert!(count_opcode(&chunk, OpCode::Jmp) >= 3);
}

#[test]
fn e2e_while_loop_jumps_back() {
    let (chunk, _) = compile_str("local i = 0 while i < 10 do i = i + 1 end");
    let back = chunk
        .code
        .iter()
        .filter(|i| i.opcode() == OpCode::Jmp)
        .any(|i| i.get_sj() < 0);
    assert!(back);
}

#[test]
fn e2e_repeat_until_sees_body_locals() {
    let (chunk, _) = compile_str("repeat local done = true until done");
    assert!(has_opcode(&chunk, OpCode::Test));
}

#[test]
fn e2e_repeat_with_captured_local_closes() {
    let (chunk, _) = compile_str("repeat local x = 1 local f = function() return x end until x");
    assert!(count_opcode(&chunk, OpCode::Close) >= 2);
}

#[test]
fn e2e_numeric_for_default_step() {
    let (chunk, _) = compile_str("for i = 1, 3 do end");
    let prep = find_opcode(&chunk, OpCode::ForPrep).unwrap();
    assert_eq!(chunk.code[prep - 1].opcode(), OpCode::LoadI);
    assert_eq!(chunk.code[prep - 1].sbx(), 1);
}

#[test]
fn e2e_generic_for_registers() {
    let (chunk, _) = compile_str("for k, v in pairs({}) do end");
    let call = find_opcode(&chunk, OpCode::TForCall).unwrap();
    assert_eq!(chunk.code[call].c(), 2);
    assert!(chunk.max_stack_size >= 6);
}

#[test]
fn e2e_break_jumps_past_loop() {
    let (chunk, _) = compile_str("while true do break end return 1");
    let jumps: Vec<i32> = chunk
        .code
        .iter()
        .filter(|i| i.opcode() == OpCode::Jmp)
        .map(|i| i.get_sj())
        .collect();
    assert!(jumps.iter().any(|&off| off > 0));
}

#[test]
fn e2e_break_closes_captured() {
    let (chunk, _) = compile_str("while true do local x = 1 local f = function() return x end break end");
    let close = find_opcode(&chunk, OpCode::Close).unwrap();
    assert_eq!(chunk.code[close + 1].opcode(), OpCode::Jmp);
}

#[test]
fn e2e_goto_continue() {
    compile_str(
        "for i = 1, 10 do\n  if i % 2 == 0 then goto continue end\n  print(i)\n  ::continue::\nend",
    );
}

#[test]
fn e2e_goto_backward_loop() {
    let (chunk, _) = compile_str("local i = 0 ::top:: i = i + 1 if i < 3 then goto top end");
    assert!(chunk.code.iter().any(|i| i.opcode() == OpCode::Jmp && i.get_sj() < 0));
}

#[test]
fn e2e_nested_break_in_inner_loop() {
    compile_str("for i = 1, 3 do for j = 1, 3 do if j == 2 then break end end end");
}

#[test]
fn e2e_multiple_assignment_evaluates_before_store() {
    let (chunk, _) = compile_str("local t, i = {}, 1 i, t[i] = i + 1, 20");
    // t[i] must use the old i: a copy of i is taken before the store.
    assert!(has_opcode(&chunk, OpCode::SetTable));
    assert!(count_opcode(&chunk, OpCode::Move) >= 2);
}

#[test]
fn e2e_upvalue_assignment() {
    let (chunk, _) = compile_str("local n = 0 local function inc() n = n + 1 end");
    assert!(has_opcode(&chunk.children[0], OpCode::SetUpval));
    assert!(has_opcode(&chunk.children[0], OpCode::GetUpval));
}

#[test]
fn e2e_close_variable() {
    let (chunk, _) = compile_str("do local h <close> = setmetatable({}, mt) end");
    assert!(has_opcode(&chunk, OpCode::Tbc));
    assert!(has_opcode(&chunk, OpCode::Close));
}

#[test]
fn e2e_call_statement_discards_results() {
    let (chunk, _) = compile_str("print('hi')");
    let call = find_opcode(&chunk, OpCode::Call).unwrap();
    assert_eq!(chunk.code[call].b(), 2);
    assert_eq!(chunk.code[call].c(), 1);
}
