use super::helpers::*;
use moonlet_compiler::opcode::OpCode;

#[test]
fn e2e_return_literals() {
    let (chunk, _) = compile_str("return nil, true, false");
    assert!(has_opcode(&chunk, OpCode::LoadNil));
    assert!(has_opcode(&chunk, OpCode::LoadTrue));
    assert!(has_opcode(&chunk, OpCode::LoadFalse));
    assert!(has_opcode(&chunk, OpCode::Return));
}

#[test]
fn e2e_small_integers_use_loadi() {
    let (chunk, _) = compile_str("return -1");
    assert!(has_opcode(&chunk, OpCode::LoadI));
    assert!(chunk.constants.is_empty());
}

#[test]
fn e2e_float_uses_constant() {
    let (chunk, _) = compile_str("return 3.25");
    assert!(has_number_constant(&chunk, 3.25));
    assert_eq!(count_opcode(&chunk, OpCode::LoadK), 1);
}

#[test]
fn e2e_negative_zero_not_folded() {
    let (chunk, _) = compile_str("return -0");
    assert!(has_opcode(&chunk, OpCode::Unm));
}

#[test]
fn e2e_huge_integer_uses_constant() {
    let (chunk, _) = compile_str("return 9007199254740992");
    assert!(has_opcode(&chunk, OpCode::LoadK));
}

#[test]
fn e2e_string_constant() {
    let (chunk, strings) = compile_str("return 'moon'");
    assert!(has_string_constant(&chunk, "moon", &strings));
}

#[test]
fn e2e_constant_folding() {
    let (chunk, _) = compile_str("return 2 ^ 10, 7 // 2, 1 << 4");
    assert!(!has_opcode(&chunk, OpCode::PowK));
    assert!(!has_opcode(&chunk, OpCode::IDivK));
    // Bitwise operators depend on integer conversion at run time.
    assert!(has_opcode(&chunk, OpCode::Shl));
}

#[test]
fn e2e_division_by_zero_not_folded() {
    let (chunk, _) = compile_str("return 1 // 0");
    assert!(has_opcode(&chunk, OpCode::IDivK) || has_opcode(&chunk, OpCode::IDiv));
}

#[test]
fn e2e_arithmetic_registers() {
    let (chunk, _) = compile_str("local a, b = ... return a - b, a / b, a % b");
    assert!(has_opcode(&chunk, OpCode::Sub));
    assert!(has_opcode(&chunk, OpCode::Div));
    assert!(has_opcode(&chunk, OpCode::Mod));
    assert_eq!(count_opcode(&chunk, OpCode::MMBin), 3);
}

#[test]
fn e2e_bitwise_ops() {
    let (chunk, _) = compile_str("local a, b = ... return a | b, a ~ b, a >> b, ~a");
    assert!(has_opcode(&chunk, OpCode::BOr));
    assert!(has_opcode(&chunk, OpCode::BXor));
    assert!(has_opcode(&chunk, OpCode::Shr));
    assert!(has_opcode(&chunk, OpCode::BNot));
}

#[test]
fn e2e_unary_ops() {
    let (chunk, _) = compile_str("local a = ... return -a, not a, #a");
    assert!(has_opcode(&chunk, OpCode::Unm));
    assert!(has_opcode(&chunk, OpCode::Not));
    assert!(has_opcode(&chunk, OpCode::Len));
}

#[test]
fn e2e_comparison_operands_swapped_for_greater() {
    let (chunk, _) = compile_str("local a, b = ... return a > b");
    let lt = find_opcode(&chunk, OpCode::Lt).unwrap();
    assert_eq!(chunk.code[lt].a(), 1);
    assert_eq!(chunk.code[lt].b(), 0);
}

#[test]
fn e2e_not_equal_constant() {
    let (chunk, _) = compile_str("local a = ... return a ~= 10");
    assert!(has_opcode(&chunk, OpCode::EqK));
}

#[test]
fn e2e_and_or_short_circuit() {
    let (chunk, _) = compile_str("local a, b, c = ... return a and b or c");
    assert!(count_opcode(&chunk, OpCode::Test) >= 2);
}

#[test]
fn e2e_concat_chain() {
    let (chunk, _) = compile_str("local a = ... return 'x' .. a .. 'y' .. 1");
    assert_eq!(count_opcode(&chunk, OpCode::Concat), 1);
    let at = find_opcode(&chunk, OpCode::Concat).unwrap();
    assert_eq!(chunk.code[at].b(), 4);
}

#[test]
fn e2e_table_constructor_mixed() {
    let (chunk, strings) = compile_str("return {1, 2, x = 3, [10] = 4, ['k' .. 'v'] = 5}");
    assert!(has_opcode(&chunk, OpCode::NewTable));
    assert!(has_opcode(&chunk, OpCode::SetField));
    assert!(has_opcode(&chunk, OpCode::SetI));
    assert!(has_opcode(&chunk, OpCode::SetTable));
    assert!(has_opcode(&chunk, OpCode::SetList));
    assert!(has_string_constant(&chunk, "x", &strings));
}

#[test]
fn e2e_table_size_hints() {
    let (chunk, _) = compile_str("return {1, 2, 3, a = 1}");
    let at = find_opcode(&chunk, OpCode::NewTable).unwrap();
    assert_eq!(chunk.code[at].b(), 1);
    assert_eq!(chunk.code[at].c(), 3);
}

#[test]
fn e2e_global_read_write() {
    let (chunk, strings) = compile_str("counter = counter + 1");
    assert!(has_opcode(&chunk, OpCode::GetTabUp));
    assert!(has_opcode(&chunk, OpCode::SetTabUp));
    assert!(has_opcode(&chunk, OpCode::AddK) || has_opcode(&chunk, OpCode::Add));
    assert!(has_string_constant(&chunk, "counter", &strings));
}

#[test]
fn e2e_method_call_uses_self() {
    let (chunk, _) = compile_str("local s = ... return s:upper()");
    assert!(has_opcode(&chunk, OpCode::Self_));
}

#[test]
fn e2e_paren_truncates_call() {
    let (chunk, _) = compile_str("return (f())");
    let call = find_opcode(&chunk, OpCode::Call).unwrap();
    assert_eq!(chunk.code[call].c(), 2);
    assert!(!has_opcode(&chunk, OpCode::TailCall));
}

#[test]
fn e2e_vararg_in_middle_truncated() {
    let (chunk, _) = compile_str("return ..., 1");
    let at = find_opcode(&chunk, OpCode::VarArg).unwrap();
    assert_eq!(chunk.code[at].c(), 2);
}
