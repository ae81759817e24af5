use super::helpers::*;
use moonlet_compiler::disasm::disassemble;
use moonlet_compiler::opcode::OpCode;

#[test]
fn e2e_counter_closure() {
    let src = r#"
local function make_counter()
    local count = 0
    return function()
        count = count + 1
        return count
    end
end
local c = make_counter()
return c()
"#;
    let (chunk, _) = compile_str(src);
    assert!(has_opcode(&chunk, OpCode::Closure));
    let maker = &chunk.children[0];
    assert!(has_opcode(maker, OpCode::Closure));
    assert_eq!(maker.children[0].upvalues.len(), 1);
}

#[test]
fn e2e_nested_loops() {
    let src = r#"
local total = 0
for i = 1, 10 do
    for j = 1, 10 do
        total = total + i * j
    end
end
return total
"#;
    let (chunk, _) = compile_str(src);
    assert_eq!(count_opcode(&chunk, OpCode::ForPrep), 2);
    assert_eq!(count_opcode(&chunk, OpCode::ForLoop), 2);
}

#[test]
fn e2e_class_pattern() {
    let src = r#"
local Account = {}
Account.__index = Account
function Account.new(balance)
    return setmetatable({balance = balance}, Account)
end
function Account:deposit(v)
    self.balance = self.balance + v
end
local a = Account.new(100)
a:deposit(50)
return a.balance
"#;
    let (chunk, strings) = compile_str(src);
    assert_eq!(chunk.children.len(), 2);
    assert!(has_opcode(&chunk, OpCode::Self_));
    assert!(has_string_constant(&chunk, "__index", &strings));
    assert!(has_opcode(&chunk.children[1], OpCode::SetField));
}

#[test]
fn e2e_generator_with_coroutines() {
    let src = r#"
local function gen(n)
    return coroutine.wrap(function()
        for i = 1, n do coroutine.yield(i) end
    end)
end
local s = 0
for v in gen(5) do s = s + v end
return s
"#;
    let (chunk, _) = compile_str(src);
    assert!(has_opcode(&chunk, OpCode::TForCall));
    let inner = &chunk.children[0].children[0];
    assert!(has_opcode(inner, OpCode::GetUpval) || has_opcode(inner, OpCode::GetTabUp));
}

#[test]
fn e2e_string_building() {
    let src = r#"
local parts = {}
for i = 1, 3 do
    parts[#parts + 1] = "item" .. i
end
return table.concat(parts, ", ")
"#;
    let (chunk, _) = compile_str(src);
    assert!(has_opcode(&chunk, OpCode::Len));
    assert!(has_opcode(&chunk, OpCode::Concat));
    assert!(has_opcode(&chunk, OpCode::TailCall));
}

#[test]
fn e2e_large_table_constructor_extraarg() {
    let items: Vec<String> = (0..400).map(|i| i.to_string()).collect();
    let (chunk, _) = compile_str(&format!("return {{{}}}", items.join(", ")));
    assert_eq!(count_opcode(&chunk, OpCode::SetList), 8);
    assert!(has_opcode(&chunk, OpCode::ExtraArg));
}

#[test]
fn e2e_disassembly_lists_all_functions() {
    let src = "local function a() end\nlocal function b() return function() end end";
    let (chunk, strings) = compile_str(src);
    let listing = disassemble(&chunk, &strings);
    assert_eq!(listing.matches("function <").count(), 3);
    assert!(listing.contains("main <test:0,"));
}

#[test]
fn e2e_positions_cover_code() {
    let src = "local t = {}\nfor i = 1, 3 do\n  t[i] = i\nend\nreturn t";
    let (chunk, _) = compile_str(src);
    assert_eq!(chunk.code.len(), chunk.positions.len());
    let seti = find_opcode(&chunk, OpCode::SetTable).unwrap();
    assert_eq!(chunk.line_at(seti), 3);
}
