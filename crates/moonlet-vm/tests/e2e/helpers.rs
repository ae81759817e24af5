use moonlet_core::value::LuaValue;
use moonlet_vm::{open_base, open_coroutine, open_package, CaptureBuffer, Vm};

/// A VM with every library open.
pub fn new_vm() -> Vm {
    let mut vm = Vm::default();
    open_base(&mut vm);
    open_coroutine(&mut vm);
    moonlet_stdlib::open(&mut vm);
    open_package(&mut vm);
    vm
}

/// Compile and run `source` on `vm`.
pub fn exec(vm: &mut Vm, source: &str) -> Result<Vec<LuaValue>, String> {
    let chunk = vm
        .compile(source.as_bytes(), "=test")
        .unwrap_or_else(|e| panic!("compile error: {e}"));
    let f = vm.load(chunk);
    vm.call(f, &[]).map_err(|e| vm.error_message(&e))
}

/// Compile and execute Lua source, returning the results.
pub fn run_lua(source: &str) -> Vec<LuaValue> {
    let mut vm = new_vm();
    exec(&mut vm, source).unwrap_or_else(|e| panic!("runtime error: {e}"))
}

/// Results rendered as `tostring` would (without metamethods).
pub fn run_lua_strs(source: &str) -> Vec<String> {
    let mut vm = new_vm();
    let values = exec(&mut vm, source).unwrap_or_else(|e| panic!("runtime error: {e}"));
    values.iter().map(|v| v.display(&vm.strings).to_string()).collect()
}

/// Compile and execute Lua source, expecting a runtime error.
pub fn run_lua_err(source: &str) -> String {
    let mut vm = new_vm();
    match exec(&mut vm, source) {
        Err(e) => e,
        Ok(vals) => panic!("expected error, got {} results: {:?}", vals.len(), vals),
    }
}

/// Run and return everything written by `print` and `io.write`.
pub fn run_lua_output(source: &str) -> String {
    let mut vm = new_vm();
    let out = CaptureBuffer::new();
    vm.set_stdout(Box::new(out.clone()));
    exec(&mut vm, source).unwrap_or_else(|e| panic!("runtime error: {e}"));
    out.contents()
}

pub fn assert_num(results: &[LuaValue], idx: usize, expected: f64) {
    let val = results[idx];
    let got = val
        .as_number()
        .unwrap_or_else(|| panic!("result[{idx}] = {val:?}, expected number {expected}"));
    assert!(
        (got - expected).abs() < 1e-10 || (got.is_nan() && expected.is_nan()),
        "result[{idx}] = {got}, expected {expected}"
    );
}

pub fn assert_bool(results: &[LuaValue], idx: usize, expected: bool) {
    assert_eq!(results[idx], LuaValue::Boolean(expected), "result[{idx}]");
}

/// Run Lua source and check results against expected numbers.
pub fn run_check_nums(source: &str, expected: &[f64]) {
    let results = run_lua(source);
    assert_eq!(
        results.len(),
        expected.len(),
        "expected {} results, got {}",
        expected.len(),
        results.len()
    );
    for (i, &exp) in expected.iter().enumerate() {
        assert_num(&results, i, exp);
    }
}

/// Run Lua source and check the rendered results.
pub fn run_check_strs(source: &str, expected: &[&str]) {
    assert_eq!(run_lua_strs(source), expected);
}
