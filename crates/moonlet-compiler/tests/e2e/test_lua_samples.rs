use moonlet_compiler::compiler::compile;
use moonlet_core::string::StringInterner;

fn compile_file(name: &str) {
    let path = format!("{}/../moonlet/tests/scripts/{name}", env!("CARGO_MANIFEST_DIR"));
    let content = std::fs::read(&path).unwrap_or_else(|e| {
        panic!("failed to read {path}: {e}");
    });
    let mut strings = StringInterner::new();
    compile(&content, &format!("@{name}"), &mut strings).unwrap_or_else(|e| {
        panic!("failed to compile {path}: {e}");
    });
}

#[test]
fn e2e_sample_fibonacci() {
    compile_file("fibonacci.lua");
}

#[test]
fn e2e_sample_closures() {
    compile_file("closures.lua");
}

#[test]
fn e2e_sample_tables() {
    compile_file("tables.lua");
}

#[test]
fn e2e_sample_control_flow() {
    compile_file("control_flow.lua");
}

#[test]
fn e2e_sample_sieve() {
    compile_file("sieve.lua");
}

#[test]
fn e2e_sample_varargs() {
    compile_file("varargs.lua");
}

#[test]
fn e2e_sample_metatables() {
    compile_file("metatables.lua");
}

#[test]
fn e2e_sample_coroutines() {
    compile_file("coroutines.lua");
}

#[test]
fn e2e_sample_errors() {
    compile_file("errors.lua");
}
