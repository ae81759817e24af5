use super::helpers::*;
use moonlet_core::error::LuaError;
use moonlet_vm::{FileModuleLoader, MemoryModuleLoader};
use std::rc::Rc;

fn vm_with_modules(modules: &[(&str, &str)]) -> moonlet_vm::Vm {
    let mut vm = new_vm();
    let mut loader = MemoryModuleLoader::new();
    for (name, source) in modules {
        loader.insert(name, source);
    }
    vm.add_module_loader(Rc::new(loader));
    vm
}

#[test]
fn test_require_returns_module_table() {
    let mut vm = vm_with_modules(&[("greet", "local M = {} function M.hi(n) return 'hi ' .. n end return M")]);
    let r = exec(&mut vm, "local g = require('greet') return g.hi('bob')").unwrap();
    assert_eq!(r[0].display(&vm.strings).to_string(), "hi bob");
}

#[test]
fn test_require_caches_in_package_loaded() {
    let mut vm = vm_with_modules(&[("counter", "loads = (loads or 0) + 1 return {}")]);
    let r = exec(
        &mut vm,
        "local a = require('counter')
         local b = require('counter')
         return a == b, loads, package.loaded.counter == a",
    )
    .unwrap();
    assert_bool(&r, 0, true);
    assert_num(&r, 1, 1.0);
    assert_bool(&r, 2, true);
}

#[test]
fn test_modules_require_each_other() {
    let mut vm = vm_with_modules(&[
        ("a", "local b = require('b') return {value = b.value + 1}"),
        ("b", "return {value = 41}"),
    ]);
    let r = exec(&mut vm, "return require('a').value").unwrap();
    assert_num(&r, 0, 42.0);
}

#[test]
fn test_first_loader_wins() {
    let mut vm = new_vm();
    vm.add_module_loader(Rc::new(MemoryModuleLoader::new().with_module("m", "return 'first'")));
    vm.add_module_loader(Rc::new(MemoryModuleLoader::new().with_module("m", "return 'second'")));
    let r = exec(&mut vm, "return require('m')").unwrap();
    assert_eq!(r[0].display(&vm.strings).to_string(), "first");
}

#[test]
fn test_module_not_found_from_host() {
    let mut vm = vm_with_modules(&[]);
    let chunk = vm.compile(b"require('missing.mod')", "=main").unwrap();
    let f = vm.load(chunk);
    let err = vm.call(f, &[]).unwrap_err();
    match err.root() {
        LuaError::ModuleNotFound { name, searched } => {
            assert_eq!(name, "missing.mod");
            assert!(searched.contains("no module 'missing.mod' in memory"), "{searched}");
        }
        other => panic!("expected ModuleNotFound, got {other:?}"),
    }
}

#[test]
fn test_module_runtime_error_propagates() {
    let mut vm = vm_with_modules(&[("broken", "local x = nil\nreturn x.field")]);
    let e = exec(&mut vm, "require('broken')").unwrap_err();
    assert_eq!(e, "broken:2: attempt to index a nil value (local 'x')");
}

#[test]
fn test_module_syntax_error_mentions_module() {
    let mut vm = vm_with_modules(&[("bad", "return (")]);
    let r = exec(&mut vm, "local ok, e = pcall(require, 'bad') return ok, e").unwrap();
    assert_bool(&r, 0, false);
    let msg = r[1].display(&vm.strings).to_string();
    assert!(msg.contains("error loading module 'bad'"), "{msg}");
}

#[test]
fn test_preload_function() {
    let r = run_lua_strs(
        "package.preload['virtual'] = function(name) return {name = name} end
         return require('virtual').name",
    );
    assert_eq!(r, vec!["virtual"]);
}

#[test]
fn test_standard_libraries_are_loaded() {
    run_check_strs("return require('string') == string, require('math') == math", &["true", "true"]);
}

#[test]
fn test_file_loader_reads_from_disk() {
    let dir = std::env::temp_dir().join(format!("moonlet-modules-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("pkg")).unwrap();
    std::fs::write(dir.join("pkg").join("util.lua"), "return {twice = function(x) return x * 2 end}").unwrap();

    let mut vm = new_vm();
    let template = format!("{}/?.lua", dir.display());
    vm.add_module_loader(Rc::new(FileModuleLoader::new(&template)));
    let r = exec(&mut vm, "return require('pkg.util').twice(21)").unwrap();
    assert_num(&r, 0, 42.0);

    let e = exec(&mut vm, "require('pkg.nothing')").unwrap_err();
    assert!(e.contains("module 'pkg.nothing' not found:"), "{e}");
    assert!(e.contains("pkg/nothing.lua"), "{e}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_searchpath() {
    run_check_strs(
        "local p, err = package.searchpath('no.such', './?.lua;./?/init.lua')
         return p, err",
        &["nil", "\n\tno file './no/such.lua'\n\tno file './no/such/init.lua'"],
    );
}
