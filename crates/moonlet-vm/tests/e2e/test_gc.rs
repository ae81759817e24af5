use super::helpers::*;
use moonlet_vm::{Vm, VmConfig};

#[test]
fn test_host_collection_frees_garbage() {
    let mut vm = new_vm();
    exec(&mut vm, "for i = 1, 2000 do local t = {i, tostring(i)} end").unwrap();
    let before = vm.memory_kb();
    let freed = vm.collect_garbage();
    assert!(freed > 0);
    assert!(vm.memory_kb() < before);
}

#[test]
fn test_reachable_values_survive_collection() {
    let mut vm = new_vm();
    exec(
        &mut vm,
        "keep = {}
         for i = 1, 100 do keep[i] = {value = 'item' .. i} end
         local function make() local n = 0 return function() n = n + 1 return n end end
         counter = make()
         counter()",
    )
    .unwrap();
    vm.collect_garbage();
    vm.collect_garbage();
    let r = exec(&mut vm, "return keep[57].value, counter(), #keep").unwrap();
    assert_eq!(r[0].display(&vm.strings).to_string(), "item57");
    assert_num(&r, 1, 2.0);
    assert_num(&r, 2, 100.0);
}

#[test]
fn test_collectgarbage_from_lua() {
    run_check_strs(
        "local junk = {}
         for i = 1, 5000 do junk[i] = {} end
         junk = nil
         local before = collectgarbage('count')
         collectgarbage()
         collectgarbage('collect')
         local after = collectgarbage('count')
         return type(before), after <= before, collectgarbage('isrunning')",
        &["number", "true", "true"],
    );
}

#[test]
fn test_stop_and_restart() {
    run_check_strs(
        "collectgarbage('stop')
         local a = collectgarbage('isrunning')
         collectgarbage('restart')
         return a, collectgarbage('isrunning')",
        &["false", "true"],
    );
}

#[test]
fn test_invalid_option() {
    let e = run_lua_err("collectgarbage('bogus')");
    assert!(e.contains("invalid option 'bogus'"), "{e}");
}

#[test]
fn test_automatic_collection_under_pressure() {
    let mut vm = Vm::new(VmConfig {
        gc_threshold: 500,
        ..VmConfig::default()
    });
    moonlet_vm::open_base(&mut vm);
    moonlet_stdlib::open(&mut vm);
    let r = exec(
        &mut vm,
        "local live = {}
         for i = 1, 20000 do
           local t = {i}
           if i % 1000 == 0 then live[#live + 1] = t end
         end
         local sum = 0
         for _, t in ipairs(live) do sum = sum + t[1] end
         return sum, collectgarbage('count') < 1000",
    )
    .unwrap();
    assert_num(&r, 0, 210000.0);
    assert_bool(&r, 1, true);
}

#[test]
fn test_suspended_coroutine_keeps_locals_alive() {
    let mut vm = new_vm();
    exec(
        &mut vm,
        "co = coroutine.create(function()
           local held = {payload = 'still here'}
           coroutine.yield()
           return held.payload
         end)
         coroutine.resume(co)",
    )
    .unwrap();
    exec(&mut vm, "for i = 1, 3000 do local _ = {i} end").unwrap();
    vm.collect_garbage();
    let r = exec(&mut vm, "local ok, v = coroutine.resume(co) return v").unwrap();
    assert_eq!(r[0].display(&vm.strings).to_string(), "still here");
}
