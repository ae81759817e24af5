use super::helpers::*;
use futures::executor::block_on;
use futures::future::FutureExt;
use moonlet_core::error::LuaError;
use moonlet_core::native::{native_value, AsyncCompletion, CancellationToken, NativeContext, NativeFunction};
use moonlet_core::value::LuaValue;
use moonlet_vm::Vm;
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Pending for `n` polls, then ready.
struct Ticks(usize);

impl Future for Ticks {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 == 0 {
            Poll::Ready(())
        } else {
            self.0 -= 1;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// `double(x)` resolves to `x * 2` after a few polls.
fn install_double(vm: &mut Vm, polls: Rc<Cell<usize>>) {
    let f = NativeFunction::new_async("double", move |ctx: &mut NativeContext<'_>| {
        let x = ctx.check_number(0)?;
        let polls = polls.clone();
        Ok(async move {
            Ticks(2).await;
            polls.set(polls.get() + 1);
            let done: AsyncCompletion = Box::new(move |ctx: &mut NativeContext<'_>| Ok(ctx.ret(&[LuaValue::Number(x * 2.0)])));
            Ok(done)
        }
        .boxed_local())
    });
    let value = native_value(vm, f);
    vm.set_global("double", value);
}

/// `fail()` resolves to an error.
fn install_fail(vm: &mut Vm) {
    let f = NativeFunction::new_async("fail", |_ctx: &mut NativeContext<'_>| {
        Ok(async move {
            Ticks(1).await;
            Err(LuaError::runtime("remote failure"))
        }
        .boxed_local())
    });
    let value = native_value(vm, f);
    vm.set_global("fail", value);
}

/// `hang()` never resolves on its own; it trips `token` when first polled.
fn install_hang(vm: &mut Vm, token: CancellationToken) {
    let f = NativeFunction::new_async("hang", move |_ctx: &mut NativeContext<'_>| {
        let token = token.clone();
        Ok(async move {
            token.cancel();
            futures::future::pending::<()>().await;
            Err(LuaError::runtime("unreachable"))
        }
        .boxed_local())
    });
    let value = native_value(vm, f);
    vm.set_global("hang", value);
}

fn run_async(vm: &mut Vm, source: &str) -> Result<Vec<LuaValue>, LuaError> {
    let chunk = vm.compile(source.as_bytes(), "=async").expect("compiles");
    let f = vm.load(chunk);
    block_on(vm.call_async(f, &[]))
}

// ---- Awaiting ----

#[test]
fn test_async_native_awaited_from_host() {
    let mut vm = new_vm();
    let polls = Rc::new(Cell::new(0));
    install_double(&mut vm, polls.clone());
    let r = run_async(&mut vm, "local a = double(10) local b = double(a) return a + b").unwrap();
    assert_num(&r, 0, 60.0);
    assert_eq!(polls.get(), 2);
}

#[test]
fn test_async_native_blocks_under_sync_call() {
    let mut vm = new_vm();
    install_double(&mut vm, Rc::new(Cell::new(0)));
    let r = exec(&mut vm, "return double(4)").unwrap();
    assert_num(&r, 0, 8.0);
}

#[test]
fn test_async_inside_coroutine() {
    let mut vm = new_vm();
    install_double(&mut vm, Rc::new(Cell::new(0)));
    let r = run_async(
        &mut vm,
        "local co = coroutine.wrap(function(x)
           local y = coroutine.yield(double(x))
           return double(y)
         end)
         return co(5), co(7)",
    )
    .unwrap();
    assert_num(&r, 0, 10.0);
    assert_num(&r, 1, 14.0);
}

#[test]
fn test_async_error_caught_by_pcall() {
    let mut vm = new_vm();
    install_fail(&mut vm);
    let r = run_async(&mut vm, "local ok, e = pcall(fail) return ok, e").unwrap();
    assert_bool(&r, 0, false);
    let msg = r[1].display(&vm.strings).to_string();
    assert!(msg.ends_with("remote failure"), "{msg}");
}

#[test]
fn test_async_error_uncaught() {
    let mut vm = new_vm();
    install_fail(&mut vm);
    let err = run_async(&mut vm, "fail()").unwrap_err();
    assert!(vm.error_message(&err).contains("remote failure"));
}

#[test]
fn test_await_inside_sort_comparator_is_rejected() {
    let mut vm = new_vm();
    install_double(&mut vm, Rc::new(Cell::new(0)));
    let r = run_async(
        &mut vm,
        "local ok, e = pcall(table.sort, {3, 1, 2}, function(a, b) return double(a) < double(b) end)
         return ok, e",
    )
    .unwrap();
    assert_bool(&r, 0, false);
    let msg = r[1].display(&vm.strings).to_string();
    assert!(msg.contains("attempt to await 'double' across a C-call boundary"), "{msg}");
}

#[test]
fn test_vm_reusable_after_async_call() {
    let mut vm = new_vm();
    install_double(&mut vm, Rc::new(Cell::new(0)));
    run_async(&mut vm, "total = double(1)").unwrap();
    let r = run_async(&mut vm, "return total + double(2)").unwrap();
    assert_num(&r, 0, 6.0);
}

// ---- Cancellation ----

fn install_trip(vm: &mut Vm, token: CancellationToken) {
    let f = NativeFunction::new("trip", move |_ctx: &mut NativeContext<'_>| {
        token.cancel();
        Ok(0)
    });
    let value = native_value(vm, f);
    vm.set_global("trip", value);
}

#[test]
fn test_cancel_stops_infinite_loop() {
    let mut vm = new_vm();
    let token = CancellationToken::new();
    vm.set_cancel_token(token.clone());
    install_trip(&mut vm, token.clone());
    let err = exec(&mut vm, "trip() while true do end").unwrap_err();
    assert_eq!(err, "cancelled");
    assert!(token.is_cancelled());
}

#[test]
fn test_cancel_caught_by_pcall() {
    let mut vm = new_vm();
    let token = CancellationToken::new();
    vm.set_cancel_token(token.clone());
    install_trip(&mut vm, token);
    let r = exec(
        &mut vm,
        "local ok, e = pcall(function() trip() local i = 0 while true do i = i + 1 end end)
         return ok, e",
    )
    .unwrap();
    assert_bool(&r, 0, false);
    assert_eq!(r[1].display(&vm.strings).to_string(), "cancelled");
}

#[test]
fn test_cancel_interrupts_pending_await() {
    let mut vm = new_vm();
    let token = CancellationToken::new();
    vm.set_cancel_token(token.clone());
    install_hang(&mut vm, token);
    let err = run_async(&mut vm, "hang()").unwrap_err();
    assert!(err.root().is_cancelled(), "{err:?}");
}

#[test]
fn test_cancel_interrupts_recursion() {
    let mut vm = new_vm();
    let token = CancellationToken::new();
    vm.set_cancel_token(token.clone());
    install_trip(&mut vm, token);
    let err = exec(&mut vm, "local function f(n) if n == 100 then trip() end return f(n + 1) end f(0)").unwrap_err();
    assert_eq!(err, "cancelled");
}

#[test]
fn test_fresh_token_allows_new_calls() {
    let mut vm = new_vm();
    let token = CancellationToken::new();
    vm.set_cancel_token(token.clone());
    install_trip(&mut vm, token);
    assert!(exec(&mut vm, "trip() while true do end").is_err());
    vm.set_cancel_token(CancellationToken::new());
    let r = exec(&mut vm, "return 1 + 1").unwrap();
    assert_num(&r, 0, 2.0);
}
