//! `coroutine` library. `resume`, `yield` and the functions made by `wrap`
//! are intrinsics; the loop switches threads itself.

use crate::base_lib::vm_of;
use crate::vm::{ThreadStatus, Vm};
use moonlet_core::error::LuaError;
use moonlet_core::native::{native_value, register_fn, register_native, Intrinsic, NativeContext, NativeFunction};
use moonlet_core::value::{LuaValue, ThreadId};

pub fn open_coroutine(vm: &mut Vm) {
    let co = vm.heap.alloc_table(0, 8);
    register_fn(vm, co, "create", create);
    register_native(vm, co, NativeFunction::intrinsic("resume", Intrinsic::Resume));
    register_native(vm, co, NativeFunction::intrinsic("yield", Intrinsic::Yield));
    register_fn(vm, co, "status", status);
    register_fn(vm, co, "wrap", wrap);
    register_fn(vm, co, "isyieldable", isyieldable);
    register_fn(vm, co, "running", running);
    register_fn(vm, co, "close", close);
    vm.set_global("coroutine", LuaValue::Table(co));
}

fn create(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let f = ctx.check_function(0)?;
    let id = vm_of(ctx)?.create_thread(LuaValue::Function(f));
    Ok(ctx.ret(&[LuaValue::Thread(id)]))
}

fn wrap(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let f = ctx.check_function(0)?;
    let id = vm_of(ctx)?.create_thread(LuaValue::Function(f));
    let resume = NativeFunction::intrinsic("wrap", Intrinsic::WrapResume).with_upvalue(LuaValue::Thread(id));
    let value = native_value(ctx.rt, resume);
    Ok(ctx.ret(&[value]))
}

fn status(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let id = ctx.check_thread(0)?;
    let vm = vm_of(ctx)?;
    let name = if id == vm.current_thread_id() {
        ThreadStatus::Running.name()
    } else {
        vm.thread_status(id).unwrap_or(ThreadStatus::Dead).name()
    };
    ctx.push_str(name);
    Ok(1)
}

fn isyieldable(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let id = match ctx.arg(0) {
        LuaValue::Nil => ctx.thread(),
        _ => ctx.check_thread(0)?,
    };
    Ok(ctx.ret(&[LuaValue::Boolean(id != ThreadId::MAIN)]))
}

fn running(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let id = ctx.thread();
    Ok(ctx.ret(&[LuaValue::Thread(id), LuaValue::Boolean(id == ThreadId::MAIN)]))
}

fn close(ctx: &mut NativeContext<'_>) -> Result<usize, LuaError> {
    let id = ctx.check_thread(0)?;
    let vm = vm_of(ctx)?;
    let outcome = match vm.thread_status(id) {
        _ if id == vm.current_thread_id() => return Err(LuaError::runtime("cannot close a running coroutine")),
        Some(ThreadStatus::Running) => return Err(LuaError::runtime("cannot close a running coroutine")),
        Some(ThreadStatus::Normal) => return Err(LuaError::runtime("cannot close a normal coroutine")),
        Some(ThreadStatus::Suspended) => vm.close_thread(id),
        Some(ThreadStatus::Dead) | None => vm.thread_mut(id).and_then(|t| t.error.take()),
    };
    match outcome {
        None => Ok(ctx.ret(&[LuaValue::Boolean(true)])),
        Some(err) => Ok(ctx.ret(&[LuaValue::Boolean(false), err])),
    }
}

impl Vm {
    /// Kill a suspended coroutine: run its pending `__close` handlers and
    /// close its upvalues. Returns the error a handler raised, if any.
    pub(crate) fn close_thread(&mut self, id: ThreadId) -> Option<LuaValue> {
        let me = self.current;
        self.set_status(me, ThreadStatus::Normal);
        self.set_status(id, ThreadStatus::Running);
        self.switch_to(id);
        let mut error = None;
        while let Some(&slot) = self.tbc.last() {
            self.tbc.pop();
            let v = self.stack.get(slot).copied().unwrap_or(LuaValue::Nil);
            let h = self.metamethod(v, self.names.close);
            if h.is_nil() {
                continue;
            }
            let err = error.unwrap_or(LuaValue::Nil);
            if let Err(e) = self.call(h, &[v, err]) {
                error = Some(self.error_value(e));
            }
        }
        self.close_upvalues(0);
        self.frames.clear();
        self.switch_to(me);
        if let Some(t) = self.thread_mut(id) {
            t.status = ThreadStatus::Dead;
            t.stack = Vec::new();
            t.yield_to = None;
            t.error = None;
        }
        self.set_status(me, ThreadStatus::Running);
        tracing::trace!(thread = id.0, "coroutine closed");
        error
    }
}
