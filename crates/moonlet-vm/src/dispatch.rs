//! Main bytecode dispatch loop, calls, returns and error unwinding.

use crate::arith::{self, ArithResult};
use crate::callinfo::{Protect, RunEntry, MULTRET};
use crate::debug::Site;
use crate::vm::{PendingAwait, ResumeLink, RunExit, ThreadStatus, Vm};
use moonlet_compiler::chunk::{Chunk, Constant};
use moonlet_compiler::opcode::{MetaEvent, OpCode};
use moonlet_core::error::{FrameInfo, LuaError};
use moonlet_core::gc::{GcIdx, LuaClosure};
use moonlet_core::native::{AsyncCompletion, Intrinsic, NativeContext, NativeFn, NativeFunction, NativeFuture};
use moonlet_core::value::{LuaFunction, LuaValue, ThreadId};
use std::rc::Rc;

/// Nested `__call` handlers tolerated before giving up.
const MAX_CALL_CHAIN: usize = 100;

#[inline]
fn constant(chunk: &Chunk, idx: usize) -> LuaValue {
    match chunk.constants[idx] {
        Constant::Number(n) => LuaValue::Number(n),
        Constant::String(s) => LuaValue::String(s),
    }
}

fn binary_event(op: OpCode) -> MetaEvent {
    match op {
        OpCode::Add | OpCode::AddK => MetaEvent::Add,
        OpCode::Sub | OpCode::SubK => MetaEvent::Sub,
        OpCode::Mul | OpCode::MulK => MetaEvent::Mul,
        OpCode::Mod | OpCode::ModK => MetaEvent::Mod,
        OpCode::Pow | OpCode::PowK => MetaEvent::Pow,
        OpCode::Div | OpCode::DivK => MetaEvent::Div,
        OpCode::IDiv | OpCode::IDivK => MetaEvent::IDiv,
        OpCode::BAnd => MetaEvent::BAnd,
        OpCode::BOr => MetaEvent::BOr,
        OpCode::BXor => MetaEvent::BXor,
        OpCode::Shl => MetaEvent::Shl,
        _ => MetaEvent::Shr,
    }
}

#[inline]
fn check_cancel(vm: &Vm) -> Result<(), LuaError> {
    if vm.cancel.is_cancelled() {
        Err(LuaError::Cancelled)
    } else {
        Ok(())
    }
}

fn for_number(v: LuaValue, what: &str) -> Result<f64, LuaError> {
    match v {
        LuaValue::Number(n) => Ok(n),
        _ => Err(LuaError::runtime(format!("'for' {what} must be a number"))),
    }
}

#[inline]
fn num(v: LuaValue) -> f64 {
    v.as_number().unwrap_or(0.0)
}

/// Execute instructions until the entry frame returns, an async native
/// must be awaited, or an error escapes the running instruction.
pub(crate) fn execute(vm: &mut Vm, entry: &RunEntry) -> Result<RunExit, LuaError> {
    'frame: loop {
        let Some(fi) = vm.frames.len().checked_sub(1) else {
            return Err(LuaError::runtime("no active call frame"));
        };
        let base = vm.frames[fi].base;
        let closure = vm.frames[fi].closure;
        let chunk = vm.protos[vm.frames[fi].proto].chunk.clone();

        macro_rules! reg {
            ($r:expr) => {
                vm.stack[base + $r as usize]
            };
        }

        loop {
            let pc = vm.frames[fi].pc;
            let inst = chunk.code[pc];
            vm.frames[fi].pc = pc + 1;
            let a = inst.a() as usize;

            match inst.opcode() {
                OpCode::Move => reg!(a) = reg!(inst.b()),
                OpCode::LoadI => reg!(a) = LuaValue::Number(inst.sbx() as f64),
                OpCode::LoadK => reg!(a) = constant(&chunk, inst.bx() as usize),
                OpCode::LoadFalse => reg!(a) = LuaValue::Boolean(false),
                OpCode::LFalseSkip => {
                    reg!(a) = LuaValue::Boolean(false);
                    vm.frames[fi].pc += 1;
                }
                OpCode::LoadTrue => reg!(a) = LuaValue::Boolean(true),
                OpCode::LoadNil => {
                    for r in a..=a + inst.b() as usize {
                        reg!(r) = LuaValue::Nil;
                    }
                }

                OpCode::GetUpval => {
                    let uv = vm.heap.closure(closure).upvalues[inst.b() as usize];
                    reg!(a) = vm.upval_get(uv);
                }
                OpCode::SetUpval => {
                    let uv = vm.heap.closure(closure).upvalues[inst.b() as usize];
                    let v = reg!(a);
                    vm.upval_set(uv, v);
                }

                OpCode::GetTabUp => {
                    let uv = vm.heap.closure(closure).upvalues[inst.b() as usize];
                    let t = vm.upval_get(uv);
                    let key = constant(&chunk, inst.c() as usize);
                    reg!(a) = vm.index_value(t, key, Site::Upvalue(inst.b()))?;
                }
                OpCode::GetTable => {
                    let v = vm.index_value(reg!(inst.b()), reg!(inst.c()), Site::Register(inst.b()))?;
                    reg!(a) = v;
                }
                OpCode::GetI => {
                    let key = LuaValue::Number(inst.c() as f64);
                    let v = vm.index_value(reg!(inst.b()), key, Site::Register(inst.b()))?;
                    reg!(a) = v;
                }
                OpCode::GetField => {
                    let key = constant(&chunk, inst.c() as usize);
                    let v = vm.index_value(reg!(inst.b()), key, Site::Register(inst.b()))?;
                    reg!(a) = v;
                }

                OpCode::SetTabUp => {
                    let uv = vm.heap.closure(closure).upvalues[a];
                    let t = vm.upval_get(uv);
                    let key = constant(&chunk, inst.b() as usize);
                    let v = if inst.k() { constant(&chunk, inst.c() as usize) } else { reg!(inst.c()) };
                    vm.set_index_value(t, key, v, Site::Upvalue(inst.a()))?;
                }
                OpCode::SetTable | OpCode::SetI | OpCode::SetField => {
                    let key = match inst.opcode() {
                        OpCode::SetTable => reg!(inst.b()),
                        OpCode::SetI => LuaValue::Number(inst.b() as f64),
                        _ => constant(&chunk, inst.b() as usize),
                    };
                    let v = if inst.k() { constant(&chunk, inst.c() as usize) } else { reg!(inst.c()) };
                    vm.set_index_value(reg!(a), key, v, Site::Register(inst.a()))?;
                }

                OpCode::NewTable => {
                    let t = vm.heap.alloc_table(inst.c() as usize, inst.b() as usize);
                    reg!(a) = LuaValue::Table(t);
                    vm.maybe_collect();
                }

                OpCode::Self_ => {
                    let obj = reg!(inst.b());
                    let key = if inst.k() { constant(&chunk, inst.c() as usize) } else { reg!(inst.c()) };
                    reg!(a + 1) = obj;
                    reg!(a) = vm.index_value(obj, key, Site::Register(inst.b()))?;
                }

                OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Mod
                | OpCode::Pow
                | OpCode::Div
                | OpCode::IDiv
                | OpCode::BAnd
                | OpCode::BOr
                | OpCode::BXor
                | OpCode::Shl
                | OpCode::Shr => {
                    let event = binary_event(inst.opcode());
                    match arith::arith_op(event, reg!(inst.b()), reg!(inst.c()), &vm.strings) {
                        ArithResult::Ok(n) => {
                            reg!(a) = LuaValue::Number(n);
                            vm.frames[fi].pc += 1;
                        }
                        ArithResult::NeedMetamethod => {}
                        ArithResult::Error(e) => return Err(e),
                    }
                }
                OpCode::AddK
                | OpCode::SubK
                | OpCode::MulK
                | OpCode::ModK
                | OpCode::PowK
                | OpCode::DivK
                | OpCode::IDivK => {
                    let event = binary_event(inst.opcode());
                    let k = constant(&chunk, inst.c() as usize);
                    match arith::arith_op(event, reg!(inst.b()), k, &vm.strings) {
                        ArithResult::Ok(n) => {
                            reg!(a) = LuaValue::Number(n);
                            vm.frames[fi].pc += 1;
                        }
                        ArithResult::NeedMetamethod => {}
                        ArithResult::Error(e) => return Err(e),
                    }
                }
                OpCode::MMBin => {
                    let event = MetaEvent::from_u8(inst.c())
                        .ok_or_else(|| LuaError::runtime("invalid metamethod event"))?;
                    let dest = chunk.code[pc - 1].a();
                    let sites = (Site::Register(inst.a()), Site::Register(inst.b()));
                    let v = vm.arith_fallback(event, reg!(a), reg!(inst.b()), sites)?;
                    reg!(dest) = v;
                }
                OpCode::MMBinK => {
                    let event = MetaEvent::from_u8(inst.c())
                        .ok_or_else(|| LuaError::runtime("invalid metamethod event"))?;
                    let dest = chunk.code[pc - 1].a();
                    let k = constant(&chunk, inst.b() as usize);
                    let v = if inst.k() {
                        vm.arith_fallback(event, k, reg!(a), (Site::Unknown, Site::Register(inst.a())))?
                    } else {
                        vm.arith_fallback(event, reg!(a), k, (Site::Register(inst.a()), Site::Unknown))?
                    };
                    reg!(dest) = v;
                }

                OpCode::Unm => {
                    let v = vm.unary_minus(reg!(inst.b()), Site::Register(inst.b()))?;
                    reg!(a) = v;
                }
                OpCode::BNot => {
                    let v = vm.bitwise_not(reg!(inst.b()), Site::Register(inst.b()))?;
                    reg!(a) = v;
                }
                OpCode::Not => reg!(a) = LuaValue::Boolean(reg!(inst.b()).is_falsy()),
                OpCode::Len => {
                    let v = vm.length_of(reg!(inst.b()), Site::Register(inst.b()))?;
                    reg!(a) = v;
                }
                OpCode::Concat => {
                    let v = vm.concat_range(base + a, inst.b() as usize)?;
                    reg!(a) = v;
                    vm.maybe_collect();
                }

                OpCode::Close => {
                    vm.close_tbc(base + a)?;
                    vm.close_upvalues(base + a);
                }
                OpCode::Tbc => vm.mark_tbc(base + a, &chunk, inst.a(), pc)?,

                OpCode::Jmp => {
                    let offset = inst.get_sj();
                    vm.frames[fi].pc = (pc as i64 + 1 + offset as i64) as usize;
                    if offset < 0 {
                        check_cancel(vm)?;
                    }
                }

                OpCode::Eq => {
                    let equal = vm.equals(reg!(a), reg!(inst.b()))?;
                    if equal != inst.k() {
                        vm.frames[fi].pc += 1;
                    }
                }
                OpCode::Lt => {
                    let less = vm.less_than_values(reg!(a), reg!(inst.b()))?;
                    if less != inst.k() {
                        vm.frames[fi].pc += 1;
                    }
                }
                OpCode::Le => {
                    let less_eq = vm.less_equal_values(reg!(a), reg!(inst.b()))?;
                    if less_eq != inst.k() {
                        vm.frames[fi].pc += 1;
                    }
                }
                OpCode::EqK => {
                    let equal = reg!(a) == constant(&chunk, inst.b() as usize);
                    if equal != inst.k() {
                        vm.frames[fi].pc += 1;
                    }
                }
                OpCode::Test => {
                    if reg!(a).is_truthy() != inst.k() {
                        vm.frames[fi].pc += 1;
                    }
                }
                OpCode::TestSet => {
                    let v = reg!(inst.b());
                    if v.is_truthy() == inst.k() {
                        reg!(a) = v;
                    } else {
                        vm.frames[fi].pc += 1;
                    }
                }

                OpCode::Call => {
                    let func = base + a;
                    let b = inst.b() as usize;
                    let nargs = if b == 0 { vm.frames[fi].top - func - 1 } else { b - 1 };
                    check_cancel(vm)?;
                    let site = Site::Register(inst.a());
                    if let Some(exit) = vm.call_at(func, nargs, inst.c() as i32 - 1, entry, site)? {
                        return Ok(exit);
                    }
                    continue 'frame;
                }
                OpCode::TailCall => {
                    let func = base + a;
                    let b = inst.b() as usize;
                    let nargs = if b == 0 { vm.frames[fi].top - func - 1 } else { b - 1 };
                    check_cancel(vm)?;
                    vm.close_upvalues(base);
                    if let LuaValue::Function(LuaFunction::Lua(callee)) = vm.stack[func] {
                        vm.tail_call(callee, func, nargs)?;
                    } else if let Some(exit) =
                        vm.call_at(func, nargs, MULTRET, entry, Site::Register(inst.a()))?
                    {
                        return Ok(exit);
                    }
                    continue 'frame;
                }

                OpCode::Return => {
                    let first = base + a;
                    let b = inst.b() as usize;
                    let n = if b == 0 { vm.frames[fi].top - first } else { b - 1 };
                    if let Some(exit) = vm.return_from(first, n)? {
                        return Ok(exit);
                    }
                    continue 'frame;
                }
                OpCode::Return0 => {
                    if let Some(exit) = vm.return_from(base, 0)? {
                        return Ok(exit);
                    }
                    continue 'frame;
                }
                OpCode::Return1 => {
                    if let Some(exit) = vm.return_from(base + a, 1)? {
                        return Ok(exit);
                    }
                    continue 'frame;
                }

                OpCode::ForPrep => {
                    let init = for_number(reg!(a), "initial value")?;
                    let limit = for_number(reg!(a + 1), "limit")?;
                    let step = for_number(reg!(a + 2), "step")?;
                    if step == 0.0 {
                        return Err(LuaError::runtime("'for' step is zero"));
                    }
                    let enter = if step > 0.0 { init <= limit } else { init >= limit };
                    if enter {
                        reg!(a + 3) = LuaValue::Number(init);
                    } else {
                        vm.frames[fi].pc += inst.bx() as usize + 1;
                    }
                }
                OpCode::ForLoop => {
                    let step = num(reg!(a + 2));
                    let next = num(reg!(a)) + step;
                    let limit = num(reg!(a + 1));
                    let again = if step > 0.0 { next <= limit } else { next >= limit };
                    if again {
                        reg!(a) = LuaValue::Number(next);
                        reg!(a + 3) = LuaValue::Number(next);
                        vm.frames[fi].pc -= inst.bx() as usize;
                        check_cancel(vm)?;
                    }
                }

                OpCode::TForPrep => {
                    vm.mark_tbc(base + a + 3, &chunk, inst.a() + 3, pc)?;
                    vm.frames[fi].pc += inst.bx() as usize;
                }
                OpCode::TForCall => {
                    let cb = base + a + 4;
                    vm.ensure_stack(cb + 4);
                    vm.stack.copy_within(base + a..base + a + 3, cb);
                    check_cancel(vm)?;
                    if let Some(exit) = vm.call_at(cb, 2, inst.c() as i32, entry, Site::ForIterator)? {
                        return Ok(exit);
                    }
                    continue 'frame;
                }
                OpCode::TForLoop => {
                    let control = reg!(a + 4);
                    if !control.is_nil() {
                        reg!(a + 2) = control;
                        vm.frames[fi].pc -= inst.bx() as usize;
                        check_cancel(vm)?;
                    }
                }

                OpCode::SetList => {
                    let b = inst.b() as usize;
                    let n = if b == 0 { vm.frames[fi].top - (base + a) - 1 } else { b };
                    let stored = if inst.k() {
                        let extra = chunk.code[pc + 1].ax_field() as usize;
                        vm.frames[fi].pc += 1;
                        extra
                    } else {
                        inst.c() as usize
                    };
                    let LuaValue::Table(t) = reg!(a) else {
                        return Err(LuaError::runtime("table constructor target is not a table"));
                    };
                    for i in 1..=n {
                        let v = reg!(a + i);
                        vm.heap.table_mut(t).set_int((stored + i) as i64, v);
                    }
                }

                OpCode::Closure => {
                    let v = vm.make_closure(fi, inst.bx() as usize);
                    reg!(a) = v;
                    vm.maybe_collect();
                }

                OpCode::VarArg => {
                    let frame = &vm.frames[fi];
                    let (start, available) = (frame.varargs, frame.num_varargs);
                    let c = inst.c() as usize;
                    let wanted = if c == 0 { available } else { c - 1 };
                    let dest = base + a;
                    vm.ensure_stack(dest + wanted + 1);
                    for i in 0..wanted {
                        vm.stack[dest + i] = if i < available { vm.stack[start + i] } else { LuaValue::Nil };
                    }
                    if c == 0 {
                        vm.frames[fi].top = dest + wanted;
                    }
                }
                OpCode::VarArgPrep | OpCode::ExtraArg => {}
            }
        }
    }
}

impl Vm {
    /// Instantiate child prototype `idx` of frame `fi`.
    fn make_closure(&mut self, fi: usize, idx: usize) -> LuaValue {
        let frame = &self.frames[fi];
        let (proto, base, parent) = (frame.proto, frame.base, frame.closure);
        let child = self.protos[proto].children[idx];
        let descs = self.protos[child].chunk.upvalues.clone();
        let upvalues = descs
            .iter()
            .map(|d| {
                if d.in_stack {
                    self.find_upval(base + d.index as usize)
                } else {
                    self.heap.closure(parent).upvalues[d.index as usize]
                }
            })
            .collect();
        LuaValue::Function(LuaFunction::Lua(self.heap.alloc_closure(child, upvalues)))
    }

    /// Register a to-be-closed variable held in `slot`.
    fn mark_tbc(&mut self, slot: usize, chunk: &Chunk, reg: u8, pc: usize) -> Result<(), LuaError> {
        let v = self.stack[slot];
        if v.is_falsy() {
            return Ok(());
        }
        if self.metamethod(v, self.names.close).is_nil() {
            let name = chunk
                .local_name(reg, pc + 1)
                .map_or_else(|| "?".to_string(), |n| self.strings.get_lossy(n).into_owned());
            return Err(LuaError::runtime(format!("variable '{name}' got a non-closable value")));
        }
        self.tbc.push(slot);
        Ok(())
    }

    /// Run `__close(v, nil)` for pending variables at or above `level`.
    pub(crate) fn close_tbc(&mut self, level: usize) -> Result<(), LuaError> {
        while let Some(&slot) = self.tbc.last() {
            if slot < level {
                break;
            }
            self.tbc.pop();
            let v = self.stack[slot];
            let h = self.metamethod(v, self.names.close);
            if !h.is_nil() {
                self.call(h, &[v, LuaValue::Nil])?;
            }
        }
        Ok(())
    }

    /// Close pending variables while an error propagates. An error raised
    /// by a handler replaces the one being propagated.
    pub(crate) fn close_tbc_with_error(&mut self, level: usize, mut err: LuaValue) -> LuaValue {
        while let Some(&slot) = self.tbc.last() {
            if slot < level {
                break;
            }
            self.tbc.pop();
            let v = self.stack.get(slot).copied().unwrap_or(LuaValue::Nil);
            let h = self.metamethod(v, self.names.close);
            if h.is_nil() {
                continue;
            }
            if let Err(e) = self.call(h, &[v, err]) {
                err = self.error_value(e);
            }
        }
        err
    }

    /// Replace the running frame with a call to `callee`.
    fn tail_call(&mut self, callee: GcIdx<LuaClosure>, func: usize, nargs: usize) -> Result<(), LuaError> {
        let Some(frame) = self.frames.pop() else {
            return Err(LuaError::runtime("no active call frame"));
        };
        self.stack.copy_within(func..func + 1 + nargs, frame.func);
        self.push_lua_frame(callee, frame.func, nargs, frame.num_results)?;
        if let Some(new) = self.frames.last_mut() {
            new.protect = frame.protect;
            new.is_entry = frame.is_entry;
            new.tail_calls = frame.tail_calls + 1;
        }
        Ok(())
    }

    /// Call the value at `func`. Lua callees get a new frame; natives run to
    /// completion and their results are placed at `func`.
    pub(crate) fn call_at(
        &mut self,
        func: usize,
        mut nargs: usize,
        nresults: i32,
        entry: &RunEntry,
        mut site: Site,
    ) -> Result<Option<RunExit>, LuaError> {
        for _ in 0..MAX_CALL_CHAIN {
            match self.stack[func] {
                LuaValue::Function(LuaFunction::Lua(c)) => {
                    self.push_lua_frame(c, func, nargs, nresults)?;
                    return Ok(None);
                }
                LuaValue::Function(LuaFunction::Native(n)) => {
                    return self.call_native(n, func, nargs, nresults, entry);
                }
                callee => {
                    let h = self.metamethod(callee, self.names.call);
                    if h.is_nil() {
                        return Err(self.type_error("call", callee, site));
                    }
                    self.ensure_stack(func + nargs + 2);
                    self.stack.copy_within(func..func + 1 + nargs, func + 1);
                    self.stack[func] = h;
                    nargs += 1;
                    site = Site::Unknown;
                }
            }
        }
        Err(LuaError::runtime("'__call' chain too long; possible loop"))
    }

    fn call_native(
        &mut self,
        n: GcIdx<NativeFunction>,
        func: usize,
        nargs: usize,
        nresults: i32,
        entry: &RunEntry,
    ) -> Result<Option<RunExit>, LuaError> {
        let native = self.heap.native(n);
        let (name, kind, upvalue) = (native.name.clone(), native.func.clone(), native.upvalue);
        match kind {
            NativeFn::Sync(f) => {
                let args = self.stack[func + 1..func + 1 + nargs].to_vec();
                let mut out = Vec::new();
                self.last_native = Some(name.clone());
                let cancel = self.cancel.clone();
                let count = {
                    let mut ctx = NativeContext::new(self, &args, &mut out, name, upvalue, cancel);
                    f(&mut ctx)?
                };
                self.last_native = None;
                self.place_results(func, nresults, &out[..count.min(out.len())]);
                self.maybe_collect();
                Ok(None)
            }
            NativeFn::Async(f) => {
                let args = self.stack[func + 1..func + 1 + nargs].to_vec();
                let mut out = Vec::new();
                self.last_native = Some(name.clone());
                let cancel = self.cancel.clone();
                let future = {
                    let mut ctx = NativeContext::new(self, &args, &mut out, name.clone(), upvalue, cancel);
                    f(&mut ctx)?
                };
                if entry.can_await {
                    tracing::trace!(native = %name, "suspending on async native");
                    return Ok(Some(RunExit::Await(PendingAwait {
                        future,
                        func,
                        num_results: nresults,
                        name,
                        upvalue,
                    })));
                }
                let completion = self.block_on_native(future, &name)?;
                self.complete_async(completion, func, nresults, name, upvalue)?;
                Ok(None)
            }
            NativeFn::Intrinsic(which) => {
                self.call_intrinsic(which, func, nargs, nresults, entry, upvalue)?;
                Ok(None)
            }
        }
    }

    /// Drive an async native from a context that cannot suspend.
    fn block_on_native(
        &self,
        future: NativeFuture,
        name: &str,
    ) -> Result<AsyncCompletion, LuaError> {
        use futures::future::{select, Either, FutureExt};

        match futures::executor::enter() {
            Ok(guard) => {
                drop(guard);
                let cancelled = self.cancel.cancelled();
                match futures::executor::block_on(select(future, cancelled)) {
                    Either::Left((result, _)) => result,
                    Either::Right(_) => Err(LuaError::Cancelled),
                }
            }
            Err(_) => future.now_or_never().unwrap_or_else(|| {
                Err(LuaError::runtime(format!(
                    "attempt to await '{name}' across a C-call boundary"
                )))
            }),
        }
    }

    /// Run an async native's completion and place its results at `func`.
    pub(crate) fn complete_async(
        &mut self,
        completion: AsyncCompletion,
        func: usize,
        nresults: i32,
        name: Rc<str>,
        upvalue: LuaValue,
    ) -> Result<(), LuaError> {
        let mut out = Vec::new();
        self.last_native = Some(name.clone());
        let cancel = self.cancel.clone();
        let count = {
            let mut ctx = NativeContext::new(self, &[], &mut out, name, upvalue, cancel);
            completion(&mut ctx)?
        };
        self.last_native = None;
        self.place_results(func, nresults, &out[..count.min(out.len())]);
        Ok(())
    }

    fn call_intrinsic(
        &mut self,
        which: Intrinsic,
        func: usize,
        nargs: usize,
        nresults: i32,
        entry: &RunEntry,
        upvalue: LuaValue,
    ) -> Result<(), LuaError> {
        match which {
            Intrinsic::Pcall => {
                if nargs == 0 {
                    return Err(LuaError::bad_argument(1, "pcall", "value expected"));
                }
                self.protected_call(func, nargs, nresults, LuaValue::Nil)
            }
            Intrinsic::Xpcall => {
                if nargs < 2 {
                    return Err(LuaError::bad_argument(2, "xpcall", "value expected"));
                }
                let handler = self.stack[func + 2];
                self.stack.copy_within(func + 3..func + 1 + nargs, func + 2);
                self.protected_call(func, nargs - 1, nresults, handler)
            }
            Intrinsic::Resume => {
                let first = self.stack.get(func + 1).copied().unwrap_or(LuaValue::Nil);
                let target = match (nargs, first) {
                    (1.., LuaValue::Thread(t)) => t,
                    (0, _) => return Err(LuaError::bad_argument(1, "resume", "thread expected, got no value")),
                    (_, v) => {
                        let msg = format!("thread expected, got {}", self.type_name_of(v));
                        return Err(LuaError::bad_argument(1, "resume", msg));
                    }
                };
                self.resume(target, func, func + 2, nargs - 1, nresults, false)
            }
            Intrinsic::WrapResume => {
                let LuaValue::Thread(target) = upvalue else {
                    return Err(LuaError::runtime("wrapped coroutine is missing its thread"));
                };
                self.resume(target, func, func + 1, nargs, nresults, true)
            }
            Intrinsic::Yield => self.yield_values(func, nargs, nresults, entry),
        }
    }

    /// Start `stack[func+1](stack[func+2..])` under an error boundary.
    fn protected_call(&mut self, func: usize, nargs: usize, nresults: i32, handler: LuaValue) -> Result<(), LuaError> {
        let inner = if nresults == MULTRET { MULTRET } else { (nresults - 1).max(0) };
        let f_slot = func + 1;
        let pushed = match self.stack[f_slot] {
            LuaValue::Function(LuaFunction::Lua(c)) => self.push_lua_frame(c, f_slot, nargs - 1, inner),
            _ => {
                self.ensure_stack(f_slot + nargs + 2);
                self.stack.copy_within(f_slot..f_slot + nargs, f_slot + 1);
                self.stack[f_slot] = self.trampoline_value();
                self.push_lua_frame(self.trampoline, f_slot, nargs, inner)
            }
        };
        if let Err(e) = pushed {
            let v = self.positioned_error(&e);
            self.place_results(func, nresults, &[LuaValue::Boolean(false), v]);
            return Ok(());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.protect = Some(Protect {
                handler,
                num_results: nresults,
            });
        }
        Ok(())
    }

    /// Return `n` values starting at `first` from the running frame.
    pub(crate) fn return_from(&mut self, first: usize, n: usize) -> Result<Option<RunExit>, LuaError> {
        let base = self.frames.last().map_or(0, |f| f.base);
        if self.tbc.last().is_some_and(|&s| s >= base) {
            let saved = self.stack[first..first + n].to_vec();
            self.close_tbc(base)?;
            self.stack[first..first + n].copy_from_slice(&saved);
        }
        self.close_upvalues(base);
        let Some(frame) = self.frames.pop() else {
            return Err(LuaError::runtime("no active call frame"));
        };
        let (dest, wanted, count) = match frame.protect {
            Some(p) => {
                self.ensure_stack(frame.func + n + 1);
                self.stack.copy_within(first..first + n, frame.func);
                self.stack[frame.func - 1] = LuaValue::Boolean(true);
                (frame.func - 1, p.num_results, n + 1)
            }
            None => {
                self.stack.copy_within(first..first + n, frame.func);
                (frame.func, frame.num_results, n)
            }
        };
        if frame.is_entry {
            return Ok(Some(RunExit::Returned { start: dest, count }));
        }
        if self.frames.is_empty() {
            self.finish_coroutine(dest, count)?;
            return Ok(None);
        }
        if wanted == MULTRET {
            if let Some(caller) = self.frames.last_mut() {
                caller.top = dest + count;
            }
        } else {
            let wanted = wanted as usize;
            self.ensure_stack(dest + wanted + 1);
            for slot in &mut self.stack[dest + count.min(wanted)..dest + wanted] {
                *slot = LuaValue::Nil;
            }
        }
        Ok(None)
    }

    // ---- Coroutines ----

    fn deliver(&mut self, link: ResumeLink, values: &[LuaValue]) {
        if link.wrap {
            self.place_results(link.dest, link.wanted, values);
        } else {
            let mut with_status = Vec::with_capacity(values.len() + 1);
            with_status.push(LuaValue::Boolean(true));
            with_status.extend_from_slice(values);
            self.place_results(link.dest, link.wanted, &with_status);
        }
    }

    fn resume(
        &mut self,
        target: ThreadId,
        dest: usize,
        args_start: usize,
        nargs: usize,
        wanted: i32,
        wrap: bool,
    ) -> Result<(), LuaError> {
        let problem = match self.thread_status(target) {
            _ if target == self.current => Some("cannot resume non-suspended coroutine"),
            Some(ThreadStatus::Suspended) => None,
            Some(ThreadStatus::Running | ThreadStatus::Normal) => Some("cannot resume non-suspended coroutine"),
            Some(ThreadStatus::Dead) | None => Some("cannot resume dead coroutine"),
        };
        if let Some(msg) = problem {
            if wrap {
                return Err(LuaError::runtime(msg));
            }
            let msg = LuaValue::String(self.strings.intern_str(msg));
            self.place_results(dest, wanted, &[LuaValue::Boolean(false), msg]);
            return Ok(());
        }

        let args = self.stack[args_start..args_start + nargs].to_vec();
        let me = self.current;
        self.set_status(me, ThreadStatus::Normal);
        if let Some(t) = self.thread_mut(target) {
            t.status = ThreadStatus::Running;
            t.resume_to = Some(ResumeLink {
                thread: me,
                dest,
                wanted,
                wrap,
            });
        }
        self.switch_to(target);
        tracing::trace!(thread = target.0, nargs, "resume");

        match self.thread_mut(target).and_then(|t| t.yield_to.take()) {
            Some((slot, count)) => self.place_results(slot, count, &args),
            None => {
                let body = self.thread(target).map_or(LuaValue::Nil, |t| t.body);
                self.ensure_stack(nargs + 2);
                if let LuaValue::Function(LuaFunction::Lua(c)) = body {
                    self.stack[0] = body;
                    self.stack[1..1 + nargs].copy_from_slice(&args);
                    self.push_lua_frame(c, 0, nargs, MULTRET)?;
                } else {
                    self.stack[0] = self.trampoline_value();
                    self.stack[1] = body;
                    self.stack[2..2 + nargs].copy_from_slice(&args);
                    self.push_lua_frame(self.trampoline, 0, nargs + 1, MULTRET)?;
                }
            }
        }
        Ok(())
    }

    fn yield_values(&mut self, func: usize, nargs: usize, wanted: i32, entry: &RunEntry) -> Result<(), LuaError> {
        if self.current == ThreadId::MAIN {
            return Err(LuaError::runtime("attempt to yield from outside a coroutine"));
        }
        if self.current == entry.thread {
            return Err(LuaError::runtime("attempt to yield across a C-call boundary"));
        }
        let values = self.stack[func + 1..func + 1 + nargs].to_vec();
        let co = self.current;
        let link = self.thread_mut(co).and_then(|t| {
            t.status = ThreadStatus::Suspended;
            t.yield_to = Some((func, wanted));
            t.resume_to.take()
        });
        let Some(link) = link else {
            return Err(LuaError::runtime("coroutine has no resumer"));
        };
        self.switch_to(link.thread);
        self.set_status(link.thread, ThreadStatus::Running);
        tracing::trace!(thread = co.0, nvalues = values.len(), "yield");
        self.deliver(link, &values);
        Ok(())
    }

    /// The body of the running coroutine returned.
    fn finish_coroutine(&mut self, start: usize, count: usize) -> Result<(), LuaError> {
        let values = self.stack[start..start + count].to_vec();
        let co = self.current;
        let link = self.thread_mut(co).and_then(|t| {
            t.status = ThreadStatus::Dead;
            t.resume_to.take()
        });
        let Some(link) = link else {
            return Err(LuaError::runtime("coroutine has no resumer"));
        };
        self.switch_to(link.thread);
        if let Some(t) = self.thread_mut(co) {
            t.stack = Vec::new();
            t.tbc.clear();
        }
        self.set_status(link.thread, ThreadStatus::Running);
        tracing::trace!(thread = co.0, "coroutine finished");
        self.deliver(link, &values);
        Ok(())
    }

    // ---- Errors ----

    /// Error value as Lua sees it, with the raising position prepended to
    /// plain messages.
    pub(crate) fn positioned_error(&mut self, e: &LuaError) -> LuaValue {
        match e.root() {
            LuaError::Value(v) => *v,
            LuaError::Cancelled => LuaValue::String(self.strings.intern_str("cancelled")),
            other => {
                let text = format!("{}{}", self.where_at(1), other);
                LuaValue::String(self.strings.intern_str(&text))
            }
        }
    }

    /// Hand an error to the innermost protected frame within reach of this
    /// run. Returns `Err` when the error leaves the run.
    pub(crate) fn unwind(&mut self, e: LuaError, entry: &RunEntry) -> Result<(), LuaError> {
        let mut error = e;
        loop {
            let mut value = self.positioned_error(&error);
            let floor = if self.current == entry.thread { entry.depth } else { 0 };
            let protected = (floor..self.frames.len())
                .rev()
                .find_map(|i| self.frames[i].protect.map(|p| (i, p)));

            if let Some((pi, protect)) = protected {
                if !protect.handler.is_nil() {
                    value = match self.call(protect.handler, &[value]) {
                        Ok(results) => results.first().copied().unwrap_or(LuaValue::Nil),
                        Err(e) => self.error_value(e),
                    };
                }
                let func = self.frames[pi].func;
                self.close_upvalues(func);
                value = self.close_tbc_with_error(func, value);
                self.frames.truncate(pi);
                self.last_native = None;
                self.place_results(func - 1, protect.num_results, &[LuaValue::Boolean(false), value]);
                return Ok(());
            }

            if self.current == entry.thread {
                let level = self.frames.get(entry.depth).map_or(0, |f| f.func);
                let traceback = match error.traceback() {
                    Some(tb) => tb.clone(),
                    None => {
                        let mut tb = self.traceback_frames();
                        if let Some(name) = self.last_native.take() {
                            tb.frames.insert(
                                0,
                                FrameInfo {
                                    function: format!("function '{name}'"),
                                    source: "[builtin]".to_string(),
                                    line: None,
                                },
                            );
                        }
                        tb
                    }
                };
                self.close_upvalues(level);
                let closed = self.close_tbc_with_error(level, value);
                self.frames.truncate(entry.depth);
                self.last_native = None;
                let replaced = closed != value;
                let root = match error.into_root() {
                    LuaError::Cancelled if !replaced => LuaError::Cancelled,
                    e @ LuaError::ModuleNotFound { .. } if !replaced => e,
                    _ => LuaError::Value(closed),
                };
                tracing::debug!(error = %root, "error left the interpreter");
                return Err(LuaError::Traced {
                    error: Box::new(root),
                    traceback,
                });
            }

            // No handler on this coroutine: it dies and the resumer sees
            // the error.
            let co = self.current;
            self.close_upvalues(0);
            value = self.close_tbc_with_error(0, value);
            self.frames.clear();
            let link = self.thread_mut(co).and_then(|t| {
                t.status = ThreadStatus::Dead;
                t.error = Some(value);
                t.resume_to.take()
            });
            let Some(link) = link else {
                return Err(LuaError::Value(value));
            };
            self.switch_to(link.thread);
            if let Some(t) = self.thread_mut(co) {
                t.stack = Vec::new();
            }
            self.set_status(link.thread, ThreadStatus::Running);
            tracing::debug!(thread = co.0, "coroutine died with an error");
            if !link.wrap {
                self.last_native = None;
                self.place_results(link.dest, link.wanted, &[LuaValue::Boolean(false), value]);
                return Ok(());
            }
            error = match value {
                LuaValue::String(s) => {
                    let text = format!("{}{}", self.where_at(1), self.strings.get_lossy(s));
                    LuaError::Value(LuaValue::String(self.strings.intern_str(&text)))
                }
                other => LuaError::Value(other),
            };
        }
    }
}
