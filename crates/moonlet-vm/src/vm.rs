//! Lua VM state.

use crate::callinfo::{CallFrame, RunEntry, MULTRET};
use crate::loader::ModuleLoader;
use crate::metamethod::MetaNames;
use moonlet_compiler::chunk::Chunk;
use moonlet_compiler::opcode::{Instruction, OpCode};
use moonlet_compiler::token::Span;
use moonlet_compiler::CompileError;
use moonlet_core::error::{LuaError, Traceback};
use moonlet_core::gc::{GcIdx, Heap, LuaClosure, UpVal};
use moonlet_core::native::{CancellationToken, NativeFuture, Runtime};
use moonlet_core::string::{StringId, StringInterner};
use moonlet_core::table::LuaTable;
use moonlet_core::value::{LuaFunction, LuaValue, ThreadId};
use std::any::Any;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Limits and tuning knobs.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Lua frames per thread before "stack overflow".
    pub max_call_depth: usize,
    /// Nested interpreter loops (natives calling back into Lua).
    pub max_native_depth: usize,
    /// Allocations between automatic collections.
    pub gc_threshold: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 200_000,
            max_native_depth: 100,
            gc_threshold: 20_000,
        }
    }
}

/// Coroutine lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Created or yielded; ready to be resumed.
    Suspended,
    Running,
    /// Resumed another coroutine and waits for it.
    Normal,
    /// Returned or failed.
    Dead,
}

impl ThreadStatus {
    pub fn name(self) -> &'static str {
        match self {
            ThreadStatus::Suspended => "suspended",
            ThreadStatus::Running => "running",
            ThreadStatus::Normal => "normal",
            ThreadStatus::Dead => "dead",
        }
    }
}

/// Where a coroutine delivers values when it yields, returns or fails.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResumeLink {
    pub thread: ThreadId,
    /// Slot of the resuming call in the resumer's stack.
    pub dest: usize,
    pub wanted: i32,
    /// Resumed through a `coroutine.wrap` function: no status value and
    /// errors propagate.
    pub wrap: bool,
}

/// Saved state of a thread. The running thread's stack, frames and upvalue
/// list live in the [`Vm`] itself and are swapped in and out on resume and
/// yield; its entry here keeps only the status and links.
pub(crate) struct LuaThread {
    pub status: ThreadStatus,
    pub stack: Vec<LuaValue>,
    pub frames: Vec<CallFrame>,
    /// Open upvalues sorted by slot.
    pub open_upvals: Vec<(usize, GcIdx<UpVal>)>,
    /// Slots of pending to-be-closed variables, innermost last.
    pub tbc: Vec<usize>,
    pub resume_to: Option<ResumeLink>,
    /// Slot and wanted count of the pending `yield` call.
    pub yield_to: Option<(usize, i32)>,
    /// Function the coroutine runs.
    pub body: LuaValue,
    /// Error value that killed the coroutine.
    pub error: Option<LuaValue>,
}

impl LuaThread {
    pub fn new(body: LuaValue, status: ThreadStatus) -> Self {
        LuaThread {
            status,
            stack: Vec::new(),
            frames: Vec::new(),
            open_upvals: Vec::new(),
            tbc: Vec::new(),
            resume_to: None,
            yield_to: None,
            body,
            error: None,
        }
    }
}

/// A loaded prototype and the registry indices of its nested functions.
pub(crate) struct ProtoEntry {
    pub chunk: Rc<Chunk>,
    pub children: Vec<usize>,
}

/// An async native call suspended on the outermost loop.
pub(crate) struct PendingAwait {
    pub future: NativeFuture,
    pub func: usize,
    pub num_results: i32,
    pub name: Rc<str>,
    pub upvalue: LuaValue,
}

pub(crate) enum RunExit {
    /// The entry frame returned `count` values starting at `start`.
    Returned { start: usize, count: usize },
    Await(PendingAwait),
}

/// Shared in-memory sink for `print` and `io.write`.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Rc<RefCell<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// The Lua virtual machine.
///
/// `stack`, `frames`, `open_upvals` and `tbc` always belong to the running
/// thread (`current`). Resuming a coroutine swaps them with the target's
/// saved state; yielding or returning swaps them back.
pub struct Vm {
    pub(crate) stack: Vec<LuaValue>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) open_upvals: Vec<(usize, GcIdx<UpVal>)>,
    pub(crate) tbc: Vec<usize>,
    pub(crate) threads: Vec<Option<LuaThread>>,
    pub(crate) current: ThreadId,
    pub heap: Heap,
    pub strings: StringInterner,
    pub(crate) protos: Vec<ProtoEntry>,
    pub(crate) globals: GcIdx<LuaTable>,
    pub(crate) registry: GcIdx<LuaTable>,
    /// `package.loaded`.
    pub(crate) loaded: GcIdx<LuaTable>,
    pub(crate) string_mt: Option<GcIdx<LuaTable>>,
    pub(crate) names: MetaNames,
    /// Prototype of the function that forwards a call to a non-Lua callee,
    /// so every call made through an entry point has a Lua frame.
    pub(crate) trampoline_proto: usize,
    pub(crate) trampoline: GcIdx<LuaClosure>,
    pub(crate) cancel: CancellationToken,
    pub(crate) config: VmConfig,
    /// Nested interpreter loops currently active.
    pub(crate) run_depth: usize,
    pub(crate) gc_requested: bool,
    pub(crate) gc_stopped: bool,
    pub(crate) strings_at_last_gc: usize,
    /// Native that raised the error being unwound.
    pub(crate) last_native: Option<Rc<str>>,
    pub(crate) loaders: Vec<Rc<dyn ModuleLoader>>,
    pub(crate) stdout: Box<dyn Write>,
}

fn trampoline_chunk() -> Chunk {
    let mut chunk = Chunk::new("[builtin]".into());
    chunk.is_vararg = true;
    chunk.line_defined = 1;
    chunk.last_line = 1;
    chunk.name = Some("?".to_string());
    let span = Span::NONE;
    chunk.emit(Instruction::abc(OpCode::VarArgPrep, 0, 0, 0, false), span);
    chunk.emit(Instruction::abc(OpCode::VarArg, 0, 0, 0, false), span);
    chunk.emit(Instruction::abc(OpCode::Call, 0, 0, 0, false), span);
    chunk.emit(Instruction::abc(OpCode::Return, 0, 0, 0, false), span);
    chunk
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        let mut heap = Heap::new();
        let mut strings = StringInterner::new();
        let names = MetaNames::init(&mut strings);
        let globals = heap.alloc_table(0, 64);
        let registry = heap.alloc_table(0, 4);
        let loaded = heap.alloc_table(0, 16);
        let loaded_key = strings.intern(b"_LOADED");
        heap.table_mut(registry).set_str(loaded_key, LuaValue::Table(loaded));
        let protos = vec![ProtoEntry {
            chunk: Rc::new(trampoline_chunk()),
            children: Vec::new(),
        }];
        let trampoline = heap.alloc_closure(0, Vec::new());
        let strings_at_last_gc = strings.len();
        Vm {
            stack: Vec::with_capacity(256),
            frames: Vec::new(),
            open_upvals: Vec::new(),
            tbc: Vec::new(),
            threads: vec![Some(LuaThread::new(LuaValue::Nil, ThreadStatus::Running))],
            current: ThreadId::MAIN,
            heap,
            strings,
            protos,
            globals,
            registry,
            loaded,
            string_mt: None,
            names,
            trampoline_proto: 0,
            trampoline,
            cancel: CancellationToken::new(),
            config,
            run_depth: 0,
            gc_requested: false,
            gc_stopped: false,
            strings_at_last_gc,
            last_native: None,
            loaders: Vec::new(),
            stdout: Box::new(std::io::stdout()),
        }
    }

    pub(crate) fn trampoline_value(&self) -> LuaValue {
        LuaValue::Function(LuaFunction::Lua(self.trampoline))
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn globals_table(&self) -> GcIdx<LuaTable> {
        self.globals
    }

    pub fn registry_table(&self) -> GcIdx<LuaTable> {
        self.registry
    }

    /// `package.loaded`.
    pub fn loaded_table(&self) -> GcIdx<LuaTable> {
        self.loaded
    }

    pub fn set_stdout(&mut self, out: Box<dyn Write>) {
        self.stdout = out;
    }

    pub fn set_cancel_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn add_module_loader(&mut self, loader: Rc<dyn ModuleLoader>) {
        self.loaders.push(loader);
    }

    /// Compile source text with this VM's string interner.
    pub fn compile(&mut self, source: &[u8], chunk_name: &str) -> Result<Rc<Chunk>, CompileError> {
        moonlet_compiler::compile(source, chunk_name, &mut self.strings)
    }

    fn register_proto(&mut self, chunk: Rc<Chunk>) -> usize {
        let idx = self.protos.len();
        self.protos.push(ProtoEntry {
            chunk: chunk.clone(),
            children: Vec::new(),
        });
        let children = chunk
            .children
            .iter()
            .map(|c| self.register_proto(c.clone()))
            .collect();
        self.protos[idx].children = children;
        idx
    }

    /// Instantiate a main chunk as a closure whose `_ENV` is the globals.
    pub fn load(&mut self, chunk: Rc<Chunk>) -> LuaValue {
        self.load_with_env(chunk, LuaValue::Table(self.globals))
    }

    /// Instantiate a main chunk with a custom `_ENV`.
    pub fn load_with_env(&mut self, chunk: Rc<Chunk>, env: LuaValue) -> LuaValue {
        let num_upvalues = chunk.upvalues.len();
        let proto = self.register_proto(chunk);
        let upvalues = (0..num_upvalues)
            .map(|i| {
                let v = if i == 0 { env } else { LuaValue::Nil };
                self.heap.alloc_upval(UpVal::Closed(v))
            })
            .collect();
        let closure = self.heap.alloc_closure(proto, upvalues);
        LuaValue::Function(LuaFunction::Lua(closure))
    }

    // ---- Stack ----

    pub(crate) fn ensure_stack(&mut self, size: usize) {
        if size > self.stack.len() {
            self.stack.resize(size, LuaValue::Nil);
        }
    }

    /// First slot not used by any active frame of the running thread.
    pub(crate) fn stack_top(&self) -> usize {
        self.frames
            .iter()
            .map(|f| (f.base + self.protos[f.proto].chunk.max_stack_size as usize).max(f.top))
            .max()
            .unwrap_or(0)
    }

    // ---- Upvalues ----

    pub(crate) fn upval_get(&self, uv: GcIdx<UpVal>) -> LuaValue {
        match *self.heap.upval(uv) {
            UpVal::Closed(v) => v,
            UpVal::Open { thread, slot } => self.thread_slot(thread, slot),
        }
    }

    pub(crate) fn upval_set(&mut self, uv: GcIdx<UpVal>, value: LuaValue) {
        match *self.heap.upval(uv) {
            UpVal::Closed(_) => *self.heap.upval_mut(uv) = UpVal::Closed(value),
            UpVal::Open { thread, slot } => {
                if thread == self.current {
                    self.stack[slot] = value;
                } else if let Some(Some(t)) = self.threads.get_mut(thread.index()) {
                    t.stack[slot] = value;
                }
            }
        }
    }

    fn thread_slot(&self, thread: ThreadId, slot: usize) -> LuaValue {
        if thread == self.current {
            self.stack.get(slot).copied().unwrap_or(LuaValue::Nil)
        } else {
            self.thread(thread)
                .and_then(|t| t.stack.get(slot).copied())
                .unwrap_or(LuaValue::Nil)
        }
    }

    /// Shared upvalue for a live stack slot of the running thread.
    pub(crate) fn find_upval(&mut self, slot: usize) -> GcIdx<UpVal> {
        match self.open_upvals.binary_search_by_key(&slot, |(s, _)| *s) {
            Ok(i) => self.open_upvals[i].1,
            Err(i) => {
                let uv = self.heap.alloc_upval(UpVal::Open {
                    thread: self.current,
                    slot,
                });
                self.open_upvals.insert(i, (slot, uv));
                uv
            }
        }
    }

    /// Close every open upvalue at or above `level`.
    pub(crate) fn close_upvalues(&mut self, level: usize) {
        let split = self.open_upvals.partition_point(|(s, _)| *s < level);
        for (slot, uv) in self.open_upvals.drain(split..) {
            let v = self.stack.get(slot).copied().unwrap_or(LuaValue::Nil);
            *self.heap.upval_mut(uv) = UpVal::Closed(v);
        }
    }

    // ---- Threads ----

    pub(crate) fn thread(&self, id: ThreadId) -> Option<&LuaThread> {
        self.threads.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn thread_mut(&mut self, id: ThreadId) -> Option<&mut LuaThread> {
        self.threads.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Create a suspended coroutine running `body`.
    pub fn create_thread(&mut self, body: LuaValue) -> ThreadId {
        self.heap.debt += 1;
        let thread = LuaThread::new(body, ThreadStatus::Suspended);
        if let Some(i) = self.threads.iter().skip(1).position(Option::is_none) {
            self.threads[i + 1] = Some(thread);
            return ThreadId(i as u32 + 1);
        }
        self.threads.push(Some(thread));
        tracing::trace!(thread = self.threads.len() - 1, "coroutine created");
        ThreadId(self.threads.len() as u32 - 1)
    }

    pub fn thread_status(&self, id: ThreadId) -> Option<ThreadStatus> {
        self.thread(id).map(|t| t.status)
    }

    pub fn current_thread_id(&self) -> ThreadId {
        self.current
    }

    pub(crate) fn set_status(&mut self, id: ThreadId, status: ThreadStatus) {
        if let Some(t) = self.thread_mut(id) {
            t.status = status;
        }
    }

    fn swap_state(&mut self, id: ThreadId) {
        if let Some(Some(t)) = self.threads.get_mut(id.index()) {
            std::mem::swap(&mut self.stack, &mut t.stack);
            std::mem::swap(&mut self.frames, &mut t.frames);
            std::mem::swap(&mut self.open_upvals, &mut t.open_upvals);
            std::mem::swap(&mut self.tbc, &mut t.tbc);
        }
    }

    /// Make `target` the running thread.
    pub(crate) fn switch_to(&mut self, target: ThreadId) {
        if target == self.current {
            return;
        }
        self.swap_state(self.current);
        self.swap_state(target);
        tracing::trace!(from = self.current.0, to = target.0, "thread switch");
        self.current = target;
    }

    // ---- Calls ----

    /// Push `func(args...)` as an entry frame on the running thread.
    pub(crate) fn push_entry(
        &mut self,
        func: LuaValue,
        args: &[LuaValue],
        can_await: bool,
    ) -> Result<RunEntry, LuaError> {
        if self.run_depth >= self.config.max_native_depth {
            return Err(LuaError::StackOverflow);
        }
        let slot = self.stack_top();
        self.ensure_stack(slot + args.len() + 2);
        let depth = self.frames.len();
        match func {
            LuaValue::Function(LuaFunction::Lua(c)) => {
                self.stack[slot] = func;
                self.stack[slot + 1..slot + 1 + args.len()].copy_from_slice(args);
                self.push_lua_frame(c, slot, args.len(), MULTRET)?;
            }
            _ => {
                self.stack[slot] = self.trampoline_value();
                self.stack[slot + 1] = func;
                self.stack[slot + 2..slot + 2 + args.len()].copy_from_slice(args);
                self.push_lua_frame(self.trampoline, slot, args.len() + 1, MULTRET)?;
            }
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.is_entry = true;
        }
        Ok(RunEntry {
            thread: self.current,
            depth,
            can_await,
        })
    }

    /// Push a frame for a Lua closure whose function value is at `func`
    /// with `nargs` arguments above it.
    pub(crate) fn push_lua_frame(
        &mut self,
        closure: GcIdx<LuaClosure>,
        func: usize,
        nargs: usize,
        num_results: i32,
    ) -> Result<(), LuaError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(LuaError::StackOverflow);
        }
        let proto = self.heap.closure(closure).proto;
        let chunk = &self.protos[proto].chunk;
        let num_params = chunk.num_params as usize;
        let max_stack = chunk.max_stack_size as usize;
        let is_vararg = chunk.is_vararg;

        let mut base = func + 1;
        let mut num_varargs = 0;
        if is_vararg && nargs > num_params {
            num_varargs = nargs - num_params;
            base = func + 1 + nargs;
            self.ensure_stack(base + max_stack + 1);
            for i in 0..num_params {
                self.stack[base + i] = self.stack[func + 1 + i];
            }
        } else {
            self.ensure_stack(base + max_stack + 1);
        }
        let given = nargs.min(num_params);
        for slot in &mut self.stack[base + given..base + max_stack] {
            *slot = LuaValue::Nil;
        }
        let mut frame = CallFrame::new(closure, proto, func, base, num_results);
        frame.varargs = func + 1 + num_params;
        frame.num_varargs = num_varargs;
        self.frames.push(frame);
        Ok(())
    }

    /// Write `values` as the results of the call at `func`.
    pub(crate) fn place_results(&mut self, func: usize, wanted: i32, values: &[LuaValue]) {
        if wanted == MULTRET {
            self.ensure_stack(func + values.len() + 1);
            self.stack[func..func + values.len()].copy_from_slice(values);
            if let Some(frame) = self.frames.last_mut() {
                frame.top = func + values.len();
            }
        } else {
            let wanted = wanted as usize;
            self.ensure_stack(func + wanted + 1);
            for i in 0..wanted {
                self.stack[func + i] = values.get(i).copied().unwrap_or(LuaValue::Nil);
            }
        }
    }

    /// Run the interpreter loop until the entry frame returns or an async
    /// native must be awaited. `pending` is an error to unwind first.
    pub(crate) fn run(&mut self, entry: RunEntry, mut pending: Option<LuaError>) -> Result<RunExit, LuaError> {
        self.run_depth += 1;
        let result = loop {
            if let Some(e) = pending.take() {
                if let Err(e) = self.unwind(e, &entry) {
                    break Err(e);
                }
            }
            match crate::dispatch::execute(self, &entry) {
                Ok(exit) => break Ok(exit),
                Err(e) => pending = Some(e),
            }
        };
        self.run_depth -= 1;
        result
    }

    fn returned_values(&self, exit: RunExit) -> Result<Vec<LuaValue>, LuaError> {
        match exit {
            RunExit::Returned { start, count } => Ok(self.stack[start..start + count].to_vec()),
            RunExit::Await(p) => Err(LuaError::runtime(format!(
                "attempt to await '{}' across a C-call boundary",
                p.name
            ))),
        }
    }

    /// Call any callable value and collect all results. Async natives reached
    /// from here are driven to completion in place.
    pub fn call(&mut self, func: LuaValue, args: &[LuaValue]) -> Result<Vec<LuaValue>, LuaError> {
        self.check_callable(func)?;
        self.recover();
        let entry = self.push_entry(func, args, false)?;
        let exit = self.run(entry, None)?;
        self.returned_values(exit)
    }

    /// Call from the host, awaiting async natives cooperatively. The
    /// cancellation token races every await.
    pub async fn call_async(&mut self, func: LuaValue, args: &[LuaValue]) -> Result<Vec<LuaValue>, LuaError> {
        use futures::future::{select, Either};

        self.check_callable(func)?;
        self.recover();
        let can_await = self.run_depth == 0;
        let entry = self.push_entry(func, args, can_await)?;
        let mut exit = self.run(entry, None)?;
        loop {
            let pending = match exit {
                RunExit::Await(pending) => pending,
                done => return self.returned_values(done),
            };
            let cancelled = self.cancel.cancelled();
            let outcome = match select(pending.future, cancelled).await {
                Either::Left((result, _)) => result,
                Either::Right(_) => Err(LuaError::Cancelled),
            };
            let error = match outcome {
                Ok(completion) => {
                    self.run_depth += 1;
                    let done = self.complete_async(
                        completion,
                        pending.func,
                        pending.num_results,
                        pending.name,
                        pending.upvalue,
                    );
                    self.run_depth -= 1;
                    done.err()
                }
                Err(e) => Some(e),
            };
            exit = self.run(entry, error)?;
        }
    }

    pub(crate) fn check_callable(&self, func: LuaValue) -> Result<(), LuaError> {
        match func {
            LuaValue::Function(_) => Ok(()),
            _ if !self.metamethod(func, self.names.call).is_nil() => Ok(()),
            _ => Err(LuaError::runtime(format!(
                "attempt to call a {} value",
                self.type_name_of(func)
            ))),
        }
    }

    /// Reset the main thread after a host future was dropped mid-await.
    fn recover(&mut self) {
        if self.run_depth > 0 || (self.current == ThreadId::MAIN && self.frames.is_empty()) {
            return;
        }
        tracing::warn!("discarding interrupted call state");
        while self.current != ThreadId::MAIN {
            let id = self.current;
            self.close_upvalues(0);
            self.frames.clear();
            self.tbc.clear();
            let back = self
                .thread_mut(id)
                .and_then(|t| {
                    t.status = ThreadStatus::Dead;
                    t.resume_to.take()
                })
                .map_or(ThreadId::MAIN, |l| l.thread);
            self.switch_to(back);
        }
        self.close_upvalues(0);
        self.frames.clear();
        self.tbc.clear();
        self.set_status(ThreadId::MAIN, ThreadStatus::Running);
    }

    /// Error value as seen by Lua code.
    pub(crate) fn error_value(&mut self, e: LuaError) -> LuaValue {
        match e.into_root() {
            LuaError::Value(v) => v,
            other => {
                let text = other.to_string();
                LuaValue::String(self.strings.intern_str(&text))
            }
        }
    }

    /// Text of an error that left the VM.
    pub fn error_message(&self, e: &LuaError) -> String {
        match e.root() {
            LuaError::Value(v @ (LuaValue::String(_) | LuaValue::Number(_))) => {
                v.display(&self.strings).to_string()
            }
            other => other.to_string(),
        }
    }

    /// Intern a Rust string.
    pub fn intern(&mut self, s: &str) -> StringId {
        self.strings.intern_str(s)
    }

    /// Raw global lookup.
    pub fn get_global(&self, name: &str) -> LuaValue {
        match self.strings.find(name.as_bytes()) {
            Some(key) => self.heap.table(self.globals).get_str(key),
            None => LuaValue::Nil,
        }
    }

    /// Raw global assignment.
    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        let key = self.strings.intern_str(name);
        self.heap.table_mut(self.globals).set_str(key, value);
    }
}

impl Runtime for Vm {
    fn heap(&self) -> &Heap {
        &self.heap
    }

    fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    fn strings(&self) -> &StringInterner {
        &self.strings
    }

    fn strings_mut(&mut self) -> &mut StringInterner {
        &mut self.strings
    }

    fn globals(&self) -> GcIdx<LuaTable> {
        self.globals
    }

    fn current_thread(&self) -> ThreadId {
        self.current
    }

    fn call(&mut self, func: LuaValue, args: &[LuaValue]) -> Result<Vec<LuaValue>, LuaError> {
        Vm::call(self, func, args)
    }

    fn index(&mut self, obj: LuaValue, key: LuaValue) -> Result<LuaValue, LuaError> {
        self.index_value(obj, key, crate::debug::Site::Unknown)
    }

    fn set_index(&mut self, obj: LuaValue, key: LuaValue, value: LuaValue) -> Result<(), LuaError> {
        self.set_index_value(obj, key, value, crate::debug::Site::Unknown)
    }

    fn tostring(&mut self, v: LuaValue) -> Result<StringId, LuaError> {
        self.tostring_value(v)
    }

    fn less_than(&mut self, a: LuaValue, b: LuaValue) -> Result<bool, LuaError> {
        self.less_than_values(a, b)
    }

    fn length(&mut self, v: LuaValue) -> Result<LuaValue, LuaError> {
        self.length_of(v, crate::debug::Site::Unknown)
    }

    fn traceback(&self) -> Traceback {
        self.traceback_frames()
    }

    fn where_(&self, level: usize) -> String {
        self.where_at(level)
    }

    fn string_metatable(&self) -> Option<GcIdx<LuaTable>> {
        self.string_mt
    }

    fn set_string_metatable(&mut self, mt: Option<GcIdx<LuaTable>>) {
        self.string_mt = mt;
    }

    fn stdout(&mut self) -> &mut dyn Write {
        &mut *self.stdout
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}
