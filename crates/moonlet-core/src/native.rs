//! The native function boundary.
//!
//! A native receives a [`NativeContext`]: its argument window, an output
//! buffer, the cancellation signal and a handle to the running VM through the
//! [`Runtime`] trait. It pushes results into the buffer and returns how many
//! it wrote. Async natives return a future instead; the VM awaits it without
//! blocking other work and then runs the completion to produce results.
use crate::error::{LuaError, Traceback};
use crate::gc::{GcIdx, Heap};
use crate::number::{format_number, str_to_number, to_integer_exact};
use crate::string::{StringId, StringInterner};
use crate::table::LuaTable;
use crate::value::{LuaFunction, LuaValue, ThreadId};
use futures::future::LocalBoxFuture;
use futures::task::AtomicWaker;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// VM services available to native functions.
pub trait Runtime: Any {
    fn heap(&self) -> &Heap;
    fn heap_mut(&mut self) -> &mut Heap;
    fn strings(&self) -> &StringInterner;
    fn strings_mut(&mut self) -> &mut StringInterner;
    fn globals(&self) -> GcIdx<LuaTable>;
    fn current_thread(&self) -> ThreadId;

    /// Call any callable value (honors `__call`), collecting all results.
    fn call(&mut self, func: LuaValue, args: &[LuaValue]) -> Result<Vec<LuaValue>, LuaError>;
    /// `obj[key]` with `__index`.
    fn index(&mut self, obj: LuaValue, key: LuaValue) -> Result<LuaValue, LuaError>;
    /// `obj[key] = value` with `__newindex`.
    fn set_index(&mut self, obj: LuaValue, key: LuaValue, value: LuaValue) -> Result<(), LuaError>;
    /// `tostring(v)` with `__tostring` and `__name`.
    fn tostring(&mut self, v: LuaValue) -> Result<StringId, LuaError>;
    /// `a < b` with `__lt`.
    fn less_than(&mut self, a: LuaValue, b: LuaValue) -> Result<bool, LuaError>;
    /// `#v` with `__len`.
    fn length(&mut self, v: LuaValue) -> Result<LuaValue, LuaError>;

    fn traceback(&self) -> Traceback;
    /// `chunk:line:` of the Lua function at `level` (1 = innermost Lua caller),
    /// or an empty string when there is none.
    fn where_(&self, level: usize) -> String;

    fn string_metatable(&self) -> Option<GcIdx<LuaTable>>;
    fn set_string_metatable(&mut self, mt: Option<GcIdx<LuaTable>>);

    /// Sink for `print` and `io.write`.
    fn stdout(&mut self) -> &mut dyn std::io::Write;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Completion of an async native, run once its future resolves.
pub type AsyncCompletion = Box<dyn FnOnce(&mut NativeContext<'_>) -> Result<usize, LuaError>>;
pub type NativeFuture = LocalBoxFuture<'static, Result<AsyncCompletion, LuaError>>;
pub type SyncFn = Rc<dyn Fn(&mut NativeContext<'_>) -> Result<usize, LuaError>>;
pub type AsyncFn = Rc<dyn Fn(&mut NativeContext<'_>) -> Result<NativeFuture, LuaError>>;

/// Control-flow builtins the interpreter loop implements itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Pcall,
    Xpcall,
    Resume,
    Yield,
    /// Function returned by `coroutine.wrap`; the thread is the upvalue.
    WrapResume,
}

#[derive(Clone)]
pub enum NativeFn {
    Sync(SyncFn),
    Async(AsyncFn),
    Intrinsic(Intrinsic),
}

/// A native (Rust) function callable from Lua.
pub struct NativeFunction {
    pub name: Rc<str>,
    pub func: NativeFn,
    /// Single bound value, traced by the collector.
    pub upvalue: LuaValue,
}

impl NativeFunction {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut NativeContext<'_>) -> Result<usize, LuaError> + 'static,
    {
        NativeFunction {
            name: name.into(),
            func: NativeFn::Sync(Rc::new(f)),
            upvalue: LuaValue::Nil,
        }
    }

    pub fn new_async<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut NativeContext<'_>) -> Result<NativeFuture, LuaError> + 'static,
    {
        NativeFunction {
            name: name.into(),
            func: NativeFn::Async(Rc::new(f)),
            upvalue: LuaValue::Nil,
        }
    }

    pub fn intrinsic(name: &str, which: Intrinsic) -> Self {
        NativeFunction {
            name: name.into(),
            func: NativeFn::Intrinsic(which),
            upvalue: LuaValue::Nil,
        }
    }

    pub fn with_upvalue(mut self, upvalue: LuaValue) -> Self {
        self.upvalue = upvalue;
        self
    }
}

/// Allocate a native function on the heap.
pub fn native_value(rt: &mut dyn Runtime, f: NativeFunction) -> LuaValue {
    LuaValue::Function(LuaFunction::Native(rt.heap_mut().alloc_native(f)))
}

/// Store `f` in `table` under its own name.
pub fn register_native(rt: &mut dyn Runtime, table: GcIdx<LuaTable>, f: NativeFunction) -> LuaValue {
    let key = rt.strings_mut().intern(f.name.as_bytes());
    let value = native_value(rt, f);
    rt.heap_mut().table_mut(table).set_str(key, value);
    value
}

/// Register a synchronous native in `table`.
pub fn register_fn<F>(rt: &mut dyn Runtime, table: GcIdx<LuaTable>, name: &str, f: F) -> LuaValue
where
    F: Fn(&mut NativeContext<'_>) -> Result<usize, LuaError> + 'static,
{
    register_native(rt, table, NativeFunction::new(name, f))
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// Context passed to native functions.
pub struct NativeContext<'a> {
    pub rt: &'a mut dyn Runtime,
    args: &'a [LuaValue],
    pub out: &'a mut Vec<LuaValue>,
    pub name: Rc<str>,
    pub upvalue: LuaValue,
    pub cancel: CancellationToken,
}

impl<'a> NativeContext<'a> {
    pub fn new(
        rt: &'a mut dyn Runtime,
        args: &'a [LuaValue],
        out: &'a mut Vec<LuaValue>,
        name: Rc<str>,
        upvalue: LuaValue,
        cancel: CancellationToken,
    ) -> Self {
        NativeContext {
            rt,
            args,
            out,
            name,
            upvalue,
            cancel,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &[LuaValue] {
        self.args
    }

    /// Permissive access: missing arguments read as nil.
    pub fn arg(&self, i: usize) -> LuaValue {
        self.args.get(i).copied().unwrap_or(LuaValue::Nil)
    }

    pub fn thread(&self) -> ThreadId {
        self.rt.current_thread()
    }

    pub fn traceback(&self) -> Traceback {
        self.rt.traceback()
    }

    /// `bad argument #i+1 to '<name>' (msg)`.
    pub fn arg_error(&self, i: usize, msg: impl fmt::Display) -> LuaError {
        LuaError::bad_argument(i + 1, &self.name, msg)
    }

    pub fn type_error(&self, i: usize, expected: &str) -> LuaError {
        let got = if i < self.args.len() {
            self.args[i].type_name()
        } else {
            "no value"
        };
        self.arg_error(i, format_args!("{expected} expected, got {got}"))
    }

    pub fn check_any(&self, i: usize) -> Result<LuaValue, LuaError> {
        if i < self.args.len() {
            Ok(self.args[i])
        } else {
            Err(self.arg_error(i, "value expected"))
        }
    }

    /// Number argument; numeric strings are converted.
    pub fn check_number(&self, i: usize) -> Result<f64, LuaError> {
        match self.arg(i) {
            LuaValue::Number(n) => Ok(n),
            LuaValue::String(s) => str_to_number(self.rt.strings().get_bytes(s))
                .ok_or_else(|| self.type_error(i, "number")),
            _ => Err(self.type_error(i, "number")),
        }
    }

    pub fn check_integer(&self, i: usize) -> Result<i64, LuaError> {
        let n = self.check_number(i)?;
        to_integer_exact(n).ok_or_else(|| self.arg_error(i, "number has no integer representation"))
    }

    pub fn opt_number(&self, i: usize, default: f64) -> Result<f64, LuaError> {
        if self.arg(i).is_nil() {
            Ok(default)
        } else {
            self.check_number(i)
        }
    }

    pub fn opt_integer(&self, i: usize, default: i64) -> Result<i64, LuaError> {
        if self.arg(i).is_nil() {
            Ok(default)
        } else {
            self.check_integer(i)
        }
    }

    /// String argument; numbers are converted.
    pub fn check_string(&mut self, i: usize) -> Result<StringId, LuaError> {
        match self.arg(i) {
            LuaValue::String(s) => Ok(s),
            LuaValue::Number(n) => Ok(self.rt.strings_mut().intern(format_number(n).as_bytes())),
            _ => Err(self.type_error(i, "string")),
        }
    }

    pub fn opt_string(&mut self, i: usize) -> Result<Option<StringId>, LuaError> {
        if self.arg(i).is_nil() {
            Ok(None)
        } else {
            self.check_string(i).map(Some)
        }
    }

    /// Owned copy of a string argument's bytes.
    pub fn check_bytes(&mut self, i: usize) -> Result<Vec<u8>, LuaError> {
        let s = self.check_string(i)?;
        Ok(self.rt.strings().get_bytes(s).to_vec())
    }

    pub fn check_table(&self, i: usize) -> Result<GcIdx<LuaTable>, LuaError> {
        self.arg(i).as_table().ok_or_else(|| self.type_error(i, "table"))
    }

    pub fn check_function(&self, i: usize) -> Result<LuaFunction, LuaError> {
        self.arg(i).as_function().ok_or_else(|| self.type_error(i, "function"))
    }

    pub fn check_thread(&self, i: usize) -> Result<ThreadId, LuaError> {
        self.arg(i).as_thread().ok_or_else(|| self.type_error(i, "thread"))
    }

    pub fn push(&mut self, v: LuaValue) {
        self.out.push(v);
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let s = self.rt.strings_mut().intern(bytes);
        self.out.push(LuaValue::String(s));
    }

    pub fn push_str(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    /// Push each value and return the count, for `Ok(ctx.ret(...))`.
    pub fn ret(&mut self, values: &[LuaValue]) -> usize {
        self.out.extend_from_slice(values);
        values.len()
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        self.rt.strings_mut().intern(s.as_bytes())
    }

    pub fn bytes_of(&self, s: StringId) -> &[u8] {
        self.rt.strings().get_bytes(s)
    }

    /// Fail with [`LuaError::Cancelled`] if the host asked to stop.
    pub fn check_cancelled(&self) -> Result<(), LuaError> {
        if self.cancel.is_cancelled() {
            Err(LuaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct CancelInner {
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

/// Cooperative cancellation signal shared between a host and a running VM.
/// Cloning shares the same signal.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                waker: AtomicWaker::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.waker.wake();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            token: self.clone(),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Future returned by [`CancellationToken::cancelled`].
pub struct Cancelled {
    token: CancellationToken,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.token.is_cancelled() {
            return Poll::Ready(());
        }
        self.token.inner.waker.register(cx.waker());
        if self.token.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
