//! Call frames for the interpreter loop.

use moonlet_core::gc::{GcIdx, LuaClosure};
use moonlet_core::value::{LuaValue, ThreadId};

/// `num_results` value meaning "all results".
pub const MULTRET: i32 = -1;

/// Error boundary installed on the frame of a function called through
/// `pcall` or `xpcall`. On a normal return `true` is written in the slot
/// just below the frame's function slot.
#[derive(Clone, Copy, Debug)]
pub struct Protect {
    /// `xpcall` message handler; nil for `pcall`.
    pub handler: LuaValue,
    /// Results wanted from the `pcall` itself, status included.
    pub num_results: i32,
}

/// Activation record of one Lua function.
#[derive(Clone, Debug)]
pub struct CallFrame {
    pub closure: GcIdx<LuaClosure>,
    /// Index into the VM's prototype registry.
    pub proto: usize,
    /// Stack slot holding the called function; results are written here.
    pub func: usize,
    /// First register.
    pub base: usize,
    /// Next instruction to execute.
    pub pc: usize,
    /// Results wanted by the caller (`MULTRET` = all).
    pub num_results: i32,
    /// First extra argument of a vararg function.
    pub varargs: usize,
    pub num_varargs: usize,
    /// End of the values produced by the last open-ended CALL or VARARG.
    pub top: usize,
    pub protect: Option<Protect>,
    /// Frame pushed by a host-level call; its return ends the run.
    pub is_entry: bool,
    /// Tail calls that replaced this frame, for tracebacks.
    pub tail_calls: u32,
}

impl CallFrame {
    pub fn new(closure: GcIdx<LuaClosure>, proto: usize, func: usize, base: usize, num_results: i32) -> Self {
        CallFrame {
            closure,
            proto,
            func,
            base,
            pc: 0,
            num_results,
            varargs: base,
            num_varargs: 0,
            top: base,
            protect: None,
            is_entry: false,
            tail_calls: 0,
        }
    }
}

/// Where the interpreter loop stops: the return of the entry frame at
/// `depth` on `thread`.
#[derive(Clone, Copy, Debug)]
pub struct RunEntry {
    pub thread: ThreadId,
    pub depth: usize,
    /// Async natives may suspend the loop instead of blocking.
    pub can_await: bool,
}
