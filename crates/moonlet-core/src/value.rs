//! The Lua value type.
//!
//! `LuaValue` is a small `Copy` enum. Heap objects are referenced by typed
//! arena indices ([`GcIdx`]), strings by interned [`StringId`], so copying a
//! value never touches the heap. Derived `PartialEq` is Lua raw equality:
//! numbers compare by value (NaN is unequal to itself), strings by content
//! (interning makes id equality content equality), everything else by identity.
use crate::gc::{GcIdx, LuaClosure, UserData};
use crate::native::NativeFunction;
use crate::string::{StringId, StringInterner};
use crate::table::LuaTable;
use std::fmt;

/// Handle to a coroutine owned by the VM. Thread 0 is the main thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub const MAIN: ThreadId = ThreadId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A callable: bytecode closure or host function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LuaFunction {
    Lua(GcIdx<LuaClosure>),
    Native(GcIdx<NativeFunction>),
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum LuaValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(StringId),
    Table(GcIdx<LuaTable>),
    Function(LuaFunction),
    Thread(ThreadId),
    UserData(GcIdx<UserData>),
}

impl LuaValue {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    /// Only `nil` and `false` are falsy.
    #[inline]
    pub fn is_falsy(&self) -> bool {
        matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    #[inline]
    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Boolean(_) => "boolean",
            LuaValue::Number(_) => "number",
            LuaValue::String(_) => "string",
            LuaValue::Table(_) => "table",
            LuaValue::Function(_) => "function",
            LuaValue::Thread(_) => "thread",
            LuaValue::UserData(_) => "userdata",
        }
    }

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            LuaValue::Number(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_string_id(&self) -> Option<StringId> {
        match *self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_table(&self) -> Option<GcIdx<LuaTable>> {
        match *self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub fn as_function(&self) -> Option<LuaFunction> {
        match *self {
            LuaValue::Function(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_thread(&self) -> Option<ThreadId> {
        match *self {
            LuaValue::Thread(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            LuaValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// Render for debugging and host display; no metamethods are consulted.
    pub fn display<'a>(&self, strings: &'a StringInterner) -> DisplayValue<'a> {
        DisplayValue {
            value: *self,
            strings,
        }
    }
}

impl From<bool> for LuaValue {
    fn from(b: bool) -> Self {
        LuaValue::Boolean(b)
    }
}

impl From<f64> for LuaValue {
    fn from(n: f64) -> Self {
        LuaValue::Number(n)
    }
}

impl From<i32> for LuaValue {
    fn from(n: i32) -> Self {
        LuaValue::Number(n as f64)
    }
}

impl From<usize> for LuaValue {
    fn from(n: usize) -> Self {
        LuaValue::Number(n as f64)
    }
}

impl From<StringId> for LuaValue {
    fn from(s: StringId) -> Self {
        LuaValue::String(s)
    }
}

impl From<GcIdx<LuaTable>> for LuaValue {
    fn from(t: GcIdx<LuaTable>) -> Self {
        LuaValue::Table(t)
    }
}

impl From<LuaFunction> for LuaValue {
    fn from(f: LuaFunction) -> Self {
        LuaValue::Function(f)
    }
}

/// Raw `tostring` rendering (no `__tostring`/`__name`).
pub struct DisplayValue<'a> {
    value: LuaValue,
    strings: &'a StringInterner,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            LuaValue::Nil => f.write_str("nil"),
            LuaValue::Boolean(b) => write!(f, "{b}"),
            LuaValue::Number(n) => f.write_str(&crate::number::format_number(n)),
            LuaValue::String(s) => f.write_str(&self.strings.get_lossy(s)),
            LuaValue::Table(t) => write!(f, "table: 0x{:08x}", t.0),
            LuaValue::Function(LuaFunction::Lua(c)) => write!(f, "function: 0x{:08x}", c.0),
            LuaValue::Function(LuaFunction::Native(n)) => {
                write!(f, "function: builtin: 0x{:08x}", n.0)
            }
            LuaValue::Thread(t) => write!(f, "thread: 0x{:08x}", t.0),
            LuaValue::UserData(u) => write!(f, "userdata: 0x{:08x}", u.0),
        }
    }
}
