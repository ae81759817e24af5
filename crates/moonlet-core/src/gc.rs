//! GC heap with arena-based allocation and typed indices.
//!
//! Every collectable object lives in a typed [`Arena`] and is referenced by a
//! [`GcIdx`]. Collection is stop-the-world mark & sweep: the VM seeds a
//! [`Marker`] with its roots, [`Heap::propagate`] traces through object
//! contents, and [`Heap::sweep`] frees whatever stayed white.
use crate::native::NativeFunction;
use crate::string::StringId;
use crate::table::LuaTable;
use crate::value::{LuaFunction, LuaValue, ThreadId};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

/// A typed index into an arena in the heap.
pub struct GcIdx<T>(pub u32, pub PhantomData<T>);

impl<T> GcIdx<T> {
    pub fn new(index: u32) -> Self {
        GcIdx(index, PhantomData)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl<T> Clone for GcIdx<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for GcIdx<T> {}

impl<T> PartialEq for GcIdx<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T> Eq for GcIdx<T> {}

impl<T> std::hash::Hash for GcIdx<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> fmt::Debug for GcIdx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcIdx({})", self.0)
    }
}

/// Slot storage with a free list and a mark bit per slot.
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    marks: Vec<bool>,
    free: Vec<u32>,
    kind: &'static str,
}

impl<T> Arena<T> {
    pub fn new(kind: &'static str) -> Self {
        Arena {
            slots: Vec::new(),
            marks: Vec::new(),
            free: Vec::new(),
            kind,
        }
    }

    pub fn alloc(&mut self, value: T) -> GcIdx<T> {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(value);
            self.marks[idx as usize] = false;
            GcIdx::new(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(value));
            self.marks.push(false);
            GcIdx::new(idx)
        }
    }

    pub fn get(&self, idx: GcIdx<T>) -> &T {
        match self.slots.get(idx.0 as usize) {
            Some(Some(v)) => v,
            _ => panic!("{} {} was freed", self.kind, idx.0),
        }
    }

    pub fn get_mut(&mut self, idx: GcIdx<T>) -> &mut T {
        let kind = self.kind;
        match self.slots.get_mut(idx.0 as usize) {
            Some(Some(v)) => v,
            _ => panic!("{} {} was freed", kind, idx.0),
        }
    }

    pub fn try_get(&self, idx: GcIdx<T>) -> Option<&T> {
        self.slots.get(idx.0 as usize).and_then(Option::as_ref)
    }

    /// Live object count.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set the mark bit; returns true if the object was white.
    fn mark(&mut self, idx: GcIdx<T>) -> bool {
        match self.marks.get_mut(idx.0 as usize) {
            Some(m) if !*m => {
                *m = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_marked(&self, idx: GcIdx<T>) -> bool {
        self.marks.get(idx.0 as usize).copied().unwrap_or(false)
    }

    /// Free every unmarked object and clear marks. Returns the count freed.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !self.marks[i] {
                *slot = None;
                self.free.push(i as u32);
                freed += 1;
            }
            self.marks[i] = false;
        }
        freed
    }

    pub fn iter(&self) -> impl Iterator<Item = (GcIdx<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (GcIdx::new(i as u32), v)))
    }
}

/// A Lua closure (function prototype + captured upvalues).
#[derive(Debug)]
pub struct LuaClosure {
    /// Index of the prototype in the VM's proto store.
    pub proto: usize,
    pub upvalues: Vec<GcIdx<UpVal>>,
}

/// A captured variable: open while its stack slot is live, closed afterwards.
#[derive(Debug, Clone, Copy)]
pub enum UpVal {
    Open { thread: ThreadId, slot: usize },
    Closed(LuaValue),
}

/// Opaque host data with an optional metatable.
pub struct UserData {
    pub data: Box<dyn Any>,
    pub metatable: Option<GcIdx<LuaTable>>,
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("metatable", &self.metatable)
            .finish_non_exhaustive()
    }
}

/// Mark-phase worklist. Strings and threads are reported back to the VM,
/// which owns their storage.
pub struct Marker {
    gray: Vec<LuaValue>,
    upvals: Vec<GcIdx<UpVal>>,
    pub strings: Vec<bool>,
    pub threads: Vec<ThreadId>,
}

impl Marker {
    pub fn mark_string(&mut self, s: StringId) {
        if let Some(m) = self.strings.get_mut(s.index()) {
            *m = true;
        }
    }

    pub fn push(&mut self, v: LuaValue) {
        match v {
            LuaValue::String(s) => self.mark_string(s),
            LuaValue::Nil | LuaValue::Boolean(_) | LuaValue::Number(_) => {}
            _ => self.gray.push(v),
        }
    }

    pub fn push_upval(&mut self, uv: GcIdx<UpVal>) {
        self.upvals.push(uv);
    }

    pub fn is_empty(&self) -> bool {
        self.gray.is_empty() && self.upvals.is_empty()
    }
}

/// Counts returned by a sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub tables: usize,
    pub closures: usize,
    pub upvals: usize,
    pub natives: usize,
    pub userdata: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.tables + self.closures + self.upvals + self.natives + self.userdata
    }
}

/// Arena-based GC heap.
pub struct Heap {
    pub tables: Arena<LuaTable>,
    pub closures: Arena<LuaClosure>,
    pub upvals: Arena<UpVal>,
    pub natives: Arena<NativeFunction>,
    pub userdata: Arena<UserData>,
    /// Allocations since the last collection.
    pub debt: usize,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            tables: Arena::new("table"),
            closures: Arena::new("closure"),
            upvals: Arena::new("upvalue"),
            natives: Arena::new("native function"),
            userdata: Arena::new("userdata"),
            debt: 0,
        }
    }

    pub fn alloc_table(&mut self, array_hint: usize, hash_hint: usize) -> GcIdx<LuaTable> {
        self.debt += 1;
        self.tables.alloc(LuaTable::new(array_hint, hash_hint))
    }

    pub fn alloc_closure(&mut self, proto: usize, upvalues: Vec<GcIdx<UpVal>>) -> GcIdx<LuaClosure> {
        self.debt += 1;
        self.closures.alloc(LuaClosure { proto, upvalues })
    }

    pub fn alloc_upval(&mut self, upval: UpVal) -> GcIdx<UpVal> {
        self.debt += 1;
        self.upvals.alloc(upval)
    }

    pub fn alloc_native(&mut self, native: NativeFunction) -> GcIdx<NativeFunction> {
        self.debt += 1;
        self.natives.alloc(native)
    }

    pub fn alloc_userdata(&mut self, data: Box<dyn Any>) -> GcIdx<UserData> {
        self.debt += 1;
        self.userdata.alloc(UserData {
            data,
            metatable: None,
        })
    }

    pub fn table(&self, idx: GcIdx<LuaTable>) -> &LuaTable {
        self.tables.get(idx)
    }

    pub fn table_mut(&mut self, idx: GcIdx<LuaTable>) -> &mut LuaTable {
        self.tables.get_mut(idx)
    }

    pub fn closure(&self, idx: GcIdx<LuaClosure>) -> &LuaClosure {
        self.closures.get(idx)
    }

    pub fn upval(&self, idx: GcIdx<UpVal>) -> &UpVal {
        self.upvals.get(idx)
    }

    pub fn upval_mut(&mut self, idx: GcIdx<UpVal>) -> &mut UpVal {
        self.upvals.get_mut(idx)
    }

    pub fn native(&self, idx: GcIdx<NativeFunction>) -> &NativeFunction {
        self.natives.get(idx)
    }

    /// Metatable of a table or userdata; other types are handled by the VM.
    pub fn metatable_of(&self, v: LuaValue) -> Option<GcIdx<LuaTable>> {
        match v {
            LuaValue::Table(t) => self.table(t).metatable,
            LuaValue::UserData(u) => self.userdata.get(u).metatable,
            _ => None,
        }
    }

    /// Total live objects across all arenas.
    pub fn object_count(&self) -> usize {
        self.tables.len()
            + self.closures.len()
            + self.upvals.len()
            + self.natives.len()
            + self.userdata.len()
    }

    pub fn begin_mark(&mut self, string_slots: usize) -> Marker {
        Marker {
            gray: Vec::new(),
            upvals: Vec::new(),
            strings: vec![false; string_slots],
            threads: Vec::new(),
        }
    }

    /// Trace until the worklist is empty. Thread references are queued in
    /// `marker.threads` for the VM to scan.
    pub fn propagate(&mut self, marker: &mut Marker) {
        loop {
            if let Some(uv) = marker.upvals.pop() {
                if self.upvals.mark(uv) {
                    if let UpVal::Closed(v) = *self.upvals.get(uv) {
                        marker.push(v);
                    }
                }
                continue;
            }
            let Some(v) = marker.gray.pop() else { break };
            match v {
                LuaValue::Table(t) => {
                    if !self.tables.mark(t) {
                        continue;
                    }
                    let table = self.tables.get(t);
                    if let Some(mt) = table.metatable {
                        marker.push(LuaValue::Table(mt));
                    }
                    for &val in table.array_values() {
                        marker.push(val);
                    }
                    for (k, val) in table.hash_entries() {
                        marker.push(k);
                        marker.push(val);
                    }
                }
                LuaValue::Function(LuaFunction::Lua(c)) => {
                    if !self.closures.mark(c) {
                        continue;
                    }
                    for &uv in &self.closures.get(c).upvalues {
                        marker.upvals.push(uv);
                    }
                }
                LuaValue::Function(LuaFunction::Native(n)) => {
                    if self.natives.mark(n) {
                        let upvalue = self.natives.get(n).upvalue;
                        marker.push(upvalue);
                    }
                }
                LuaValue::UserData(u) => {
                    if self.userdata.mark(u) {
                        if let Some(mt) = self.userdata.get(u).metatable {
                            marker.push(LuaValue::Table(mt));
                        }
                    }
                }
                LuaValue::Thread(t) => marker.threads.push(t),
                LuaValue::Nil | LuaValue::Boolean(_) | LuaValue::Number(_) | LuaValue::String(_) => {}
            }
        }
    }

    /// Free unmarked objects and reset the allocation debt.
    pub fn sweep(&mut self) -> SweepStats {
        self.debt = 0;
        SweepStats {
            tables: self.tables.sweep(),
            closures: self.closures.sweep(),
            upvals: self.upvals.sweep(),
            natives: self.natives.sweep(),
            userdata: self.userdata.sweep(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
