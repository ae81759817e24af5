//! Hybrid array+hash table for Lua.
//!
//! Keys `1..=n` live in a dense `array` segment; everything else lives in an
//! insertion-ordered `hash` segment. Appending `n+1` pulls any following
//! integer keys out of the hash, so the hash never holds key `array.len()+1`.
//! Setting an existing key to nil leaves a hole (array) or a tombstone (hash)
//! so a traversal in progress can continue past it; trailing array holes are
//! trimmed and tombstones are purged when a new key is inserted.
use crate::gc::{GcIdx, UserData};
use crate::string::StringId;
use crate::value::{LuaFunction, LuaValue, ThreadId};
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table index is nil")]
    NilIndex,
    #[error("table index is NaN")]
    NaNIndex,
    #[error("invalid key to 'next'")]
    InvalidNextKey,
}

/// A key in the hash part of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKey {
    /// Number stored as bits, with -0.0 folded into 0.0.
    Number(u64),
    Boolean(bool),
    String(StringId),
    Table(GcIdx<LuaTable>),
    Function(LuaFunction),
    Thread(ThreadId),
    UserData(GcIdx<UserData>),
}

impl TableKey {
    pub fn from_value(v: LuaValue) -> Result<TableKey, TableError> {
        Ok(match v {
            LuaValue::Nil => return Err(TableError::NilIndex),
            LuaValue::Number(n) if n.is_nan() => return Err(TableError::NaNIndex),
            LuaValue::Number(n) => TableKey::Number((n + 0.0).to_bits()),
            LuaValue::Boolean(b) => TableKey::Boolean(b),
            LuaValue::String(s) => TableKey::String(s),
            LuaValue::Table(t) => TableKey::Table(t),
            LuaValue::Function(f) => TableKey::Function(f),
            LuaValue::Thread(t) => TableKey::Thread(t),
            LuaValue::UserData(u) => TableKey::UserData(u),
        })
    }

    pub fn to_value(self) -> LuaValue {
        match self {
            TableKey::Number(bits) => LuaValue::Number(f64::from_bits(bits)),
            TableKey::Boolean(b) => LuaValue::Boolean(b),
            TableKey::String(s) => LuaValue::String(s),
            TableKey::Table(t) => LuaValue::Table(t),
            TableKey::Function(f) => LuaValue::Function(f),
            TableKey::Thread(t) => LuaValue::Thread(t),
            TableKey::UserData(u) => LuaValue::UserData(u),
        }
    }

    fn int(i: i64) -> TableKey {
        TableKey::Number((i as f64 + 0.0).to_bits())
    }
}

/// 1-based array position for a number key, if it is a positive integer.
#[inline]
fn array_slot(n: f64) -> Option<usize> {
    if n >= 1.0 && n.fract() == 0.0 && n <= (usize::MAX >> 1) as f64 {
        Some(n as usize)
    } else {
        None
    }
}

/// A Lua table: hybrid array + hash map.
pub struct LuaTable {
    /// Array part (array[0] is key 1). May contain nil holes.
    array: Vec<LuaValue>,
    /// Number of nil holes in `array`.
    holes: usize,
    hash: IndexMap<TableKey, LuaValue>,
    /// Number of nil-valued entries in `hash`.
    tombstones: usize,
    pub metatable: Option<GcIdx<LuaTable>>,
}

impl LuaTable {
    pub fn new(array_hint: usize, hash_hint: usize) -> Self {
        LuaTable {
            array: Vec::with_capacity(array_hint),
            holes: 0,
            hash: IndexMap::with_capacity(hash_hint),
            tombstones: 0,
            metatable: None,
        }
    }

    /// Raw get.
    pub fn get(&self, key: LuaValue) -> LuaValue {
        match key {
            LuaValue::Number(n) => {
                if let Some(i) = array_slot(n) {
                    if i <= self.array.len() {
                        return self.array[i - 1];
                    }
                }
                if n.is_nan() {
                    return LuaValue::Nil;
                }
                self.hash_get(TableKey::Number((n + 0.0).to_bits()))
            }
            LuaValue::String(s) => self.get_str(s),
            LuaValue::Nil => LuaValue::Nil,
            other => match TableKey::from_value(other) {
                Ok(k) => self.hash_get(k),
                Err(_) => LuaValue::Nil,
            },
        }
    }

    #[inline]
    fn hash_get(&self, key: TableKey) -> LuaValue {
        self.hash.get(&key).copied().unwrap_or(LuaValue::Nil)
    }

    pub fn get_int(&self, i: i64) -> LuaValue {
        if i >= 1 && (i as u64) <= self.array.len() as u64 {
            self.array[(i - 1) as usize]
        } else {
            self.hash_get(TableKey::int(i))
        }
    }

    pub fn get_str(&self, s: StringId) -> LuaValue {
        self.hash_get(TableKey::String(s))
    }

    /// Raw set. Fails for nil and NaN keys.
    pub fn set(&mut self, key: LuaValue, value: LuaValue) -> Result<(), TableError> {
        if let LuaValue::Number(n) = key {
            if let Some(i) = array_slot(n) {
                if self.set_array(i, value) {
                    return Ok(());
                }
            }
        }
        let key = TableKey::from_value(key)?;
        self.hash_set(key, value);
        Ok(())
    }

    pub fn set_int(&mut self, i: i64, value: LuaValue) {
        if i >= 1 && self.set_array(i as usize, value) {
            return;
        }
        self.hash_set(TableKey::int(i), value);
    }

    pub fn set_str(&mut self, s: StringId, value: LuaValue) {
        self.hash_set(TableKey::String(s), value);
    }

    /// Store into the array part if `i` is inside it or appends to it.
    fn set_array(&mut self, i: usize, value: LuaValue) -> bool {
        let len = self.array.len();
        if i <= len {
            let slot = &mut self.array[i - 1];
            match (slot.is_nil(), value.is_nil()) {
                (true, false) => self.holes -= 1,
                (false, true) => self.holes += 1,
                _ => {}
            }
            *slot = value;
            if i == len && value.is_nil() {
                while self.array.last().is_some_and(LuaValue::is_nil) {
                    self.array.pop();
                    self.holes -= 1;
                }
            }
            true
        } else if i == len + 1 && !value.is_nil() {
            self.array.push(value);
            self.migrate_from_hash();
            true
        } else {
            false
        }
    }

    fn hash_set(&mut self, key: TableKey, value: LuaValue) {
        match self.hash.get_mut(&key) {
            Some(slot) => {
                match (slot.is_nil(), value.is_nil()) {
                    (true, false) => self.tombstones -= 1,
                    (false, true) => self.tombstones += 1,
                    _ => {}
                }
                *slot = value;
            }
            None => {
                if value.is_nil() {
                    return;
                }
                if self.tombstones > 0 && self.tombstones * 2 >= self.hash.len() {
                    self.hash.retain(|_, v| !v.is_nil());
                    self.tombstones = 0;
                }
                self.hash.insert(key, value);
            }
        }
    }

    /// Move consecutive integer entries from hash into array.
    fn migrate_from_hash(&mut self) {
        loop {
            let next = TableKey::int(self.array.len() as i64 + 1);
            match self.hash.shift_remove(&next) {
                Some(v) if !v.is_nil() => self.array.push(v),
                Some(_) => {
                    self.tombstones -= 1;
                    break;
                }
                None => break,
            }
        }
    }

    /// Length of the run of non-nil values at keys 1, 2, ... This is the
    /// `#` result when no `__len` metamethod applies.
    pub fn array_length(&self) -> usize {
        if self.holes == 0 {
            self.array.len()
        } else {
            self.array
                .iter()
                .position(LuaValue::is_nil)
                .unwrap_or(self.array.len())
        }
    }

    /// Insert `value` at 1-based `pos`, shifting `pos..=#t` up by one.
    /// `pos` must be in `1..=#t+1`.
    pub fn insert(&mut self, pos: usize, value: LuaValue) {
        let n = self.array_length();
        debug_assert!(pos >= 1 && pos <= n + 1);
        if n == self.array.len() && pos <= n + 1 && !value.is_nil() {
            self.array.insert(pos - 1, value);
            self.migrate_from_hash();
            return;
        }
        let mut i = n;
        while i >= pos {
            let v = self.get_int(i as i64);
            self.set_int(i as i64 + 1, v);
            i -= 1;
        }
        self.set_int(pos as i64, value);
    }

    /// Remove and return the value at 1-based `pos`, shifting `pos+1..=#t`
    /// down by one. `pos` must be in `1..=#t`.
    pub fn remove_at(&mut self, pos: usize) -> LuaValue {
        let n = self.array_length();
        debug_assert!(pos >= 1 && pos <= n);
        if n == self.array.len() && pos <= n {
            return self.array.remove(pos - 1);
        }
        let removed = self.get_int(pos as i64);
        for i in pos..n {
            let v = self.get_int(i as i64 + 1);
            self.set_int(i as i64, v);
        }
        self.set_int(n as i64, LuaValue::Nil);
        removed
    }

    /// Next key-value pair after `key` in traversal order: the array segment
    /// ascending, then the hash segment in insertion order.
    pub fn next(&self, key: LuaValue) -> Result<Option<(LuaValue, LuaValue)>, TableError> {
        let hash_start = match key {
            LuaValue::Nil => {
                if let Some(pair) = self.next_in_array(0) {
                    return Ok(Some(pair));
                }
                0
            }
            LuaValue::Number(n) if array_slot(n).is_some_and(|i| i <= self.array.len()) => {
                let i = n as usize;
                if let Some(pair) = self.next_in_array(i) {
                    return Ok(Some(pair));
                }
                0
            }
            other => {
                let k = TableKey::from_value(other).map_err(|_| TableError::InvalidNextKey)?;
                match self.hash.get_index_of(&k) {
                    Some(i) => i + 1,
                    // A trailing array slot cleared during traversal.
                    None if matches!(other, LuaValue::Number(n) if array_slot(n).is_some()) => 0,
                    None => return Err(TableError::InvalidNextKey),
                }
            }
        };
        Ok(self.next_in_hash(hash_start))
    }

    fn next_in_array(&self, from: usize) -> Option<(LuaValue, LuaValue)> {
        self.array[from..]
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_nil())
            .map(|(off, v)| (LuaValue::Number((from + off + 1) as f64), *v))
    }

    fn next_in_hash(&self, from: usize) -> Option<(LuaValue, LuaValue)> {
        (from..self.hash.len()).find_map(|i| {
            let (k, v) = self.hash.get_index(i)?;
            (!v.is_nil()).then(|| (k.to_value(), *v))
        })
    }

    /// Array part values (for GC traversal).
    pub fn array_values(&self) -> &[LuaValue] {
        &self.array
    }

    /// Live hash entries (for GC traversal).
    pub fn hash_entries(&self) -> impl Iterator<Item = (LuaValue, LuaValue)> + '_ {
        self.hash
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.to_value(), *v))
    }

    /// Number of non-nil entries.
    pub fn entry_count(&self) -> usize {
        (self.array.len() - self.holes) + (self.hash.len() - self.tombstones)
    }
}

impl std::fmt::Debug for LuaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "table(array={}, hash={})",
            self.array.len(),
            self.hash.len()
        )
    }
}
