//! Interned Lua strings.
//!
//! Every string value lives in the [`StringInterner`] exactly once, so two
//! [`StringId`]s compare equal iff their bytes are equal. Short strings are
//! stored inline; longer ones spill to the heap. Slots can be released by the
//! garbage collector and are reused through a free list.
use std::collections::HashMap;
use std::fmt;

/// Maximum bytes stored inline.
const INLINE_MAX: usize = 22;

/// An opaque handle to a string in the interner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct StringId(pub u32);

impl StringId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone)]
enum Repr {
    Inline { buf: [u8; INLINE_MAX], len: u8 },
    Heap(Box<[u8]>),
}

/// String bytes with their precomputed hash.
#[derive(Clone)]
pub struct LuaStr {
    repr: Repr,
    hash: u32,
}

impl LuaStr {
    fn new(bytes: &[u8]) -> Self {
        let hash = lua_hash(bytes);
        let repr = if bytes.len() <= INLINE_MAX {
            let mut buf = [0u8; INLINE_MAX];
            buf[..bytes.len()].copy_from_slice(bytes);
            Repr::Inline {
                buf,
                len: bytes.len() as u8,
            }
        } else {
            Repr::Heap(bytes.into())
        };
        LuaStr { repr, hash }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Inline { buf, len } => &buf[..*len as usize],
            Repr::Heap(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

impl fmt::Debug for LuaStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// The luaS_hash string hash: samples at most ~32 bytes of long strings.
pub fn lua_hash(bytes: &[u8]) -> u32 {
    let len = bytes.len();
    let mut h = len as u32;
    let step = (len >> 5) + 1;
    let mut i = len;
    while i >= step {
        h ^= (h << 5).wrapping_add(h >> 2).wrapping_add(bytes[i - 1] as u32);
        i -= step;
    }
    h
}

/// Owns every string and deduplicates them by content.
#[derive(Debug, Default)]
pub struct StringInterner {
    slots: Vec<Option<LuaStr>>,
    free: Vec<u32>,
    /// hash -> ids with that hash
    lookup: HashMap<u32, Vec<u32>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `bytes`, returning the existing id when already present.
    pub fn intern(&mut self, bytes: &[u8]) -> StringId {
        let hash = lua_hash(bytes);
        if let Some(ids) = self.lookup.get(&hash) {
            for &id in ids {
                if let Some(s) = &self.slots[id as usize] {
                    if s.as_bytes() == bytes {
                        return StringId(id);
                    }
                }
            }
        }
        let s = LuaStr::new(bytes);
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(s);
                id
            }
            None => {
                self.slots.push(Some(s));
                (self.slots.len() - 1) as u32
            }
        };
        self.lookup.entry(hash).or_default().push(id);
        StringId(id)
    }

    pub fn intern_str(&mut self, s: &str) -> StringId {
        self.intern(s.as_bytes())
    }

    /// Look up an already-interned string without creating it.
    pub fn find(&self, bytes: &[u8]) -> Option<StringId> {
        let ids = self.lookup.get(&lua_hash(bytes))?;
        ids.iter()
            .copied()
            .find(|&id| {
                self.slots[id as usize]
                    .as_ref()
                    .is_some_and(|s| s.as_bytes() == bytes)
            })
            .map(StringId)
    }

    pub fn get(&self, id: StringId) -> &LuaStr {
        match &self.slots[id.index()] {
            Some(s) => s,
            None => panic!("use of collected string {}", id.0),
        }
    }

    pub fn get_bytes(&self, id: StringId) -> &[u8] {
        self.get(id).as_bytes()
    }

    /// Lossy UTF-8 view, for messages and display.
    pub fn get_lossy(&self, id: StringId) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.get_bytes(id))
    }

    /// Number of live strings.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the id space, for sizing mark bitmaps.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Release every live string whose slot is not marked. Returns the count freed.
    pub fn sweep(&mut self, marked: &[bool]) -> usize {
        let mut freed = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let keep = marked.get(i).copied().unwrap_or(true);
            if keep {
                continue;
            }
            if let Some(s) = slot.take() {
                if let Some(ids) = self.lookup.get_mut(&s.hash) {
                    ids.retain(|&id| id as usize != i);
                    if ids.is_empty() {
                        self.lookup.remove(&s.hash);
                    }
                }
                self.free.push(i as u32);
                freed += 1;
            }
        }
        freed
    }
}
