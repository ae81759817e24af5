//! Metamethod lookup and the slow paths of the operators.

use crate::arith::{self, ArithResult};
use crate::coerce;
use crate::compare::{self, CompareResult};
use crate::debug::Site;
use crate::vm::Vm;
use moonlet_compiler::opcode::MetaEvent;
use moonlet_core::error::LuaError;
use moonlet_core::gc::GcIdx;
use moonlet_core::number::format_number;
use moonlet_core::string::{StringId, StringInterner};
use moonlet_core::table::LuaTable;
use moonlet_core::value::LuaValue;

/// Longest `__index`/`__newindex` chain followed before giving up.
const MAX_META_CHAIN: usize = 2000;

/// Pre-interned metatable keys.
pub struct MetaNames {
    arith: [StringId; 12],
    pub unm: StringId,
    pub bnot: StringId,
    pub eq: StringId,
    pub lt: StringId,
    pub le: StringId,
    pub index: StringId,
    pub newindex: StringId,
    pub call: StringId,
    pub len: StringId,
    pub concat: StringId,
    pub tostring: StringId,
    pub name: StringId,
    pub pairs: StringId,
    pub close: StringId,
    pub metatable: StringId,
}

impl MetaNames {
    pub fn init(strings: &mut StringInterner) -> Self {
        let arith = [
            MetaEvent::Add,
            MetaEvent::Sub,
            MetaEvent::Mul,
            MetaEvent::Mod,
            MetaEvent::Pow,
            MetaEvent::Div,
            MetaEvent::IDiv,
            MetaEvent::BAnd,
            MetaEvent::BOr,
            MetaEvent::BXor,
            MetaEvent::Shl,
            MetaEvent::Shr,
        ]
        .map(|e| strings.intern_str(e.key()));
        MetaNames {
            arith,
            unm: strings.intern(b"__unm"),
            bnot: strings.intern(b"__bnot"),
            eq: strings.intern(b"__eq"),
            lt: strings.intern(b"__lt"),
            le: strings.intern(b"__le"),
            index: strings.intern(b"__index"),
            newindex: strings.intern(b"__newindex"),
            call: strings.intern(b"__call"),
            len: strings.intern(b"__len"),
            concat: strings.intern(b"__concat"),
            tostring: strings.intern(b"__tostring"),
            name: strings.intern(b"__name"),
            pairs: strings.intern(b"__pairs"),
            close: strings.intern(b"__close"),
            metatable: strings.intern(b"__metatable"),
        }
    }

    pub fn event(&self, e: MetaEvent) -> StringId {
        self.arith[e as usize]
    }

    /// Every name, for the collector's root set.
    pub fn all(&self) -> impl Iterator<Item = StringId> + '_ {
        self.arith.iter().copied().chain([
            self.unm,
            self.bnot,
            self.eq,
            self.lt,
            self.le,
            self.index,
            self.newindex,
            self.call,
            self.len,
            self.concat,
            self.tostring,
            self.name,
            self.pairs,
            self.close,
            self.metatable,
        ])
    }
}

fn first(values: Vec<LuaValue>) -> LuaValue {
    values.into_iter().next().unwrap_or(LuaValue::Nil)
}

impl Vm {
    /// Metatable of any value; strings share one.
    pub fn metatable(&self, v: LuaValue) -> Option<GcIdx<LuaTable>> {
        match v {
            LuaValue::String(_) => self.string_mt,
            _ => self.heap.metatable_of(v),
        }
    }

    /// `metatable(v)[name]`, or nil.
    pub fn metamethod(&self, v: LuaValue, name: StringId) -> LuaValue {
        match self.metatable(v) {
            Some(mt) => self.heap.table(mt).get_str(name),
            None => LuaValue::Nil,
        }
    }

    fn binary_metamethod(&self, a: LuaValue, b: LuaValue, name: StringId) -> LuaValue {
        let h = self.metamethod(a, name);
        if h.is_nil() {
            self.metamethod(b, name)
        } else {
            h
        }
    }

    /// `obj[key]` following `__index`.
    pub(crate) fn index_value(&mut self, obj: LuaValue, key: LuaValue, site: Site) -> Result<LuaValue, LuaError> {
        let mut cur = obj;
        for depth in 0..MAX_META_CHAIN {
            let handler = if let LuaValue::Table(t) = cur {
                let table = self.heap.table(t);
                let v = table.get(key);
                if !v.is_nil() {
                    return Ok(v);
                }
                match table.metatable {
                    None => return Ok(LuaValue::Nil),
                    Some(mt) => {
                        let h = self.heap.table(mt).get_str(self.names.index);
                        if h.is_nil() {
                            return Ok(LuaValue::Nil);
                        }
                        h
                    }
                }
            } else {
                let h = self.metamethod(cur, self.names.index);
                if h.is_nil() {
                    let site = if depth == 0 { site } else { Site::Unknown };
                    return Err(self.type_error("index", cur, site));
                }
                h
            };
            if let LuaValue::Function(_) = handler {
                return Ok(first(self.call(handler, &[cur, key])?));
            }
            cur = handler;
        }
        Err(LuaError::runtime("'__index' chain too long; possible loop"))
    }

    /// `obj[key] = value` following `__newindex`.
    pub(crate) fn set_index_value(
        &mut self,
        obj: LuaValue,
        key: LuaValue,
        value: LuaValue,
        site: Site,
    ) -> Result<(), LuaError> {
        let mut cur = obj;
        for depth in 0..MAX_META_CHAIN {
            let handler = if let LuaValue::Table(t) = cur {
                let table = self.heap.table(t);
                let handler = match table.metatable {
                    Some(mt) if table.get(key).is_nil() => self.heap.table(mt).get_str(self.names.newindex),
                    _ => LuaValue::Nil,
                };
                if handler.is_nil() {
                    self.heap.table_mut(t).set(key, value)?;
                    return Ok(());
                }
                handler
            } else {
                let h = self.metamethod(cur, self.names.newindex);
                if h.is_nil() {
                    let site = if depth == 0 { site } else { Site::Unknown };
                    return Err(self.type_error("index", cur, site));
                }
                h
            };
            if let LuaValue::Function(_) = handler {
                self.call(handler, &[cur, key, value])?;
                return Ok(());
            }
            cur = handler;
        }
        Err(LuaError::runtime("'__newindex' chain too long; possible loop"))
    }

    /// Binary operator after the primitive path failed.
    pub(crate) fn arith_fallback(
        &mut self,
        event: MetaEvent,
        a: LuaValue,
        b: LuaValue,
        sites: (Site, Site),
    ) -> Result<LuaValue, LuaError> {
        let h = self.binary_metamethod(a, b, self.names.event(event));
        if !h.is_nil() {
            return Ok(first(self.call(h, &[a, b])?));
        }
        let a_num = coerce::to_number(a, &self.strings).is_some();
        let b_num = coerce::to_number(b, &self.strings).is_some();
        if event.is_bitwise() {
            if a_num && b_num {
                return Err(LuaError::runtime("number has no integer representation"));
            }
            let (v, site) = if a_num { (b, sites.1) } else { (a, sites.0) };
            return Err(self.type_error("perform bitwise operation on", v, site));
        }
        let (v, site) = if a_num { (b, sites.1) } else { (a, sites.0) };
        Err(self.type_error("perform arithmetic on", v, site))
    }

    pub(crate) fn unary_minus(&mut self, v: LuaValue, site: Site) -> Result<LuaValue, LuaError> {
        if let Some(n) = arith::unary_minus(v, &self.strings) {
            return Ok(LuaValue::Number(n));
        }
        let h = self.metamethod(v, self.names.unm);
        if h.is_nil() {
            return Err(self.type_error("perform arithmetic on", v, site));
        }
        Ok(first(self.call(h, &[v, v])?))
    }

    pub(crate) fn bitwise_not(&mut self, v: LuaValue, site: Site) -> Result<LuaValue, LuaError> {
        match arith::bit_not(v, &self.strings) {
            ArithResult::Ok(n) => Ok(LuaValue::Number(n)),
            ArithResult::Error(e) => Err(e),
            ArithResult::NeedMetamethod => {
                let h = self.metamethod(v, self.names.bnot);
                if h.is_nil() {
                    return Err(self.type_error("perform bitwise operation on", v, site));
                }
                Ok(first(self.call(h, &[v, v])?))
            }
        }
    }

    /// `a == b` with `__eq`.
    pub(crate) fn equals(&mut self, a: LuaValue, b: LuaValue) -> Result<bool, LuaError> {
        if a == b {
            return Ok(true);
        }
        if !compare::may_use_eq_metamethod(a, b) {
            return Ok(false);
        }
        let h = self.binary_metamethod(a, b, self.names.eq);
        if h.is_nil() {
            return Ok(false);
        }
        Ok(first(self.call(h, &[a, b])?).is_truthy())
    }

    /// `a < b` with `__lt`.
    pub(crate) fn less_than_values(&mut self, a: LuaValue, b: LuaValue) -> Result<bool, LuaError> {
        match compare::less_than(a, b, &self.strings) {
            CompareResult::Ok(r) => Ok(r),
            CompareResult::NeedMetamethod => self.order_metamethod(a, b, self.names.lt),
        }
    }

    /// `a <= b` with `__le`.
    pub(crate) fn less_equal_values(&mut self, a: LuaValue, b: LuaValue) -> Result<bool, LuaError> {
        match compare::less_equal(a, b, &self.strings) {
            CompareResult::Ok(r) => Ok(r),
            CompareResult::NeedMetamethod => self.order_metamethod(a, b, self.names.le),
        }
    }

    fn order_metamethod(&mut self, a: LuaValue, b: LuaValue, name: StringId) -> Result<bool, LuaError> {
        let h = self.binary_metamethod(a, b, name);
        if h.is_nil() {
            return Err(LuaError::runtime(compare::compare_error(a, b)));
        }
        Ok(first(self.call(h, &[a, b])?).is_truthy())
    }

    /// Concatenate `stack[first..first+count]` right to left, honoring
    /// `__concat`.
    pub(crate) fn concat_range(&mut self, first_slot: usize, count: usize) -> Result<LuaValue, LuaError> {
        let values = &self.stack[first_slot..first_slot + count];
        if values.iter().all(|v| coerce::is_concatenable(*v)) {
            let mut buf = Vec::new();
            for v in values {
                coerce::append_concat(*v, &self.strings, &mut buf);
            }
            return Ok(LuaValue::String(self.strings.intern(&buf)));
        }
        let values = values.to_vec();
        let mut acc = values[count - 1];
        let mut acc_site = Site::Register(self.frame_reg(first_slot + count - 1));
        for i in (0..count - 1).rev() {
            let lhs = values[i];
            acc = self.concat_pair(lhs, acc, (Site::Register(self.frame_reg(first_slot + i)), acc_site))?;
            acc_site = Site::Unknown;
        }
        Ok(acc)
    }

    fn concat_pair(&mut self, a: LuaValue, b: LuaValue, sites: (Site, Site)) -> Result<LuaValue, LuaError> {
        if coerce::is_concatenable(a) && coerce::is_concatenable(b) {
            let mut buf = Vec::new();
            coerce::append_concat(a, &self.strings, &mut buf);
            coerce::append_concat(b, &self.strings, &mut buf);
            return Ok(LuaValue::String(self.strings.intern(&buf)));
        }
        let h = self.binary_metamethod(a, b, self.names.concat);
        if !h.is_nil() {
            return Ok(first(self.call(h, &[a, b])?));
        }
        let (v, site) = if coerce::is_concatenable(a) { (b, sites.1) } else { (a, sites.0) };
        Err(self.type_error("concatenate", v, site))
    }

    /// Register number of an absolute stack slot in the running frame.
    fn frame_reg(&self, slot: usize) -> u8 {
        let base = self.frames.last().map_or(0, |f| f.base);
        slot.saturating_sub(base).min(u8::MAX as usize) as u8
    }

    /// `#v` with `__len`.
    pub(crate) fn length_of(&mut self, v: LuaValue, site: Site) -> Result<LuaValue, LuaError> {
        match v {
            LuaValue::String(s) => Ok(LuaValue::Number(self.strings.get_bytes(s).len() as f64)),
            LuaValue::Table(t) => {
                let h = self.metamethod(v, self.names.len);
                if h.is_nil() {
                    Ok(LuaValue::Number(self.heap.table(t).array_length() as f64))
                } else {
                    Ok(first(self.call(h, &[v])?))
                }
            }
            _ => {
                let h = self.metamethod(v, self.names.len);
                if h.is_nil() {
                    return Err(self.type_error("get length of", v, site));
                }
                Ok(first(self.call(h, &[v])?))
            }
        }
    }

    /// `tostring(v)`: `__tostring`, then `__name`, then the raw form.
    pub(crate) fn tostring_value(&mut self, v: LuaValue) -> Result<StringId, LuaError> {
        let h = self.metamethod(v, self.names.tostring);
        if !h.is_nil() {
            return match first(self.call(h, &[v])?) {
                LuaValue::String(s) => Ok(s),
                LuaValue::Number(n) => Ok(self.strings.intern_str(&format_number(n))),
                _ => Err(LuaError::runtime("'__tostring' must return a string")),
            };
        }
        if let LuaValue::String(s) = v {
            return Ok(s);
        }
        if let LuaValue::String(name) = self.metamethod(v, self.names.name) {
            if matches!(v, LuaValue::Table(_) | LuaValue::UserData(_)) {
                let raw = v.display(&self.strings).to_string();
                let addr = raw.split_once(": ").map_or(raw.as_str(), |(_, a)| a);
                let text = format!("{}: {}", self.strings.get_lossy(name), addr);
                return Ok(self.strings.intern_str(&text));
            }
        }
        let text = v.display(&self.strings).to_string();
        Ok(self.strings.intern_str(&text))
    }

    /// Type name honoring a string `__name` in the metatable.
    pub(crate) fn type_name_of(&self, v: LuaValue) -> String {
        if matches!(v, LuaValue::Table(_) | LuaValue::UserData(_)) {
            if let LuaValue::String(name) = self.metamethod(v, self.names.name) {
                return self.strings.get_lossy(name).into_owned();
            }
        }
        v.type_name().to_string()
    }

    /// `attempt to <op> a <type> value (<variable>)`.
    pub(crate) fn type_error(&self, op: &str, v: LuaValue, site: Site) -> LuaError {
        let info = self.describe(site);
        LuaError::runtime(format!("attempt to {op} a {} value{info}", self.type_name_of(v)))
    }
}
