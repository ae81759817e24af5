//! String/number coercions used by arithmetic and concatenation.

use moonlet_core::number::{format_number, str_to_number, to_integer_exact};
use moonlet_core::string::StringInterner;
use moonlet_core::value::LuaValue;

/// Numeric value of `v`; numeric strings convert.
pub fn to_number(v: LuaValue, strings: &StringInterner) -> Option<f64> {
    match v {
        LuaValue::Number(n) => Some(n),
        LuaValue::String(s) => str_to_number(strings.get_bytes(s)),
        _ => None,
    }
}

/// Integer value of `v` for bitwise operators. Floats must be integral.
pub fn to_integer(v: LuaValue, strings: &StringInterner) -> Option<i64> {
    to_number(v, strings).and_then(to_integer_exact)
}

/// True for values `..` accepts without a metamethod.
pub fn is_concatenable(v: LuaValue) -> bool {
    matches!(v, LuaValue::String(_) | LuaValue::Number(_))
}

/// Append the concatenation form of a string or number to `out`.
pub fn append_concat(v: LuaValue, strings: &StringInterner, out: &mut Vec<u8>) -> bool {
    match v {
        LuaValue::String(s) => {
            out.extend_from_slice(strings.get_bytes(s));
            true
        }
        LuaValue::Number(n) => {
            out.extend_from_slice(format_number(n).as_bytes());
            true
        }
        _ => false,
    }
}
