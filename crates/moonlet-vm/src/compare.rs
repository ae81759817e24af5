//! Primitive comparisons. Anything these cannot order goes to `__lt`/`__le`.

use moonlet_core::string::StringInterner;
use moonlet_core::value::LuaValue;
use std::cmp::Ordering;

/// Result of a primitive comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Ok(bool),
    NeedMetamethod,
}

fn order(a: LuaValue, b: LuaValue, strings: &StringInterner) -> Option<Option<Ordering>> {
    match (a, b) {
        (LuaValue::Number(x), LuaValue::Number(y)) => Some(x.partial_cmp(&y)),
        (LuaValue::String(x), LuaValue::String(y)) => {
            Some(Some(strings.get_bytes(x).cmp(strings.get_bytes(y))))
        }
        _ => None,
    }
}

/// `a < b` for numbers and strings.
pub fn less_than(a: LuaValue, b: LuaValue, strings: &StringInterner) -> CompareResult {
    match order(a, b, strings) {
        Some(ord) => CompareResult::Ok(ord == Some(Ordering::Less)),
        None => CompareResult::NeedMetamethod,
    }
}

/// `a <= b` for numbers and strings. NaN compares false.
pub fn less_equal(a: LuaValue, b: LuaValue, strings: &StringInterner) -> CompareResult {
    match order(a, b, strings) {
        Some(ord) => CompareResult::Ok(matches!(ord, Some(Ordering::Less | Ordering::Equal))),
        None => CompareResult::NeedMetamethod,
    }
}

/// Raw equality decides unless both operands are distinct tables or
/// distinct userdata, where `__eq` may apply.
pub fn may_use_eq_metamethod(a: LuaValue, b: LuaValue) -> bool {
    matches!(
        (a, b),
        (LuaValue::Table(_), LuaValue::Table(_)) | (LuaValue::UserData(_), LuaValue::UserData(_))
    ) && a != b
}

/// Message for comparing values without an ordering.
pub fn compare_error(a: LuaValue, b: LuaValue) -> String {
    let (ta, tb) = (a.type_name(), b.type_name());
    if ta == tb {
        format!("attempt to compare two {ta} values")
    } else {
        format!("attempt to compare {ta} with {tb}")
    }
}
