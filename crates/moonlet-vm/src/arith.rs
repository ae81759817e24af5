//! Arithmetic and bitwise operators on Lua numbers.
//!
//! All numbers are `f64`. Bitwise operators work on the exact integer value
//! of their operands and fail when an operand has a fractional part.

use crate::coerce;
use moonlet_compiler::opcode::MetaEvent;
use moonlet_core::error::LuaError;
use moonlet_core::string::StringInterner;
use moonlet_core::value::LuaValue;

/// Outcome of a primitive binary operation.
pub enum ArithResult {
    Ok(f64),
    /// Operand types have no primitive meaning; try the metamethod.
    NeedMetamethod,
    Error(LuaError),
}

/// Apply `event` to two values, coercing numeric strings.
pub fn arith_op(event: MetaEvent, a: LuaValue, b: LuaValue, strings: &StringInterner) -> ArithResult {
    let (Some(x), Some(y)) = (coerce::to_number(a, strings), coerce::to_number(b, strings)) else {
        return ArithResult::NeedMetamethod;
    };
    if event.is_bitwise() {
        return match (to_bits(x), to_bits(y)) {
            (Some(i), Some(j)) => ArithResult::Ok(bitwise(event, i, j) as f64),
            _ => ArithResult::Error(LuaError::runtime("number has no integer representation")),
        };
    }
    ArithResult::Ok(float_arith(event, x, y))
}

fn to_bits(n: f64) -> Option<i64> {
    moonlet_core::number::to_integer_exact(n)
}

/// Float operators. `//` and `%` floor toward negative infinity.
pub fn float_arith(event: MetaEvent, a: f64, b: f64) -> f64 {
    match event {
        MetaEvent::Add => a + b,
        MetaEvent::Sub => a - b,
        MetaEvent::Mul => a * b,
        MetaEvent::Div => a / b,
        MetaEvent::Pow => a.powf(b),
        MetaEvent::IDiv => (a / b).floor(),
        MetaEvent::Mod => lua_fmod(a, b),
        MetaEvent::BAnd | MetaEvent::BOr | MetaEvent::BXor | MetaEvent::Shl | MetaEvent::Shr => {
            match (to_bits(a), to_bits(b)) {
                (Some(i), Some(j)) => bitwise(event, i, j) as f64,
                _ => f64::NAN,
            }
        }
    }
}

/// `a % b` with the sign of the divisor.
pub fn lua_fmod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if m != 0.0 && (m < 0.0) != (b < 0.0) {
        m + b
    } else {
        m
    }
}

fn bitwise(event: MetaEvent, a: i64, b: i64) -> i64 {
    match event {
        MetaEvent::BAnd => a & b,
        MetaEvent::BOr => a | b,
        MetaEvent::BXor => a ^ b,
        MetaEvent::Shl => shift_left(a, b),
        MetaEvent::Shr => shift_left(a, b.wrapping_neg()),
        _ => 0,
    }
}

/// Logical shift; negative counts shift right, counts of 64 or more give 0.
pub fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> (-n)) as i64
    }
}

/// Unary minus; `None` when the operand is not a number.
pub fn unary_minus(v: LuaValue, strings: &StringInterner) -> Option<f64> {
    coerce::to_number(v, strings).map(|n| -n)
}

/// Bitwise not.
pub fn bit_not(v: LuaValue, strings: &StringInterner) -> ArithResult {
    match coerce::to_number(v, strings) {
        None => ArithResult::NeedMetamethod,
        Some(n) => match to_bits(n) {
            Some(i) => ArithResult::Ok(!i as f64),
            None => ArithResult::Error(LuaError::runtime("number has no integer representation")),
        },
    }
}
