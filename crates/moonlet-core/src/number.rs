//! Number conversions shared by the lexer, `tonumber` and string coercion.
//!
//! Lua numbers are always `f64` here; integer-looking text still parses to
//! a float, and integral floats print without a fractional part.

/// Lua's notion of whitespace (C `isspace` in the "C" locale).
fn is_lua_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Parse a Lua numeral, allowing surrounding whitespace and a leading sign.
///
/// Accepts decimal integers and floats with optional exponent, and hex
/// numerals with optional fraction and binary `p` exponent. Rejects `inf`,
/// `nan` and anything with trailing garbage.
pub fn str_to_number(text: &[u8]) -> Option<f64> {
    let start = text.iter().position(|&b| !is_lua_space(b))?;
    let end = text.iter().rposition(|&b| !is_lua_space(b))? + 1;
    let mut s = &text[start..end];
    let mut negative = false;
    if let Some((&sign, rest)) = s.split_first() {
        if sign == b'-' || sign == b'+' {
            negative = sign == b'-';
            s = rest;
        }
    }
    let value = if s.len() > 1 && s[0] == b'0' && (s[1] == b'x' || s[1] == b'X') {
        parse_hex(&s[2..])?
    } else {
        parse_decimal(s)?
    };
    Some(if negative { -value } else { value })
}

fn parse_decimal(s: &[u8]) -> Option<f64> {
    let mut i = 0;
    let mut digits = 0;
    while i < s.len() && s[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < s.len() && s[i] == b'.' {
        i += 1;
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }
    if i < s.len() && (s[i] == b'e' || s[i] == b'E') {
        i += 1;
        if i < s.len() && (s[i] == b'+' || s[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return None;
        }
    }
    if i != s.len() {
        return None;
    }
    // Validated above, so the std parser sees only plain numerals.
    std::str::from_utf8(s).ok()?.parse::<f64>().ok()
}

fn hex_digit(b: u8) -> Option<u32> {
    (b as char).to_digit(16)
}

/// Hex numeral body (after `0x`). Integers without fraction or exponent wrap
/// modulo 2^64 like Lua's integer hex literals do.
fn parse_hex(s: &[u8]) -> Option<f64> {
    let mut i = 0;
    let mut mantissa: f64 = 0.0;
    let mut wrapped: u64 = 0;
    let mut exponent: i64 = 0;
    let mut any_digit = false;
    let mut is_float = false;
    while i < s.len() {
        match hex_digit(s[i]) {
            Some(d) => {
                mantissa = mantissa * 16.0 + d as f64;
                wrapped = wrapped.wrapping_mul(16).wrapping_add(d as u64);
                any_digit = true;
                i += 1;
            }
            None => break,
        }
    }
    if i < s.len() && s[i] == b'.' {
        is_float = true;
        i += 1;
        while i < s.len() {
            match hex_digit(s[i]) {
                Some(d) => {
                    mantissa = mantissa * 16.0 + d as f64;
                    exponent -= 4;
                    any_digit = true;
                    i += 1;
                }
                None => break,
            }
        }
    }
    if !any_digit {
        return None;
    }
    if i < s.len() && (s[i] == b'p' || s[i] == b'P') {
        is_float = true;
        i += 1;
        let mut exp_neg = false;
        if i < s.len() && (s[i] == b'+' || s[i] == b'-') {
            exp_neg = s[i] == b'-';
            i += 1;
        }
        let exp_start = i;
        let mut e: i64 = 0;
        while i < s.len() && s[i].is_ascii_digit() {
            e = e.saturating_mul(10).saturating_add((s[i] - b'0') as i64);
            i += 1;
        }
        if i == exp_start {
            return None;
        }
        exponent = exponent.saturating_add(if exp_neg { -e } else { e });
    }
    if i != s.len() {
        return None;
    }
    if is_float {
        let exp = exponent.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        Some(mantissa * 2f64.powi(exp))
    } else {
        Some(wrapped as i64 as f64)
    }
}

/// Convert a float with an exact integer value in i64 range.
pub fn to_integer_exact(n: f64) -> Option<i64> {
    // 2^63 itself is out of range; -2^63 is representable.
    if n.fract() == 0.0 && n >= -9_223_372_036_854_775_808.0 && n < 9_223_372_036_854_775_808.0 {
        Some(n as i64)
    } else {
        None
    }
}

/// Format a number the way `tostring` does (`%.14g`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e14 {
        return format!("{}", n as i64);
    }
    const PRECISION: i32 = 14;
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mant, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    if exp < -4 || exp >= PRECISION {
        let mant = strip_fraction_zeros(mant);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mant, sign, exp.abs())
    } else {
        let fixed = format!("{:.*}", (PRECISION - 1 - exp) as usize, n);
        strip_fraction_zeros(&fixed).to_string()
    }
}

fn strip_fraction_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
