//! printf-style conversions for `string.format`.

/// One parsed `%` conversion: flags, width, precision and the conversion
/// character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spec {
    pub left: bool,
    pub plus: bool,
    pub space: bool,
    pub alt: bool,
    pub zero: bool,
    pub width: usize,
    pub precision: Option<usize>,
    pub conv: u8,
}

const MAX_DIGITS: usize = 2;

/// Parse the conversion starting just after a `%` at `fmt[*i]`, advancing
/// `*i` past it.
pub fn parse_spec(fmt: &[u8], i: &mut usize) -> Result<Spec, String> {
    let start = *i;
    let mut spec = Spec::default();
    while let Some(&c) = fmt.get(*i) {
        match c {
            b'-' => spec.left = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'#' => spec.alt = true,
            b'0' => spec.zero = true,
            _ => break,
        }
        *i += 1;
    }
    spec.width = read_digits(fmt, i).ok_or_else(|| invalid(fmt, start, *i))?.unwrap_or(0);
    if fmt.get(*i) == Some(&b'.') {
        *i += 1;
        spec.precision = Some(read_digits(fmt, i).ok_or_else(|| invalid(fmt, start, *i))?.unwrap_or(0));
    }
    match fmt.get(*i) {
        Some(&c) if c.is_ascii_alphabetic() => {
            spec.conv = c;
            *i += 1;
            Ok(spec)
        }
        _ => Err(invalid(fmt, start, (*i + 1).min(fmt.len()))),
    }
}

fn read_digits(fmt: &[u8], i: &mut usize) -> Option<Option<usize>> {
    let start = *i;
    while fmt.get(*i).is_some_and(u8::is_ascii_digit) {
        *i += 1;
    }
    if *i - start > MAX_DIGITS {
        return None;
    }
    let digits = &fmt[start..*i];
    Some((!digits.is_empty()).then(|| digits.iter().fold(0, |n, d| n * 10 + (d - b'0') as usize)))
}

fn invalid(fmt: &[u8], start: usize, end: usize) -> String {
    format!("invalid conversion '%{}' to 'format'", String::from_utf8_lossy(&fmt[start..end]))
}

/// Apply width and justification. `prefix` (sign, `0x`) stays left of any
/// zero padding.
fn pad(spec: &Spec, prefix: &str, body: &str, zero_ok: bool) -> String {
    let len = prefix.len() + body.len();
    if len >= spec.width {
        return format!("{prefix}{body}");
    }
    let fill = spec.width - len;
    if spec.left {
        format!("{prefix}{body}{}", " ".repeat(fill))
    } else if spec.zero && zero_ok {
        format!("{prefix}{}{body}", "0".repeat(fill))
    } else {
        format!("{}{prefix}{body}", " ".repeat(fill))
    }
}

fn sign(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

/// `%d` / `%i`.
pub fn integer(spec: &Spec, n: i64) -> String {
    let mut digits = n.unsigned_abs().to_string();
    if let Some(p) = spec.precision {
        if p == 0 && n == 0 {
            digits.clear();
        } else if digits.len() < p {
            digits = format!("{}{digits}", "0".repeat(p - digits.len()));
        }
    }
    pad(spec, sign(spec, n < 0), &digits, spec.precision.is_none())
}

/// `%u`, `%o`, `%x`, `%X`; the value is reinterpreted as unsigned.
pub fn unsigned(spec: &Spec, n: i64) -> String {
    let u = n as u64;
    let mut digits = match spec.conv {
        b'u' => u.to_string(),
        b'o' => format!("{u:o}"),
        b'X' => format!("{u:X}"),
        _ => format!("{u:x}"),
    };
    if let Some(p) = spec.precision {
        if p == 0 && u == 0 {
            digits.clear();
        } else if digits.len() < p {
            digits = format!("{}{digits}", "0".repeat(p - digits.len()));
        }
    }
    let prefix = match spec.conv {
        b'o' if spec.alt && !digits.starts_with('0') => "0",
        b'x' if spec.alt && u != 0 => "0x",
        b'X' if spec.alt && u != 0 => "0X",
        _ => "",
    };
    pad(spec, prefix, &digits, spec.precision.is_none())
}

/// `%e %E %f %F %g %G %a %A`.
pub fn float(spec: &Spec, n: f64) -> String {
    let upper = spec.conv.is_ascii_uppercase();
    let prefix = sign(spec, n.is_sign_negative() && !n.is_nan());
    if !n.is_finite() {
        let word = if n.is_nan() { "nan" } else { "inf" };
        let word = if upper { word.to_ascii_uppercase() } else { word.to_string() };
        return pad(spec, prefix, &word, false);
    }
    let a = n.abs();
    let body = match spec.conv.to_ascii_lowercase() {
        b'e' => exponent_form(a, spec.precision.unwrap_or(6), spec.alt),
        b'f' => fixed_form(a, spec.precision.unwrap_or(6), spec.alt),
        b'a' => {
            let hex = hex_float(a, spec.precision);
            let (x, hex) = if upper { ("0X", hex.to_ascii_uppercase()) } else { ("0x", hex) };
            return pad(spec, &format!("{prefix}{x}"), &hex, true);
        }
        _ => general_form(a, spec.precision.unwrap_or(6), spec.alt),
    };
    let body = if upper { body.to_ascii_uppercase() } else { body };
    pad(spec, prefix, &body, true)
}

fn fixed_form(a: f64, precision: usize, alt: bool) -> String {
    let mut s = format!("{a:.precision$}");
    if alt && precision == 0 {
        s.push('.');
    }
    s
}

/// `d.ddde±XX` with at least two exponent digits.
fn exponent_form(a: f64, precision: usize, alt: bool) -> String {
    let s = format!("{a:.precision$e}");
    let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let dot = if alt && precision == 0 { "." } else { "" };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{dot}e{sign}{:02}", exp.abs())
}

fn general_form(a: f64, precision: usize, alt: bool) -> String {
    let p = precision.max(1);
    let probe = format!("{a:.prec$e}", prec = p - 1);
    let exp: i32 = probe.split_once('e').and_then(|(_, e)| e.parse().ok()).unwrap_or(0);
    let mut s = if exp < -4 || exp >= p as i32 {
        exponent_form(a, p - 1, alt)
    } else {
        fixed_form(a, (p as i32 - 1 - exp) as usize, alt)
    };
    if !alt {
        s = strip_trailing_zeros(&s);
    }
    s
}

fn strip_trailing_zeros(s: &str) -> String {
    let (mantissa, exp) = match s.find('e') {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    if !mantissa.contains('.') {
        return s.to_string();
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}{exp}")
}

/// Hex digits and binary exponent of `a` (no sign, no `0x`).
fn hex_float(a: f64, precision: Option<usize>) -> String {
    if a == 0.0 {
        let frac = match precision {
            Some(p) if p > 0 => format!(".{}", "0".repeat(p)),
            _ => String::new(),
        };
        return format!("0{frac}p+0");
    }
    let bits = a.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i32;
    let mut mantissa = bits & ((1u64 << 52) - 1);
    let (lead, exp) = if raw_exp == 0 { (0, -1022) } else { (1, raw_exp - 1023) };
    let mut lead = lead;
    let mut digits = format!("{mantissa:013x}");
    if let Some(p) = precision.filter(|&p| p < 13) {
        let shift = (13 - p) * 4;
        let half = 1u64 << (shift - 1);
        let rem = mantissa & ((1u64 << shift) - 1);
        mantissa >>= shift;
        if rem > half || (rem == half && mantissa & 1 == 1) {
            mantissa += 1;
            if p == 0 || mantissa >> (p * 4) != 0 {
                lead += 1;
                mantissa &= (1u64 << (p * 4)).wrapping_sub(1);
            }
        }
        digits = if p == 0 { String::new() } else { format!("{mantissa:0width$x}", width = p) };
    } else if precision.is_none() {
        digits = digits.trim_end_matches('0').to_string();
    } else if let Some(p) = precision {
        digits.push_str(&"0".repeat(p - 13));
    }
    let frac = if digits.is_empty() { String::new() } else { format!(".{digits}") };
    format!("{lead}{frac}p{exp:+}")
}

/// `%q` body for a string: quoted, with control characters escaped so the
/// result reads back as the same string.
pub fn quote_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'"');
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            0 | 1..=31 | 127 => {
                let next_is_digit = bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
                let esc = if next_is_digit { format!("\\{b:03}") } else { format!("\\{b}") };
                out.extend_from_slice(esc.as_bytes());
            }
            _ => out.push(b),
        }
    }
    out.push(b'"');
    out
}

/// `%q` body for a number: integers print as integers, other floats in hex
/// so they read back exactly.
pub fn quote_number(n: f64) -> String {
    if n.is_nan() {
        "(0/0)".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "1e9999" } else { "-1e9999" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 9.2e18 {
        format!("{}", n as i64)
    } else {
        let spec = Spec {
            conv: b'a',
            ..Spec::default()
        };
        float(&spec, n)
    }
}
