//! `math` library.

use crate::{library, set_field};
use moonlet_core::error::LuaError;
use moonlet_core::gc::GcIdx;
use moonlet_core::native::{register_fn, NativeContext, Runtime};
use moonlet_core::number::to_integer_exact;
use moonlet_core::table::LuaTable;
use moonlet_core::value::LuaValue;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// xoshiro256** generator, one per VM.
#[derive(Debug, Clone)]
pub struct Xoshiro256 {
    s: [u64; 4],
}

impl Xoshiro256 {
    /// Seed the way `math.randomseed(n)` does: `n` and a constant fill the
    /// state, then the first outputs are discarded.
    pub fn seeded(a: u64, b: u64) -> Self {
        let mut rng = Xoshiro256 { s: [a, 0xff, b, 0] };
        for _ in 0..16 {
            rng.next_u64();
        }
        rng
    }

    pub fn next_u64(&mut self) -> u64 {
        let s = &mut self.s;
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 17;
        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(45);
        result
    }

    /// Float in `[0, 1)` from the top 53 bits.
    pub fn next_float(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (0.5 / (1u64 << 52) as f64)
    }

    /// Uniform integer in `0..=limit` without modulo bias.
    pub fn project(&mut self, limit: u64) -> u64 {
        let mut r = self.next_u64();
        if limit & limit.wrapping_add(1) == 0 {
            return r & limit;
        }
        let mut mask = limit;
        mask |= mask >> 1;
        mask |= mask >> 2;
        mask |= mask >> 4;
        mask |= mask >> 8;
        mask |= mask >> 16;
        mask |= mask >> 32;
        loop {
            r &= mask;
            if r <= limit {
                return r;
            }
            r = self.next_u64();
        }
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

pub fn open_math(rt: &mut dyn Runtime) {
    let math = library(rt, "math");

    unary(rt, math, "abs", f64::abs);
    unary(rt, math, "ceil", f64::ceil);
    unary(rt, math, "floor", f64::floor);
    unary(rt, math, "sqrt", f64::sqrt);
    unary(rt, math, "sin", f64::sin);
    unary(rt, math, "cos", f64::cos);
    unary(rt, math, "tan", f64::tan);
    unary(rt, math, "asin", f64::asin);
    unary(rt, math, "acos", f64::acos);
    unary(rt, math, "exp", f64::exp);
    unary(rt, math, "deg", f64::to_degrees);
    unary(rt, math, "rad", f64::to_radians);

    register_fn(rt, math, "atan", |ctx: &mut NativeContext<'_>| {
        let y = ctx.check_number(0)?;
        let x = ctx.opt_number(1, 1.0)?;
        Ok(ctx.ret(&[LuaValue::Number(y.atan2(x))]))
    });
    register_fn(rt, math, "log", |ctx: &mut NativeContext<'_>| {
        let x = ctx.check_number(0)?;
        let r = match ctx.arg(1) {
            LuaValue::Nil => x.ln(),
            _ => match ctx.check_number(1)? {
                b if b == 2.0 => x.log2(),
                b if b == 10.0 => x.log10(),
                b => x.ln() / b.ln(),
            },
        };
        Ok(ctx.ret(&[LuaValue::Number(r)]))
    });
    register_fn(rt, math, "fmod", |ctx: &mut NativeContext<'_>| {
        let a = ctx.check_number(0)?;
        let b = ctx.check_number(1)?;
        Ok(ctx.ret(&[LuaValue::Number(a % b)]))
    });
    register_fn(rt, math, "modf", |ctx: &mut NativeContext<'_>| {
        let x = ctx.check_number(0)?;
        let int = if x.is_infinite() { x } else { x.trunc() };
        let frac = if x.is_infinite() { 0.0 } else { x - int };
        Ok(ctx.ret(&[LuaValue::Number(int), LuaValue::Number(frac)]))
    });
    register_fn(rt, math, "max", |ctx: &mut NativeContext<'_>| extremum(ctx, |a, b| b > a));
    register_fn(rt, math, "min", |ctx: &mut NativeContext<'_>| extremum(ctx, |a, b| b < a));
    register_fn(rt, math, "tointeger", |ctx: &mut NativeContext<'_>| {
        let v = match ctx.arg(0) {
            LuaValue::Number(n) if to_integer_exact(n).is_some() => LuaValue::Number(n),
            _ => {
                ctx.check_any(0)?;
                LuaValue::Nil
            }
        };
        Ok(ctx.ret(&[v]))
    });
    register_fn(rt, math, "type", |ctx: &mut NativeContext<'_>| match ctx.check_any(0)? {
        LuaValue::Number(n) if to_integer_exact(n).is_some() => {
            ctx.push_str("integer");
            Ok(1)
        }
        LuaValue::Number(_) => {
            ctx.push_str("float");
            Ok(1)
        }
        _ => Ok(ctx.ret(&[LuaValue::Nil])),
    });
    register_fn(rt, math, "ult", |ctx: &mut NativeContext<'_>| {
        let a = ctx.check_integer(0)? as u64;
        let b = ctx.check_integer(1)? as u64;
        Ok(ctx.ret(&[LuaValue::Boolean(a < b)]))
    });

    let rng = Rc::new(RefCell::new(Xoshiro256::seeded(time_seed(), 0)));
    let state = rng.clone();
    register_fn(rt, math, "random", move |ctx: &mut NativeContext<'_>| {
        let mut rng = state.borrow_mut();
        let (low, high) = match ctx.arg_count() {
            0 => return Ok(ctx.ret(&[LuaValue::Number(rng.next_float())])),
            1 => (1, ctx.check_integer(0)?),
            2 => (ctx.check_integer(0)?, ctx.check_integer(1)?),
            _ => return Err(LuaError::runtime("wrong number of arguments")),
        };
        if low > high {
            return Err(ctx.arg_error(ctx.arg_count() - 1, "interval is empty"));
        }
        let offset = rng.project(high.wrapping_sub(low) as u64);
        Ok(ctx.ret(&[LuaValue::Number(offset.wrapping_add(low as u64) as i64 as f64)]))
    });
    register_fn(rt, math, "randomseed", move |ctx: &mut NativeContext<'_>| {
        let (a, b) = match ctx.arg(0) {
            LuaValue::Nil => (time_seed(), 0),
            _ => {
                let n = ctx.check_number(0)?;
                let a = to_integer_exact(n).map_or(n.to_bits(), |i| i as u64);
                (a, ctx.opt_integer(1, 0)? as u64)
            }
        };
        *rng.borrow_mut() = Xoshiro256::seeded(a, b);
        tracing::trace!(seed = a, "math.randomseed");
        Ok(ctx.ret(&[LuaValue::Number(a as i64 as f64), LuaValue::Number(b as i64 as f64)]))
    });

    set_field(rt, math, "pi", LuaValue::Number(std::f64::consts::PI));
    set_field(rt, math, "huge", LuaValue::Number(f64::INFINITY));
    set_field(rt, math, "maxinteger", LuaValue::Number(i64::MAX as f64));
    set_field(rt, math, "mininteger", LuaValue::Number(i64::MIN as f64));
}

fn unary(rt: &mut dyn Runtime, math: GcIdx<LuaTable>, name: &str, f: fn(f64) -> f64) {
    register_fn(rt, math, name, move |ctx: &mut NativeContext<'_>| {
        let x = ctx.check_number(0)?;
        Ok(ctx.ret(&[LuaValue::Number(f(x))]))
    });
}

fn extremum(ctx: &mut NativeContext<'_>, better: fn(f64, f64) -> bool) -> Result<usize, LuaError> {
    let mut best = ctx.check_number(0)?;
    for i in 1..ctx.arg_count() {
        let x = ctx.check_number(i)?;
        if better(best, x) {
            best = x;
        }
    }
    Ok(ctx.ret(&[LuaValue::Number(best)]))
}
