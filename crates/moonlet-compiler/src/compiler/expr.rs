//! Expression code generation.
use super::{CResult, Compiler, VarRef};
use crate::ast::{BinOp, Expr, ExprKind, Field, UnOp};
use crate::opcode::{Instruction, MetaEvent, OpCode, FIELDS_PER_FLUSH, MAX_C};
use crate::token::Span;
use moonlet_core::string::StringId;

/// Key operand of an indexed assignment target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum KeyRef {
    /// String constant index.
    Field(u8),
    /// Small non-negative integer.
    Int(u8),
    Reg(u8),
}

/// An assignable place, with its table and key already evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum LValue {
    Local(u8),
    Upvalue(u8),
    /// Global through an `_ENV` upvalue.
    TabUp { upval: u8, key: u8 },
    Index { table: u8, key: KeyRef },
}

fn small_int(n: f64) -> Option<u8> {
    (n.fract() == 0.0 && (0.0..=255.0).contains(&n)).then_some(n as u8)
}

fn arith_event(op: BinOp) -> Option<(OpCode, Option<OpCode>, MetaEvent)> {
    use OpCode::*;
    Some(match op {
        BinOp::Add => (Add, Some(AddK), MetaEvent::Add),
        BinOp::Sub => (Sub, Some(SubK), MetaEvent::Sub),
        BinOp::Mul => (Mul, Some(MulK), MetaEvent::Mul),
        BinOp::Mod => (Mod, Some(ModK), MetaEvent::Mod),
        BinOp::Pow => (Pow, Some(PowK), MetaEvent::Pow),
        BinOp::Div => (Div, Some(DivK), MetaEvent::Div),
        BinOp::IDiv => (IDiv, Some(IDivK), MetaEvent::IDiv),
        BinOp::BAnd => (BAnd, None, MetaEvent::BAnd),
        BinOp::BOr => (BOr, None, MetaEvent::BOr),
        BinOp::BXor => (BXor, None, MetaEvent::BXor),
        BinOp::Shl => (Shl, None, MetaEvent::Shl),
        BinOp::Shr => (Shr, None, MetaEvent::Shr),
        _ => return None,
    })
}

impl Compiler<'_> {
    /// A temporary at the top of the register stack can be built in place.
    fn is_top_temp(&self, dest: u8) -> bool {
        dest as usize + 1 == self.free_reg() as usize && dest as usize >= self.num_locals()
    }

    /// Compile `e` into register `dest`, which must already be reserved.
    pub(super) fn expr_to_reg(&mut self, e: &Expr, dest: u8) -> CResult<()> {
        let top = self.free_reg();
        let span = e.span;
        match &e.kind {
            ExprKind::Nil => self.load_nil(dest, 1, span),
            ExprKind::True => {
                self.emit_abc(OpCode::LoadTrue, dest, 0, 0, false, span);
            }
            ExprKind::False => {
                self.emit_abc(OpCode::LoadFalse, dest, 0, 0, false, span);
            }
            ExprKind::Number(n) => self.load_number(dest, *n, span)?,
            ExprKind::String(s) => {
                let k = self.string_k(*s, span)?;
                self.load_k(dest, k, span);
            }
            ExprKind::Vararg => {
                self.emit_abc(OpCode::VarArg, dest, 0, 2, false, span);
            }
            ExprKind::Function(body) => {
                let idx = self.compile_function(body)?;
                self.emit_abx(OpCode::Closure, dest, idx, span);
            }
            ExprKind::Name(name) => match self.resolve(*name, span)? {
                VarRef::Local(reg) => {
                    if reg != dest {
                        self.emit_abc(OpCode::Move, dest, reg, 0, false, span);
                    }
                }
                VarRef::Upvalue(idx) => {
                    self.emit_abc(OpCode::GetUpval, dest, idx, 0, false, span);
                }
                VarRef::Global(name) => self.get_global(dest, name, span)?,
            },
            ExprKind::Index { obj, key } => {
                let table = self.expr_any(obj)?;
                self.index_into(dest, table, key)?;
            }
            ExprKind::Call { .. } | ExprKind::Method { .. } => {
                self.in_fresh_reg(dest, span, |c| c.call(e, Some(1)))?;
            }
            ExprKind::Table(fields) => {
                self.in_fresh_reg(dest, span, |c| c.table(fields, span))?;
            }
            ExprKind::Paren(inner) => self.expr_to_reg(inner, dest)?,
            ExprKind::Unary { op, operand } => self.unary(*op, operand, dest, span)?,
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinOp::And | BinOp::Or => self.and_or(*op, lhs, rhs, dest)?,
                BinOp::Concat => self.in_fresh_reg(dest, span, |c| c.concat(e))?,
                op if op.is_comparison() => {
                    let jumps = self.cond_jump(e, true)?;
                    self.emit_abc(OpCode::LFalseSkip, dest, 0, 0, false, span);
                    self.patch_here(&jumps);
                    self.emit_abc(OpCode::LoadTrue, dest, 0, 0, false, span);
                }
                _ => self.arith(*op, lhs, rhs, dest, span)?,
            },
        }
        self.free_to(top);
        Ok(())
    }

    /// Run `build`, which leaves its result in a newly allocated register,
    /// so that the result ends up in `dest`.
    fn in_fresh_reg(&mut self, dest: u8, span: Span, build: impl FnOnce(&mut Self) -> CResult<u8>) -> CResult<()> {
        if self.is_top_temp(dest) {
            self.free_to(dest);
            let reg = build(self)?;
            debug_assert_eq!(reg, dest);
            return Ok(());
        }
        let reg = build(self)?;
        if reg != dest {
            self.emit_abc(OpCode::Move, dest, reg, 0, false, span);
        }
        self.free_to(reg);
        Ok(())
    }

    /// Compile `e` into any register: a local's own register, or a new temp.
    pub(super) fn expr_any(&mut self, e: &Expr) -> CResult<u8> {
        if let ExprKind::Name(name) = &e.kind {
            if let VarRef::Local(reg) = self.resolve(*name, e.span)? {
                return Ok(reg);
            }
        }
        let reg = self.alloc_reg(e.span)?;
        self.expr_to_reg(e, reg)?;
        Ok(reg)
    }

    /// Register or constant operand for a store.
    pub(super) fn rk(&mut self, e: &Expr) -> CResult<(u8, bool)> {
        let k = match &e.kind {
            ExprKind::String(s) => Some(self.string_k(*s, e.span)?),
            ExprKind::Number(n) => Some(self.number_k(*n, e.span)?),
            _ => None,
        };
        match k {
            Some(k) if k <= MAX_C => Ok((k as u8, true)),
            _ => Ok((self.expr_any(e)?, false)),
        }
    }

    /// Evaluate `exprs` into consecutive registers from the current free
    /// register. With `want`, exactly that many values are produced
    /// (padding with nil, discarding extras). Without it, a trailing
    /// multi-value expression is left open; returns whether it was.
    pub(super) fn explist(&mut self, exprs: &[Expr], want: Option<usize>, span: Span) -> CResult<bool> {
        let base = self.free_reg() as usize;
        let mut produced = 0;
        let mut open = false;
        for (i, e) in exprs.iter().enumerate() {
            let last = i + 1 == exprs.len();
            if last && e.is_multi() {
                match want {
                    None => {
                        self.multi(e, None)?;
                        open = true;
                    }
                    Some(n) if n > i => {
                        self.multi(e, Some(n - i))?;
                        produced = n;
                    }
                    Some(_) => {
                        let reg = self.alloc_reg(e.span)?;
                        self.expr_to_reg(e, reg)?;
                        produced += 1;
                    }
                }
                continue;
            }
            let reg = self.alloc_reg(e.span)?;
            self.expr_to_reg(e, reg)?;
            produced += 1;
        }
        if let Some(n) = want {
            if produced < n {
                let first = self.alloc_regs(n - produced, span)?;
                self.load_nil(first, n - produced, span);
            }
            self.free_to((base + n) as u8);
        }
        Ok(open)
    }

    /// Compile a call or `...` at the current free register, keeping
    /// `want` results (all of them when `None`).
    fn multi(&mut self, e: &Expr, want: Option<usize>) -> CResult<u8> {
        if let ExprKind::Vararg = e.kind {
            let base = self.free_reg();
            let c = want.map_or(0, |n| n + 1);
            self.emit_abc(OpCode::VarArg, base, 0, c as u8, false, e.span);
            match want {
                Some(n) => self.set_free_reg(base as usize + n, e.span)?,
                None => self.free_to(base),
            }
            return Ok(base);
        }
        self.call(e, want)
    }

    /// Compile a function or method call at a fresh base register.
    /// `nresults = None` keeps all results; returns the base.
    pub(super) fn call(&mut self, e: &Expr, nresults: Option<usize>) -> CResult<u8> {
        let span = e.span;
        let (base, args) = match &e.kind {
            ExprKind::Call { func, args } => {
                let base = self.alloc_reg(span)?;
                self.expr_to_reg(func, base)?;
                (base, args)
            }
            ExprKind::Method { obj, name, args } => {
                let base = self.alloc_regs(2, span)?;
                let object = self.expr_any(obj)?;
                let k = self.string_k(*name, span)?;
                if k <= MAX_C {
                    self.emit_abc(OpCode::Self_, base, object, k as u8, true, span);
                } else {
                    let key = self.alloc_reg(span)?;
                    self.load_k(key, k, span);
                    self.emit_abc(OpCode::Self_, base, object, key, false, span);
                }
                self.free_to(base + 2);
                (base, args)
            }
            _ => return self.multi(e, nresults),
        };
        let open = self.explist(args, None, span)?;
        let b = if open { 0 } else { self.free_reg() - base };
        let c = nresults.map_or(0, |n| n + 1);
        self.emit_abc(OpCode::Call, base, b, c as u8, false, span);
        match nresults {
            Some(n) => self.set_free_reg(base as usize + n, span)?,
            None => self.free_to(base),
        }
        Ok(base)
    }

    fn get_global(&mut self, dest: u8, name: StringId, span: Span) -> CResult<()> {
        let k = self.string_k(name, span)?;
        let env = self.env;
        match self.resolve(env, span)? {
            VarRef::Upvalue(up) if k <= MAX_C => {
                self.emit_abc(OpCode::GetTabUp, dest, up, k as u8, false, span);
            }
            VarRef::Local(reg) if k <= MAX_C => {
                self.emit_abc(OpCode::GetField, dest, reg, k as u8, false, span);
            }
            other => {
                let table = self.env_to_reg(other, span)?;
                let key = self.alloc_reg(span)?;
                self.load_k(key, k, span);
                self.emit_abc(OpCode::GetTable, dest, table, key, false, span);
            }
        }
        Ok(())
    }

    fn env_to_reg(&mut self, env: VarRef, span: Span) -> CResult<u8> {
        match env {
            VarRef::Local(reg) => Ok(reg),
            VarRef::Upvalue(up) => {
                let reg = self.alloc_reg(span)?;
                self.emit_abc(OpCode::GetUpval, reg, up, 0, false, span);
                Ok(reg)
            }
            VarRef::Global(_) => Err(self.semantic(span, "no _ENV in scope".to_string())),
        }
    }

    /// `dest = table[key]`, picking the specialized opcode for the key.
    fn index_into(&mut self, dest: u8, table: u8, key: &Expr) -> CResult<()> {
        let span = key.span;
        match &key.kind {
            ExprKind::String(s) => {
                let k = self.string_k(*s, span)?;
                self.index_const_key(dest, table, k, span)
            }
            ExprKind::Number(n) if small_int(*n).is_some() => {
                let i = small_int(*n).unwrap_or_default();
                self.emit_abc(OpCode::GetI, dest, table, i, false, span);
                Ok(())
            }
            _ => {
                let key = self.expr_any(key)?;
                self.emit_abc(OpCode::GetTable, dest, table, key, false, span);
                Ok(())
            }
        }
    }

    pub(super) fn index_const_key(&mut self, dest: u8, table: u8, k: u32, span: Span) -> CResult<()> {
        if k <= MAX_C {
            self.emit_abc(OpCode::GetField, dest, table, k as u8, false, span);
        } else {
            let key = self.alloc_reg(span)?;
            self.load_k(key, k, span);
            self.emit_abc(OpCode::GetTable, dest, table, key, false, span);
        }
        Ok(())
    }

    pub(super) fn string_key(&mut self, name: StringId, span: Span) -> CResult<KeyRef> {
        let k = self.string_k(name, span)?;
        if k <= MAX_C {
            return Ok(KeyRef::Field(k as u8));
        }
        let reg = self.alloc_reg(span)?;
        self.load_k(reg, k, span);
        Ok(KeyRef::Reg(reg))
    }

    fn key_ref(&mut self, key: &Expr) -> CResult<KeyRef> {
        match &key.kind {
            ExprKind::String(s) => self.string_key(*s, key.span),
            ExprKind::Number(n) if small_int(*n).is_some() => Ok(KeyRef::Int(small_int(*n).unwrap_or_default())),
            _ => Ok(KeyRef::Reg(self.expr_any(key)?)),
        }
    }

    /// Resolve an assignment target, evaluating its table and key.
    pub(super) fn lvalue(&mut self, target: &Expr) -> CResult<LValue> {
        let span = target.span;
        match &target.kind {
            ExprKind::Name(name) => {
                let var = self.resolve(*name, span)?;
                if self.is_const_var(var) {
                    let msg = format!("attempt to assign to const variable '{}'", self.name_of(*name));
                    return Err(self.semantic(span, msg));
                }
                match var {
                    VarRef::Local(reg) => Ok(LValue::Local(reg)),
                    VarRef::Upvalue(up) => Ok(LValue::Upvalue(up)),
                    VarRef::Global(name) => {
                        let env = self.env;
                        let env = self.resolve(env, span)?;
                        let k = self.string_k(name, span)?;
                        match env {
                            VarRef::Upvalue(upval) if k <= MAX_C => Ok(LValue::TabUp { upval, key: k as u8 }),
                            other => {
                                let table = self.env_to_reg(other, span)?;
                                let key = self.string_key(name, span)?;
                                Ok(LValue::Index { table, key })
                            }
                        }
                    }
                }
            }
            ExprKind::Index { obj, key } => {
                let table = self.expr_any(obj)?;
                let key = self.key_ref(key)?;
                Ok(LValue::Index { table, key })
            }
            _ => Err(self.semantic(span, "syntax error (cannot assign to expression)".to_string())),
        }
    }

    /// Store register (or constant, when `is_k`) `src` into `target`.
    pub(super) fn store(&mut self, target: LValue, src: u8, is_k: bool, span: Span) -> CResult<()> {
        match target {
            LValue::Local(reg) => {
                if is_k {
                    self.load_k(reg, src as u32, span);
                } else if reg != src {
                    self.emit_abc(OpCode::Move, reg, src, 0, false, span);
                }
            }
            LValue::Upvalue(up) => {
                let reg = if is_k {
                    let reg = self.alloc_reg(span)?;
                    self.load_k(reg, src as u32, span);
                    reg
                } else {
                    src
                };
                self.emit_abc(OpCode::SetUpval, reg, up, 0, false, span);
            }
            LValue::TabUp { upval, key } => {
                self.emit_abc(OpCode::SetTabUp, upval, key, src, is_k, span);
            }
            LValue::Index { table, key } => {
                let (op, b) = match key {
                    KeyRef::Field(k) => (OpCode::SetField, k),
                    KeyRef::Int(i) => (OpCode::SetI, i),
                    KeyRef::Reg(r) => (OpCode::SetTable, r),
                };
                self.emit_abc(op, table, b, src, is_k, span);
            }
        }
        Ok(())
    }

    fn unary(&mut self, op: UnOp, operand: &Expr, dest: u8, span: Span) -> CResult<()> {
        let src = self.expr_any(operand)?;
        let op = match op {
            UnOp::Neg => OpCode::Unm,
            UnOp::BNot => OpCode::BNot,
            UnOp::Not => OpCode::Not,
            UnOp::Len => OpCode::Len,
        };
        self.emit_abc(op, dest, src, 0, false, span);
        Ok(())
    }

    fn arith(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, dest: u8, span: Span) -> CResult<()> {
        let Some((reg_op, k_op, event)) = arith_event(op) else {
            return Err(self.semantic(span, format!("unsupported binary operator {op:?}")));
        };
        if let Some(k_op) = k_op {
            if let ExprKind::Number(n) = rhs.kind {
                let k = self.number_k(n, rhs.span)?;
                if k <= MAX_C {
                    let left = self.expr_any(lhs)?;
                    self.emit_abc(k_op, dest, left, k as u8, false, span);
                    self.emit_abc(OpCode::MMBinK, left, k as u8, event as u8, false, span);
                    return Ok(());
                }
            }
            // Commutative: constant on the left swaps operands.
            if let (ExprKind::Number(n), BinOp::Add | BinOp::Mul) = (&lhs.kind, op) {
                let k = self.number_k(*n, lhs.span)?;
                if k <= MAX_C {
                    let right = self.expr_any(rhs)?;
                    self.emit_abc(k_op, dest, right, k as u8, false, span);
                    self.emit_abc(OpCode::MMBinK, right, k as u8, event as u8, true, span);
                    return Ok(());
                }
            }
        }
        let left = self.expr_any(lhs)?;
        let right = self.expr_any(rhs)?;
        self.emit_abc(reg_op, dest, left, right, false, span);
        self.emit_abc(OpCode::MMBin, left, right, event as u8, false, span);
        Ok(())
    }

    /// `a .. b .. c` evaluates all operands into consecutive registers
    /// and joins them with one CONCAT.
    fn concat(&mut self, e: &Expr) -> CResult<u8> {
        fn flatten<'e>(e: &'e Expr, out: &mut Vec<&'e Expr>) {
            match &e.kind {
                ExprKind::Binary {
                    op: BinOp::Concat,
                    lhs,
                    rhs,
                } => {
                    flatten(lhs, out);
                    flatten(rhs, out);
                }
                _ => out.push(e),
            }
        }
        let mut parts = Vec::new();
        flatten(e, &mut parts);
        let base = self.free_reg();
        for part in &parts {
            let reg = self.alloc_reg(part.span)?;
            self.expr_to_reg(part, reg)?;
        }
        self.emit_abc(OpCode::Concat, base, parts.len() as u8, 0, false, e.span);
        self.free_to(base + 1);
        Ok(base)
    }

    fn and_or(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, dest: u8) -> CResult<()> {
        if (dest as usize) < self.num_locals() {
            // Writing the lhs into a live local before the rhs runs would
            // change what the rhs reads.
            let tmp = self.alloc_reg(lhs.span)?;
            self.and_or(op, lhs, rhs, tmp)?;
            self.emit_abc(OpCode::Move, dest, tmp, 0, false, lhs.span);
            return Ok(());
        }
        self.expr_to_reg(lhs, dest)?;
        self.emit_abc(OpCode::Test, dest, 0, 0, op == BinOp::Or, lhs.span);
        let skip = self.emit_jump(lhs.span);
        self.expr_to_reg(rhs, dest)?;
        self.patch_here(&[skip]);
        Ok(())
    }

    fn table(&mut self, fields: &[Field], span: Span) -> CResult<u8> {
        let table = self.alloc_reg(span)?;
        let positional = fields.iter().filter(|f| matches!(f, Field::Positional(_))).count();
        let hashed = fields.len() - positional;
        self.emit_abc(
            OpCode::NewTable,
            table,
            hashed.min(255) as u8,
            positional.min(255) as u8,
            false,
            span,
        );
        let mut pending = 0;
        let mut stored = 0;
        for (i, field) in fields.iter().enumerate() {
            let top = self.free_reg();
            match field {
                Field::Positional(e) if i + 1 == fields.len() && e.is_multi() => {
                    self.multi(e, None)?;
                    self.flush(table, 0, stored, span);
                    pending = 0;
                }
                Field::Positional(e) => {
                    let reg = self.alloc_reg(e.span)?;
                    self.expr_to_reg(e, reg)?;
                    pending += 1;
                    if pending == FIELDS_PER_FLUSH {
                        self.flush(table, pending, stored, span);
                        stored += pending;
                        pending = 0;
                        self.free_to(table + 1);
                    }
                }
                Field::Named(name, value) => {
                    let key = self.string_key(*name, value.span)?;
                    let (src, is_k) = self.rk(value)?;
                    self.store(LValue::Index { table, key }, src, is_k, value.span)?;
                    self.free_to(top);
                }
                Field::Keyed(key, value) => {
                    let key = self.key_ref(key)?;
                    let (src, is_k) = self.rk(value)?;
                    self.store(LValue::Index { table, key }, src, is_k, value.span)?;
                    self.free_to(top);
                }
            }
        }
        if pending > 0 {
            self.flush(table, pending, stored, span);
        }
        self.free_to(table + 1);
        Ok(table)
    }

    /// SETLIST of `count` pending values (0: up to top) after `stored`.
    fn flush(&mut self, table: u8, count: usize, stored: usize, span: Span) {
        if stored <= MAX_C as usize {
            self.emit_abc(OpCode::SetList, table, count as u8, stored as u8, false, span);
        } else {
            self.emit_abc(OpCode::SetList, table, count as u8, 0, true, span);
            self.emit(Instruction::ax(OpCode::ExtraArg, stored as u32), span);
        }
    }

    /// Jumps taken when the truthiness of `e` equals `jump_if`; falls
    /// through otherwise.
    pub(super) fn cond_jump(&mut self, e: &Expr, jump_if: bool) -> CResult<Vec<usize>> {
        let span = e.span;
        match &e.kind {
            ExprKind::Nil | ExprKind::False => {
                return Ok(if jump_if { Vec::new() } else { vec![self.emit_jump(span)] });
            }
            ExprKind::True | ExprKind::Number(_) | ExprKind::String(_) => {
                return Ok(if jump_if { vec![self.emit_jump(span)] } else { Vec::new() });
            }
            ExprKind::Paren(inner) => return self.cond_jump(inner, jump_if),
            ExprKind::Unary { op: UnOp::Not, operand } => return self.cond_jump(operand, !jump_if),
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinOp::And | BinOp::Or => {
                    // The operator short-circuits when lhs is false (and)
                    // or true (or).
                    let short = *op == BinOp::Or;
                    if short == jump_if {
                        let mut jumps = self.cond_jump(lhs, jump_if)?;
                        jumps.extend(self.cond_jump(rhs, jump_if)?);
                        return Ok(jumps);
                    }
                    let skip = self.cond_jump(lhs, !jump_if)?;
                    let jumps = self.cond_jump(rhs, jump_if)?;
                    self.patch_here(&skip);
                    return Ok(jumps);
                }
                op if op.is_comparison() => return self.compare_jump(*op, lhs, rhs, jump_if, span),
                _ => {}
            },
            _ => {}
        }
        let top = self.free_reg();
        let reg = self.expr_any(e)?;
        self.emit_abc(OpCode::Test, reg, 0, 0, jump_if, span);
        let j = self.emit_jump(span);
        self.free_to(top);
        Ok(vec![j])
    }

    fn constant_operand(&mut self, e: &Expr) -> CResult<Option<u8>> {
        let k = match &e.kind {
            ExprKind::String(s) => self.string_k(*s, e.span)?,
            ExprKind::Number(n) => self.number_k(*n, e.span)?,
            _ => return Ok(None),
        };
        Ok((k <= MAX_C).then_some(k as u8))
    }

    fn compare_jump(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, jump_if: bool, span: Span) -> CResult<Vec<usize>> {
        let top = self.free_reg();
        match op {
            BinOp::Eq | BinOp::NotEq => {
                let k = (op == BinOp::Eq) == jump_if;
                if let Some(kidx) = self.constant_operand(rhs)? {
                    let left = self.expr_any(lhs)?;
                    self.emit_abc(OpCode::EqK, left, kidx, 0, k, span);
                } else if let Some(kidx) = self.constant_operand(lhs)? {
                    let right = self.expr_any(rhs)?;
                    self.emit_abc(OpCode::EqK, right, kidx, 0, k, span);
                } else {
                    let left = self.expr_any(lhs)?;
                    let right = self.expr_any(rhs)?;
                    self.emit_abc(OpCode::Eq, left, right, 0, k, span);
                }
            }
            _ => {
                let left = self.expr_any(lhs)?;
                let right = self.expr_any(rhs)?;
                let (code, a, b) = match op {
                    BinOp::Lt => (OpCode::Lt, left, right),
                    BinOp::LtEq => (OpCode::Le, left, right),
                    BinOp::Gt => (OpCode::Lt, right, left),
                    _ => (OpCode::Le, right, left),
                };
                self.emit_abc(code, a, b, 0, jump_if, span);
            }
        }
        let j = self.emit_jump(span);
        self.free_to(top);
        Ok(vec![j])
    }
}
