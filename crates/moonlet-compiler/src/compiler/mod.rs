/// Code generation: AST → [`Chunk`] bytecode.
///
/// Expressions are compiled into explicit destination registers
/// (`expr_to_reg`) or into whatever register already holds them
/// (`expr_any`); conditions compile to jump lists (`cond_jump`).
pub mod expr;
pub mod scope;

use crate::ast::{self, Attrib, Block, Expr, ExprKind, FuncBody, FuncName, LocalName, Stat, StatKind};
use crate::chunk::{Chunk, Constant, UpvalDesc};
use crate::error::{chunk_display_name, CompileError};
use crate::opcode::{Instruction, OpCode, MAX_BX, MAX_SBX, MIN_SBX};
use crate::parser;
use crate::token::Span;
use expr::LValue;
use moonlet_core::string::{StringId, StringInterner};
use scope::{LabelInfo, LimitError, PendingGoto, ScopeManager};
use std::rc::Rc;

pub const MAX_UPVALUES: usize = 255;

#[derive(Clone, Debug)]
struct UpvalInfo {
    name: StringId,
    in_stack: bool,
    index: u8,
    is_const: bool,
}

/// State for a single function being compiled.
struct FuncState {
    chunk: Chunk,
    scope: ScopeManager,
    upvalues: Vec<UpvalInfo>,
}

impl FuncState {
    fn new(source: Rc<str>, name: Option<String>, line_defined: u32) -> Self {
        let mut chunk = Chunk::new(source);
        chunk.name = name;
        chunk.line_defined = line_defined;
        FuncState {
            chunk,
            scope: ScopeManager::new(),
            upvalues: Vec::new(),
        }
    }
}

/// Where a name resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VarRef {
    Local(u8),
    Upvalue(u8),
    Global(StringId),
}

type CResult<T> = Result<T, CompileError>;

pub struct Compiler<'s> {
    /// Enclosing functions, innermost last.
    funcs: Vec<FuncState>,
    strings: &'s mut StringInterner,
    source: Rc<str>,
    env: StringId,
    hidden: StringId,
    self_name: StringId,
}

/// Compile source text into the main function of a chunk.
///
/// `chunk_name` follows the usual convention: `=name` is shown verbatim,
/// `@path` is a file, anything else is treated as the source itself.
pub fn compile(
    source: &[u8],
    chunk_name: &str,
    strings: &mut StringInterner,
) -> Result<Rc<Chunk>, CompileError> {
    let chunk_label = chunk_display_name(chunk_name);
    let ast = parser::parse(source, &chunk_label, strings)?;
    let chunk = Compiler::new(strings, chunk_label.as_str().into()).main(&ast)?;
    tracing::debug!(
        chunk = %chunk_label,
        instructions = chunk.code.len(),
        functions = chunk.children.len(),
        "compiled chunk"
    );
    Ok(chunk)
}

/// Lower an already parsed chunk.
pub fn compile_ast(
    ast: &ast::Chunk,
    chunk_name: &str,
    strings: &mut StringInterner,
) -> Result<Rc<Chunk>, CompileError> {
    let chunk_label = chunk_display_name(chunk_name);
    Compiler::new(strings, chunk_label.as_str().into()).main(ast)
}

impl<'s> Compiler<'s> {
    fn new(strings: &'s mut StringInterner, source: Rc<str>) -> Self {
        let env = strings.intern(b"_ENV");
        let hidden = strings.intern(b"(for state)");
        let self_name = strings.intern(b"self");
        Compiler {
            funcs: Vec::new(),
            strings,
            source,
            env,
            hidden,
            self_name,
        }
    }

    fn main(mut self, ast: &ast::Chunk) -> CResult<Rc<Chunk>> {
        let mut fs = FuncState::new(self.source.clone(), None, 0);
        fs.upvalues.push(UpvalInfo {
            name: self.env,
            in_stack: true,
            index: 0,
            is_const: false,
        });
        fs.chunk.is_vararg = true;
        fs.chunk.last_line = ast.end_line;
        self.funcs.push(fs);
        self.fs_mut().scope.enter_block(false);
        let start = Span::new(1, 0);
        self.emit_abc(OpCode::VarArgPrep, 0, 0, 0, false, start);
        self.block(&ast.body, true)?;
        self.emit_abc(OpCode::Return0, 0, 0, 0, false, Span::new(ast.end_line, 0));
        Ok(Rc::new(self.close_function()?))
    }

    // ---- Function state access ----

    fn fs(&self) -> &FuncState {
        // `funcs` is never empty while compiling
        &self.funcs[self.funcs.len() - 1]
    }

    fn fs_mut(&mut self) -> &mut FuncState {
        let last = self.funcs.len() - 1;
        &mut self.funcs[last]
    }

    fn pc(&self) -> usize {
        self.fs().chunk.code.len()
    }

    fn num_locals(&self) -> usize {
        self.fs().scope.num_locals()
    }

    fn free_reg(&self) -> u8 {
        self.fs().scope.free_reg()
    }

    // ---- Errors ----

    fn semantic(&self, span: Span, message: String) -> CompileError {
        CompileError::Semantic {
            chunk: self.source.to_string(),
            line: span.line,
            column: span.column,
            message,
        }
    }

    fn limit(&self, err: LimitError, span: Span) -> CompileError {
        let message = match err {
            LimitError::Registers => err.to_string(),
            LimitError::Locals => {
                let line = self.fs().chunk.line_defined;
                if line == 0 {
                    format!("{err} in main function")
                } else {
                    format!("{err} in function at line {line}")
                }
            }
        };
        self.semantic(span, message)
    }

    fn name_of(&self, id: StringId) -> String {
        self.strings.get_lossy(id).into_owned()
    }

    // ---- Emission ----

    fn emit(&mut self, inst: Instruction, span: Span) -> usize {
        self.fs_mut().chunk.emit(inst, span)
    }

    fn emit_abc(&mut self, op: OpCode, a: u8, b: u8, c: u8, k: bool, span: Span) -> usize {
        self.emit(Instruction::abc(op, a, b, c, k), span)
    }

    fn emit_abx(&mut self, op: OpCode, a: u8, bx: u32, span: Span) -> usize {
        self.emit(Instruction::abx(op, a, bx), span)
    }

    fn emit_jump(&mut self, span: Span) -> usize {
        self.emit(Instruction::sj(OpCode::Jmp, 0), span)
    }

    /// Point the jump at `jump_pc` to `target`.
    fn patch_to(&mut self, jump_pc: usize, target: usize) {
        let offset = target as i32 - jump_pc as i32 - 1;
        self.fs_mut().chunk.code[jump_pc].set_sj(offset);
    }

    fn patch_here(&mut self, jumps: &[usize]) {
        let target = self.pc();
        for &j in jumps {
            self.patch_to(j, target);
        }
    }

    /// Unconditional jump back to `target`.
    fn jump_to(&mut self, target: usize, span: Span) {
        let j = self.emit_jump(span);
        self.patch_to(j, target);
    }

    fn add_constant(&mut self, k: Constant, span: Span) -> CResult<u32> {
        let idx = self.fs_mut().chunk.add_constant(k);
        if idx as u32 > MAX_BX {
            return Err(self.semantic(span, "too many constants".to_string()));
        }
        Ok(idx as u32)
    }

    fn string_k(&mut self, s: StringId, span: Span) -> CResult<u32> {
        self.add_constant(Constant::String(s), span)
    }

    fn number_k(&mut self, n: f64, span: Span) -> CResult<u32> {
        self.add_constant(Constant::Number(n), span)
    }

    fn load_number(&mut self, dest: u8, n: f64, span: Span) -> CResult<()> {
        let small = n.fract() == 0.0
            && n >= MIN_SBX as f64
            && n <= MAX_SBX as f64
            && !(n == 0.0 && n.is_sign_negative());
        if small {
            self.emit(Instruction::asbx(OpCode::LoadI, dest, n as i32), span);
        } else {
            let k = self.number_k(n, span)?;
            self.emit_abx(OpCode::LoadK, dest, k, span);
        }
        Ok(())
    }

    fn load_k(&mut self, dest: u8, k: u32, span: Span) {
        self.emit_abx(OpCode::LoadK, dest, k, span);
    }

    fn load_nil(&mut self, first: u8, count: usize, span: Span) {
        if count > 0 {
            self.emit_abc(OpCode::LoadNil, first, (count - 1) as u8, 0, false, span);
        }
    }

    // ---- Registers ----

    fn alloc_reg(&mut self, span: Span) -> CResult<u8> {
        self.fs_mut().scope.alloc_reg().map_err(|e| self.limit(e, span))
    }

    fn alloc_regs(&mut self, n: usize, span: Span) -> CResult<u8> {
        self.fs_mut().scope.alloc_regs(n).map_err(|e| self.limit(e, span))
    }

    fn free_to(&mut self, level: u8) {
        self.fs_mut().scope.free_reg_to(level);
    }

    fn set_free_reg(&mut self, level: usize, span: Span) -> CResult<()> {
        self.fs_mut().scope.set_free_reg(level).map_err(|e| self.limit(e, span))
    }

    fn declare_local(&mut self, name: StringId, attrib: Attrib, span: Span) -> CResult<u8> {
        let pc = self.pc() as u32;
        self.fs_mut()
            .scope
            .declare_local(name, attrib == Attrib::Const, attrib == Attrib::Close, pc)
            .map_err(|e| self.limit(e, span))
    }

    // ---- Name resolution ----

    fn resolve(&mut self, name: StringId, span: Span) -> CResult<VarRef> {
        if let Some(local) = self.fs().scope.resolve_local(name) {
            return Ok(VarRef::Local(local.reg));
        }
        let top = self.funcs.len() - 1;
        Ok(match self.resolve_upvalue(top, name, span)? {
            Some(idx) => VarRef::Upvalue(idx),
            None => VarRef::Global(name),
        })
    }

    /// Find or create an upvalue for `name` in function `fs_idx`, walking
    /// outwards through the enclosing functions.
    fn resolve_upvalue(&mut self, fs_idx: usize, name: StringId, span: Span) -> CResult<Option<u8>> {
        if let Some(i) = self.funcs[fs_idx].upvalues.iter().position(|u| u.name == name) {
            return Ok(Some(i as u8));
        }
        if fs_idx == 0 {
            return Ok(None);
        }
        let parent = fs_idx - 1;
        if let Some(local) = self.funcs[parent].scope.resolve_local(name) {
            let (reg, is_const) = (local.reg, local.is_const);
            self.funcs[parent].scope.mark_captured(reg);
            return self.add_upvalue(fs_idx, name, true, reg, is_const, span).map(Some);
        }
        match self.resolve_upvalue(parent, name, span)? {
            Some(up) => {
                let is_const = self.funcs[parent].upvalues[up as usize].is_const;
                self.add_upvalue(fs_idx, name, false, up, is_const, span).map(Some)
            }
            None => Ok(None),
        }
    }

    fn add_upvalue(
        &mut self,
        fs_idx: usize,
        name: StringId,
        in_stack: bool,
        index: u8,
        is_const: bool,
        span: Span,
    ) -> CResult<u8> {
        let upvalues = &mut self.funcs[fs_idx].upvalues;
        if upvalues.len() >= MAX_UPVALUES {
            return Err(self.semantic(span, format!("too many upvalues (limit is {MAX_UPVALUES})")));
        }
        upvalues.push(UpvalInfo {
            name,
            in_stack,
            index,
            is_const,
        });
        Ok((upvalues.len() - 1) as u8)
    }

    fn is_const_var(&self, var: VarRef) -> bool {
        match var {
            VarRef::Local(reg) => self
                .fs()
                .scope
                .locals
                .iter()
                .rev()
                .find(|l| l.reg == reg)
                .is_some_and(|l| l.is_const),
            VarRef::Upvalue(idx) => self.fs().upvalues[idx as usize].is_const,
            VarRef::Global(_) => false,
        }
    }

    // ---- Functions ----

    fn compile_function(&mut self, func: &FuncBody) -> CResult<u32> {
        let mut fs = FuncState::new(self.source.clone(), func.name.clone(), func.span.line);
        fs.chunk.last_line = func.end_line;
        fs.chunk.is_vararg = func.is_vararg;
        self.funcs.push(fs);
        self.fs_mut().scope.enter_block(false);
        if func.is_method {
            self.declare_local(self.self_name, Attrib::None, func.span)?;
        }
        for &param in &func.params {
            self.declare_local(param, Attrib::None, func.span)?;
        }
        let num_params = self.num_locals() as u8;
        self.fs_mut().chunk.num_params = num_params;
        if func.is_vararg {
            self.emit_abc(OpCode::VarArgPrep, num_params, 0, 0, false, func.span);
        }
        self.block(&func.body, true)?;
        self.emit_abc(OpCode::Return0, 0, 0, 0, false, Span::new(func.end_line, 0));
        let chunk = self.close_function()?;

        let children = &mut self.fs_mut().chunk.children;
        children.push(Rc::new(chunk));
        let idx = children.len() - 1;
        if idx as u32 > MAX_BX {
            return Err(self.semantic(func.span, "too many nested functions".to_string()));
        }
        Ok(idx as u32)
    }

    /// Pop the innermost function and finish its chunk.
    fn close_function(&mut self) -> CResult<Chunk> {
        let end_pc = self.pc() as u32;
        let block = self.fs_mut().scope.leave_block(end_pc);
        if let Some(goto) = block.pending_gotos.first() {
            let msg = format!(
                "no visible label '{}' for goto at line {}",
                self.name_of(goto.name),
                goto.line
            );
            return Err(self.semantic(Span::new(goto.line, 0), msg));
        }
        let Some(fs) = self.funcs.pop() else {
            return Err(self.semantic(Span::default(), "no function to close".to_string()));
        };
        let FuncState {
            mut chunk,
            scope,
            upvalues,
        } = fs;
        chunk.max_stack_size = scope.max_reg.max(2) as u8;
        chunk.upvalues = upvalues
            .into_iter()
            .map(|u| UpvalDesc {
                name: u.name,
                in_stack: u.in_stack,
                index: u.index,
            })
            .collect();
        chunk.locals = scope.finished;
        chunk.locals.sort_by_key(|l| (l.start_pc, l.reg));
        Ok(chunk)
    }

    // ---- Blocks ----

    /// Compile the statements of `block` in the current scope.
    /// `labels_may_end` is false for `repeat` bodies, where `until` follows.
    fn block(&mut self, block: &Block, labels_may_end: bool) -> CResult<()> {
        for (i, stat) in block.stats.iter().enumerate() {
            match &stat.kind {
                StatKind::Label(name) => {
                    let at_end = labels_may_end
                        && block.ret.is_none()
                        && block.stats[i + 1..]
                            .iter()
                            .all(|s| matches!(s.kind, StatKind::Label(_)));
                    self.label(*name, at_end, stat.span)?;
                }
                _ => self.statement(stat)?,
            }
            let level = self.num_locals() as u8;
            self.free_to(level);
        }
        if let Some(ret) = &block.ret {
            self.return_stat(&ret.values, ret.span)?;
        }
        Ok(())
    }

    fn scoped_block(&mut self, block: &Block, is_loop: bool, span: Span) -> CResult<Vec<usize>> {
        self.fs_mut().scope.enter_block(is_loop);
        self.block(block, true)?;
        self.leave_scope(span)
    }

    /// Leave the innermost block, closing captured locals. Returns the
    /// block's pending break jumps.
    fn leave_scope(&mut self, span: Span) -> CResult<Vec<usize>> {
        if let Some(level) = self.fs().scope.block_needs_close() {
            self.emit_abc(OpCode::Close, level, 0, 0, false, span);
        }
        let end_pc = self.pc() as u32;
        Ok(self.fs_mut().scope.leave_block(end_pc).break_jumps)
    }

    // ---- Statements ----

    fn statement(&mut self, stat: &Stat) -> CResult<()> {
        let span = stat.span;
        match &stat.kind {
            StatKind::Call(call) => {
                self.call(call, Some(0))?;
            }
            StatKind::Assign { targets, values } => self.assign(targets, values, span)?,
            StatKind::Local { names, values } => self.local_stat(names, values, span)?,
            StatKind::LocalFunction { name, func } => {
                let reg = self.declare_local(*name, Attrib::None, span)?;
                let idx = self.compile_function(func)?;
                self.emit_abx(OpCode::Closure, reg, idx, span);
            }
            StatKind::Function { name, func } => self.function_stat(name, func, span)?,
            StatKind::Do(body) => {
                self.scoped_block(body, false, span)?;
            }
            StatKind::While { cond, body } => {
                let start = self.pc();
                let exits = self.cond_jump(cond, false)?;
                let breaks = self.scoped_block(body, true, span)?;
                self.jump_to(start, span);
                self.patch_here(&exits);
                self.patch_here(&breaks);
            }
            StatKind::Repeat { body, cond } => self.repeat_stat(body, cond, span)?,
            StatKind::If {
                clauses,
                else_block,
            } => {
                let mut exits = Vec::new();
                for (i, (cond, body)) in clauses.iter().enumerate() {
                    let skip = self.cond_jump(cond, false)?;
                    self.scoped_block(body, false, span)?;
                    if i + 1 < clauses.len() || else_block.is_some() {
                        exits.push(self.emit_jump(span));
                    }
                    self.patch_here(&skip);
                }
                if let Some(body) = else_block {
                    self.scoped_block(body, false, span)?;
                }
                self.patch_here(&exits);
            }
            StatKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => self.numeric_for(*var, start, limit, step.as_ref(), body, span)?,
            StatKind::GenericFor { names, exprs, body } => self.generic_for(names, exprs, body, span)?,
            StatKind::Break => self.break_stat(span)?,
            StatKind::Goto(name) => self.goto_stat(*name, span)?,
            StatKind::Label(name) => self.label(*name, false, span)?,
        }
        Ok(())
    }

    fn local_stat(&mut self, names: &[LocalName], values: &[Expr], span: Span) -> CResult<()> {
        self.explist(values, Some(names.len()), span)?;
        for local in names {
            let reg = self.declare_local(local.name, local.attrib, span)?;
            if local.attrib == Attrib::Close {
                self.emit_abc(OpCode::Tbc, reg, 0, 0, false, span);
            }
        }
        Ok(())
    }

    fn function_stat(&mut self, name: &FuncName, func: &FuncBody, span: Span) -> CResult<()> {
        let base = Expr::new(ExprKind::Name(name.base), span);
        let mut keys: Vec<StringId> = name.fields.clone();
        keys.extend(name.method);
        let Some((&last, path)) = keys.split_last() else {
            let target = self.lvalue(&base)?;
            if let LValue::Local(reg) = target {
                let idx = self.compile_function(func)?;
                self.emit_abx(OpCode::Closure, reg, idx, span);
                return Ok(());
            }
            let reg = self.alloc_reg(span)?;
            let idx = self.compile_function(func)?;
            self.emit_abx(OpCode::Closure, reg, idx, span);
            return self.store(target, reg, false, span);
        };
        let mut table = self.expr_any(&base)?;
        for &field in path {
            let k = self.string_k(field, span)?;
            let dest = self.alloc_reg(span)?;
            self.index_const_key(dest, table, k, span)?;
            table = dest;
        }
        let key = self.string_key(last, span)?;
        let reg = self.alloc_reg(span)?;
        let idx = self.compile_function(func)?;
        self.emit_abx(OpCode::Closure, reg, idx, span);
        self.store(LValue::Index { table, key }, reg, false, span)
    }

    fn repeat_stat(&mut self, body: &Block, cond: &Expr, span: Span) -> CResult<()> {
        let start = self.pc();
        self.fs_mut().scope.enter_block(true);
        self.fs_mut().scope.enter_block(false);
        self.block(body, false)?;
        let back = self.cond_jump(cond, false)?;
        match self.fs().scope.block_needs_close() {
            Some(level) => {
                self.emit_abc(OpCode::Close, level, 0, 0, false, span);
                let exit = self.emit_jump(span);
                self.patch_here(&back);
                self.emit_abc(OpCode::Close, level, 0, 0, false, span);
                self.jump_to(start, span);
                self.patch_here(&[exit]);
            }
            None => {
                for j in back {
                    self.patch_to(j, start);
                }
            }
        }
        let end_pc = self.pc() as u32;
        self.fs_mut().scope.leave_block(end_pc);
        let breaks = self.leave_scope(span)?;
        self.patch_here(&breaks);
        Ok(())
    }

    fn numeric_for(
        &mut self,
        var: StringId,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
        span: Span,
    ) -> CResult<()> {
        let base = self.free_reg();
        self.fs_mut().scope.enter_block(true);
        let r = self.alloc_reg(span)?;
        self.expr_to_reg(start, r)?;
        let r = self.alloc_reg(span)?;
        self.expr_to_reg(limit, r)?;
        let r = self.alloc_reg(span)?;
        match step {
            Some(step) => self.expr_to_reg(step, r)?,
            None => self.load_number(r, 1.0, span)?,
        }
        for _ in 0..3 {
            self.declare_local(self.hidden, Attrib::None, span)?;
        }
        let prep = self.emit_abx(OpCode::ForPrep, base, 0, span);

        self.fs_mut().scope.enter_block(false);
        self.declare_local(var, Attrib::None, span)?;
        self.block(body, true)?;
        self.leave_scope(span)?;

        let loop_pc = self.emit_abx(OpCode::ForLoop, base, 0, span);
        self.fs_mut().chunk.code[loop_pc].set_bx((loop_pc - prep) as u32);
        self.fs_mut().chunk.code[prep].set_bx((loop_pc - prep - 1) as u32);
        let breaks = self.leave_scope(span)?;
        self.patch_here(&breaks);
        Ok(())
    }

    fn generic_for(&mut self, names: &[StringId], exprs: &[Expr], body: &Block, span: Span) -> CResult<()> {
        let base = self.free_reg();
        self.fs_mut().scope.enter_block(true);
        self.explist(exprs, Some(4), span)?;
        for i in 0..4 {
            let attrib = if i == 3 { Attrib::Close } else { Attrib::None };
            self.declare_local(self.hidden, attrib, span)?;
        }
        let prep = self.emit_abx(OpCode::TForPrep, base, 0, span);

        self.fs_mut().scope.enter_block(false);
        for &name in names {
            self.declare_local(name, Attrib::None, span)?;
        }
        self.block(body, true)?;
        self.leave_scope(span)?;

        let call_pc = self.emit_abc(OpCode::TForCall, base, 0, names.len() as u8, false, span);
        let loop_pc = self.emit_abx(OpCode::TForLoop, base, 0, span);
        self.fs_mut().chunk.code[loop_pc].set_bx((loop_pc - prep) as u32);
        self.fs_mut().chunk.code[prep].set_bx((call_pc - prep - 1) as u32);
        let breaks = self.leave_scope(span)?;
        self.patch_here(&breaks);
        Ok(())
    }

    fn break_stat(&mut self, span: Span) -> CResult<()> {
        if self.fs_mut().scope.find_loop_block_mut().is_none() {
            return Err(self.semantic(span, format!("break outside a loop at line {}", span.line)));
        }
        if let Some(level) = self.fs().scope.break_needs_close() {
            self.emit_abc(OpCode::Close, level, 0, 0, false, span);
        }
        let j = self.emit_jump(span);
        if let Some(block) = self.fs_mut().scope.find_loop_block_mut() {
            block.break_jumps.push(j);
        }
        Ok(())
    }

    fn goto_stat(&mut self, name: StringId, span: Span) -> CResult<()> {
        if let Some(label) = self.fs().scope.find_label(name) {
            let (target, level) = (label.pc, label.num_locals);
            if let Some(close) = self.fs().scope.needs_close_from(level) {
                self.emit_abc(OpCode::Close, close, 0, 0, false, span);
            }
            self.jump_to(target, span);
            return Ok(());
        }
        let pc = self.emit_jump(span);
        let num_locals = self.num_locals();
        if let Some(block) = self.fs_mut().scope.current_block_mut() {
            block.pending_gotos.push(PendingGoto {
                name,
                pc,
                line: span.line,
                num_locals,
                needs_close: false,
            });
        }
        Ok(())
    }

    /// Define a label and resolve the forward gotos waiting for it.
    /// A label at the end of its block does not count the block's locals.
    fn label(&mut self, name: StringId, at_end: bool, span: Span) -> CResult<()> {
        if let Some(existing) = self.fs().scope.find_label(name) {
            let msg = format!(
                "label '{}' already defined on line {}",
                self.name_of(name),
                existing.line
            );
            return Err(self.semantic(span, msg));
        }
        let (entry, pending) = match self.fs_mut().scope.current_block_mut() {
            Some(block) => {
                let (matching, rest) = std::mem::take(&mut block.pending_gotos)
                    .into_iter()
                    .partition::<Vec<_>, _>(|g| g.name == name);
                block.pending_gotos = rest;
                (block.num_locals_on_entry, matching)
            }
            None => (0, Vec::new()),
        };
        let num_locals = if at_end { entry } else { self.num_locals() };
        let mut needs_close = false;
        for goto in &pending {
            if goto.num_locals < num_locals {
                let local = self.fs().scope.locals[goto.num_locals].name;
                let msg = format!(
                    "<goto {}> at line {} jumps into the scope of local '{}'",
                    self.name_of(name),
                    goto.line,
                    self.name_of(local)
                );
                return Err(self.semantic(Span::new(goto.line, 0), msg));
            }
            needs_close |= goto.needs_close;
        }
        let pc = self.pc();
        if needs_close {
            self.emit_abc(OpCode::Close, num_locals as u8, 0, 0, false, span);
        }
        for goto in &pending {
            self.patch_to(goto.pc, pc);
        }
        if let Some(block) = self.fs_mut().scope.current_block_mut() {
            block.labels.push(LabelInfo {
                name,
                pc,
                num_locals,
                line: span.line,
            });
        }
        Ok(())
    }

    fn return_stat(&mut self, values: &[Expr], span: Span) -> CResult<()> {
        match values {
            [] => {
                self.emit_abc(OpCode::Return0, 0, 0, 0, false, span);
            }
            [single] if single.is_multi() && !matches!(single.kind, ExprKind::Vararg) => {
                let base = self.call(single, None)?;
                if !self.fs().scope.has_tbc_in_scope() {
                    let last = self.pc() - 1;
                    let inst = self.fs().chunk.code[last];
                    self.fs_mut().chunk.code[last] =
                        Instruction::abc(OpCode::TailCall, inst.a(), inst.b(), 0, false);
                }
                self.emit_abc(OpCode::Return, base, 0, 0, false, span);
            }
            [single] if !single.is_multi() => {
                let reg = self.expr_any(single)?;
                self.emit_abc(OpCode::Return1, reg, 0, 0, false, span);
            }
            _ => {
                let base = self.free_reg();
                let multret = self.explist(values, None, span)?;
                let b = if multret { 0 } else { values.len() + 1 };
                self.emit_abc(OpCode::Return, base, b as u8, 0, false, span);
            }
        }
        Ok(())
    }

    fn assign(&mut self, targets: &[Expr], values: &[Expr], span: Span) -> CResult<()> {
        if let ([target], [value]) = (targets, values) {
            let lv = self.lvalue(target)?;
            if let LValue::Local(reg) = lv {
                return self.expr_to_reg(value, reg);
            }
            let (src, is_k) = self.rk(value)?;
            return self.store(lv, src, is_k, span);
        }

        let mut lvalues = Vec::with_capacity(targets.len());
        for target in targets {
            lvalues.push(self.lvalue(target)?);
        }
        // A local assigned here must not be read through an earlier index target.
        let assigned: Vec<u8> = lvalues
            .iter()
            .filter_map(|lv| match lv {
                LValue::Local(r) => Some(*r),
                _ => None,
            })
            .collect();
        for lv in lvalues.iter_mut() {
            if let LValue::Index { table, key } = lv {
                if assigned.contains(table) {
                    let tmp = self.alloc_reg(span)?;
                    self.emit_abc(OpCode::Move, tmp, *table, 0, false, span);
                    *table = tmp;
                }
                if let expr::KeyRef::Reg(r) = key {
                    if assigned.contains(r) {
                        let tmp = self.alloc_reg(span)?;
                        self.emit_abc(OpCode::Move, tmp, *r, 0, false, span);
                        *r = tmp;
                    }
                }
            }
        }
        let base = self.free_reg();
        self.explist(values, Some(targets.len()), span)?;
        for (i, lv) in lvalues.into_iter().enumerate().rev() {
            self.store(lv, base + i as u8, false, span)?;
        }
        Ok(())
    }
}
