/// Scope and register management for one function being compiled.
///
/// Active locals always occupy registers `0..locals.len()` in declaration
/// order, so the number of active locals doubles as the register level a
/// block exit or goto must close down to.
use crate::chunk::LocalVar;
use moonlet_core::string::StringId;
use std::fmt;

/// Registers are addressed by an 8-bit field.
pub const MAX_REGISTERS: usize = 255;
pub const MAX_LOCALS: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitError {
    Registers,
    Locals,
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitError::Registers => f.write_str("function or expression needs too many registers"),
            LimitError::Locals => write!(f, "too many local variables (limit is {MAX_LOCALS})"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LocalVarInfo {
    pub name: StringId,
    pub reg: u8,
    /// Declared `<const>` (or `<close>`, which is also read-only).
    pub is_const: bool,
    pub is_close: bool,
    /// Referenced as an upvalue by a nested function.
    pub is_captured: bool,
    pub start_pc: u32,
}

impl LocalVarInfo {
    fn needs_close(&self) -> bool {
        self.is_captured || self.is_close
    }
}

#[derive(Clone, Debug)]
pub struct BlockScope {
    pub num_locals_on_entry: usize,
    pub is_loop: bool,
    /// Unpatched `break` jumps out of this loop.
    pub break_jumps: Vec<usize>,
    pub pending_gotos: Vec<PendingGoto>,
    pub labels: Vec<LabelInfo>,
}

/// A forward goto waiting for its label.
#[derive(Clone, Debug)]
pub struct PendingGoto {
    pub name: StringId,
    pub pc: usize,
    pub line: u32,
    pub num_locals: usize,
    /// The jump leaves the scope of a captured or to-be-closed local.
    pub needs_close: bool,
}

#[derive(Clone, Debug)]
pub struct LabelInfo {
    pub name: StringId,
    pub pc: usize,
    pub num_locals: usize,
    pub line: u32,
}

#[derive(Default)]
pub struct ScopeManager {
    pub locals: Vec<LocalVarInfo>,
    pub blocks: Vec<BlockScope>,
    free_reg: usize,
    /// High-water mark of register use.
    pub max_reg: usize,
    /// Locals that went out of scope, for debug info.
    pub finished: Vec<LocalVar>,
}

impl ScopeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn free_reg(&self) -> u8 {
        self.free_reg as u8
    }

    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    pub fn enter_block(&mut self, is_loop: bool) {
        self.blocks.push(BlockScope {
            num_locals_on_entry: self.locals.len(),
            is_loop,
            break_jumps: Vec::new(),
            pending_gotos: Vec::new(),
            labels: Vec::new(),
        });
    }

    /// Leave the innermost block. Unresolved gotos move to the parent block,
    /// capped to the parent's local count.
    pub fn leave_block(&mut self, end_pc: u32) -> BlockScope {
        let mut block = match self.blocks.pop() {
            Some(b) => b,
            None => return self.empty_block(),
        };
        let entry = block.num_locals_on_entry;
        let leaves_closable = self.locals[entry..].iter().any(LocalVarInfo::needs_close);
        for local in self.locals.drain(entry..) {
            self.finished.push(LocalVar {
                name: local.name,
                reg: local.reg,
                start_pc: local.start_pc,
                end_pc,
            });
        }
        self.free_reg = entry;

        let gotos = std::mem::take(&mut block.pending_gotos);
        if let Some(parent) = self.blocks.last_mut() {
            parent.pending_gotos.extend(gotos.into_iter().map(|mut g| {
                if g.num_locals > entry {
                    g.num_locals = entry;
                    g.needs_close |= leaves_closable;
                }
                g
            }));
        } else {
            block.pending_gotos = gotos;
        }
        block
    }

    fn empty_block(&self) -> BlockScope {
        BlockScope {
            num_locals_on_entry: self.locals.len(),
            is_loop: false,
            break_jumps: Vec::new(),
            pending_gotos: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Register level to close when the current block ends, if any local
    /// declared in it is captured or to-be-closed.
    pub fn block_needs_close(&self) -> Option<u8> {
        let block = self.blocks.last()?;
        self.needs_close_from(block.num_locals_on_entry)
    }

    /// Close level for a `break` out of the innermost loop.
    pub fn break_needs_close(&self) -> Option<u8> {
        let block = self.blocks.iter().rev().find(|b| b.is_loop)?;
        self.needs_close_from(block.num_locals_on_entry)
    }

    /// Close level when jumping back to a label that saw `level` locals.
    pub fn needs_close_from(&self, level: usize) -> Option<u8> {
        self.locals
            .get(level..)?
            .iter()
            .any(LocalVarInfo::needs_close)
            .then_some(level as u8)
    }

    /// `return f()` cannot be a tail call while a to-be-closed local is live.
    pub fn has_tbc_in_scope(&self) -> bool {
        self.locals.iter().any(|l| l.is_close)
    }

    pub fn mark_captured(&mut self, reg: u8) {
        if let Some(local) = self.locals.iter_mut().rev().find(|l| l.reg == reg) {
            local.is_captured = true;
        }
    }

    /// Activate the next local. Its register is its index; the value is
    /// expected to be there already (or the register is reserved now).
    pub fn declare_local(
        &mut self,
        name: StringId,
        is_const: bool,
        is_close: bool,
        start_pc: u32,
    ) -> Result<u8, LimitError> {
        if self.locals.len() >= MAX_LOCALS {
            return Err(LimitError::Locals);
        }
        let reg = self.locals.len();
        if reg >= MAX_REGISTERS {
            return Err(LimitError::Registers);
        }
        self.locals.push(LocalVarInfo {
            name,
            reg: reg as u8,
            is_const: is_const || is_close,
            is_close,
            is_captured: false,
            start_pc,
        });
        if self.free_reg <= reg {
            self.free_reg = reg + 1;
            self.max_reg = self.max_reg.max(self.free_reg);
        }
        Ok(reg as u8)
    }

    pub fn alloc_reg(&mut self) -> Result<u8, LimitError> {
        self.alloc_regs(1)
    }

    /// Reserve `n` consecutive registers, returning the first.
    pub fn alloc_regs(&mut self, n: usize) -> Result<u8, LimitError> {
        let first = self.free_reg;
        if first + n > MAX_REGISTERS {
            return Err(LimitError::Registers);
        }
        self.free_reg += n;
        self.max_reg = self.max_reg.max(self.free_reg);
        Ok(first as u8)
    }

    /// Release temporaries down to `level` (never below the active locals).
    pub fn free_reg_to(&mut self, level: u8) {
        self.free_reg = (level as usize).max(self.locals.len());
    }

    /// Move the free level to `level`, reserving registers if it grows
    /// (after instructions that write an open-ended register range).
    pub fn set_free_reg(&mut self, level: usize) -> Result<(), LimitError> {
        if level > MAX_REGISTERS {
            return Err(LimitError::Registers);
        }
        self.free_reg = level.max(self.locals.len());
        self.max_reg = self.max_reg.max(self.free_reg);
        Ok(())
    }

    pub fn resolve_local(&self, name: StringId) -> Option<&LocalVarInfo> {
        self.locals.iter().rev().find(|v| v.name == name)
    }

    pub fn find_loop_block_mut(&mut self) -> Option<&mut BlockScope> {
        self.blocks.iter_mut().rev().find(|b| b.is_loop)
    }

    pub fn current_block_mut(&mut self) -> Option<&mut BlockScope> {
        self.blocks.last_mut()
    }

    /// A label with this name visible from the current position.
    pub fn find_label(&self, name: StringId) -> Option<&LabelInfo> {
        self.blocks
            .iter()
            .rev()
            .flat_map(|b| b.labels.iter())
            .find(|l| l.name == name)
    }
}
