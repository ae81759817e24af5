//! Stop-the-world mark and sweep over the heap, the string interner and
//! coroutine stacks.
//!
//! Collections only run at safe points of the outermost interpreter loop,
//! or from the host between calls, so every live value is reachable from a
//! thread stack, the globals, the registry or a prototype.

use crate::callinfo::CallFrame;
use crate::vm::Vm;
use moonlet_compiler::chunk::Constant;
use moonlet_core::gc::Marker;
use moonlet_core::value::{LuaFunction, LuaValue, ThreadId};

/// Slots in use by a thread's frames.
fn stack_extent(vm: &Vm, frames: &[CallFrame]) -> usize {
    frames
        .iter()
        .map(|f| (f.base + vm.protos[f.proto].chunk.max_stack_size as usize).max(f.top))
        .max()
        .unwrap_or(0)
}

impl Vm {
    /// Collect if enough was allocated since the last cycle, or if a
    /// collection was requested. Only the outermost loop collects.
    pub(crate) fn maybe_collect(&mut self) {
        if self.run_depth != 1 {
            return;
        }
        let grown = self.heap.debt + self.strings.len().saturating_sub(self.strings_at_last_gc);
        if self.gc_requested || (!self.gc_stopped && grown > self.config.gc_threshold) {
            self.collect_now();
        }
    }

    /// Run a full cycle. Inside a nested call the cycle is deferred to the
    /// next safe point.
    pub fn collect_garbage(&mut self) -> usize {
        if self.run_depth > 1 {
            self.gc_requested = true;
            return 0;
        }
        self.collect_now()
    }

    /// Stop or restart automatic collection.
    pub fn set_gc_running(&mut self, running: bool) {
        self.gc_stopped = !running;
    }

    pub fn gc_running(&self) -> bool {
        !self.gc_stopped
    }

    /// Approximate heap size in KiB, for `collectgarbage("count")`.
    pub fn memory_kb(&self) -> f64 {
        (self.heap.object_count() * 64 + self.strings.len() * 32) as f64 / 1024.0
    }

    /// Request a collection at the next safe point.
    pub(crate) fn request_gc(&mut self) {
        self.gc_requested = true;
    }

    fn clear_dead_slots(&mut self) {
        let extent = stack_extent(self, &self.frames);
        for slot in self.stack.iter_mut().skip(extent) {
            *slot = LuaValue::Nil;
        }
        for i in 0..self.threads.len() {
            let Some(t) = &self.threads[i] else { continue };
            let extent = stack_extent(self, &t.frames);
            if let Some(Some(t)) = self.threads.get_mut(i) {
                for slot in t.stack.iter_mut().skip(extent) {
                    *slot = LuaValue::Nil;
                }
            }
        }
    }

    fn mark_roots(&self, m: &mut Marker) {
        m.push(LuaValue::Table(self.globals));
        m.push(LuaValue::Table(self.registry));
        m.push(LuaValue::Table(self.loaded));
        if let Some(mt) = self.string_mt {
            m.push(LuaValue::Table(mt));
        }
        m.push(LuaValue::Function(LuaFunction::Lua(self.trampoline)));
        for name in self.names.all() {
            m.mark_string(name);
        }
        for entry in &self.protos {
            let chunk = &entry.chunk;
            for k in &chunk.constants {
                if let Constant::String(s) = k {
                    m.mark_string(*s);
                }
            }
            for local in &chunk.locals {
                m.mark_string(local.name);
            }
            for uv in &chunk.upvalues {
                m.mark_string(uv.name);
            }
        }
        m.threads.push(ThreadId::MAIN);
        m.threads.push(self.current);
    }

    fn mark_thread(&self, id: ThreadId, m: &mut Marker) {
        let Some(t) = self.thread(id) else { return };
        let (stack, frames, open) = if id == self.current {
            (&self.stack, &self.frames, &self.open_upvals)
        } else {
            (&t.stack, &t.frames, &t.open_upvals)
        };
        for &v in stack {
            m.push(v);
        }
        for frame in frames {
            m.push(LuaValue::Function(LuaFunction::Lua(frame.closure)));
            if let Some(p) = frame.protect {
                m.push(p.handler);
            }
        }
        for &(_, uv) in open {
            m.push_upval(uv);
        }
        m.push(t.body);
        if let Some(e) = t.error {
            m.push(e);
        }
        if let Some(link) = t.resume_to {
            m.threads.push(link.thread);
        }
    }

    fn collect_now(&mut self) -> usize {
        self.gc_requested = false;
        self.clear_dead_slots();
        let mut m = self.heap.begin_mark(self.strings.slot_count());
        self.mark_roots(&mut m);

        let mut marked = vec![false; self.threads.len()];
        loop {
            self.heap.propagate(&mut m);
            let mut progressed = false;
            while let Some(id) = m.threads.pop() {
                if let Some(seen) = marked.get_mut(id.index()) {
                    if !*seen {
                        *seen = true;
                        self.mark_thread(id, &mut m);
                        progressed = true;
                    }
                }
            }
            if progressed {
                continue;
            }
            // A suspended coroutine stays alive while a closure still
            // refers to one of its stack slots.
            for (i, t) in self.threads.iter().enumerate() {
                let Some(t) = t else { continue };
                if marked[i] {
                    continue;
                }
                if t.open_upvals.iter().any(|&(_, uv)| self.heap.upvals.is_marked(uv)) {
                    m.threads.push(ThreadId(i as u32));
                }
            }
            if m.threads.is_empty() && m.is_empty() {
                break;
            }
        }

        let stats = self.heap.sweep();
        let strings_freed = self.strings.sweep(&m.strings);
        let mut threads_freed = 0;
        for (i, slot) in self.threads.iter_mut().enumerate().skip(1) {
            if slot.is_some() && !marked[i] {
                *slot = None;
                threads_freed += 1;
            }
        }
        self.strings_at_last_gc = self.strings.len();
        let freed = stats.total() + strings_freed + threads_freed;
        tracing::debug!(
            freed,
            strings_freed,
            threads_freed,
            live = self.heap.object_count(),
            "gc cycle"
        );
        freed
    }
}
