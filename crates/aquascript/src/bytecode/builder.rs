//! Low-level instruction assembly: constant/global interning and
//! forward-jump patching, generalized from the teacher's `CodeBuilder`
//! idiom to this crate's `(opcode, operand)` instruction-list model.

use std::collections::HashMap;

use super::code::Constant;
use super::op::{Instruction, Opcode};

/// Deduplicates constants by equality on insertion, per spec.md §3.
#[derive(Debug, Default)]
pub struct ConstPool {
    constants: Vec<Constant>,
    index: HashMap<Constant, usize>,
}

impl ConstPool {
    pub fn add(&mut self, value: Constant) -> usize {
        if let Some(&idx) = self.index.get(&value) {
            return idx;
        }
        let idx = self.constants.len();
        self.index.insert(value.clone(), idx);
        self.constants.push(value);
        idx
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Constant> {
        self.constants
    }
}

/// Interns global variable names into a stable index table.
#[derive(Debug, Default)]
pub struct GlobalTable {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl GlobalTable {
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn add(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.index.insert(name.to_string(), idx);
        self.names.push(name.to_string());
        idx
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.names
    }
}

/// Patch sites collected for a single loop's `break`/`continue` statements.
/// `continue` jumps back to the loop's condition re-check; `break` jumps
/// past the loop's end, both resolved once the loop body is fully emitted.
#[derive(Debug, Default)]
pub struct LoopPatches {
    pub breaks: Vec<usize>,
    pub continues: Vec<usize>,
}

/// Builds one function body's (or the main program's) instruction list.
#[derive(Debug, Default)]
pub struct InstrBuilder {
    instructions: Vec<Instruction>,
    loop_stack: Vec<LoopPatches>,
}

impl InstrBuilder {
    pub fn emit(&mut self, op: Opcode, operand: i64) -> usize {
        let idx = self.instructions.len();
        self.instructions.push(Instruction::new(op, operand));
        idx
    }

    pub fn emit_bare(&mut self, op: Opcode) -> usize {
        self.emit(op, 0)
    }

    /// Emits a jump with a placeholder operand, to be filled in later via
    /// [`Self::patch`] once the jump target is known.
    pub fn emit_jump_placeholder(&mut self, op: Opcode) -> usize {
        self.emit(op, -1)
    }

    pub fn patch(&mut self, idx: usize, target: i64) {
        self.instructions[idx].operand = target;
    }

    /// Patches a jump instruction to land on the instruction that will be
    /// emitted next.
    pub fn patch_to_here(&mut self, idx: usize) {
        let here = self.pos() as i64;
        self.patch(idx, here);
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.instructions.len()
    }

    pub fn push_loop(&mut self) {
        self.loop_stack.push(LoopPatches::default());
    }

    pub fn pop_loop(&mut self) -> LoopPatches {
        self.loop_stack.pop().expect("loop stack underflow")
    }

    pub fn record_break(&mut self, idx: usize) {
        self.loop_stack
            .last_mut()
            .expect("break outside of loop")
            .breaks
            .push(idx);
    }

    pub fn record_continue(&mut self, idx: usize) {
        self.loop_stack
            .last_mut()
            .expect("continue outside of loop")
            .continues
            .push(idx);
    }

    pub fn in_loop(&self) -> bool {
        !self.loop_stack.is_empty()
    }

    #[must_use]
    pub fn finish(self) -> Vec<Instruction> {
        self.instructions
    }
}
