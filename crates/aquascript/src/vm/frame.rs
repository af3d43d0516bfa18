//! Call-frame management.

use crate::bytecode::Instruction;
use crate::value::Value;

/// The activation record of a single function call, per spec.md §3.
///
/// Locals are a flat, pre-sized array: parameters occupy slots
/// `0..params.len()` in declaration order, with any further locals
/// declared by the function body appended after them (invariant 5 and
/// the `local_vars` layout in spec.md §3).
#[derive(Debug)]
pub struct CallFrame {
    /// Function-table key, e.g. `"fib"` or `"Counter.increment"`.
    pub function_name: String,
    pub pc: usize,
    pub locals: Vec<Value>,
}

impl CallFrame {
    #[must_use]
    pub fn new(function_name: String, local_count: usize, args: Vec<Value>) -> Self {
        let mut locals = args;
        locals.resize(local_count, Value::Nil);
        Self { function_name, pc: 0, locals }
    }

    #[must_use]
    pub fn current(&self, instructions: &[Instruction]) -> Option<Instruction> {
        instructions.get(self.pc).copied()
    }
}
