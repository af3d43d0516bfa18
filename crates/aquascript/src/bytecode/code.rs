//! The compiled-unit data model: constant pool, global table, function
//! table, and the main instruction list, per spec.md §3 and §4.4.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::op::Instruction;

/// A typed scalar living in the constant pool. Compound values (lists,
/// dicts) are never constant-folded — they are always built at runtime
/// via `BUILD_LIST`/`BUILD_DICT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
}

impl Eq for Constant {}

impl std::hash::Hash for Constant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Int(i) => i.hash(state),
            Constant::Float(f) => f.to_bits().hash(state),
            Constant::Str(s) => s.hash(state),
            Constant::Bool(b) => b.hash(state),
            Constant::Nil => {}
        }
    }
}

/// A function's compiled body. Class methods are stored under the name
/// `ClassName.methodName`, mirroring the original VM's function table
/// convention (confirmed against `optimized_aquavm.py`).
///
/// `local_vars` maps every local's name to its frame slot, params first
/// (slots `0..params.len()`) followed by any further declarations in
/// first-use order, per spec.md §3's compiled-unit data model. The VM
/// only needs the slot count to size a frame, but the names round-trip
/// through the container for fidelity and for `--debug` traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProto {
    pub name: String,
    pub params: Vec<String>,
    pub local_vars: IndexMap<String, u32>,
    pub instructions: Vec<Instruction>,
}

impl FunctionProto {
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.local_vars.len()
    }
}

/// A compiled class: its parent (if any) and the names of its methods in
/// the function table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassProto {
    pub name: String,
    pub parent: Option<String>,
    pub methods: Vec<String>,
}

/// A fully compiled program, ready to be serialized into a container or
/// handed straight to the VM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Code {
    pub constants: Vec<Constant>,
    pub globals: Vec<String>,
    pub functions: IndexMap<String, FunctionProto>,
    pub classes: IndexMap<String, ClassProto>,
    pub instructions: Vec<Instruction>,
}

impl Code {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
