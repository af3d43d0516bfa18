//! The flat, append-only class table.
//!
//! Per §9, instances hold a [`ClassId`] into this table rather than a
//! strong reference to a class object, so instance/class cycles never
//! need a tracing collector: `Rc`/`RefCell` alone is enough.

use indexmap::IndexMap;

use crate::value::{ClassId, Value};

/// A compiled class as it lives in the VM: its method table (name →
/// function-table key) and its parent, if any.
#[derive(Debug)]
pub struct ClassEntry {
    pub name: String,
    pub parent: Option<ClassId>,
    /// method name → function-table key (`<ClassName>.<methodName>`).
    pub methods: IndexMap<String, String>,
}

/// Append-only table of classes, indexed by [`ClassId`].
///
/// Populated during the load/init pass by `CREATE_CLASS`; a `CREATE_CLASS`
/// executed later at runtime (e.g. inside a function) simply appends
/// another entry, which is in-thread and therefore race-free (§5).
#[derive(Debug, Default)]
pub struct ClassTable {
    entries: Vec<ClassEntry>,
    by_name: IndexMap<String, ClassId>,
}

impl ClassTable {
    pub fn insert(&mut self, entry: ClassEntry) -> ClassId {
        let id = ClassId(self.entries.len() as u32);
        self.by_name.insert(entry.name.clone(), id);
        self.entries.push(entry);
        id
    }

    #[must_use]
    pub fn get(&self, id: ClassId) -> &ClassEntry {
        &self.entries[id.0 as usize]
    }

    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a method along the parent chain, returning the owning
    /// class's function-table key.
    #[must_use]
    pub fn resolve_method(&self, id: ClassId, name: &str) -> Option<&str> {
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let entry = self.get(cur);
            if let Some(key) = entry.methods.get(name) {
                return Some(key.as_str());
            }
            cursor = entry.parent;
        }
        None
    }

    /// True if `id` names `ancestor` or a descendant of it, used to test
    /// an exception's dynamic type against a `catch TypeName` clause.
    #[must_use]
    pub fn is_or_inherits(&self, id: ClassId, ancestor_name: &str) -> bool {
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let entry = self.get(cur);
            if entry.name == ancestor_name {
                return true;
            }
            cursor = entry.parent;
        }
        false
    }

    /// Instantiates `id` with its declared defaults as the instance's
    /// initial attribute map (currently always empty — AquaScript has no
    /// field-default syntax, but this is where it would be populated).
    #[must_use]
    pub fn default_attrs(&self, _id: ClassId) -> IndexMap<String, Value> {
        IndexMap::new()
    }
}
