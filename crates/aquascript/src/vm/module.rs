//! Pluggable module resolution for `IMPORT_MODULE`/`IMPORT_FROM`.
//!
//! §9 re-architects the source's dynamic Python-interop "bridge" into a
//! resolver trait the embedder supplies: given a module name, return a
//! value (conventionally a dict of exported names). The default resolver
//! always fails, matching the documented fallback behavior.

use crate::value::Value;

/// Resolves an AquaScript `import` to a runtime value.
pub trait ModuleResolver {
    /// Resolves `module` (the full dotted name as written in source) to a
    /// value, typically a [`Value::Dict`] of exported names.
    fn resolve(&self, module: &str) -> Result<Value, String>;
}

/// The default resolver: every module lookup fails with a fixed message,
/// per spec.md §9 ("a useful default is an empty resolver that fails with
/// 'module not found'").
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl ModuleResolver for NullResolver {
    fn resolve(&self, module: &str) -> Result<Value, String> {
        Err(format!("module not found: '{module}'"))
    }
}
