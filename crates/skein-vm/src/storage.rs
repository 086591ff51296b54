//! Named variable storage.

use std::collections::HashMap;

use skein_core::Value;

/// Storage for the variables a dialogue program reads and writes.
///
/// The machine stores the top-of-stack value as observed; implementations
/// that only accept a narrower domain can reject in `set`. Reads of missing
/// variables are fatal to the run, so `get` distinguishes "absent" from any
/// stored value (including `Null`).
pub trait VariableStorage {
    /// Store a value under a name, replacing any previous value.
    fn set(&mut self, name: &str, value: Value);

    /// Fetch the value stored under a name.
    fn get(&self, name: &str) -> Option<Value>;

    /// Remove all stored variables.
    fn clear(&mut self);
}

/// Default in-memory variable storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    vars: HashMap<String, Value>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl VariableStorage for MemoryStorage {
    fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    fn clear(&mut self) {
        self.vars.clear();
    }
}
