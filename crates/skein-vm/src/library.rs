//! Host function libraries.
//!
//! A dialogue program calls back into its embedder through named functions.
//! The machine is library-agnostic: it looks functions up through the
//! [`Library`] trait and drives the argument protocol itself (see
//! `CallFunc` in the interpreter). [`FunctionTable`] is the default
//! registry implementation.

use std::collections::HashMap;
use std::sync::Arc;

use skein_core::Value;

/// A host function callable from a dialogue program.
pub trait Function: Send + Sync {
    /// Number of parameters this function takes, or `-1` for variadic.
    /// For variadic functions the actual count is popped from the stack
    /// before the arguments.
    fn param_count(&self) -> i32;

    /// Whether the result of [`Function::invoke`] should be pushed onto
    /// the stack.
    fn returns(&self) -> bool;

    /// Call the function. `args` are in declaration order (the value pushed
    /// first comes first).
    fn invoke(&self, args: &[Value]) -> Result<Value, String>;
}

/// Lookup of host functions by name.
pub trait Library {
    fn function(&self, name: &str) -> Option<&dyn Function>;
}

/// Map-backed function registry.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionTable {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function.
    pub fn add<F: Function + 'static>(&mut self, name: impl Into<String>, function: F) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Register a shared function.
    pub fn add_arc(&mut self, name: impl Into<String>, function: Arc<dyn Function>) {
        self.functions.insert(name.into(), function);
    }

    /// Register a closure with a fixed signature.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        param_count: i32,
        returns: bool,
        body: F,
    ) where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.add(
            name,
            FnFunction {
                param_count,
                returns,
                body,
            },
        );
    }

    /// Check whether a function is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl Library for FunctionTable {
    fn function(&self, name: &str) -> Option<&dyn Function> {
        self.functions.get(name).map(|f| f.as_ref())
    }
}

struct FnFunction<F> {
    param_count: i32,
    returns: bool,
    body: F,
}

impl<F> Function for FnFunction<F>
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync,
{
    fn param_count(&self) -> i32 {
        self.param_count
    }

    fn returns(&self) -> bool {
        self.returns
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        (self.body)(args)
    }
}
