use std::collections::HashMap;

use crate::ast::Value;

/// One frame of variable bindings.
///
/// The interpreter owns a single global frame; every top-level form, closure
/// call and `defun` call gets its own local frame. Frames are not chained:
/// lookups consult the local frame and then the global one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
        }
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Merged copy of a local frame over the global frame, as captured by `lambda`
    pub(crate) fn snapshot(local: &Environment, global: &Environment) -> Environment {
        let mut bindings = global.bindings.clone();
        bindings.extend(
            local
                .bindings
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        Environment { bindings }
    }

    /// Get all bindings in this frame
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut result: Vec<_> = self
            .bindings
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}
