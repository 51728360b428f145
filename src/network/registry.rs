//! Registry of node actions, looked up by name at compile time

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::action::{ConstantAction, EchoAction, NodeAction, SumAction};

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<RwLock<HashMap<String, Arc<dyn NodeAction>>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `constant`, `sum` and `echo`
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ConstantAction));
        registry.register(Arc::new(SumAction));
        registry.register(Arc::new(EchoAction));
        registry
    }

    /// Register an action, returning the one it replaced
    pub fn register(&self, action: Arc<dyn NodeAction>) -> Option<Arc<dyn NodeAction>> {
        tracing::debug!("Registered action: {}", action.name());
        self.actions.write().insert(action.name().to_string(), action)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn NodeAction>> {
        self.actions.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NodeAction>> {
        self.actions.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.read().keys().cloned().collect();
        names.sort();
        names
    }
}
