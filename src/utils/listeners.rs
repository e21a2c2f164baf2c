//! Multi-subscriber callback registry
//!
//! Handlers are invoked synchronously, in registration order. Dispatch works
//! on a snapshot so a handler may register further handlers without
//! deadlocking; those only see subsequent emissions.

use parking_lot::RwLock;
use std::sync::Arc;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Listeners<T> {
    handlers: RwLock<Vec<Handler<T>>>,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler
    pub fn add<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Invoke every handler with `payload`, returning how many ran
    pub fn emit(&self, payload: &T) -> usize {
        let snapshot: Vec<Handler<T>> = self.handlers.read().clone();
        for handler in &snapshot {
            handler(payload);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}
