//! Named lifecycle events.
//!
//! One handler per event name; registering again replaces the previous
//! handler. Emitting an event nobody listens to is logged, not fatal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: HashMap<String, EventHandler>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.handlers.insert(event.into(), Arc::new(handler));
        self
    }

    /// Invoke the handler for `event`. Returns false when none is registered.
    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        match self.handlers.get(event) {
            Some(handler) => {
                handler(args);
                true
            }
            None => {
                tracing::error!(event = %event, "Emitting on not found handler was ignored");
                false
            }
        }
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("events", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
