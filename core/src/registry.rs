//! Named callback table shared by the JSONP transport and the host document.
//!
//! Each JSONP call registers a handler under a generated name; the loaded
//! script resolves that name and invokes it with its payload. The counter is
//! owned by the registry and never resets, so names stay unique for the
//! registry's whole lifetime.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

/// Prefix of every generated callback name.
pub const CALLBACK_PREFIX: &str = "___pj";

pub type ScriptHandler = Box<dyn FnOnce(String)>;

pub struct CallbackRegistry {
    prefix: String,
    counter: Cell<u64>,
    handlers: RefCell<HashMap<String, ScriptHandler>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::with_prefix(CALLBACK_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Cell::new(0),
            handlers: RefCell::new(HashMap::new()),
        }
    }

    /// Reserve the next unique name.
    pub fn next_name(&self) -> String {
        let next = self.counter.get() + 1;
        self.counter.set(next);
        format!("{}{next}", self.prefix)
    }

    pub fn register(&self, name: &str, handler: ScriptHandler) {
        self.handlers.borrow_mut().insert(name.to_string(), handler);
    }

    /// Whether `name` still has a live handler.
    pub fn is_active(&self, name: &str) -> bool {
        self.handlers.borrow().contains_key(name)
    }

    /// Turn `name` into a no-op. Late invocations are silently ignored.
    pub fn neutralize(&self, name: &str) {
        let handler = self.handlers.borrow_mut().remove(name);
        drop(handler);
    }

    /// Run the handler registered under `name`, at most once.
    ///
    /// Returns false when the name is unknown or already neutralized.
    pub fn invoke(&self, name: &str, payload: String) -> bool {
        let handler = self.handlers.borrow_mut().remove(name);
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("prefix", &self.prefix)
            .field("counter", &self.counter.get())
            .field("active", &self.active_count())
            .finish()
    }
}
