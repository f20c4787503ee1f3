//! Native host for `purejax-core`.
//!
//! # Overview
//! Provides real implementations of the core's host capabilities: timers as
//! tasks on a tokio `LocalSet`, HTTP connections through `ureq` on the
//! blocking pool, and an in-memory script document that fetches injected
//! scripts and runs their callback invocation.
//!
//! # Design
//! - Everything stays on one thread, matching the core's `Rc`-based model.
//!   Dispatching must therefore happen inside a `tokio::task::LocalSet`.
//! - One `CallbackRegistry` is shared by the JSONP transport and the
//!   document, so scripts resolve exactly the names the transport handed out.

pub mod document;
pub mod http;
pub mod timers;

use std::rc::Rc;

use purejax_core::{CallbackRegistry, Dispatcher, Environment};

pub use document::NativeDocument;
pub use http::UreqClient;
pub use timers::LocalTimers;

/// Timers, HTTP client, script document and callback registry for one
/// thread. Nothing here may be used outside a `tokio::task::LocalSet`.
pub struct NativeHost {
    timers: LocalTimers,
    document: Rc<NativeDocument>,
    registry: Rc<CallbackRegistry>,
    client: UreqClient,
}

impl NativeHost {
    pub fn new() -> Self {
        Self::with_agent(http::agent())
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        let registry = Rc::new(CallbackRegistry::new());
        Self {
            timers: LocalTimers::new(),
            document: Rc::new(NativeDocument::new(agent.clone(), Rc::clone(&registry))),
            registry,
            client: UreqClient::new(agent),
        }
    }

    pub fn environment(&self) -> Environment {
        Environment::new(
            Rc::new(self.timers.clone()),
            self.document.clone(),
            Rc::clone(&self.registry),
        )
        .with_http(Rc::new(self.client.clone()))
    }

    /// A dispatcher wired to this host.
    ///
    /// # Panics
    /// Requests sent through it spawn local tasks, so dispatching outside a
    /// `tokio::task::LocalSet` panics.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.environment())
    }

    pub fn timers(&self) -> &LocalTimers {
        &self.timers
    }

    pub fn document(&self) -> &Rc<NativeDocument> {
        &self.document
    }

    pub fn registry(&self) -> &Rc<CallbackRegistry> {
        &self.registry
    }
}

impl Default for NativeHost {
    fn default() -> Self {
        Self::new()
    }
}
