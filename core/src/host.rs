//! Host capabilities the transports are written against.
//!
//! # Design
//! The dispatcher never reaches for ambient globals. Everything it needs from
//! the environment (timers, an HTTP client, a script-loading document, a
//! clock, the callback registry, and whether futures are supported) comes
//! through an `Environment` assembled by the embedder. Swapping the
//! environment swaps the whole I/O layer: the `sim` module provides a
//! deterministic one, the native crate a tokio/ureq one.
//!
//! All handles are `Rc`: the model is single-threaded and callback-driven.

use std::fmt;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::RequestError;
use crate::http::{HttpRequest, HttpResponse};
use crate::registry::CallbackRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Delay-based callbacks.
pub trait Timers {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    /// Cancel a timer. Unknown or already-fired ids are ignored.
    fn clear_timeout(&self, id: TimerId);
}

pub type CompletionHandler = Box<dyn FnOnce(HttpResponse)>;

/// One in-flight HTTP exchange.
pub trait HttpConnection {
    /// Start the exchange. `on_complete` runs once all bytes have arrived,
    /// unless the connection is aborted first.
    fn send(&mut self, request: HttpRequest, on_complete: CompletionHandler);

    /// Abandon the exchange. `on_complete` may still run if the host cannot
    /// retract it; callers must tolerate that.
    fn abort(&mut self);
}

/// Produces fresh connections.
pub trait HttpClientFactory {
    fn create(&self) -> Box<dyn HttpConnection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u64);

/// The part of a document the JSONP transport touches.
pub trait ScriptDocument {
    /// Create a script element loading `src`, insert it ahead of the first
    /// script element (or into the head when there is none) and start
    /// loading it immediately.
    fn inject(&self, src: &str) -> ScriptId;

    /// Detach the element. Returns false if it was no longer attached.
    fn remove(&self, id: ScriptId) -> bool;
}

/// Wall-clock milliseconds, used for cache busting.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Capability provider handed to the dispatcher.
#[derive(Clone)]
pub struct Environment {
    timers: Rc<dyn Timers>,
    document: Rc<dyn ScriptDocument>,
    registry: Rc<CallbackRegistry>,
    clock: Rc<dyn Clock>,
    http: Option<Rc<dyn HttpClientFactory>>,
    fallback_http: Option<Rc<dyn HttpClientFactory>>,
    futures: bool,
}

impl Environment {
    /// An environment with the system clock, future support, and no HTTP
    /// client yet.
    pub fn new(
        timers: Rc<dyn Timers>,
        document: Rc<dyn ScriptDocument>,
        registry: Rc<CallbackRegistry>,
    ) -> Self {
        Self {
            timers,
            document,
            registry,
            clock: Rc::new(SystemClock),
            http: None,
            fallback_http: None,
            futures: true,
        }
    }

    pub fn with_http(mut self, factory: Rc<dyn HttpClientFactory>) -> Self {
        self.http = Some(factory);
        self
    }

    /// Used only when no primary client is present.
    pub fn with_fallback_http(mut self, factory: Rc<dyn HttpClientFactory>) -> Self {
        self.fallback_http = Some(factory);
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Callers must then always pass a callback.
    pub fn without_futures(mut self) -> Self {
        self.futures = false;
        self
    }

    pub fn supports_futures(&self) -> bool {
        self.futures
    }

    pub fn timers(&self) -> &Rc<dyn Timers> {
        &self.timers
    }

    pub fn document(&self) -> &Rc<dyn ScriptDocument> {
        &self.document
    }

    pub fn registry(&self) -> &Rc<CallbackRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    /// A fresh connection from the primary client, else the fallback.
    pub fn http_connection(&self) -> Result<Box<dyn HttpConnection>, RequestError> {
        self.http
            .as_ref()
            .or(self.fallback_http.as_ref())
            .map(|factory| factory.create())
            .ok_or(RequestError::NoHttpClient)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("registry", &self.registry)
            .field("http", &self.http.is_some())
            .field("fallback_http", &self.fallback_http.is_some())
            .field("futures", &self.futures)
            .finish()
    }
}
