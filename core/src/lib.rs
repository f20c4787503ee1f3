//! Dual-transport request dispatcher.
//!
//! # Overview
//! One entry point, `Dispatcher::request`, issues either a direct HTTP call
//! or a JSONP script-injection call, and reports both through the same
//! callback-or-future contract with timeouts, cancellation and cache busting.
//!
//! # Design
//! - The dispatcher never touches the network itself. Timers, HTTP
//!   connections, the script document and the clock are capabilities of an
//!   `Environment` supplied by the embedder (host-does-IO pattern).
//! - `sim::SimHost` is a deterministic environment; the `purejax-native`
//!   crate provides a tokio/ureq one.
//! - The model is single-threaded: handles are `Rc`, callbacks are not
//!   `Send`.
//! - Each pending operation settles at most once; whichever of completion,
//!   timeout or cancellation comes first wins.

pub mod completion;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod http;
pub mod jsonp;
pub mod options;
pub mod params;
pub mod registry;
pub mod sim;
pub mod xhr;

pub use completion::{CancelHandle, Completion, Outcome, ResponseFuture};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::RequestError;
pub use host::{
    Clock, CompletionHandler, Environment, HttpClientFactory, HttpConnection, ScriptDocument,
    ScriptId, SystemClock, TimerId, Timers,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use options::{Headers, RequestOptions, RequestOverrides, CACHE_BUST_KEY};
pub use params::{paramify, ParamValue, Params};
pub use registry::CallbackRegistry;
