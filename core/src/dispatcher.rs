//! Public entry point.
//!
//! # Design
//! `Dispatcher` owns an `Environment` and a set of defaults. Every request
//! goes through the same steps: merge the overrides, add the cache-busting
//! timestamp, build a `Completion`, and hand it to the transport selected by
//! `jsonp`. The callback and future flavours differ only in how the
//! `Completion` is built.

use tracing::debug;

use crate::completion::{CancelHandle, Completion, Outcome, ResponseFuture};
use crate::error::RequestError;
use crate::host::Environment;
use crate::options::{RequestOptions, RequestOverrides, CACHE_BUST_KEY};
use crate::{jsonp, xhr};

/// What `Dispatcher::request` hands back.
#[derive(Debug)]
pub enum Dispatched {
    /// No callback was given: await the outcome.
    Future(ResponseFuture),
    /// A callback was given: the outcome goes there.
    Cancel(CancelHandle),
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    env: Environment,
    defaults: RequestOptions,
}

impl Dispatcher {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            defaults: RequestOptions::default(),
        }
    }

    /// Replace the defaults every request's overrides are merged over.
    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    /// Merge `overrides` over the defaults and apply cache busting.
    pub fn normalize(&self, overrides: RequestOverrides) -> Result<RequestOptions, RequestError> {
        let mut options = RequestOptions::merge(&self.defaults, overrides)?;
        if !options.cache {
            options
                .params
                .insert(CACHE_BUST_KEY, self.env.clock().now_ms().to_string());
        }
        Ok(options)
    }

    /// Dispatch with an optional callback.
    ///
    /// A callback always wins. Without one, a future is returned if the
    /// environment supports futures; otherwise the call fails with
    /// `InvalidCallback` before any I/O.
    pub fn request(
        &self,
        overrides: RequestOverrides,
        callback: Option<Box<dyn FnOnce(Outcome)>>,
    ) -> Result<Dispatched, RequestError> {
        match callback {
            Some(callback) => self.send(overrides, callback).map(Dispatched::Cancel),
            None => self.fetch(overrides).map(Dispatched::Future),
        }
    }

    /// Dispatch and deliver the outcome to `callback`.
    pub fn send(
        &self,
        overrides: RequestOverrides,
        callback: impl FnOnce(Outcome) + 'static,
    ) -> Result<CancelHandle, RequestError> {
        self.dispatch(overrides, Completion::from_callback(callback))
    }

    /// Dispatch and return a future of the outcome.
    pub fn fetch(&self, overrides: RequestOverrides) -> Result<ResponseFuture, RequestError> {
        if !self.env.supports_futures() {
            return Err(RequestError::InvalidCallback);
        }
        let (completion, rx) = Completion::channel();
        let cancel = self.dispatch(overrides, completion)?;
        Ok(ResponseFuture::new(rx, cancel))
    }

    fn dispatch(
        &self,
        overrides: RequestOverrides,
        completion: Completion,
    ) -> Result<CancelHandle, RequestError> {
        let options = self.normalize(overrides)?;
        debug!(
            url = options.url.as_deref().unwrap_or_default(),
            method = %options.method,
            jsonp = options.jsonp,
            timeout_ms = options.timeout_ms,
            "dispatching request"
        );

        if options.jsonp {
            jsonp::send(&self.env, &options, completion)
        } else {
            xhr::send(&self.env, &options, completion)
        }
    }
}
