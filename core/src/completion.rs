//! Settle-once result delivery and the two caller-facing adapters.
//!
//! # Design
//! Transports only ever see a `Completion`: a shared sink that accepts the
//! first outcome and ignores every later one. The dispatcher builds it either
//! around a caller's callback or around a oneshot channel whose receiving end
//! becomes a `ResponseFuture`. Neither transport knows which.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::RequestError;

/// Raw response body (XHR) or raw payload text (JSONP), or the failure.
pub type Outcome = Result<String, RequestError>;

pub type Callback = Box<dyn FnOnce(Outcome)>;

#[derive(Clone)]
pub struct Completion {
    sink: Rc<RefCell<Option<Callback>>>,
}

impl Completion {
    pub fn from_callback(callback: impl FnOnce(Outcome) + 'static) -> Self {
        Self {
            sink: Rc::new(RefCell::new(Some(Box::new(callback)))),
        }
    }

    /// A completion whose outcome is delivered over a oneshot channel.
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::from_callback(move |outcome| {
            // The receiver may already be gone.
            let _ = tx.send(outcome);
        });
        (completion, rx)
    }

    pub fn is_settled(&self) -> bool {
        self.sink.borrow().is_none()
    }

    /// Deliver `outcome` if nothing was delivered yet. Returns whether it was.
    pub fn settle(&self, outcome: Outcome) -> bool {
        let sink = self.sink.borrow_mut().take();
        match sink {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop the sink without delivering anything.
    pub(crate) fn discard(&self) {
        let sink = self.sink.borrow_mut().take();
        drop(sink);
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Cancels a pending operation. Cancelling never delivers an outcome and is
/// a no-op once the operation has settled or was already cancelled.
#[derive(Clone)]
pub struct CancelHandle {
    cancel: Rc<dyn Fn()>,
}

impl CancelHandle {
    pub(crate) fn new(cancel: impl Fn() + 'static) -> Self {
        Self {
            cancel: Rc::new(cancel),
        }
    }

    pub fn cancel(&self) {
        (self.cancel)()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelHandle")
    }
}

/// Resolves with the outcome of a dispatched request.
///
/// Dropping the future before it resolves cancels the request.
#[derive(Debug)]
pub struct ResponseFuture {
    rx: oneshot::Receiver<Outcome>,
    cancel: CancelHandle,
}

impl ResponseFuture {
    pub(crate) fn new(rx: oneshot::Receiver<Outcome>, cancel: CancelHandle) -> Self {
        Self { rx, cancel }
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }
}

impl Future for ResponseFuture {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(RequestError::Cancelled)))
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
