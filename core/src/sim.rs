//! Deterministic in-process host.
//!
//! # Design
//! `SimHost` implements every capability in `host` on top of a virtual clock.
//! Nothing happens on its own: timers fire only when the clock is advanced,
//! HTTP exchanges complete only when `respond` is called, and scripts run
//! only when `load_script` is called. Embedders use it to drive the
//! dispatcher step by step in tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use percent_encoding::percent_decode_str;

use crate::host::{
    Clock, CompletionHandler, Environment, HttpClientFactory, HttpConnection, ScriptDocument,
    ScriptId, TimerId, Timers,
};
use crate::http::{HttpRequest, HttpResponse};
use crate::jsonp::CALLBACK_PARAM;
use crate::registry::CallbackRegistry;

/// Virtual epoch the clock starts at.
pub const SIM_EPOCH_MS: u64 = 1_700_000_000_000;

/// A request the host has seen, as observed by a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub request: HttpRequest,
    pub aborted: bool,
    pub completed: bool,
}

/// A script element the document has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedScript {
    pub id: ScriptId,
    pub src: String,
    pub attached: bool,
}

struct Exchange {
    request: HttpRequest,
    handler: Option<CompletionHandler>,
    aborted: bool,
    completed: bool,
}

struct Inner {
    now: Cell<u64>,
    next_id: Cell<u64>,
    timers: RefCell<BTreeMap<(u64, TimerId), Box<dyn FnOnce()>>>,
    exchanges: RefCell<Vec<Exchange>>,
    scripts: RefCell<Vec<InjectedScript>>,
    /// Attached script ids in document order.
    document_order: RefCell<Vec<ScriptId>>,
    registry: Rc<CallbackRegistry>,
}

impl Inner {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

#[derive(Clone)]
pub struct SimHost {
    inner: Rc<Inner>,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                now: Cell::new(SIM_EPOCH_MS),
                next_id: Cell::new(0),
                timers: RefCell::new(BTreeMap::new()),
                exchanges: RefCell::new(Vec::new()),
                scripts: RefCell::new(Vec::new()),
                document_order: RefCell::new(Vec::new()),
                registry: Rc::new(CallbackRegistry::new()),
            }),
        }
    }

    /// An environment wired to this host, with the sim client as the primary
    /// HTTP client.
    pub fn environment(&self) -> Environment {
        self.bare_environment().with_http(self.http_client())
    }

    /// Like `environment` but without any HTTP client.
    pub fn bare_environment(&self) -> Environment {
        Environment::new(
            Rc::new(SimTimers(Rc::clone(&self.inner))),
            Rc::new(SimDocument(Rc::clone(&self.inner))),
            Rc::clone(&self.inner.registry),
        )
        .with_clock(Rc::new(SimClock(Rc::clone(&self.inner))))
    }

    pub fn http_client(&self) -> Rc<dyn HttpClientFactory> {
        Rc::new(SimHttp(Rc::clone(&self.inner)))
    }

    pub fn registry(&self) -> &Rc<CallbackRegistry> {
        &self.inner.registry
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.now.get()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Move the clock forward, firing due timers in deadline order.
    pub fn advance(&self, ms: u64) {
        let target = self.inner.now.get() + ms;
        loop {
            let due = {
                let mut timers = self.inner.timers.borrow_mut();
                let is_due = matches!(
                    timers.first_key_value(),
                    Some((&(deadline, _), _)) if deadline <= target
                );
                if is_due {
                    timers.pop_first()
                } else {
                    None
                }
            };
            match due {
                Some(((deadline, _), callback)) => {
                    self.inner.now.set(deadline);
                    callback();
                }
                None => break,
            }
        }
        self.inner.now.set(target);
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.inner
            .exchanges
            .borrow()
            .iter()
            .map(|exchange| SentRequest {
                request: exchange.request.clone(),
                aborted: exchange.aborted,
                completed: exchange.completed,
            })
            .collect()
    }

    /// Complete the `index`-th exchange. Returns false if it was aborted or
    /// already completed.
    pub fn respond(&self, index: usize, status: u16, body: &str) -> bool {
        let handler = {
            let mut exchanges = self.inner.exchanges.borrow_mut();
            match exchanges.get_mut(index) {
                Some(exchange) if !exchange.aborted && !exchange.completed => {
                    exchange.completed = true;
                    exchange.handler.take()
                }
                _ => None,
            }
        };
        match handler {
            Some(handler) => {
                handler(HttpResponse::new(status, body));
                true
            }
            None => false,
        }
    }

    /// Complete an exchange as if the handler had ignored an abort.
    pub fn respond_even_if_aborted(&self, index: usize, status: u16, body: &str) -> bool {
        let handler = {
            let mut exchanges = self.inner.exchanges.borrow_mut();
            exchanges.get_mut(index).and_then(|exchange| {
                exchange.completed = true;
                exchange.handler.take()
            })
        };
        match handler {
            Some(handler) => {
                handler(HttpResponse::new(status, body));
                true
            }
            None => false,
        }
    }

    pub fn scripts(&self) -> Vec<InjectedScript> {
        self.inner.scripts.borrow().clone()
    }

    /// Sources of the attached scripts, in document order.
    pub fn attached_scripts(&self) -> Vec<String> {
        let scripts = self.inner.scripts.borrow();
        self.inner
            .document_order
            .borrow()
            .iter()
            .filter_map(|id| scripts.iter().find(|script| script.id == *id))
            .map(|script| script.src.clone())
            .collect()
    }

    /// Run script `id` as if its response were `name(payload)`, with `name`
    /// taken from the `callback` parameter of its URL. Returns whether a live
    /// handler received the payload.
    pub fn load_script(&self, id: ScriptId, payload: &str) -> bool {
        let src = self
            .inner
            .scripts
            .borrow()
            .iter()
            .find(|script| script.id == id)
            .map(|script| script.src.clone());
        match src.as_deref().and_then(callback_name) {
            Some(name) => self.inner.registry.invoke(&name, payload.to_string()),
            None => false,
        }
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

/// The decoded `callback` query parameter of `src`.
pub fn callback_name(src: &str) -> Option<String> {
    let (_, query) = src.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == CALLBACK_PARAM)
        .map(|(_, value)| percent_decode_str(value).decode_utf8_lossy().into_owned())
}

struct SimTimers(Rc<Inner>);

impl Timers for SimTimers {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.0.next_id());
        let deadline = self.0.now.get() + delay.as_millis() as u64;
        self.0.timers.borrow_mut().insert((deadline, id), callback);
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        let removed = {
            let mut timers = self.0.timers.borrow_mut();
            let key = timers.keys().find(|(_, timer)| *timer == id).copied();
            key.and_then(|key| timers.remove(&key))
        };
        drop(removed);
    }
}

struct SimClock(Rc<Inner>);

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.0.now.get()
    }
}

struct SimHttp(Rc<Inner>);

impl HttpClientFactory for SimHttp {
    fn create(&self) -> Box<dyn HttpConnection> {
        Box::new(SimConnection {
            inner: Rc::clone(&self.0),
            index: None,
        })
    }
}

struct SimConnection {
    inner: Rc<Inner>,
    index: Option<usize>,
}

impl HttpConnection for SimConnection {
    fn send(&mut self, request: HttpRequest, on_complete: CompletionHandler) {
        let mut exchanges = self.inner.exchanges.borrow_mut();
        self.index = Some(exchanges.len());
        exchanges.push(Exchange {
            request,
            handler: Some(on_complete),
            aborted: false,
            completed: false,
        });
    }

    fn abort(&mut self) {
        let Some(index) = self.index else {
            return;
        };
        // The handler stays; `respond_even_if_aborted` can still deliver it.
        if let Some(exchange) = self.inner.exchanges.borrow_mut().get_mut(index) {
            if !exchange.completed {
                exchange.aborted = true;
            }
        }
    }
}

struct SimDocument(Rc<Inner>);

impl ScriptDocument for SimDocument {
    fn inject(&self, src: &str) -> ScriptId {
        let id = ScriptId(self.0.next_id());
        self.0.scripts.borrow_mut().push(InjectedScript {
            id,
            src: src.to_string(),
            attached: true,
        });
        // Ahead of the first script element; an empty head just receives it.
        self.0.document_order.borrow_mut().insert(0, id);
        id
    }

    fn remove(&self, id: ScriptId) -> bool {
        let mut order = self.0.document_order.borrow_mut();
        let Some(position) = order.iter().position(|attached| *attached == id) else {
            return false;
        };
        order.remove(position);
        if let Some(script) = self
            .0
            .scripts
            .borrow_mut()
            .iter_mut()
            .find(|script| script.id == id)
        {
            script.attached = false;
        }
        true
    }
}
