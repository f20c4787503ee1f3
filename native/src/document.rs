//! In-memory script document.
//!
//! Injected scripts are fetched over HTTP as soon as they are inserted. A
//! script that loads with a 2xx status and has the shape `name(payload);`
//! runs by invoking `name` in the callback registry; anything else is logged
//! and ignored, so the pending JSONP call simply times out.

use std::cell::RefCell;
use std::rc::Rc;

use purejax_core::jsonp::split_invocation;
use purejax_core::{CallbackRegistry, HttpMethod, HttpRequest, HttpResponse, ScriptDocument, ScriptId};
use tokio::task::{self, AbortHandle};
use tracing::{debug, warn};

use crate::http::execute;

struct ScriptElement {
    id: ScriptId,
    src: String,
    loading: AbortHandle,
}

#[derive(Default)]
struct DocumentState {
    next: u64,
    /// Attached scripts in document order.
    scripts: Vec<ScriptElement>,
}

pub struct NativeDocument {
    agent: ureq::Agent,
    registry: Rc<CallbackRegistry>,
    state: RefCell<DocumentState>,
}

impl NativeDocument {
    pub fn new(agent: ureq::Agent, registry: Rc<CallbackRegistry>) -> Self {
        Self {
            agent,
            registry,
            state: RefCell::new(DocumentState::default()),
        }
    }

    /// Sources of the attached scripts, in document order.
    pub fn attached_sources(&self) -> Vec<String> {
        self.state
            .borrow()
            .scripts
            .iter()
            .map(|script| script.src.clone())
            .collect()
    }
}

impl ScriptDocument for NativeDocument {
    /// Must be called from within a `LocalSet`.
    fn inject(&self, src: &str) -> ScriptId {
        let id = {
            let mut state = self.state.borrow_mut();
            state.next += 1;
            ScriptId(state.next)
        };

        let agent = self.agent.clone();
        let registry = Rc::clone(&self.registry);
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: src.to_string(),
            headers: Vec::new(),
            body: None,
        };
        let handle = task::spawn_local(async move {
            let url = request.url.clone();
            let response = task::spawn_blocking(move || execute(&agent, &request))
                .await
                .unwrap_or_else(|_| HttpResponse::network_error());
            if !response.is_success() {
                warn!(%url, status = response.status, "script failed to load");
                return;
            }
            run_script(&registry, &response.body);
        });

        // Ahead of the first script element; an empty head just receives it.
        self.state.borrow_mut().scripts.insert(
            0,
            ScriptElement {
                id,
                src: src.to_string(),
                loading: handle.abort_handle(),
            },
        );
        id
    }

    fn remove(&self, id: ScriptId) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            state
                .scripts
                .iter()
                .position(|script| script.id == id)
                .map(|position| state.scripts.remove(position))
        };
        match removed {
            Some(script) => {
                script.loading.abort();
                true
            }
            None => false,
        }
    }
}

/// Evaluate a loaded JSONP script against `registry`.
///
/// Returns whether a live callback received the payload.
pub fn run_script(registry: &CallbackRegistry, body: &str) -> bool {
    let Some((name, payload)) = split_invocation(body) else {
        warn!("script is not a single callback invocation");
        return false;
    };
    if let Err(err) = serde_json::from_str::<serde_json::Value>(payload) {
        warn!(callback = name, error = %err, "script payload is not valid JSON");
        return false;
    }
    debug!(callback = name, "running jsonp script");
    registry.invoke(name, payload.to_string())
}
