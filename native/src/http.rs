//! HTTP connections backed by `ureq`.
//!
//! # Design
//! `ureq` is blocking, so each exchange runs on tokio's blocking pool while a
//! local task waits for it and then runs the completion handler on the
//! dispatcher's thread. Aborting cancels the waiting task: the blocking call
//! may still finish, but its result is dropped and the handler never runs.
//! The agent's global timeout bounds how long such an orphaned call can hold
//! a blocking worker.
//! Non-2xx statuses are returned as data; transport failures, including a
//! body that cannot be read, become status 0. Bodies that are not valid
//! UTF-8 are decoded lossily.

use std::time::Duration;

use purejax_core::{
    CompletionHandler, HttpClientFactory, HttpConnection, HttpMethod, HttpRequest, HttpResponse,
};
use tokio::task::{self, AbortHandle};
use tracing::warn;

/// Upper bound on a single blocking exchange, body included.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(30);

/// An agent that reports every status as data rather than as an error.
pub fn agent() -> ureq::Agent {
    agent_with_timeout(WORKER_TIMEOUT)
}

/// Like [`agent`], with every exchange cut off after `limit`.
pub fn agent_with_timeout(limit: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(limit))
        .build()
        .new_agent()
}

/// Execute `request` synchronously.
pub fn execute(agent: &ureq::Agent, request: &HttpRequest) -> HttpResponse {
    let result = match request.method {
        HttpMethod::Get => {
            let mut builder = agent.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.call()
        }
        HttpMethod::Post => {
            let mut builder = agent.post(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.send(request.body.as_deref().unwrap_or_default().as_bytes())
        }
    };

    match result {
        Ok(mut response) => {
            let status = response.status().as_u16();
            match response.body_mut().read_to_vec() {
                Ok(bytes) => HttpResponse::new(status, String::from_utf8_lossy(&bytes).into_owned()),
                Err(err) => {
                    warn!(url = %request.url, status, error = %err, "failed to read response body");
                    HttpResponse::network_error()
                }
            }
        }
        Err(err) => {
            warn!(url = %request.url, error = %err, "http transport error");
            HttpResponse::network_error()
        }
    }
}

#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(agent())
    }
}

impl HttpClientFactory for UreqClient {
    fn create(&self) -> Box<dyn HttpConnection> {
        Box::new(UreqConnection {
            agent: self.agent.clone(),
            task: None,
        })
    }
}

pub struct UreqConnection {
    agent: ureq::Agent,
    task: Option<AbortHandle>,
}

impl HttpConnection for UreqConnection {
    /// Must be called from within a `LocalSet`.
    fn send(&mut self, request: HttpRequest, on_complete: CompletionHandler) {
        let agent = self.agent.clone();
        let handle = task::spawn_local(async move {
            let response = task::spawn_blocking(move || execute(&agent, &request))
                .await
                .unwrap_or_else(|err| {
                    warn!(error = %err, "http worker failed");
                    HttpResponse::network_error()
                });
            on_complete(response);
        });
        self.task = Some(handle.abort_handle());
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
