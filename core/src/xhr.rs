//! Direct HTTP transport.
//!
//! # Design
//! `build_request` turns options into a plain `HttpRequest`; `send` hands it
//! to a host connection and races the completion notification against the
//! timeout timer. Whichever happens first moves the pending operation out of
//! `Phase::InFlight`; everything that arrives afterwards is ignored.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::completion::{CancelHandle, Completion};
use crate::error::RequestError;
use crate::host::{Environment, HttpConnection, TimerId};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::options::RequestOptions;
use crate::params::paramify;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Build the HTTP request for `options`.
///
/// GET carries the parameters in the query string. POST sends them as a
/// form-encoded body with the matching `Content-Type`; a caller-supplied
/// content type is dropped in favour of it. Other caller headers follow.
pub fn build_request(options: &RequestOptions) -> Result<HttpRequest, RequestError> {
    let url = options.url.as_deref().ok_or(RequestError::MissingUrl)?;

    match options.method {
        HttpMethod::Get => Ok(HttpRequest {
            method: HttpMethod::Get,
            url: format!("{url}{}", paramify(&options.params, true)),
            headers: options
                .headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: None,
        }),
        HttpMethod::Post => {
            let mut headers = vec![("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())];
            headers.extend(
                options
                    .headers
                    .iter()
                    .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
                    .map(|(name, value)| (name.to_string(), value.to_string())),
            );
            Ok(HttpRequest {
                method: HttpMethod::Post,
                url: url.to_string(),
                headers,
                body: Some(paramify(&options.params, false)),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    InFlight,
    TimedOut,
    Completed,
    Cancelled,
}

struct Pending {
    phase: Phase,
    timer: Option<TimerId>,
    connection: Option<Box<dyn HttpConnection>>,
}

/// Start an HTTP request. Option and client errors are returned before any
/// I/O; everything else arrives through `completion`.
pub fn send(
    env: &Environment,
    options: &RequestOptions,
    completion: Completion,
) -> Result<CancelHandle, RequestError> {
    let request = build_request(options)?;
    let mut connection = env.http_connection()?;

    let pending = Rc::new(RefCell::new(Pending {
        phase: Phase::InFlight,
        timer: None,
        connection: None,
    }));

    if options.timeout_ms > 0 {
        let ms = options.timeout_ms;
        let expired = Rc::clone(&pending);
        let completion = completion.clone();
        let id = env.timers().set_timeout(
            Duration::from_millis(ms),
            Box::new(move || {
                let connection = {
                    let mut state = expired.borrow_mut();
                    if state.phase != Phase::InFlight {
                        return;
                    }
                    state.phase = Phase::TimedOut;
                    state.timer = None;
                    state.connection.take()
                };
                debug!(ms, "http request timed out");
                completion.settle(Err(RequestError::Timeout { ms }));
                if let Some(mut connection) = connection {
                    connection.abort();
                }
            }),
        );
        pending.borrow_mut().timer = Some(id);
    }

    let on_complete = {
        let pending = Rc::clone(&pending);
        let timers = Rc::clone(env.timers());
        let completion = completion.clone();
        Box::new(move |response: HttpResponse| {
            let timer = {
                let mut state = pending.borrow_mut();
                if state.phase != Phase::InFlight {
                    return;
                }
                state.phase = Phase::Completed;
                state.connection = None;
                state.timer.take()
            };
            if let Some(id) = timer {
                timers.clear_timeout(id);
            }
            debug!(status = response.status, "http request completed");
            if response.is_success() {
                completion.settle(Ok(response.body));
            } else {
                completion.settle(Err(RequestError::Status {
                    code: response.status,
                }));
            }
        })
    };

    debug!(method = %request.method, url = %request.url, "sending http request");
    connection.send(request, on_complete);
    {
        let mut state = pending.borrow_mut();
        if state.phase == Phase::InFlight {
            state.connection = Some(connection);
        }
    }

    let timers = Rc::clone(env.timers());
    Ok(CancelHandle::new(move || {
        let (timer, connection) = {
            let mut state = pending.borrow_mut();
            if state.phase != Phase::InFlight {
                return;
            }
            state.phase = Phase::Cancelled;
            (state.timer.take(), state.connection.take())
        };
        if let Some(id) = timer {
            timers.clear_timeout(id);
        }
        if let Some(mut connection) = connection {
            connection.abort();
        }
        completion.discard();
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Headers, RequestOverrides};

    fn options(overrides: RequestOverrides) -> RequestOptions {
        RequestOptions::merge(&RequestOptions::default(), overrides).unwrap()
    }

    #[test]
    fn get_appends_query_string() {
        let req = build_request(&options(
            RequestOverrides::for_url("http://localhost:3000/search")
                .param("q", "rust lang")
                .param("tag", vec!["a", "b"]),
        ))
        .unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(
            req.url,
            "http://localhost:3000/search?q=rust%20lang&tag[]=a&tag[]=b"
        );
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn get_without_params_leaves_url_alone() {
        let req = build_request(&options(RequestOverrides::for_url("/x"))).unwrap();
        assert_eq!(req.url, "/x");
    }

    #[test]
    fn post_sends_form_body() {
        let req = build_request(&options(
            RequestOverrides::for_url("/submit")
                .method("post")
                .param("name", "a&b")
                .param("ids", vec!["1", "2"]),
        ))
        .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "/submit");
        assert_eq!(req.body.as_deref(), Some("name=a%26b&ids[]=1&ids[]=2"));
        assert_eq!(
            req.headers,
            vec![("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())]
        );
    }

    #[test]
    fn post_with_no_params_sends_empty_body() {
        let req = build_request(&options(RequestOverrides::for_url("/submit").method("POST")))
            .unwrap();
        assert_eq!(req.body.as_deref(), Some(""));
    }

    #[test]
    fn caller_headers_follow_the_form_content_type() {
        let mut headers = Headers::new();
        headers.insert("content-type", "application/json");
        headers.insert("X-Token", "abc");
        let mut overrides = RequestOverrides::for_url("/submit").method("post");
        overrides.headers = Some(headers);

        let req = build_request(&options(overrides)).unwrap();
        assert_eq!(req.header("Content-Type"), Some(FORM_CONTENT_TYPE));
        assert_eq!(req.header("x-token"), Some("abc"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn missing_url_is_rejected() {
        let err = build_request(&options(RequestOverrides::new())).unwrap_err();
        assert_eq!(err, RequestError::MissingUrl);
    }
}
