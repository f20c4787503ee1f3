//! End-to-end requests through the native host against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port in its own runtime thread, then
//! drives the dispatcher inside a `LocalSet` the way an embedder would.
//! Validates that both transports, timeouts and cancellation behave the same
//! over real sockets as they do against the simulated host.

use std::cell::RefCell;
use std::future::Future;
use std::io::{BufRead, BufReader, Write};
use std::rc::Rc;
use std::time::Duration;

use mock_server::Echo;
use purejax_core::{Outcome, RequestError, RequestOverrides};
use purejax_native::{http, NativeHost};
use tokio::task::LocalSet;

/// Start the mock server and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// Serve one connection with `raw` as the complete response, then close.
fn start_raw_server(raw: &'static [u8]) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
            line.clear();
        }
        let mut stream = reader.into_inner();
        stream.write_all(raw).unwrap();
    });

    format!("http://{addr}")
}

async fn local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

fn recorder() -> (Rc<RefCell<Vec<Outcome>>>, impl FnOnce(Outcome) + 'static) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    (log, move |outcome| sink.borrow_mut().push(outcome))
}

#[tokio::test]
async fn get_carries_params_and_cache_buster() {
    let base = start_server();
    local(async {
        let host = NativeHost::new();
        let dispatcher = host.dispatcher();

        let body = dispatcher
            .fetch(RequestOverrides::for_url(format!("{base}/echo")).param("q", "a b"))
            .unwrap()
            .await
            .unwrap();

        let echo: Echo = serde_json::from_str(&body).unwrap();
        assert_eq!(echo.method, "GET");
        let query = echo.query.unwrap();
        assert!(query.starts_with("q=a%20b&_="), "unexpected query {query}");
        assert_eq!(host.timers().active(), 0);
    })
    .await;
}

#[tokio::test]
async fn post_sends_form_encoded_body() {
    let base = start_server();
    local(async {
        let host = NativeHost::new();
        let dispatcher = host.dispatcher();

        let body = dispatcher
            .fetch(
                RequestOverrides::for_url(format!("{base}/echo"))
                    .method("post")
                    .cache(true)
                    .param("title", "Buy milk")
                    .param("ids", vec!["1", "2"]),
            )
            .unwrap()
            .await
            .unwrap();

        let echo: Echo = serde_json::from_str(&body).unwrap();
        assert_eq!(echo.method, "POST");
        assert_eq!(
            echo.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(echo.body, "title=Buy%20milk&ids[]=1&ids[]=2");
        assert_eq!(echo.query, None);
    })
    .await;
}

#[tokio::test]
async fn non_2xx_rejects_with_status() {
    let base = start_server();
    local(async {
        let dispatcher = NativeHost::new().dispatcher();

        let err = dispatcher
            .fetch(RequestOverrides::for_url(format!("{base}/status/404")))
            .unwrap()
            .await
            .unwrap_err();

        assert_eq!(err, RequestError::Status { code: 404 });
    })
    .await;
}

#[tokio::test]
async fn unreachable_server_reports_status_zero() {
    local(async {
        let dispatcher = NativeHost::new().dispatcher();

        let err = dispatcher
            .fetch(RequestOverrides::for_url("http://127.0.0.1:1/unreachable"))
            .unwrap()
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(0));
    })
    .await;
}

#[tokio::test]
async fn slow_response_times_out_exactly_once() {
    let base = start_server();
    local(async {
        let host = NativeHost::new();
        let dispatcher = host.dispatcher();
        let (log, callback) = recorder();

        dispatcher
            .send(
                RequestOverrides::for_url(format!("{base}/delay/300")).timeout_ms(50),
                callback,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*log.borrow(), vec![Err(RequestError::Timeout { ms: 50 })]);
        assert_eq!(host.timers().active(), 0);
    })
    .await;
}

#[tokio::test]
async fn jsonp_round_trip_delivers_payload_and_cleans_up() {
    let base = start_server();
    local(async {
        let host = NativeHost::new();
        let dispatcher = host.dispatcher();

        let payload = dispatcher
            .fetch(
                RequestOverrides::for_url(format!("{base}/jsonp"))
                    .jsonp(true)
                    .cache(true)
                    .param("q", "rust"),
            )
            .unwrap()
            .await
            .unwrap();

        assert_eq!(payload, r#"{"q":"rust"}"#);
        assert!(host.document().attached_sources().is_empty());
        assert_eq!(host.registry().active_count(), 0);
        assert_eq!(host.timers().active(), 0);
    })
    .await;
}

#[tokio::test]
async fn jsonp_script_that_fails_to_load_times_out() {
    let base = start_server();
    local(async {
        let dispatcher = NativeHost::new().dispatcher();

        let err = dispatcher
            .fetch(
                RequestOverrides::for_url(format!("{base}/status/404"))
                    .jsonp(true)
                    .timeout_ms(100),
            )
            .unwrap()
            .await
            .unwrap_err();

        assert_eq!(err, RequestError::Timeout { ms: 100 });
    })
    .await;
}

#[tokio::test]
async fn cancelled_jsonp_never_reports() {
    let base = start_server();
    local(async {
        let host = NativeHost::new();
        let dispatcher = host.dispatcher();
        let (log, callback) = recorder();

        let cancel = dispatcher
            .send(
                RequestOverrides::for_url(format!("{base}/jsonp")).jsonp(true),
                callback,
            )
            .unwrap();
        cancel.cancel();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(log.borrow().is_empty());
        assert!(host.document().attached_sources().is_empty());
        assert_eq!(host.registry().active_count(), 0);
        assert_eq!(host.timers().active(), 0);
    })
    .await;
}

#[tokio::test]
async fn body_that_is_not_utf8_is_decoded_lossily() {
    let base = start_raw_server(
        b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\ncaf\xe9 ok",
    );
    local(async {
        let dispatcher = NativeHost::new().dispatcher();

        let body = dispatcher
            .fetch(RequestOverrides::for_url(format!("{base}/latin1")).cache(true))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(body, "caf\u{FFFD} ok");
    })
    .await;
}

#[tokio::test]
async fn truncated_body_reports_status_zero() {
    let base = start_raw_server(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial",
    );
    local(async {
        let dispatcher = NativeHost::new().dispatcher();

        let err = dispatcher
            .fetch(RequestOverrides::for_url(format!("{base}/short")).cache(true))
            .unwrap()
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(0));
    })
    .await;
}

#[tokio::test]
async fn agent_timeout_bounds_requests_without_a_dispatcher_timer() {
    let base = start_server();
    local(async {
        let host = NativeHost::with_agent(http::agent_with_timeout(Duration::from_millis(100)));
        let dispatcher = host.dispatcher();

        let started = std::time::Instant::now();
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher
                .fetch(RequestOverrides::for_url(format!("{base}/delay/5000")).timeout_ms(0))
                .unwrap(),
        )
        .await
        .expect("the agent timeout should end the exchange")
        .unwrap_err();

        assert_eq!(err.status_code(), Some(0));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(host.timers().active(), 0);
    })
    .await;
}

#[tokio::test]
#[should_panic]
async fn dispatching_outside_a_local_set_panics() {
    let dispatcher = NativeHost::new().dispatcher();
    let _ = dispatcher.fetch(RequestOverrides::for_url("http://127.0.0.1:1/x"));
}
