use std::{collections::BTreeMap, time::Duration};

use axum::{
    extract::{Path, Query, RawQuery},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::debug;

/// What `/echo` saw of the request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// Query parameters of `/jsonp`.
#[derive(Deserialize)]
pub struct JsonpQuery {
    pub callback: Option<String>,
    #[serde(flatten)]
    pub rest: BTreeMap<String, String>,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", get(echo).post(echo))
        .route("/status/{code}", get(status))
        .route("/delay/{ms}", get(delay))
        .route("/jsonp", get(jsonp))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, headers: HeaderMap, RawQuery(query): RawQuery, body: String) -> Json<Echo> {
    debug!(%method, ?query, "echo");
    Json(Echo {
        method: method.to_string(),
        query,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    })
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

async fn delay(Path(ms): Path<u64>) -> String {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    format!("waited {ms}")
}

/// Wraps the remaining query parameters, as a JSON object, in a call to
/// the function named by `callback`.
async fn jsonp(Query(query): Query<JsonpQuery>) -> Result<impl IntoResponse, StatusCode> {
    let callback = query.callback.ok_or(StatusCode::BAD_REQUEST)?;
    let payload =
        serde_json::to_string(&query.rest).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((
        [(header::CONTENT_TYPE, "application/javascript")],
        format!("{callback}({payload});"),
    ))
}
