//! Request options and their defaults.
//!
//! # Design
//! `RequestOptions` is the canonical, fully-populated form every transport
//! consumes. Callers describe only what they want to change through
//! `RequestOverrides`, whose fields are all optional; `RequestOptions::merge`
//! lays the overrides over a set of defaults and returns a new value. The
//! merge is shallow: `params` and `headers` in an override replace the
//! defaults wholesale.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::RequestError;
use crate::http::HttpMethod;
use crate::params::{ParamValue, Params};

pub const DEFAULT_TIMEOUT_MS: u64 = 7000;

/// Reserved parameter carrying the cache-busting timestamp. Callers should
/// not use this key for their own parameters.
pub const CACHE_BUST_KEY: &str = "_";

/// Ordered request headers. Only the XHR transport sends them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(pub Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Headers, A::Error> {
                let mut headers = Headers::new();
                while let Some((name, value)) = map.next_entry::<String, String>()? {
                    headers.insert(name, value);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// Fully-resolved options for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub url: Option<String>,
    pub method: HttpMethod,
    /// Zero disables the timeout.
    pub timeout_ms: u64,
    /// When false, a timestamp is added under `CACHE_BUST_KEY`.
    pub cache: bool,
    pub params: Params,
    pub headers: Headers,
    /// Route through script injection instead of an HTTP connection.
    pub jsonp: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            url: None,
            method: HttpMethod::Get,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cache: false,
            params: Params::new(),
            headers: Headers::new(),
            jsonp: false,
        }
    }
}

impl RequestOptions {
    /// Lay `overrides` over `defaults`. Fails only on an unknown method.
    pub fn merge(
        defaults: &RequestOptions,
        overrides: RequestOverrides,
    ) -> Result<RequestOptions, RequestError> {
        let method = match overrides.method {
            Some(method) => method.parse()?,
            None => defaults.method,
        };

        Ok(RequestOptions {
            url: overrides.url.or_else(|| defaults.url.clone()),
            method,
            timeout_ms: overrides.timeout_ms.unwrap_or(defaults.timeout_ms),
            cache: overrides.cache.unwrap_or(defaults.cache),
            params: overrides.params.unwrap_or_else(|| defaults.params.clone()),
            headers: overrides.headers.unwrap_or_else(|| defaults.headers.clone()),
            jsonp: overrides.jsonp.unwrap_or(defaults.jsonp),
        })
    }
}

/// Caller-supplied changes to the defaults. Absent fields keep the default.
///
/// Deserializes from the familiar object shape, e.g.
/// `{"url": "/search", "method": "post", "timeout": 500, "params": {"q": "x"}}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOverrides {
    pub url: Option<String>,
    /// Any casing; validated during the merge.
    pub method: Option<String>,
    #[serde(rename = "timeout")]
    pub timeout_ms: Option<u64>,
    pub cache: Option<bool>,
    pub params: Option<Params>,
    pub headers: Option<Headers>,
    pub jsonp: Option<bool>,
}

impl RequestOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Add one parameter, starting from an empty set if none was given yet.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.get_or_insert_with(Params::new).insert(key, value);
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).insert(name, value);
        self
    }

    pub fn jsonp(mut self, jsonp: bool) -> Self {
        self.jsonp = Some(jsonp);
        self
    }
}
