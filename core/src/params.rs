//! Query-string and form-body serialization.
//!
//! `Params` is an insertion-ordered mapping. Re-inserting an existing key
//! replaces its value in place, so the order of first insertion is what
//! `paramify` emits.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Everything except the characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Scalar(String),
    /// Serialized as one `key[]=value` pair per element.
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Scalar(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Scalar(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Scalar(value.to_string())
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Scalar(value.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Scalar(value.to_string())
    }
}

impl<T: Into<String>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Stringify a JSON scalar the way a query string would render it.
fn scalar_text(value: serde_json::Value) -> Result<String, String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Null => Ok("null".to_string()),
        other => Err(format!("expected a scalar parameter value, found {other}")),
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(scalar_text)
                .collect::<Result<Vec<_>, _>>()
                .map(ParamValue::List)
                .map_err(de::Error::custom),
            other => scalar_text(other).map(ParamValue::Scalar).map_err(de::Error::custom),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Scalar(value) => serializer.serialize_str(value),
            ParamValue::List(values) => values.serialize(serializer),
        }
    }
}

/// Insertion-ordered request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, keeping its original position if it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = Params;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of request parameters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Params, A::Error> {
                let mut params = Params::new();
                while let Some((key, value)) = map.next_entry::<String, ParamValue>()? {
                    params.insert(key, value);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(key, value)| (key, value)))
    }
}

fn encode(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// Serialize `params` as `k=v&k2[]=a&k2[]=b`.
///
/// With `leading_delimiter` the result is prefixed with `?`, unless it is
/// empty, in which case nothing is emitted at all.
pub fn paramify(params: &Params, leading_delimiter: bool) -> String {
    let mut pairs = Vec::with_capacity(params.len());

    for (key, value) in params.iter() {
        let key = encode(key);
        match value {
            ParamValue::Scalar(value) => pairs.push(format!("{key}={}", encode(value))),
            ParamValue::List(values) => {
                for value in values {
                    pairs.push(format!("{key}[]={}", encode(value)));
                }
            }
        }
    }

    let joined = pairs.join("&");
    if leading_delimiter && !joined.is_empty() {
        format!("?{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_never_emit_a_delimiter() {
        assert_eq!(paramify(&Params::new(), true), "");
        assert_eq!(paramify(&Params::new(), false), "");
    }

    #[test]
    fn empty_list_contributes_nothing() {
        let params: Params = [("tags", ParamValue::List(Vec::new()))].into_iter().collect();
        assert_eq!(paramify(&params, true), "");
    }

    #[test]
    fn lists_expand_to_repeated_bracket_keys() {
        let mut params = Params::new();
        params.insert("q", "rust");
        params.insert("tag", vec!["a", "b", "c"]);
        params.insert("page", 2i64);
        assert_eq!(
            paramify(&params, true),
            "?q=rust&tag[]=a&tag[]=b&tag[]=c&page=2"
        );
        assert_eq!(paramify(&params, false), "q=rust&tag[]=a&tag[]=b&tag[]=c&page=2");
    }

    #[test]
    fn keys_and_values_are_component_encoded() {
        let mut params = Params::new();
        params.insert("a b", "x&y=z");
        params.insert("safe", "-_.!~*'()");
        params.insert("unicode", "é/?");
        assert_eq!(
            paramify(&params, false),
            "a%20b=x%26y%3Dz&safe=-_.!~*'()&unicode=%C3%A9%2F%3F"
        );
    }

    #[test]
    fn reinsert_keeps_original_position() {
        let mut params = Params::new();
        params.insert("a", "1");
        params.insert("b", "2");
        params.insert("a", "3");
        assert_eq!(paramify(&params, false), "a=3&b=2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn deserializes_in_document_order_with_stringified_scalars() {
        let params: Params =
            serde_json::from_str(r#"{"z":1,"a":[true,null,"x"],"m":1.5}"#).unwrap();
        let keys: Vec<&str> = params.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(params.get("z"), Some(&ParamValue::Scalar("1".to_string())));
        assert_eq!(
            params.get("a"),
            Some(&ParamValue::List(vec![
                "true".to_string(),
                "null".to_string(),
                "x".to_string()
            ]))
        );
    }

    #[test]
    fn deserializing_from_a_json_value_keeps_document_order() {
        let value = serde_json::json!({"z": "1", "a": "2", "m": ["x", "y"]});
        let params: Params = serde_json::from_value(value).unwrap();
        assert_eq!(paramify(&params, false), "z=1&a=2&m[]=x&m[]=y");
    }

    #[test]
    fn nested_objects_are_rejected() {
        let result: Result<Params, _> = serde_json::from_str(r#"{"a":{"b":1}}"#);
        assert!(result.is_err());
    }
}
