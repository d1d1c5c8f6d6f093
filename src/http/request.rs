//! Request model shared by the gateway and microservice pipelines.
//!
//! # Responsibilities
//! - Split the raw URL into path and query string
//! - Decode the query string into a JSON object
//! - Parse the body as JSON (empty body = empty object)
//! - Carry the per-request session bag and extracted route params
//!
//! # Design Decisions
//! - Repeated query keys collapse into an array, single keys stay strings
//! - Header names are exposed lowercase when serialized

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::{Map, Value};

use crate::http::HttpError;

/// A request flowing through a middleware chain.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Map<String, Value>,
    pub body: Value,
    pub headers: HeaderMap,
    pub session: Map<String, Value>,
    /// Filled by the chain entry whose pattern matched.
    pub params: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Map::new(),
            body: Value::Object(Map::new()),
            headers: HeaderMap::new(),
            session: Map::new(),
            params: HashMap::new(),
        }
    }

    /// Build a request from what the HTTP transport hands over.
    pub fn from_http(
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: &[u8],
    ) -> Result<Self, HttpError> {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, query),
            None => (url, ""),
        };

        Ok(Self {
            method,
            path: path.to_string(),
            query: decode_query(query),
            body: parse_json_body(body)?,
            headers,
            session: Map::new(),
            params: HashMap::new(),
        })
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Headers as a JSON object; repeated headers are joined with `", "`.
    pub fn headers_json(&self) -> Map<String, Value> {
        headers_to_json(&self.headers)
    }
}

/// Header map as a JSON object; repeated headers are joined with `", "`.
pub fn headers_to_json(headers: &HeaderMap) -> Map<String, Value> {
    let mut object = Map::new();
    for (name, value) in headers.iter() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match object.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                object.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    object
}

/// Decode `a=1&b=2&b=3` into `{"a": "1", "b": ["2", "3"]}`.
pub fn decode_query(query: &str) -> Map<String, Value> {
    let mut object = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match object.get_mut(&*key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key.into_owned(), value);
            }
        }
    }
    object
}

/// Parse a JSON body. An empty or whitespace-only body yields `{}`.
pub fn parse_json_body(body: &[u8]) -> Result<Value, HttpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(HttpError::InvalidBody)
}

/// Rebuild a header map from a JSON object.
///
/// Arrays become repeated headers; invalid names or values are skipped.
pub fn headers_from_json(object: &Map<String, Value>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in object {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::debug!(header = %name, "Skipping invalid header name");
            continue;
        };
        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for value in values {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&text) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}
