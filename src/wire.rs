//! Messages exchanged with microservices over the broker.
//!
//! Both legs are UTF-8 JSON with camelCase keys.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http::Request;

/// Request leg, published on a microservice's requests queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub path: String,
    /// Lowercase HTTP method.
    pub method: String,
    pub payload: RequestPayload,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestPayload {
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub session: Map<String, Value>,
}

impl RequestMessage {
    pub fn from_request(req: &Request, request_id: impl Into<String>) -> Self {
        Self {
            path: req.path.clone(),
            method: req.method.as_str().to_lowercase(),
            payload: RequestPayload {
                query: req.query.clone(),
                body: req.body.clone(),
                headers: req.headers_json(),
                session: req.session.clone(),
            },
            request_id: request_id.into(),
        }
    }
}

/// Response leg, published on a microservice's responses queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    /// Absent means the reply is malformed and gets dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: Map<String, Value>,
    pub request_id: String,
}

fn default_status_code() -> u16 {
    200
}

impl ResponseMessage {
    /// Encode a body: UTF-8 text stays a string, anything else becomes a byte array.
    pub fn new(
        request_id: impl Into<String>,
        status_code: u16,
        headers: Map<String, Value>,
        body: &[u8],
    ) -> Self {
        let response = match std::str::from_utf8(body) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::Array(body.iter().map(|b| Value::from(*b)).collect()),
        };
        Self {
            response: Some(response),
            status_code,
            headers,
            request_id: request_id.into(),
        }
    }

    /// Decoded body, or `None` when `response` is absent or null.
    pub fn body(&self) -> Option<Bytes> {
        self.response.as_ref().and_then(decode_body)
    }
}

/// Accepts a string, an array of byte values, a `{"type": "Buffer", "data": [...]}`
/// object, or any other JSON value (sent serialized).
pub fn decode_body(value: &Value) -> Option<Bytes> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(Bytes::from(text.clone())),
        Value::Array(items) => byte_array(items).or_else(|| json_bytes(value)),
        Value::Object(object) if object.get("type").and_then(Value::as_str) == Some("Buffer") => {
            match object.get("data") {
                Some(Value::Array(items)) => byte_array(items),
                _ => json_bytes(value),
            }
        }
        other => json_bytes(other),
    }
}

fn byte_array(items: &[Value]) -> Option<Bytes> {
    items
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect::<Option<Vec<u8>>>()
        .map(Bytes::from)
}

fn json_bytes(value: &Value) -> Option<Bytes> {
    serde_json::to_vec(value).ok().map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn test_request_message_shape() {
        let mut req = Request::new(Method::POST, "/users/7")
            .with_body(json!({"name": "ada"}))
            .with_header("x-trace", "t1");
        req.query.insert("verbose".into(), json!("1"));
        req.session.insert("user".into(), json!("u1"));

        let message = RequestMessage::from_request(&req, "abc");
        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(
            encoded,
            json!({
                "path": "/users/7",
                "method": "post",
                "payload": {
                    "query": {"verbose": "1"},
                    "body": {"name": "ada"},
                    "headers": {"x-trace": "t1"},
                    "session": {"user": "u1"}
                },
                "requestId": "abc"
            })
        );
    }

    #[test]
    fn test_response_message_decoding() {
        let message: ResponseMessage = serde_json::from_value(json!({
            "response": "ok",
            "statusCode": 201,
            "headers": {"content-type": "text/plain"},
            "requestId": "id-1"
        }))
        .unwrap();
        assert_eq!(message.status_code, 201);
        assert_eq!(message.body().unwrap(), Bytes::from_static(b"ok"));
    }

    #[test]
    fn test_missing_response_has_no_body() {
        let message: ResponseMessage =
            serde_json::from_value(json!({"statusCode": 200, "requestId": "id-2"})).unwrap();
        assert!(message.body().is_none());

        let null: ResponseMessage =
            serde_json::from_value(json!({"response": null, "requestId": "id-3"})).unwrap();
        assert!(null.body().is_none());
        assert_eq!(null.status_code, 200);
    }

    #[test]
    fn test_body_encodings() {
        assert_eq!(decode_body(&json!([104, 105])).unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(
            decode_body(&json!({"type": "Buffer", "data": [111, 107]})).unwrap(),
            Bytes::from_static(b"ok")
        );
        assert_eq!(decode_body(&json!({"a": 1})).unwrap(), Bytes::from_static(br#"{"a":1}"#));
        assert_eq!(decode_body(&json!([1, "x"])).unwrap(), Bytes::from_static(br#"[1,"x"]"#));
    }

    #[test]
    fn test_binary_body_roundtrip() {
        let message = ResponseMessage::new("id", 200, Map::new(), &[0xff, 0x00]);
        assert_eq!(message.response, Some(json!([255, 0])));
        assert_eq!(message.body().unwrap(), Bytes::from_static(&[0xff, 0x00]));
    }
}
