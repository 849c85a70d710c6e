//! Content-negotiated body codec.
//!
//! Request payloads are decoded into a [`RequestBody`] according to their declared
//! content type. Handler results are expressed as a closed set of
//! [`ResponseValue`] kinds and encoded into a response body plus content type.
use std::collections::BTreeMap;

use axum::body::Body;
use bytes::Bytes;
use eyre::WrapErr;
use http::{HeaderValue, Response, StatusCode, header};
use serde::Serialize;
use serde_json::{Value, ser::PrettyFormatter};

use crate::core::{error::HandlerError, sse::SseChannel};

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const EVENT_STREAM: &str = "text/event-stream";

/// Binary payload that remembers its declared MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime: String,
    pub bytes: Bytes,
}

impl Blob {
    pub fn new(mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }
}

/// Decoded request payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No payload was sent.
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Form(BTreeMap<String, String>),
    Binary(Bytes),
    Blob(Blob),
}

impl RequestBody {
    /// Decode `bytes` according to `content_type`.
    ///
    /// Without a content type, a UTF-8 payload that parses as JSON decodes to
    /// JSON and anything else is kept as raw bytes.
    pub fn decode(bytes: Bytes, content_type: Option<&str>) -> Result<Self, HandlerError> {
        if bytes.is_empty() {
            return Ok(Self::Empty);
        }

        let Some(declared) = content_type.map(str::trim).filter(|ct| !ct.is_empty()) else {
            return Ok(match serde_json::from_slice(&bytes) {
                Ok(value) => Self::Json(value),
                Err(_) => Self::Binary(bytes),
            });
        };
        let essence = mime_essence(declared);

        match essence.as_str() {
            TEXT_PLAIN | APPLICATION_JSON | FORM_URLENCODED => {
                let text = String::from_utf8(bytes.to_vec())
                    .wrap_err("request body is not valid UTF-8")?;

                if essence == APPLICATION_JSON {
                    let value = serde_json::from_str(&text)
                        .wrap_err("request body is not valid JSON")?;
                    return Ok(Self::Json(value));
                }

                // JSON is tried first for form payloads too; kept for compatibility.
                if let Ok(value) = serde_json::from_str(&text) {
                    return Ok(Self::Json(value));
                }

                if essence == FORM_URLENCODED {
                    Ok(Self::Form(decode_form(&text)))
                } else {
                    Ok(Self::Text(text))
                }
            }
            OCTET_STREAM => Ok(Self::Binary(bytes)),
            _ => Ok(Self::Blob(Blob::new(declared, bytes))),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Form(form) => Some(form),
            _ => None,
        }
    }

    /// JSON view of textual bodies. Binary payloads have none.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Empty => Some(Value::Null),
            Self::Text(text) => Some(Value::String(text.clone())),
            Self::Json(value) => Some(value.clone()),
            Self::Form(form) => Some(Value::Object(
                form.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            Self::Binary(_) | Self::Blob(_) => None,
        }
    }
}

/// Value produced by a handler, before encoding.
#[derive(Debug, Default)]
pub enum ResponseValue {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Form(BTreeMap<String, String>),
    Binary(Bytes),
    Blob(Blob),
    Stream(SseChannel),
}

/// Handler result: a value plus optional status and content-type overrides.
#[derive(Debug, Default)]
pub struct HandlerResponse {
    pub value: ResponseValue,
    pub status: Option<StatusCode>,
    pub content_type: Option<String>,
}

impl HandlerResponse {
    pub fn new(value: ResponseValue) -> Self {
        Self {
            value,
            status: None,
            content_type: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Serialize any value into a JSON response.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, HandlerError> {
        let value = serde_json::to_value(value).wrap_err("failed to serialize response")?;
        Ok(Self::new(ResponseValue::Json(value)))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ResponseValue::Text(text.into()))
    }

    pub fn form(form: BTreeMap<String, String>) -> Self {
        Self::new(ResponseValue::Form(form))
    }

    pub fn stream(channel: SseChannel) -> Self {
        Self::new(ResponseValue::Stream(channel))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Build the HTTP response. CORS headers are added by the dispatcher.
    pub fn encode(self) -> Result<Response<Body>, HandlerError> {
        let status = self.status.unwrap_or(StatusCode::OK);
        let override_type = self.content_type;

        let (content_type, body) = match self.value {
            ResponseValue::Empty => (None, Body::empty()),
            ResponseValue::Stream(channel) => {
                let mut response = Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, EVENT_STREAM)
                    .header(header::CACHE_CONTROL, "no-cache")
                    .body(Body::from_stream(channel.into_stream()))
                    .wrap_err("failed to build event stream response")?;
                response
                    .headers_mut()
                    .insert("x-accel-buffering", HeaderValue::from_static("no"));
                return Ok(response);
            }
            ResponseValue::Text(text) => (
                Some(override_type.unwrap_or_else(|| TEXT_PLAIN.to_string())),
                Body::from(text),
            ),
            ResponseValue::Form(form) => (
                Some(override_type.unwrap_or_else(|| FORM_URLENCODED.to_string())),
                Body::from(encode_form(&form)),
            ),
            ResponseValue::Binary(bytes) => (
                Some(override_type.unwrap_or_else(|| OCTET_STREAM.to_string())),
                Body::from(bytes),
            ),
            ResponseValue::Blob(blob) => (
                Some(override_type.unwrap_or(blob.mime)),
                Body::from(blob.bytes),
            ),
            ResponseValue::Json(value) => (
                Some(override_type.unwrap_or_else(|| APPLICATION_JSON.to_string())),
                Body::from(to_pretty_json(&value)?),
            ),
        };

        let mut builder = Response::builder().status(status);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        Ok(builder
            .body(body)
            .wrap_err("failed to build response")?)
    }
}

impl From<ResponseValue> for HandlerResponse {
    fn from(value: ResponseValue) -> Self {
        Self::new(value)
    }
}

impl From<Value> for HandlerResponse {
    fn from(value: Value) -> Self {
        Self::new(ResponseValue::Json(value))
    }
}

impl From<String> for HandlerResponse {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&str> for HandlerResponse {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<Bytes> for HandlerResponse {
    fn from(bytes: Bytes) -> Self {
        Self::new(ResponseValue::Binary(bytes))
    }
}

impl From<Blob> for HandlerResponse {
    fn from(blob: Blob) -> Self {
        Self::new(ResponseValue::Blob(blob))
    }
}

impl From<SseChannel> for HandlerResponse {
    fn from(channel: SseChannel) -> Self {
        Self::stream(channel)
    }
}

impl From<()> for HandlerResponse {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

/// `Type/Subtype; params` -> `type/subtype`
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn decode_form(text: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(text.as_bytes())
        .into_owned()
        .collect()
}

fn encode_form(form: &BTreeMap<String, String>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form)
        .finish()
}

/// JSON with four-space indentation.
pub fn to_pretty_json(value: &Value) -> Result<Vec<u8>, HandlerError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .wrap_err("failed to encode JSON response")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;

    async fn body_bytes(response: Response<Body>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn test_empty_payload_is_absent_for_every_type() {
        for ct in [None, Some(APPLICATION_JSON), Some(TEXT_PLAIN), Some("image/png")] {
            assert_eq!(RequestBody::decode(Bytes::new(), ct).unwrap(), RequestBody::Empty);
        }
    }

    #[test]
    fn test_plain_text_falls_back_to_text() {
        let body = RequestBody::decode(Bytes::from_static(b"str"), Some("text/plain;charset=UTF-8"))
            .unwrap();
        assert_eq!(body, RequestBody::Text("str".into()));
    }

    #[test]
    fn test_quoted_string_decodes_to_bare_text() {
        let body = RequestBody::decode(Bytes::from_static(b"\"str\""), Some(TEXT_PLAIN)).unwrap();
        assert_eq!(body.to_json(), Some(json!("str")));
    }

    #[test]
    fn test_plain_text_parses_json_opportunistically() {
        let body = RequestBody::decode(Bytes::from_static(b"{\"a\":1}"), Some(TEXT_PLAIN)).unwrap();
        assert_eq!(body, RequestBody::Json(json!({"a": 1})));
    }

    #[test]
    fn test_strict_json_rejects_malformed_payload() {
        let err = RequestBody::decode(Bytes::from_static(b"{nope"), Some(APPLICATION_JSON))
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_form_decodes_to_mapping() {
        let body =
            RequestBody::decode(Bytes::from_static(b"e=42&name=a+b"), Some(FORM_URLENCODED))
                .unwrap();
        let form = body.as_form().unwrap();
        assert_eq!(form.get("e").map(String::as_str), Some("42"));
        assert_eq!(form.get("name").map(String::as_str), Some("a b"));
    }

    #[test]
    fn test_form_payload_holding_json_decodes_to_mapping() {
        let body =
            RequestBody::decode(Bytes::from_static(b"{\"e\":\"42\"}"), Some(FORM_URLENCODED))
                .unwrap();
        assert_eq!(body.to_json(), Some(json!({"e": "42"})));
    }

    #[test]
    fn test_missing_content_type_is_binary() {
        let body = RequestBody::decode(Bytes::from_static(b"\x00\x01"), None).unwrap();
        assert_eq!(body, RequestBody::Binary(Bytes::from_static(b"\x00\x01")));

        let body = RequestBody::decode(Bytes::from_static(b"not json"), None).unwrap();
        assert_eq!(body, RequestBody::Binary(Bytes::from_static(b"not json")));
    }

    #[test]
    fn test_missing_content_type_parses_json_payload() {
        let body = RequestBody::decode(Bytes::from_static(b"\"str\""), None).unwrap();
        assert_eq!(body, RequestBody::Json(json!("str")));
        assert_eq!(body.to_json(), Some(json!("str")));
    }

    #[test]
    fn test_other_mime_becomes_blob() {
        let body = RequestBody::decode(Bytes::from_static(b"GIF89a"), Some("image/gif")).unwrap();
        assert_eq!(
            body,
            RequestBody::Blob(Blob::new("image/gif", Bytes::from_static(b"GIF89a")))
        );
    }

    #[test]
    fn test_invalid_utf8_text_is_a_fault() {
        let err = RequestBody::decode(Bytes::from_static(b"\xff\xfe"), Some(TEXT_PLAIN)).unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn test_json_encoding_uses_four_space_indent() {
        let response = HandlerResponse::from(json!({"message": "Hello World"}))
            .encode()
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], APPLICATION_JSON);
        assert_eq!(
            body_bytes(response).await,
            Bytes::from_static(b"{\n    \"message\": \"Hello World\"\n}")
        );
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let value = json!({"list": [1, 2, {"nested": null}], "flag": true, "s": "x"});
        let response = HandlerResponse::from(value.clone()).encode().unwrap();
        let decoded = RequestBody::decode(body_bytes(response).await, Some(APPLICATION_JSON)).unwrap();
        assert_eq!(decoded, RequestBody::Json(value));
    }

    #[tokio::test]
    async fn test_empty_value_has_no_content_type() {
        let response = HandlerResponse::empty().encode().unwrap();
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_text_content_type_override() {
        let response = HandlerResponse::text("<p>hi</p>")
            .with_content_type("text/html")
            .with_status(StatusCode::CREATED)
            .encode()
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    }

    #[tokio::test]
    async fn test_form_and_blob_encoding() {
        let mut form = BTreeMap::new();
        form.insert("e".to_string(), "42".to_string());
        let response = HandlerResponse::form(form).encode().unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], FORM_URLENCODED);
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"e=42"));

        let response = HandlerResponse::from(Blob::new("image/png", Bytes::from_static(b"png")))
            .encode()
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        let response = HandlerResponse::from(Bytes::from_static(b"raw")).encode().unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_stream_response_is_event_stream() {
        let channel = SseChannel::new();
        let sender = channel.sender();
        let response = HandlerResponse::stream(channel)
            .with_content_type("text/plain")
            .encode()
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], EVENT_STREAM);

        sender.send(&json!({"count": 0}), Some("event_name")).unwrap();
        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(&frame[..], b"event: event_name\ndata: {\"count\":0}\n\n");
    }
}
