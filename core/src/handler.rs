//! Payload handlers: encode and decode the body of one request or response
//! according to its declared content type.
//!
//! # Design
//! `Handlers` is an ordered registry. Reading picks the first handler that
//! claims the body's content type; a body nobody claims is left undecoded
//! rather than treated as a failure. Writing picks the handler for the
//! request's declared content type, defaulting to JSON.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::content_type::{ContentType, JSON_MEDIA_TYPE, TEXT_MEDIA_TYPE};
use crate::error::HandlerError;

pub const DEFAULT_ACCEPT: &str = "application/json;q=0.9, */*;q=0.1";
pub const MAX_DATA_SERVICE_VERSION: &str = "4.0";
pub const DATA_SERVICE_VERSION: &str = "4.0";

/// Encodes and decodes bodies of one family of media types.
pub trait PayloadHandler: Send + Sync {
    /// Whether this handler reads bodies of the given content type.
    fn can_read(&self, content_type: &ContentType) -> bool;

    /// Decode a body.
    fn read(&self, body: &str, content_type: &ContentType) -> Result<Value, HandlerError>;

    /// Whether this handler writes bodies of the given content type.
    fn can_write(&self, content_type: &ContentType) -> bool;

    /// Encode `data`, returning the body and the content type it was written as.
    fn write(&self, data: &Value) -> Result<(String, ContentType), HandlerError>;
}

/// `application/json` bodies as `serde_json::Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

impl PayloadHandler for JsonHandler {
    fn can_read(&self, content_type: &ContentType) -> bool {
        content_type.is(JSON_MEDIA_TYPE)
    }

    fn read(&self, body: &str, _content_type: &ContentType) -> Result<Value, HandlerError> {
        Ok(serde_json::from_str(body)?)
    }

    fn can_write(&self, content_type: &ContentType) -> bool {
        content_type.is(JSON_MEDIA_TYPE)
    }

    fn write(&self, data: &Value) -> Result<(String, ContentType), HandlerError> {
        Ok((serde_json::to_string(data)?, ContentType::new(JSON_MEDIA_TYPE)))
    }
}

/// `text/*` bodies as JSON string values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

impl PayloadHandler for TextHandler {
    fn can_read(&self, content_type: &ContentType) -> bool {
        content_type.is_type("text")
    }

    fn read(&self, body: &str, _content_type: &ContentType) -> Result<Value, HandlerError> {
        Ok(Value::String(body.to_string()))
    }

    fn can_write(&self, content_type: &ContentType) -> bool {
        content_type.is_type("text")
    }

    fn write(&self, data: &Value) -> Result<(String, ContentType), HandlerError> {
        match data {
            Value::String(text) => Ok((text.clone(), ContentType::new(TEXT_MEDIA_TYPE))),
            Value::Number(n) => Ok((n.to_string(), ContentType::new(TEXT_MEDIA_TYPE))),
            Value::Bool(b) => Ok((b.to_string(), ContentType::new(TEXT_MEDIA_TYPE))),
            other => Err(HandlerError::Unsupported {
                media_type: TEXT_MEDIA_TYPE.to_string(),
                kind: value_kind(other),
            }),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The payload handler registry shared by one client.
#[derive(Clone)]
pub struct Handlers {
    handlers: Vec<Arc<dyn PayloadHandler>>,
    accept: String,
    max_version: String,
}

impl Handlers {
    /// An empty registry: nothing is decoded and no data can be written.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
            accept: DEFAULT_ACCEPT.to_string(),
            max_version: MAX_DATA_SERVICE_VERSION.to_string(),
        }
    }

    pub fn with_handler(mut self, handler: impl PayloadHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn with_max_version(mut self, version: impl Into<String>) -> Self {
        self.max_version = version.into();
        self
    }

    /// Default `Accept` header value for requests that set none.
    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// Default `OData-MaxVersion` header value for requests that set none.
    pub fn max_version(&self) -> &str {
        &self.max_version
    }

    /// Decode `body` if some handler claims `content_type`.
    ///
    /// Returns `Ok(None)` when the type is missing, unclaimed, or the body
    /// is empty.
    pub fn read(&self, body: &str, content_type: Option<&ContentType>) -> Result<Option<Value>, HandlerError> {
        let Some(content_type) = content_type else {
            return Ok(None);
        };
        if body.is_empty() {
            return Ok(None);
        }
        match self.handlers.iter().find(|h| h.can_read(content_type)) {
            Some(handler) => handler.read(body, content_type).map(Some),
            None => Ok(None),
        }
    }

    /// Encode `data` with the handler for `content_type`, or as JSON when no
    /// type was declared.
    pub fn write(&self, data: &Value, content_type: Option<&ContentType>) -> Result<(String, ContentType), HandlerError> {
        let wanted = content_type.cloned().unwrap_or_else(|| ContentType::new(JSON_MEDIA_TYPE));
        match self.handlers.iter().find(|h| h.can_write(&wanted)) {
            Some(handler) => handler.write(data),
            None => Err(HandlerError::Unsupported {
                media_type: wanted.media_type().to_string(),
                kind: value_kind(data),
            }),
        }
    }
}

impl Default for Handlers {
    fn default() -> Self {
        Handlers::empty().with_handler(JsonHandler).with_handler(TextHandler)
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("handlers", &self.handlers.len())
            .field("accept", &self.accept)
            .field("max_version", &self.max_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn json_type() -> ContentType {
        ContentType::parse("application/json;odata.metadata=minimal").unwrap()
    }

    #[test]
    fn reads_json_bodies() {
        let data = Handlers::default().read(r#"{"ID":1}"#, Some(&json_type())).unwrap();
        assert_eq!(data, Some(json!({"ID": 1})));
    }

    #[test]
    fn reads_text_bodies_as_strings() {
        let ct = ContentType::parse("text/plain;charset=utf-8").unwrap();
        let data = Handlers::default().read("42", Some(&ct)).unwrap();
        assert_eq!(data, Some(json!("42")));
    }

    #[test]
    fn unclaimed_or_missing_type_is_not_decoded() {
        let handlers = Handlers::default();
        let xml = ContentType::parse("application/xml").unwrap();
        assert_eq!(handlers.read("<a/>", Some(&xml)).unwrap(), None);
        assert_eq!(handlers.read("{}", None).unwrap(), None);
        assert_eq!(handlers.read("", Some(&json_type())).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = Handlers::default().read("{not json", Some(&json_type())).unwrap_err();
        assert!(matches!(err, HandlerError::Json(_)));
    }

    #[test]
    fn writes_json_by_default() {
        let (body, ct) = Handlers::default().write(&json!({"Name": "Bread"}), None).unwrap();
        assert_eq!(body, r#"{"Name":"Bread"}"#);
        assert!(ct.is(JSON_MEDIA_TYPE));
    }

    #[test]
    fn text_handler_rejects_structured_data() {
        let ct = ContentType::new(TEXT_MEDIA_TYPE);
        let (body, _) = Handlers::default().write(&json!("hello"), Some(&ct)).unwrap();
        assert_eq!(body, "hello");

        let err = Handlers::default().write(&json!({"a": 1}), Some(&ct)).unwrap_err();
        assert!(matches!(err, HandlerError::Unsupported { kind: "object", .. }));
    }

    #[test]
    fn empty_registry_cannot_write() {
        let err = Handlers::empty().write(&json!(1), None).unwrap_err();
        assert!(matches!(err, HandlerError::Unsupported { .. }));
    }
}
