//! OData `$batch` requests and responses.
//!
//! # Overview
//! A batch groups several HTTP operations into one `multipart/mixed`
//! envelope. Each part is either a single request or a change set: a group
//! of mutating requests the service applies atomically, carried in a nested
//! `multipart/mixed` envelope of its own. Change sets never nest.
//!
//! [`writer::serialize`] turns a [`BatchRequest`] into wire text and
//! [`reader::parse`] turns a response envelope back into a
//! [`BatchResponse`] with one entry per wire part, in order. A part that
//! failed is reported in place as a [`PartError`]; only a broken envelope
//! fails the whole call.

pub mod boundary;
pub mod cursor;
pub mod reader;
pub mod writer;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::content_type::ContentType;
use crate::error::BatchError;
use crate::http::{Headers, HttpMethod};

pub use reader::parse;
pub use writer::{serialize, serialize_value, SerializationContext};

/// One operation inside a batch or change set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_uri: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Headers,
    /// Pre-encoded body text. Takes precedence over `data`.
    #[serde(default)]
    pub body: Option<String>,
    /// Structured body, encoded by the payload handler for the request's
    /// `Content-Type` when no `body` is given.
    #[serde(default)]
    pub data: Option<Value>,
}

impl Request {
    pub fn new(method: HttpMethod, request_uri: impl Into<String>) -> Self {
        Self {
            request_uri: request_uri.into(),
            method,
            ..Self::default()
        }
    }

    pub fn get(request_uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, request_uri)
    }

    pub fn post(request_uri: impl Into<String>, data: Value) -> Self {
        Self::new(HttpMethod::Post, request_uri).with_data(data)
    }

    pub fn put(request_uri: impl Into<String>, data: Value) -> Self {
        Self::new(HttpMethod::Put, request_uri).with_data(data)
    }

    pub fn patch(request_uri: impl Into<String>, data: Value) -> Self {
        Self::new(HttpMethod::Patch, request_uri).with_data(data)
    }

    pub fn delete(request_uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, request_uri)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A group of requests the service executes as one unit.
///
/// Members built through [`ChangeSet::new`] and [`ChangeSet::with_request`]
/// are always single requests. A change set deserialized from untyped input
/// may still contain another change set; the writer rejects it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChangeSet {
    #[serde(rename = "changeRequests")]
    requests: Vec<BatchRequestPart>,
}

impl ChangeSet {
    pub fn new(requests: impl IntoIterator<Item = Request>) -> Self {
        Self {
            requests: requests.into_iter().map(BatchRequestPart::Request).collect(),
        }
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.requests.push(BatchRequestPart::Request(request));
        self
    }

    pub fn requests(&self) -> &[BatchRequestPart] {
        &self.requests
    }
}

/// A top-level batch entry.
///
/// In JSON, an object with a `changeRequests` key is a change set and any
/// other object is a request.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchRequestPart {
    ChangeSet(ChangeSet),
    Request(Request),
}

impl<'de> Deserialize<'de> for BatchRequestPart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("changeRequests").is_some() {
            ChangeSet::deserialize(value)
                .map(BatchRequestPart::ChangeSet)
                .map_err(de::Error::custom)
        } else {
            Request::deserialize(value)
                .map(BatchRequestPart::Request)
                .map_err(de::Error::custom)
        }
    }
}

/// The outbound batch: parts in wire order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchRequest {
    #[serde(rename = "batchRequests")]
    pub requests: Vec<BatchRequestPart>,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.requests.push(BatchRequestPart::Request(request));
        self
    }

    pub fn with_change_set(mut self, change_set: ChangeSet) -> Self {
        self.requests.push(BatchRequestPart::ChangeSet(change_set));
        self
    }

    /// Read a batch from its JSON description,
    /// `{ "batchRequests": [ request | { "changeRequests": [...] } ] }`.
    pub fn from_value(value: &Value) -> Result<Self, BatchError> {
        if !value.get("batchRequests").is_some_and(Value::is_array) {
            return Err(BatchError::NotABatch("missing batchRequests array".to_string()));
        }
        BatchRequest::deserialize(value).map_err(|e| BatchError::NotABatch(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// One HTTP response read out of a batch envelope.
///
/// The status fields are `None` when the part's status line was missing or
/// garbled; the raw body is still captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: Option<u16>,
    pub status_text: Option<String>,
    pub headers: Headers,
    pub body: String,
    pub data: Option<Value>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self.status_code, Some(200..=299))
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.headers.get("Content-Type").and_then(ContentType::parse)
    }
}

/// A part that failed: a non-2xx status, an undecodable body, or a change
/// set whose envelope could not be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartError {
    pub message: String,
    pub response: Response,
}

impl PartError {
    pub fn new(message: impl Into<String>, response: Response) -> Self {
        Self {
            message: message.into(),
            response,
        }
    }
}

/// Responses of one change set, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSetResponse {
    #[serde(rename = "changeResponses")]
    pub responses: Vec<BatchResponsePart>,
}

/// A top-level batch result entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchResponsePart {
    Response(Response),
    ChangeSet(ChangeSetResponse),
    Error(PartError),
}

impl BatchResponsePart {
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            BatchResponsePart::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn as_change_set(&self) -> Option<&ChangeSetResponse> {
        match self {
            BatchResponsePart::ChangeSet(change_set) => Some(change_set),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&PartError> {
        match self {
            BatchResponsePart::Error(error) => Some(error),
            _ => None,
        }
    }
}

/// The inbound batch: one entry per wire part, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResponse {
    #[serde(rename = "batchResponses")]
    pub responses: Vec<BatchResponsePart>,
}

impl BatchResponse {
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BatchResponsePart> {
        self.responses.iter()
    }
}
