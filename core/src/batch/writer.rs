//! Batch request serializer.
//!
//! Produces the `multipart/mixed` body for a [`BatchRequest`]:
//!
//! ```text
//! \r\n--batch_xxxx-xxxx-xxxx\r\n
//! Content-Type: application/http\r\n
//! Content-Transfer-Encoding: binary\r\n
//! \r\n
//! GET Products(1) HTTP/1.1\r\n
//! Accept: application/json\r\n
//! \r\n
//! \r\n--batch_xxxx-xxxx-xxxx\r\n
//! Content-Type: multipart/mixed; boundary=changeset_xxxx-xxxx-xxxx\r\n
//! \r\n--changeset_xxxx-xxxx-xxxx\r\n
//! ...
//! \r\n--changeset_xxxx-xxxx-xxxx--\r\n
//! \r\n--batch_xxxx-xxxx-xxxx--\r\n
//! ```
//!
//! The boundary chosen for the outer envelope is recorded in the
//! serialization context's content type, so the caller can send a matching
//! `Content-Type` header.

use serde_json::Value;
use tracing::{debug, trace};

use super::boundary::{create_boundary, BATCH_PREFIX, CHANGESET_PREFIX};
use super::{BatchRequest, BatchRequestPart, Request};
use crate::content_type::{ContentType, BATCH_MEDIA_TYPE, HTTP_MEDIA_TYPE};
use crate::error::{BatchError, HandlerError};
use crate::handler::{Handlers, DATA_SERVICE_VERSION};

/// State for one top-level serialization.
#[derive(Debug)]
pub struct SerializationContext<'h> {
    content_type: ContentType,
    handlers: &'h Handlers,
}

impl<'h> SerializationContext<'h> {
    /// A context negotiating `multipart/mixed`.
    pub fn new(handlers: &'h Handlers) -> Self {
        Self::with_content_type(ContentType::new(BATCH_MEDIA_TYPE), handlers)
    }

    pub fn with_content_type(content_type: ContentType, handlers: &'h Handlers) -> Self {
        Self { content_type, handlers }
    }

    /// The outer content type, carrying the `boundary` once a batch has
    /// been written.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn into_content_type(self) -> ContentType {
        self.content_type
    }
}

/// What one sub-request is written with: the registry, and the content type
/// the request itself declares. Built fresh for every part.
#[derive(Debug, Clone, Copy)]
struct PartContext<'h, 'r> {
    handlers: &'h Handlers,
    request: &'r Request,
}

impl<'h, 'r> PartContext<'h, 'r> {
    fn new(handlers: &'h Handlers, request: &'r Request) -> Self {
        Self { handlers, request }
    }

    fn content_type(&self) -> Option<ContentType> {
        self.request.headers.get("Content-Type").and_then(ContentType::parse)
    }

    /// A copy of the request with default headers filled in and `data`
    /// encoded into the body.
    fn prepare(self) -> Result<Request, HandlerError> {
        let mut prepared = self.request.clone();
        prepared.headers.set_default("Accept", self.handlers.accept());

        if let (Some(data), None) = (&self.request.data, &self.request.body) {
            let (body, written_as) = self.handlers.write(data, self.content_type().as_ref())?;
            prepared.body = Some(body);
            prepared.headers.set_default("Content-Type", &written_as.to_string());
            prepared.headers.set_default("OData-Version", DATA_SERVICE_VERSION);
        }

        prepared.headers.set_default("OData-MaxVersion", self.handlers.max_version());
        Ok(prepared)
    }
}

/// Fill in default headers and encode `data` for a request sent on its own
/// or inside a batch.
pub(crate) fn prepare_request(handlers: &Handlers, request: &Request) -> Result<Request, HandlerError> {
    PartContext::new(handlers, request).prepare()
}

/// Serialize `batch` as a `multipart/mixed` body.
///
/// Returns `Ok(None)` when the context negotiates a media type other than
/// `multipart/mixed`, leaving the payload to another writer.
pub fn serialize(batch: &BatchRequest, ctx: &mut SerializationContext<'_>) -> Result<Option<String>, BatchError> {
    if !ctx.content_type.is(BATCH_MEDIA_TYPE) {
        return Ok(None);
    }

    let boundary = create_boundary(BATCH_PREFIX);
    let mut out = String::new();
    for part in &batch.requests {
        write_delimiter(&mut out, &boundary, false);
        write_part(&mut out, part, ctx.handlers, false)?;
    }
    write_delimiter(&mut out, &boundary, true);

    debug!(%boundary, parts = batch.len(), "serialized batch request");
    ctx.content_type.set_boundary(boundary);
    Ok(Some(out))
}

/// Serialize a batch given as its JSON description.
///
/// Fails with [`BatchError::NotABatch`] before any boundary is generated
/// when `value` has no `batchRequests` array.
pub fn serialize_value(value: &Value, ctx: &mut SerializationContext<'_>) -> Result<Option<String>, BatchError> {
    if !ctx.content_type.is(BATCH_MEDIA_TYPE) {
        return Ok(None);
    }
    let batch = BatchRequest::from_value(value)?;
    serialize(&batch, ctx)
}

fn write_delimiter(out: &mut String, boundary: &str, close: bool) {
    out.push_str("\r\n--");
    out.push_str(boundary);
    if close {
        out.push_str("--");
    }
    out.push_str("\r\n");
}

fn write_part(out: &mut String, part: &BatchRequestPart, handlers: &Handlers, nested: bool) -> Result<(), BatchError> {
    match part {
        BatchRequestPart::ChangeSet(change_set) => {
            if nested {
                return Err(BatchError::NestedChangeSet);
            }
            let boundary = create_boundary(CHANGESET_PREFIX);
            out.push_str(&format!("Content-Type: {BATCH_MEDIA_TYPE}; boundary={boundary}\r\n"));
            for member in change_set.requests() {
                write_delimiter(out, &boundary, false);
                write_part(out, member, handlers, true)?;
            }
            write_delimiter(out, &boundary, true);
            trace!(%boundary, members = change_set.requests().len(), "wrote change set");
        }
        BatchRequestPart::Request(request) => {
            out.push_str(&format!(
                "Content-Type: {HTTP_MEDIA_TYPE}\r\nContent-Transfer-Encoding: binary\r\n\r\n"
            ));
            let prepared = prepare_request(handlers, request)?;
            write_request(out, &prepared)?;
            trace!(method = %prepared.method, uri = %prepared.request_uri, "wrote request");
        }
    }
    Ok(())
}

/// `METHOD URI HTTP/1.1`, the non-empty headers, a blank line, the body.
///
/// Fails without writing anything when a header would break the line
/// structure of the part.
pub fn write_request(out: &mut String, request: &Request) -> Result<(), BatchError> {
    let breaks_line = |text: &str| text.contains(['\r', '\n']);
    if let Some((name, _)) = request
        .headers
        .iter()
        .find(|(name, value)| breaks_line(name) || breaks_line(value))
    {
        return Err(BatchError::InvalidHeader(name.to_string()));
    }

    out.push_str(&format!("{} {} HTTP/1.1\r\n", request.method, request.request_uri));
    for (name, value) in request.headers.iter() {
        if !value.is_empty() {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
    }
    out.push_str("\r\n");
    if let Some(body) = &request.body {
        out.push_str(body);
    }
    Ok(())
}
