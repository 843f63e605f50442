//! Batch response parser.
//!
//! # Parsing Flow
//!
//! For each multipart body (the outer batch, or one nested change set):
//!
//! 1. Skip the preamble up to and including the first delimiter line.
//! 2. For every part: read its MIME headers, then either
//!    - recurse into a nested `multipart/mixed` change set, or
//!    - read one `application/http` response block, ending at
//!      `\r\n--<boundary>`.
//! 3. Stop after the closing `--<boundary>--` delimiter or at the end of
//!    the text.
//!
//! A non-2xx status, a body the payload handler rejects, or a change set
//! that cannot be read becomes a `PartError` in the result. An unknown part
//! type or a missing outer delimiter fails the whole parse.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use super::cursor::Cursor;
use super::{BatchResponse, BatchResponsePart, ChangeSetResponse, PartError, Response};
use crate::content_type::{ContentType, BATCH_MEDIA_TYPE, HTTP_MEDIA_TYPE};
use crate::error::BatchError;
use crate::handler::Handlers;
use crate::http::Headers;

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^HTTP/1\.\d (\d{3}) (.*)$").expect("valid status line pattern"));

/// `Name: Value`, with the name restricted to RFC 7230 token characters.
static HEADER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([^()<>@,;:\\"/\[\]?={} \t]+)\s?:\s?(.*)$"#).expect("valid header line pattern")
});

/// Parse a batch response body.
///
/// `content_type` is the response's `Content-Type`; its `boundary`
/// parameter delimits the outer envelope. 2xx parts are decoded with
/// `handlers`.
pub fn parse(text: &str, content_type: &ContentType, handlers: &Handlers) -> Result<BatchResponse, BatchError> {
    let boundary = content_type.boundary().ok_or(BatchError::MissingBoundary)?;
    let mut cursor = Cursor::new(text, boundary);
    let responses = read_batch(&mut cursor, handlers)?;
    debug!(boundary, parts = responses.len(), "parsed batch response");
    Ok(BatchResponse { responses })
}

fn read_batch(cursor: &mut Cursor<'_>, handlers: &Handlers) -> Result<Vec<BatchResponsePart>, BatchError> {
    let delimiter = cursor.delimiter();

    cursor
        .read_to(&delimiter)
        .ok_or_else(|| BatchError::MissingDelimiter(delimiter.clone()))?;
    // `--b--` right away: a multipart body with no parts
    let mut closed = cursor.remaining().starts_with("--");
    cursor.skip_line();

    let mut parts = Vec::new();
    while !closed && !cursor.is_at_end() {
        let headers = read_headers(cursor);
        let part_type = headers.get("Content-Type").and_then(ContentType::parse);

        match part_type {
            Some(part_type) if part_type.is(BATCH_MEDIA_TYPE) => {
                parts.push(read_change_set(cursor, &part_type, &delimiter, handlers)?);
            }
            Some(part_type) if part_type.is(HTTP_MEDIA_TYPE) => {
                // blank line between the MIME headers and the HTTP block
                cursor.skip_line();
                let response = read_response(cursor, &delimiter)?;
                parts.push(decode_part(response, handlers));
            }
            other => {
                return Err(BatchError::InvalidPartType(
                    other.map(|ct| ct.media_type().to_string()),
                ))
            }
        }

        closed = cursor.remaining().starts_with("--");
        cursor.skip_line();
    }

    Ok(parts)
}

/// Read a nested change set. On return the cursor sits just past the next
/// outer delimiter, whether or not the change set could be read.
fn read_change_set(
    cursor: &mut Cursor<'_>,
    part_type: &ContentType,
    delimiter: &str,
    handlers: &Handlers,
) -> Result<BatchResponsePart, BatchError> {
    let nested = match part_type.boundary() {
        Some(boundary) => {
            cursor.push_boundary(boundary);
            let nested = read_batch(cursor, handlers);
            cursor.pop_boundary();
            nested
        }
        None => Err(BatchError::MissingBoundary),
    };

    let responses = match nested {
        Ok(responses) => {
            cursor
                .read_to(delimiter)
                .ok_or_else(|| BatchError::MissingDelimiter(delimiter.to_string()))?;
            responses
        }
        Err(err) => {
            debug!(error = %err, "change set could not be read");
            let response = read_broken_part(cursor, delimiter)?;
            vec![BatchResponsePart::Error(PartError::new(err.to_string(), response))]
        }
    };

    trace!(responses = responses.len(), "read change set");
    Ok(BatchResponsePart::ChangeSet(ChangeSetResponse { responses }))
}

/// Read `Name: Value` lines up to, but not including, the first line that
/// is not a header.
fn read_headers(cursor: &mut Cursor<'_>) -> Headers {
    let mut headers = Headers::new();
    loop {
        let mark = cursor.mark();
        let Some(line) = cursor.read_line() else {
            break;
        };
        match HEADER_LINE.captures(line) {
            Some(caps) => headers.set(&caps[1], &caps[2]),
            None => {
                cursor.reset(mark);
                break;
            }
        }
    }
    headers.normalize();
    headers
}

/// Read one HTTP response block whose body ends at `\r\n<delimiter>`.
///
/// A missing or garbled status line leaves the status fields empty; the
/// body is read all the same.
fn read_response(cursor: &mut Cursor<'_>, delimiter: &str) -> Result<Response, BatchError> {
    let mut response = Response::default();

    let mark = cursor.mark();
    match cursor.read_line().and_then(|line| STATUS_LINE.captures(line)) {
        Some(caps) => {
            response.status_code = caps[1].parse().ok();
            response.status_text = Some(caps[2].to_string());
            response.headers = read_headers(cursor);
            cursor.skip_line();
        }
        None => cursor.reset(mark),
    }

    let body_end = format!("\r\n{delimiter}");
    response.body = cursor
        .read_to(&body_end)
        .ok_or_else(|| BatchError::MissingDelimiter(delimiter.to_string()))?
        .to_string();
    Ok(response)
}

/// Capture the raw text of a part that could not be read, up to the next
/// outer delimiter, whether or not a line break precedes it.
fn read_broken_part(cursor: &mut Cursor<'_>, delimiter: &str) -> Result<Response, BatchError> {
    let raw = cursor
        .read_to(delimiter)
        .ok_or_else(|| BatchError::MissingDelimiter(delimiter.to_string()))?;
    Ok(Response {
        body: raw.strip_suffix("\r\n").unwrap_or(raw).to_string(),
        ..Response::default()
    })
}

fn decode_part(mut response: Response, handlers: &Handlers) -> BatchResponsePart {
    if !response.is_success() {
        debug!(status = ?response.status_code, "batch part failed");
        return BatchResponsePart::Error(PartError::new("HTTP request failed", response));
    }

    let content_type = response.content_type();
    match handlers.read(&response.body, content_type.as_ref()) {
        Ok(data) => {
            trace!(status = ?response.status_code, "read batch part");
            response.data = data;
            BatchResponsePart::Response(response)
        }
        Err(err) => {
            debug!(error = %err, "batch part body could not be decoded");
            BatchResponsePart::Error(PartError::new(err.to_string(), response))
        }
    }
}
