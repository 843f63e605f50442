//! Error types for the OData client core.
//!
//! # Design
//! Batch processing has two tiers of failure. Structural problems with the
//! envelope itself are `BatchError`s and abort the whole operation. Problems
//! confined to one part are not errors at all at this level: they become a
//! `PartError` value inside the `BatchResponse`, in the slot the successful
//! response would have occupied.
//!
//! `NotFound` gets a dedicated `ApiError` variant because callers frequently
//! distinguish "the resource does not exist" from "the service returned an
//! unexpected status."

use thiserror::Error;

/// Structural failures while writing or reading a batch envelope.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The value handed to the batch writer does not describe a batch.
    #[error("not a batch: {0}")]
    NotABatch(String),

    /// A change set was found inside another change set.
    #[error("change set nested in other change set is not supported")]
    NestedChangeSet,

    /// A MIME part declared neither `application/http` nor `multipart/mixed`.
    #[error("invalid MIME part type {}", .0.as_deref().unwrap_or("(none)"))]
    InvalidPartType(Option<String>),

    /// A delimiter the envelope requires never appeared in the text.
    #[error("delimiter {0:?} not found")]
    MissingDelimiter(String),

    /// A multipart content type carried no `boundary` parameter.
    #[error("multipart content type has no boundary")]
    MissingBoundary,

    /// A sub-request header name or value contains a line break, which would
    /// end the header block early.
    #[error("header {0:?} contains a line break")]
    InvalidHeader(String),

    /// A sub-request body could not be written.
    #[error("failed to write request payload: {0}")]
    Payload(#[from] HandlerError),
}

/// Failures of a payload handler while encoding or decoding a body.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{media_type} handler cannot write {kind} data")]
    Unsupported { media_type: String, kind: &'static str },
}

/// Errors returned by `ODataClient` build and parse methods.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service returned 404.
    #[error("resource not found")]
    NotFound,

    /// The service returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// A body could not be encoded or decoded.
    #[error(transparent)]
    Payload(#[from] HandlerError),

    /// A batch response did not carry a usable multipart content type.
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_part_type_message_names_the_type() {
        let err = BatchError::InvalidPartType(Some("text/html".to_string()));
        assert_eq!(err.to_string(), "invalid MIME part type text/html");
        let err = BatchError::InvalidPartType(None);
        assert_eq!(err.to_string(), "invalid MIME part type (none)");
    }

    #[test]
    fn payload_errors_convert_into_api_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ApiError = HandlerError::from(json_err).into();
        assert!(matches!(err, ApiError::Payload(HandlerError::Json(_))));

        let err: ApiError = BatchError::NestedChangeSet.into();
        assert!(matches!(err, ApiError::Batch(BatchError::NestedChangeSet)));
    }
}
