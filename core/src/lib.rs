//! Synchronous client core for OData services.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). The caller executes the
//! actual HTTP round-trip, making the core fully deterministic and testable.
//!
//! The centre of the crate is the `$batch` codec in [`batch`]: it writes a
//! group of requests, optionally grouped into atomic change sets, as a
//! `multipart/mixed` envelope, and reads the service's multipart reply back
//! into one typed result per part.
//!
//! # Design
//! - `ODataClient` is stateless: it holds the service root and the payload
//!   handler registry.
//! - Each operation is split into `build_*` (produces request) and
//!   `parse_*` (consumes response), so the I/O boundary is explicit.
//! - A broken envelope is an error; a failed part is a value in the result.

pub mod batch;
pub mod client;
pub mod content_type;
pub mod error;
pub mod handler;
pub mod http;

pub use batch::{
    BatchRequest, BatchRequestPart, BatchResponse, BatchResponsePart, ChangeSet, ChangeSetResponse, PartError,
    Request, Response,
};
pub use client::ODataClient;
pub use content_type::ContentType;
pub use error::{ApiError, BatchError, HandlerError};
pub use handler::{Handlers, JsonHandler, PayloadHandler, TextHandler};
pub use http::{Headers, HttpMethod, HttpRequest, HttpResponse, UnsupportedMethod};
