//! Stateless HTTP request builder and response parser for an OData service.
//!
//! # Design
//! `ODataClient` holds a `base_url` and the payload handler registry, and
//! carries no mutable state between calls. Every operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. The caller executes the actual HTTP
//! round-trip, keeping the core deterministic and free of I/O dependencies.

use tracing::debug;

use crate::batch::{self, BatchRequest, BatchResponse, Request, Response, SerializationContext};
use crate::content_type::{ContentType, BATCH_MEDIA_TYPE};
use crate::error::{ApiError, BatchError};
use crate::handler::{Handlers, DATA_SERVICE_VERSION};
use crate::http::{Headers, HttpMethod, HttpRequest, HttpResponse};

/// Synchronous, stateless client for one OData service root.
#[derive(Debug, Clone)]
pub struct ODataClient {
    base_url: String,
    handlers: Handlers,
}

impl ODataClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            handlers: Handlers::default(),
        }
    }

    pub fn with_handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a request URI against the service root. Absolute URIs pass
    /// through unchanged.
    pub fn resolve(&self, uri: &str) -> String {
        if uri.contains("://") {
            uri.to_string()
        } else {
            format!("{}/{}", self.base_url, uri.trim_start_matches('/'))
        }
    }

    /// Build a single, non-batched request.
    pub fn build_request(&self, request: &Request) -> Result<HttpRequest, ApiError> {
        let prepared = batch::writer::prepare_request(&self.handlers, request)?;
        Ok(HttpRequest {
            method: prepared.method,
            url: self.resolve(&prepared.request_uri),
            headers: prepared.headers,
            body: prepared.body,
        })
    }

    /// Parse the response to a single request, decoding its body.
    pub fn parse_response(&self, response: HttpResponse) -> Result<Response, ApiError> {
        check_status(&response)?;
        let mut headers = response.headers;
        headers.normalize();

        let content_type = headers.get("Content-Type").and_then(ContentType::parse);
        let data = self.handlers.read(&response.body, content_type.as_ref())?;
        Ok(Response {
            status_code: Some(response.status),
            status_text: None,
            headers,
            body: response.body,
            data,
        })
    }

    /// Build a `POST {base}/$batch` request carrying `batch`.
    pub fn build_batch(&self, batch: &BatchRequest) -> Result<HttpRequest, ApiError> {
        let mut ctx = SerializationContext::new(&self.handlers);
        let body = batch::serialize(batch, &mut ctx)?
            .ok_or_else(|| BatchError::NotABatch("batch writer declined the payload".to_string()))?;
        let content_type = ctx.into_content_type();

        let mut headers = Headers::new();
        headers.set("Content-Type", content_type.to_string());
        headers.set("Accept", BATCH_MEDIA_TYPE);
        headers.set("OData-Version", DATA_SERVICE_VERSION);
        headers.set("OData-MaxVersion", self.handlers.max_version());

        debug!(parts = batch.len(), bytes = body.len(), "built batch request");
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}/$batch", self.base_url),
            headers,
            body: Some(body),
        })
    }

    /// Parse the response to a batch request.
    pub fn parse_batch(&self, response: HttpResponse) -> Result<BatchResponse, ApiError> {
        check_status(&response)?;
        let raw = response.headers.get("Content-Type").unwrap_or_default();
        let content_type = ContentType::parse(raw)
            .filter(|ct| ct.is(BATCH_MEDIA_TYPE) && ct.boundary().is_some())
            .ok_or_else(|| ApiError::UnexpectedContentType(raw.to_string()))?;

        Ok(batch::parse(&response.body, &content_type, &self.handlers)?)
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if (200..=299).contains(&response.status) {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}
