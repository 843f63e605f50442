//! `media-type; name=value` parsing and formatting.
//!
//! The batch writer records the boundary it chose as the `boundary` property
//! of the outgoing content type, and the batch reader takes the boundary of
//! an incoming envelope from the same slot.

use std::fmt;

pub const BATCH_MEDIA_TYPE: &str = "multipart/mixed";
pub const HTTP_MEDIA_TYPE: &str = "application/http";
pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const TEXT_MEDIA_TYPE: &str = "text/plain";

const BOUNDARY: &str = "boundary";

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    media_type: String,
    properties: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            properties: Vec::new(),
        }
    }

    /// Parse a header value. Returns `None` for an empty or blank value.
    pub fn parse(value: &str) -> Option<Self> {
        let mut segments = value.split(';');
        let media_type = segments.next()?.trim();
        if media_type.is_empty() {
            return None;
        }

        let mut content_type = ContentType::new(media_type);
        for segment in segments {
            if let Some((name, value)) = segment.split_once('=') {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                content_type.set_property(name.trim(), value);
            }
        }
        Some(content_type)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Whether the media type equals `media_type`, ignoring case.
    pub fn is(&self, media_type: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type)
    }

    /// Whether the top-level type matches, e.g. `text` for `text/html`.
    pub fn is_type(&self, top_level: &str) -> bool {
        self.media_type
            .split_once('/')
            .is_some_and(|(t, _)| t.eq_ignore_ascii_case(top_level))
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn boundary(&self) -> Option<&str> {
        self.property(BOUNDARY)
    }

    pub fn set_boundary(&mut self, boundary: impl Into<String>) {
        self.set_property(BOUNDARY, boundary);
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.media_type)?;
        for (name, value) in &self.properties {
            write!(f, "; {name}={value}")?;
        }
        Ok(())
    }
}
