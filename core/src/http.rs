//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The core
//! crate builds `HttpRequest` values and parses `HttpResponse` values without
//! ever touching the network; the caller (host) executes the actual I/O.
//!
//! `Headers` keeps insertion order because the batch writer emits headers in
//! the order they were set, and the wire text is compared byte-for-byte by
//! services and tests alike. Lookups are case-insensitive.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical spellings for the header names the OData protocol cares about,
/// keyed by their lowercase form.
const NORMAL_HEADERS: &[(&str, &str)] = &[
    // shared by requests and responses
    ("content-type", "Content-Type"),
    ("content-encoding", "Content-Encoding"),
    ("content-length", "Content-Length"),
    ("odata-version", "OData-Version"),
    // requests
    ("accept", "Accept"),
    ("accept-charset", "Accept-Charset"),
    ("if-match", "If-Match"),
    ("if-none-match", "If-None-Match"),
    ("odata-isolation", "OData-Isolation"),
    ("odata-maxversion", "OData-MaxVersion"),
    ("prefer", "Prefer"),
    ("content-id", "Content-ID"),
    ("content-transfer-encoding", "Content-Transfer-Encoding"),
    // responses
    ("etag", "ETag"),
    ("location", "Location"),
    ("odata-entityid", "OData-EntityId"),
    ("preference-applied", "Preference-Applied"),
    ("retry-after", "Retry-After"),
];

fn canonical_header_name(name: &str) -> Option<&'static str> {
    NORMAL_HEADERS
        .iter()
        .find(|(lower, _)| lower.eq_ignore_ascii_case(name))
        .map(|(_, canonical)| *canonical)
}

/// HTTP method for a request. Parsed case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A method name outside the verbs a batch part can carry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method {0:?}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
        ]
        .into_iter()
        .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnsupportedMethod(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Value of the first header whose name matches `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace the value of an existing header (keeping its position and
    /// spelling) or append a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Set `name` only when no header of that name is present yet.
    pub fn set_default(&mut self, name: &str, value: &str) {
        if !self.contains(name) {
            self.0.push((name.to_string(), value.to_string()));
        }
    }

    /// Rename every known header to its canonical spelling.
    pub fn normalize(&mut self) {
        for (name, _) in &mut self.0 {
            if let Some(canonical) = canonical_header_name(name) {
                *name = canonical.to_string();
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HeadersVisitor;

        impl<'de> Visitor<'de> for HeadersVisitor {
            type Value = Headers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to string values")
            }

            /// `null` and empty values mean "no such header" and are dropped.
            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Headers, A::Error> {
                let mut headers = Headers::new();
                while let Some((name, value)) = map.next_entry::<String, Option<String>>()? {
                    match value {
                        Some(value) if !value.is_empty() => headers.set(name, value),
                        _ => {}
                    }
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ODataClient::build_*` methods. The caller is responsible for
/// executing this request against the network and returning the corresponding
/// `HttpResponse`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

/// An HTTP response described as plain data.
///
/// Constructed by the caller after executing an `HttpRequest`, then passed
/// to `ODataClient::parse_*` methods.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let headers: Headers = [("content-type", "text/plain")].into_iter().collect();
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.get("Accept").is_none());
    }

    #[test]
    fn set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.set("Accept", "a");
        headers.set("Prefer", "b");
        headers.set("accept", "c");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("Accept", "c"), ("Prefer", "b")]);
    }

    #[test]
    fn set_default_keeps_existing_value() {
        let mut headers: Headers = [("accept", "text/plain")].into_iter().collect();
        headers.set_default("Accept", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Accept"), Some("text/plain"));
    }

    #[test]
    fn normalize_uses_canonical_names() {
        let mut headers: Headers = [
            ("content-type", "application/json"),
            ("odata-version", "4.0"),
            ("x-custom", "1"),
        ]
        .into_iter()
        .collect();
        headers.normalize();
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Content-Type", "OData-Version", "x-custom"]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut headers: Headers = [("ETAG", "W/\"1\""), ("X-Other", "1")].into_iter().collect();
        headers.normalize();
        let once = headers.clone();
        headers.normalize();
        assert_eq!(headers, once);
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["ETag", "X-Other"]);
    }

    #[test]
    fn null_and_empty_header_values_are_dropped() {
        let headers: Headers =
            serde_json::from_str(r#"{"If-Match":null,"Prefer":"odata.maxpagesize=2","X-Empty":""}"#).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Prefer"), Some("odata.maxpagesize=2"));
    }

    #[test]
    fn headers_deserialize_from_json_object() {
        let headers: Headers =
            serde_json::from_str(r#"{"Accept":"application/json","Prefer":"return=minimal"}"#).unwrap();
        assert_eq!(headers.get("prefer"), Some("return=minimal"));
        let back = serde_json::to_value(&headers).unwrap();
        assert_eq!(back["Accept"], "application/json");
    }

    #[test]
    fn method_serializes_uppercase() {
        let method: HttpMethod = serde_json::from_str(r#""PATCH""#).unwrap();
        assert_eq!(method, HttpMethod::Patch);
        assert_eq!(method.to_string(), "PATCH");
        assert_eq!(serde_json::to_value(method).unwrap(), "PATCH");
    }

    #[test]
    fn method_parses_any_case() {
        assert_eq!("get".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert_eq!("Delete".parse::<HttpMethod>(), Ok(HttpMethod::Delete));
        let err = serde_json::from_str::<HttpMethod>(r#""BREW""#).unwrap_err();
        assert!(err.to_string().contains("unsupported HTTP method \"BREW\""), "{err}");
    }
}
