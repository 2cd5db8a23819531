//! Stored and fetched HTTP responses.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A response as held in a cache namespace or returned by a [`Fetcher`](crate::Fetcher).
///
/// The body is a [`Bytes`] handle, so cloning a response to store one copy
/// and return the other never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl CachedResponse {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the metadata part of this response, used by disk-backed stores.
    #[must_use]
    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status,
            headers: self.headers.clone(),
        }
    }

    /// Reassembles a response from stored metadata and body.
    #[must_use]
    pub fn from_parts(head: ResponseHead, body: Bytes) -> Self {
        Self {
            status: head.status,
            headers: head.headers,
            body,
        }
    }
}

/// Status and headers of a response, without the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_range() {
        assert!(CachedResponse::new(200, "").is_ok());
        assert!(CachedResponse::new(204, "").is_ok());
        assert!(!CachedResponse::new(304, "").is_ok());
        assert!(!CachedResponse::new(404, "").is_ok());
        assert!(!CachedResponse::new(199, "").is_ok());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = CachedResponse::ok("x").with_header("Content-Type", "text/html");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn clone_shares_body() {
        let resp = CachedResponse::ok(vec![1u8; 4096]);
        let copy = resp.clone();
        assert_eq!(resp.body.as_ptr(), copy.body.as_ptr());
    }

    #[test]
    fn parts_reassemble() {
        let resp = CachedResponse::new(203, "body").with_header("etag", "abc");
        let rebuilt = CachedResponse::from_parts(resp.head(), resp.body.clone());
        assert_eq!(rebuilt, resp);
    }
}
