//! Origin handling, logical-key derivation and request identity.

use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Synthetic manifest key for the document entry point.
pub const ROOT_KEY: &str = "/";

/// Query marker used by the shell for cache-busting version parameters.
const VERSION_QUERY: &str = "?v=";

/// The origin (`scheme://host[:port]`) the application shell is served from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    /// Parses an origin from any absolute http(s) URL; path, query and fragment are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the input is not an absolute http(s) URL with a host.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| Error::Url(format!("{input}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::Url(format!("{input}: not an http(s) origin")));
        }
        Ok(Self(url.origin().ascii_serialization()))
    }

    /// Returns the serialized origin without a trailing slash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolves a manifest key to an absolute URL on this origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the key does not form a valid URL.
    pub fn resolve(&self, key: &str) -> Result<Url> {
        let path = if key == ROOT_KEY {
            ""
        } else {
            key.trim_start_matches('/')
        };
        let raw = format!("{}/{path}", self.0);
        Url::parse(&raw).map_err(|e| Error::Url(format!("{raw}: {e}")))
    }

    /// Returns the part of `url` after the origin, or `None` for a foreign URL.
    fn relative<'a>(&self, url: &'a str) -> Option<&'a str> {
        let rest = url.strip_prefix(self.0.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Logical key of a stored cache entry.
    ///
    /// Used when reconciling Content against a manifest: the URL path after
    /// the origin, with the empty path mapped to [`ROOT_KEY`]. Query strings
    /// are kept, so lazily cached `?v=` variants never match a manifest key.
    #[must_use]
    pub fn entry_key(&self, url: &str) -> String {
        let rest = self.relative(url).unwrap_or(url);
        let key = rest.strip_prefix('/').unwrap_or(rest);
        if key.is_empty() {
            ROOT_KEY.to_string()
        } else {
            key.to_string()
        }
    }

    /// Logical key of an intercepted request, or `None` if it is not on this origin.
    ///
    /// Strips a `?v=` version suffix and maps the origin root, a `/#` fragment
    /// route and the empty path to [`ROOT_KEY`].
    #[must_use]
    pub fn request_key(&self, url: &str) -> Option<String> {
        let rest = self.relative(url)?;
        let mut key = rest.strip_prefix('/').unwrap_or(rest);
        if let Some((head, _)) = key.split_once(VERSION_QUERY) {
            key = head;
        }
        if rest.is_empty() || rest.starts_with("/#") || key.is_empty() {
            return Some(ROOT_KEY.to_string());
        }
        Some(key.to_string())
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a cached request: method plus URL with the fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    /// Upper-case HTTP method.
    pub method: String,
    /// Absolute URL without fragment.
    pub url: String,
}

impl RequestKey {
    /// Builds the identity of a GET request for `url`.
    #[must_use]
    pub fn get(url: &Url) -> Self {
        Self::with_method("GET", url)
    }

    /// Builds the identity of a request with an explicit method.
    #[must_use]
    pub fn with_method(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// Parses a URL string and builds its identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if `url` is not an absolute URL.
    pub fn parse(method: &str, url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::Url(format!("{url}: {e}")))?;
        Ok(Self::with_method(method, &parsed))
    }

    /// Returns true for GET requests.
    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn origin() -> Origin {
        Origin::parse("https://app.example.com").unwrap()
    }

    #[test]
    fn parse_drops_path_and_trailing_slash() {
        let o = Origin::parse("https://app.example.com:8443/some/page?x=1#top").unwrap();
        assert_eq!(o.as_str(), "https://app.example.com:8443");
    }

    #[test]
    fn parse_rejects_non_http() {
        assert!(Origin::parse("file:///tmp/index.html").is_err());
        assert!(Origin::parse("index.html").is_err());
    }

    #[test]
    fn resolve_root_and_paths() {
        let o = origin();
        assert_eq!(o.resolve("/").unwrap().as_str(), "https://app.example.com/");
        assert_eq!(
            o.resolve("assets/FontManifest.json").unwrap().as_str(),
            "https://app.example.com/assets/FontManifest.json"
        );
    }

    #[test]
    fn entry_key_maps_empty_path_to_root() {
        let o = origin();
        assert_eq!(o.entry_key("https://app.example.com/"), "/");
        assert_eq!(o.entry_key("https://app.example.com/main.dart.js"), "main.dart.js");
        assert_eq!(
            o.entry_key("https://app.example.com/main.dart.js?v=42"),
            "main.dart.js?v=42"
        );
    }

    #[test]
    fn request_key_strips_version_query() {
        let o = origin();
        assert_eq!(
            o.request_key("https://app.example.com/main.dart.js?v=12345").as_deref(),
            Some("main.dart.js")
        );
        assert_eq!(
            o.request_key("https://app.example.com/?v=1").as_deref(),
            Some("/")
        );
    }

    #[test]
    fn request_key_normalizes_root_routes() {
        let o = origin();
        assert_eq!(o.request_key("https://app.example.com").as_deref(), Some("/"));
        assert_eq!(o.request_key("https://app.example.com/").as_deref(), Some("/"));
        assert_eq!(
            o.request_key("https://app.example.com/#/settings").as_deref(),
            Some("/")
        );
    }

    #[test]
    fn request_key_keeps_other_queries() {
        let o = origin();
        assert_eq!(
            o.request_key("https://app.example.com/api/items?page=2").as_deref(),
            Some("api/items?page=2")
        );
    }

    #[test]
    fn request_key_rejects_foreign_origins() {
        let o = origin();
        assert_eq!(o.request_key("https://cdn.example.com/main.dart.js"), None);
        assert_eq!(o.request_key("https://app.example.com.evil.org/main.dart.js"), None);
    }

    #[test]
    fn request_identity_drops_fragment() {
        let a = RequestKey::parse("get", "https://app.example.com/#/home").unwrap();
        let b = RequestKey::get(&origin().resolve("/").unwrap());
        assert_eq!(a, b);
        assert!(a.is_get());
        assert_eq!(a.to_string(), "GET https://app.example.com/");
    }

    const PATH_PATTERN: &str = "[a-z0-9_-]{1,8}(/[a-z0-9_-]{1,8}){0,3}(\\.[a-z]{1,4})?";

    proptest! {
        #[test]
        fn resolved_keys_round_trip(key in PATH_PATTERN) {
            let o = origin();
            let url = o.resolve(&key).unwrap();
            prop_assert_eq!(o.entry_key(url.as_str()), key.clone());
            prop_assert_eq!(o.request_key(url.as_str()), Some(key));
        }

        #[test]
        fn version_suffix_never_changes_key(
            key in "[a-z0-9_-]{1,8}(/[a-z0-9_-]{1,8}){0,2}\\.[a-z]{1,4}",
            version in "[0-9]{1,10}",
        ) {
            let o = origin();
            let url = format!("{}?v={version}", o.resolve(&key).unwrap());
            prop_assert_eq!(o.request_key(&url), Some(key));
        }
    }
}
