//! Resource manifests and the application-shell core set.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::ROOT_KEY;

/// Mapping from logical resource path to content fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, String>);

impl Manifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fingerprint recorded for `key`.
    #[must_use]
    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true if `key` is listed.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over the listed keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of listed resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no resources are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if a cached copy of `key` made under `previous` is still valid here:
    /// the key is listed in both with the same fingerprint.
    #[must_use]
    pub fn is_unchanged(&self, previous: &Self, key: &str) -> bool {
        match (self.fingerprint(key), previous.fingerprint(key)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }

    /// Serializes the manifest as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a manifest from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `raw` is not a JSON object of strings.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Ordered list of resources that make up the minimal application shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreSet(Vec<String>);

impl CoreSet {
    /// Creates a core set from paths.
    #[must_use]
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(paths.into_iter().map(Into::into).collect())
    }

    /// Iterates over the paths in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of core paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the core set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The asset manifest document produced alongside a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// Resource fingerprints.
    pub resources: Manifest,
    /// Application shell resources fetched at install.
    #[serde(default)]
    pub core: CoreSet,
}

impl AssetManifest {
    /// Loads a manifest document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Manifest`] if it is not a valid document.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let manifest = Self::parse(&raw)
            .map_err(|e| Error::Manifest(format!("{}: {e}", path.display())))?;
        Ok(manifest)
    }

    /// Parses a manifest document and logs inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `raw` is not a valid document.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(raw)?;
        for path in manifest.core.iter() {
            if !manifest.resources.contains(path) {
                log::warn!("Core resource {path} is not listed in the manifest");
            }
        }
        if !manifest.resources.is_empty() && !manifest.resources.contains(ROOT_KEY) {
            log::warn!("Manifest has no entry for the root document");
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(entries: &[(&str, &str)]) -> Manifest {
        entries.iter().copied().collect()
    }

    #[test]
    fn unchanged_requires_equal_fingerprints() {
        let old = manifest(&[("a.js", "1"), ("b.js", "2"), ("gone.js", "3")]);
        let new = manifest(&[("a.js", "1"), ("b.js", "9"), ("new.js", "4")]);
        assert!(new.is_unchanged(&old, "a.js"));
        assert!(!new.is_unchanged(&old, "b.js"));
        assert!(!new.is_unchanged(&old, "gone.js"));
        assert!(!new.is_unchanged(&old, "new.js"));
    }

    #[test]
    fn json_is_a_flat_object() {
        let m = manifest(&[("/", "abc"), ("index.html", "abc")]);
        let json = String::from_utf8(m.to_json().unwrap()).unwrap();
        assert_eq!(json, r#"{"/":"abc","index.html":"abc"}"#);
        assert_eq!(Manifest::from_json(json.as_bytes()).unwrap(), m);
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(Manifest::from_json(b"[1,2]").is_err());
        assert!(Manifest::from_json(b"not json").is_err());
    }

    #[test]
    fn parse_document() {
        let doc = br#"{
            "resources": {"/": "f3a6", "index.html": "f3a6", "main.dart.js": "888b"},
            "core": ["main.dart.js", "index.html"]
        }"#;
        let parsed = AssetManifest::parse(doc).unwrap();
        assert_eq!(parsed.resources.len(), 3);
        assert_eq!(
            parsed.core.iter().collect::<Vec<_>>(),
            vec!["main.dart.js", "index.html"]
        );
    }

    #[test]
    fn core_defaults_to_empty() {
        let parsed = AssetManifest::parse(br#"{"resources": {"/": "x"}}"#).unwrap();
        assert!(parsed.core.is_empty());
    }

    #[test]
    fn load_reports_path_on_bad_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("asset-manifest.json");
        std::fs::write(&path, "{").unwrap();
        let err = AssetManifest::load(&path).unwrap_err();
        assert!(matches!(err, Error::Manifest(msg) if msg.contains("asset-manifest.json")));
    }
}
