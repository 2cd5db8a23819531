//! Disk-backed cache store using `tokio::fs`.
//!
//! Layout: one directory per namespace under the store root. Each entry is a
//! single `<hash>.entry` file named after the SHA-256 of its request
//! identity: one line of JSON metadata, a newline, then the raw body. Entries
//! are written to a temporary file and committed with one rename, so readers
//! see either the old entry or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CacheStore, ensure_cacheable};
use crate::error::{Error, Result};
use crate::key::RequestKey;
use crate::response::{CachedResponse, ResponseHead};

const ENTRY_EXT: &str = "entry";

/// Header line written before the body of each entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    head: ResponseHead,
    stored_at: DateTime<Utc>,
}

/// A cache store persisted under a root directory.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Returns the store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        if namespace.is_empty()
            || namespace == "."
            || namespace == ".."
            || namespace.contains(['/', '\\'])
        {
            return Err(Error::Store(format!("invalid namespace name {namespace:?}")));
        }
        Ok(self.root.join(namespace))
    }

    fn entry_path(dir: &Path, key: &RequestKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.method.as_bytes());
        hasher.update(b" ");
        hasher.update(key.url.as_bytes());
        dir.join(format!("{:x}.{ENTRY_EXT}", hasher.finalize()))
    }

    fn tmp_path(&self, dir: &Path) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(".{}.{n}.tmp", std::process::id()))
    }

    /// Reads only the header line of an entry file.
    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut line = Vec::new();
        BufReader::new(file).read_until(b'\n', &mut line).await?;
        if line.pop() != Some(b'\n') {
            return Err(Error::Store(format!("truncated cache entry {}", path.display())));
        }
        Ok(Some(serde_json::from_slice(&line)?))
    }

    async fn read_entry(path: &Path) -> Result<Option<(EntryMeta, Bytes)>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(split) = raw.iter().position(|&b| b == b'\n') else {
            return Err(Error::Store(format!("truncated cache entry {}", path.display())));
        };
        let meta = serde_json::from_slice(&raw[..split])?;
        Ok(Some((meta, raw.slice(split + 1..))))
    }

    fn encode_entry(key: &RequestKey, response: &CachedResponse) -> Result<Vec<u8>> {
        let meta = EntryMeta {
            key: key.clone(),
            head: response.head(),
            stored_at: Utc::now(),
        };
        // Compact JSON escapes newlines inside strings, so the header is one line.
        let mut buf = serde_json::to_vec(&meta)?;
        buf.reserve(response.body.len() + 1);
        buf.push(b'\n');
        buf.extend_from_slice(&response.body);
        Ok(buf)
    }

    /// Removes an entry file that cannot be decoded.
    async fn discard_unreadable(path: &Path, e: &Error) -> Result<()> {
        log::warn!("Removing unreadable cache entry {}: {e}", path.display());
        remove_if_exists(path).await?;
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, namespace: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.namespace_dir(namespace)?).await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.namespace_dir(namespace)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        let dir = self.namespace_dir(namespace)?;
        Ok(tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()))
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<RequestKey>> {
        let dir = self.namespace_dir(namespace)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXT)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_entry {
                continue;
            }
            match Self::read_meta(&path).await {
                Ok(Some(meta)) => keys.push(meta.key),
                Ok(None) => {}
                Err(e @ (Error::Json(_) | Error::Store(_))) => {
                    Self::discard_unreadable(&path, &e).await?;
                }
                Err(e) => return Err(e),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let path = Self::entry_path(&self.namespace_dir(namespace)?, key);
        let (meta, body) = match Self::read_entry(&path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e @ (Error::Json(_) | Error::Store(_))) => {
                Self::discard_unreadable(&path, &e).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if meta.key != *key {
            log::warn!("Hash collision in {namespace}: {} vs {key}", meta.key);
            return Ok(None);
        }
        Ok(Some(CachedResponse::from_parts(meta.head, body)))
    }

    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &CachedResponse,
    ) -> Result<()> {
        ensure_cacheable(key)?;
        let dir = self.namespace_dir(namespace)?;
        tokio::fs::create_dir_all(&dir).await?;

        let encoded = Self::encode_entry(key, response)?;
        let tmp = self.tmp_path(&dir);
        let committed = match tokio::fs::write(&tmp, &encoded).await {
            Ok(()) => tokio::fs::rename(&tmp, Self::entry_path(&dir, key)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            if let Err(cleanup) = remove_if_exists(&tmp).await {
                log::warn!("Failed to remove {}: {cleanup}", tmp.display());
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &RequestKey) -> Result<bool> {
        let path = Self::entry_path(&self.namespace_dir(namespace)?, key);
        Ok(remove_if_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn key(path: &str) -> RequestKey {
        RequestKey::parse("GET", &format!("https://app.example.com/{path}")).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let resp = CachedResponse::ok("<html>").with_header("content-type", "text/html");
        {
            let store = DiskStore::new(dir.path());
            store.put("content", &key(""), &resp).await.unwrap();
        }

        let store = DiskStore::new(dir.path());
        assert_eq!(store.get("content", &key("")).await.unwrap(), Some(resp));
        assert_eq!(store.keys("content").await.unwrap(), vec![key("")]);
    }

    #[tokio::test]
    async fn missing_namespace_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path().join("never-created"));
        assert!(store.keys("content").await.unwrap().is_empty());
        assert!(store.get("content", &key("a")).await.unwrap().is_none());
        assert!(store.namespaces().await.unwrap().is_empty());
        assert!(!store.has("content").await.unwrap());
    }

    #[tokio::test]
    async fn delete_and_open_namespaces() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path());
        store.open("staging").await.unwrap();
        store.put("content", &key("a.js"), &CachedResponse::ok("a")).await.unwrap();
        assert_eq!(store.namespaces().await.unwrap(), vec!["content", "staging"]);

        assert!(store.delete("content").await.unwrap());
        assert!(!store.delete("content").await.unwrap());
        assert!(!store.has("content").await.unwrap());
        assert!(store.has("staging").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path());
        store.put("c", &key("a.js"), &CachedResponse::ok("v1")).await.unwrap();
        store.put("c", &key("a.js"), &CachedResponse::ok("v2")).await.unwrap();

        let got = store.get("c", &key("a.js")).await.unwrap().unwrap();
        assert_eq!(got.body.as_ref(), b"v2");
        assert_eq!(store.keys("c").await.unwrap().len(), 1);

        assert!(store.remove("c", &key("a.js")).await.unwrap());
        assert!(!store.remove("c", &key("a.js")).await.unwrap());
        assert!(store.keys("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_path_like_namespaces() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path());
        assert!(store.open("../escape").await.is_err());
        assert!(store.open("").await.is_err());
    }

    const VERSIONS: [(&str, &str); 2] = [("AAAA", "\"a\""), ("BBBB", "\"b\"")];

    fn version(i: usize) -> CachedResponse {
        let (body, etag) = VERSIONS[i % 2];
        CachedResponse::ok(body).with_header("etag", etag)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_overwrites_never_tear_reads() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DiskStore::new(dir.path()));
        store.put("c", &key("app.js"), &version(0)).await.unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 1..200 {
                    store.put("c", &key("app.js"), &version(i)).await.unwrap();
                }
            })
        };
        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let got = store.get("c", &key("app.js")).await.unwrap().unwrap();
                    let expected = VERSIONS
                        .iter()
                        .find(|(body, _)| got.body.as_ref() == body.as_bytes())
                        .map(|(_, etag)| *etag);
                    assert_eq!(got.header("etag"), expected);
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();

        let leftovers = std::fs::read_dir(dir.path().join("c")).unwrap().count();
        assert_eq!(leftovers, 1, "temporary files left behind");
    }

    #[tokio::test]
    async fn unreadable_entries_are_removed() {
        let dir = TempDir::new().unwrap();
        let store = DiskStore::new(dir.path());
        store.put("c", &key("good.js"), &CachedResponse::ok("ok")).await.unwrap();

        let garbage = dir.path().join("c").join("0badc0de.entry");
        std::fs::write(&garbage, b"not json\nbody").unwrap();
        let truncated = DiskStore::entry_path(&dir.path().join("c"), &key("cut.js"));
        std::fs::write(&truncated, b"{\"key\":").unwrap();

        assert_eq!(store.keys("c").await.unwrap(), vec![key("good.js")]);
        assert!(!garbage.exists());
        assert!(!truncated.exists());

        std::fs::write(&truncated, b"{}\nbody").unwrap();
        assert!(store.get("c", &key("cut.js")).await.unwrap().is_none());
        assert!(!truncated.exists());
    }
}
