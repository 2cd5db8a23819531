//! Persistent cache namespace abstraction.
//!
//! A [`CacheStore`] holds any number of named namespaces, each mapping a
//! [`RequestKey`] to a [`CachedResponse`]. The reconciler only ever talks to
//! the store through this trait, so tests substitute a [`MemoryStore`] and the
//! command-line driver uses a [`DiskStore`].

mod disk;
mod memory;

use async_trait::async_trait;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::error::{Error, Result};
use crate::key::RequestKey;
use crate::response::CachedResponse;

/// Abstraction over a persistent key-value response cache.
///
/// Reads against a namespace that does not exist behave as if it were empty.
/// `put` creates the namespace on demand. Individual `get`/`put`/`remove`
/// calls must be atomic per key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Opens a namespace, creating it if needed.
    async fn open(&self, namespace: &str) -> Result<()>;

    /// Deletes a namespace and all its entries. Returns false if it did not exist.
    async fn delete(&self, namespace: &str) -> Result<bool>;

    /// Returns true if the namespace exists.
    async fn has(&self, namespace: &str) -> Result<bool>;

    /// Lists the names of all existing namespaces.
    async fn namespaces(&self) -> Result<Vec<String>>;

    /// Lists the request identities stored in a namespace.
    async fn keys(&self, namespace: &str) -> Result<Vec<RequestKey>>;

    /// Looks up a stored response.
    async fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

    /// Stores a response, replacing any previous entry for the same identity.
    async fn put(&self, namespace: &str, key: &RequestKey, response: &CachedResponse)
    -> Result<()>;

    /// Removes a single entry. Returns false if it was not present.
    async fn remove(&self, namespace: &str, key: &RequestKey) -> Result<bool>;
}

/// Rejects identities that a response cache must not hold.
fn ensure_cacheable(key: &RequestKey) -> Result<()> {
    if key.is_get() {
        Ok(())
    } else {
        Err(Error::Store(format!("cannot cache non-GET request {key}")))
    }
}

/// Copies every entry of `from` into `to`, overwriting existing entries.
///
/// Returns the number of entries copied.
///
/// # Errors
///
/// Returns the first store error encountered; entries copied before the
/// failure stay in `to`.
pub async fn copy_namespace<S: CacheStore + ?Sized>(
    store: &S,
    from: &str,
    to: &str,
) -> Result<usize> {
    let mut copied = 0;
    for key in store.keys(from).await? {
        if let Some(response) = store.get(from, &key).await? {
            store.put(to, &key, &response).await?;
            copied += 1;
        }
    }
    Ok(copied)
}
