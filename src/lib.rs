//! shell-cache - versioned asset caching for a web application shell.
//!
//! Given a manifest of resource paths to content fingerprints, the
//! [`Reconciler`] decides which cached assets to keep, evict or refetch across
//! the install, activate and fetch lifecycle events. The cache itself and the
//! network are injected through the [`CacheStore`] and [`Fetcher`] traits.
//!
//! # Example
//!
//! ```no_run
//! use shell_cache::{AssetManifest, DiskStore, HttpFetcher, LocalHost, Origin, Reconciler};
//!
//! # async fn example() -> shell_cache::Result<()> {
//! let assets = AssetManifest::load("asset-manifest.json".as_ref())?;
//! let reconciler = Reconciler::new(
//!     Origin::parse("https://app.example.com")?,
//!     assets,
//!     DiskStore::new("/var/cache/shell"),
//!     HttpFetcher::with_defaults()?,
//!     LocalHost::new(),
//! );
//!
//! reconciler.install().await?;
//! let report = reconciler.activate().await?;
//! println!("Evicted {} stale resources", report.evicted.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod fetch;
pub mod host;
pub mod key;
pub mod manifest;
pub mod message;
pub mod reconciler;
pub mod report;
pub mod response;
pub mod store;

// Re-export main types for convenience
pub use config::{AppConfig, PathConfig, ReconcilerConfig};
pub use error::{Error, Result};
pub use fetch::{CacheMode, FetchRequest, Fetcher, HttpFetcher};
pub use host::{LocalHost, WorkerHost};
pub use key::{Origin, ROOT_KEY, RequestKey};
pub use manifest::{AssetManifest, CoreSet, Manifest};
pub use message::WorkerMessage;
pub use reconciler::Reconciler;
pub use report::{ActivationReport, FetchOutcome, MessageOutcome, OfflineReport, ResponseSource};
pub use response::CachedResponse;
pub use store::{CacheStore, DiskStore, MemoryStore};
