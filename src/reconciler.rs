//! The cache reconciler: install, activate, fetch and message handling.
//!
//! Three namespaces are involved:
//!
//! - **staging** receives the core set during [`Reconciler::install`];
//! - **content** is what [`Reconciler::handle_fetch`] serves from;
//! - **manifest record** holds the manifest of the last activated version,
//!   which [`Reconciler::activate`] diffs against the current one to decide
//!   which content entries survive the upgrade.
//!
//! Every entry point is an `async fn` on `&self` and owns no state between
//! calls; everything durable lives in the [`CacheStore`].

use std::collections::HashSet;

use futures::{StreamExt, TryStreamExt, stream};

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::fetch::{FetchRequest, Fetcher};
use crate::host::{LocalHost, WorkerHost};
use crate::key::{Origin, ROOT_KEY, RequestKey};
use crate::manifest::{AssetManifest, CoreSet, Manifest};
use crate::message::WorkerMessage;
use crate::report::{
    ActivationReport, FetchOutcome, MessageOutcome, OfflineReport, ResponseSource,
};
use crate::response::CachedResponse;
use crate::store::{CacheStore, copy_namespace};

/// Keeps a content cache in sync with one deployed asset manifest.
pub struct Reconciler<S: CacheStore, F: Fetcher, H: WorkerHost = LocalHost> {
    origin: Origin,
    manifest: Manifest,
    core: CoreSet,
    config: ReconcilerConfig,
    store: S,
    fetcher: F,
    host: H,
}

impl<S: CacheStore, F: Fetcher, H: WorkerHost> Reconciler<S, F, H> {
    /// Creates a reconciler for the given origin and asset manifest with default config.
    #[must_use]
    pub fn new(origin: Origin, assets: AssetManifest, store: S, fetcher: F, host: H) -> Self {
        Self {
            origin,
            manifest: assets.resources,
            core: assets.core,
            config: ReconcilerConfig::default(),
            store,
            fetcher,
            host,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the origin requests are resolved against.
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Returns the current manifest.
    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Returns the underlying cache store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the underlying fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the host hooks.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Consumes the reconciler and returns its store, e.g. to hand it to the next version.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    fn manifest_record_key(&self) -> Result<RequestKey> {
        Ok(RequestKey::get(&self.origin.resolve(&self.config.manifest_key)?))
    }

    /// Reads the manifest stored by the last successful activation, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the record is not valid manifest JSON.
    pub async fn recorded_manifest(&self) -> Result<Option<Manifest>> {
        let key = self.manifest_record_key()?;
        match self.store.get(&self.config.manifest_cache, &key).await? {
            Some(record) => Ok(Some(Manifest::from_json(&record.body)?)),
            None => Ok(None),
        }
    }

    /// Fetches every request, failing as a whole if any fetch fails or is not OK.
    async fn fetch_all(
        &self,
        requests: Vec<FetchRequest>,
    ) -> Result<Vec<(RequestKey, CachedResponse)>> {
        let fetcher = &self.fetcher;
        stream::iter(requests)
            .map(|request| async move {
                let response = fetcher.fetch(&request).await?;
                if !response.is_ok() {
                    return Err(Error::BadStatus {
                        url: request.key.url,
                        status: response.status,
                    });
                }
                Ok((request.key, response))
            })
            .buffer_unordered(self.config.concurrent_fetches.max(1))
            .try_collect()
            .await
    }

    /// Stores all responses, or nothing if any fetch failed.
    async fn add_all(&self, namespace: &str, requests: Vec<FetchRequest>) -> Result<usize> {
        let fetched = self.fetch_all(requests).await?;
        for (key, response) in &fetched {
            self.store.put(namespace, key, response).await?;
        }
        Ok(fetched.len())
    }

    /// Install phase: downloads the core set into the staging namespace.
    ///
    /// Requests immediate activation first, then fetches every core path
    /// bypassing intermediate HTTP caches. The core set is all-or-nothing: if
    /// any fetch fails or returns a non-OK status, nothing is stored and the
    /// error is returned so the previous version stays in charge.
    ///
    /// Returns the number of staged entries.
    ///
    /// # Errors
    ///
    /// Returns the first fetch or store error.
    pub async fn install(&self) -> Result<usize> {
        if let Err(e) = self.host.skip_waiting().await {
            log::warn!("Skip-waiting request failed: {e}");
        }

        // Staging only ever holds the core set of the version being installed.
        let staging = &self.config.staging_cache;
        self.store.delete(staging).await?;
        self.store.open(staging).await?;

        let requests = self
            .core
            .iter()
            .map(|path| Ok(FetchRequest::reload(RequestKey::get(&self.origin.resolve(path)?))))
            .collect::<Result<Vec<_>>>()?;

        match self.add_all(staging, requests).await {
            Ok(staged) => {
                log::info!("Staged {staged} core resources in {staging}");
                Ok(staged)
            }
            Err(e) => {
                if let Err(del) = self.store.delete(staging).await {
                    log::warn!("Failed to discard partial {staging}: {del}");
                }
                Err(e)
            }
        }
    }

    /// Activate phase: reconciles the content namespace with the current manifest.
    ///
    /// Without a manifest record the content namespace is rebuilt from the
    /// staged core set. With one, content entries are kept only if their key
    /// is still listed with an unchanged fingerprint; the staged core set is
    /// then copied over them. Staging is deleted and the current manifest is
    /// recorded.
    ///
    /// Any failure wipes all three namespaces so the next install starts from
    /// a clean slate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActivationReset`] wrapping the failure that caused the wipe.
    pub async fn activate(&self) -> Result<ActivationReport> {
        match self.reconcile().await {
            Ok(report) => {
                if let Err(e) = self.host.claim_clients().await {
                    log::warn!("Failed to claim clients: {e}");
                }
                log::info!(
                    "Activated: kept {}, evicted {}, promoted {}",
                    report.kept,
                    report.evicted.len(),
                    report.promoted
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("Failed to upgrade cache: {e}");
                for namespace in self.config.namespaces() {
                    if let Err(del) = self.store.delete(namespace).await {
                        log::error!("Failed to delete {namespace} during reset: {del}");
                    }
                }
                Err(Error::ActivationReset(Box::new(e)))
            }
        }
    }

    async fn reconcile(&self) -> Result<ActivationReport> {
        let content = &self.config.content_cache;
        let staging = &self.config.staging_cache;
        let manifest_cache = &self.config.manifest_cache;

        self.store.open(content).await?;
        self.store.open(staging).await?;
        self.store.open(manifest_cache).await?;

        let mut report = ActivationReport::default();
        if let Some(previous) = self.recorded_manifest().await? {
            for key in self.store.keys(content).await? {
                let logical = self.origin.entry_key(&key.url);
                if self.manifest.is_unchanged(&previous, &logical) {
                    report.kept += 1;
                } else {
                    self.store.remove(content, &key).await?;
                    log::debug!("Evicted {logical}");
                    report.evicted.push(logical);
                }
            }
        } else {
            report.first_install = true;
            self.store.delete(content).await?;
            self.store.open(content).await?;
        }

        report.promoted = copy_namespace(&self.store, staging, content).await?;
        self.store.delete(staging).await?;

        let record = CachedResponse::ok(self.manifest.to_json()?)
            .with_header("content-type", "application/json");
        self.store
            .put(manifest_cache, &self.manifest_record_key()?, &record)
            .await?;
        Ok(report)
    }

    /// Offers a client request to the cache.
    ///
    /// Only GET requests for manifest resources on this origin are
    /// intercepted; everything else yields [`FetchOutcome::Passthrough`]. The
    /// root document is served online-first, all other resources cache-first.
    ///
    /// # Errors
    ///
    /// Returns the network error when the resource is neither reachable nor cached.
    pub async fn handle_fetch(&self, method: &str, url: &str) -> Result<FetchOutcome> {
        if !method.eq_ignore_ascii_case("GET") {
            return Ok(FetchOutcome::Passthrough);
        }
        let Some(key) = self.origin.request_key(url) else {
            return Ok(FetchOutcome::Passthrough);
        };
        if !self.manifest.contains(&key) {
            log::debug!("Not in manifest, passing through: {url}");
            return Ok(FetchOutcome::Passthrough);
        }

        let request = RequestKey::parse("GET", url)?;
        if key == ROOT_KEY {
            self.online_first(request).await
        } else {
            self.cache_first(request).await
        }
    }

    async fn store_lazily(&self, request: &RequestKey, response: &CachedResponse) {
        if let Err(e) = self
            .store
            .put(&self.config.content_cache, request, response)
            .await
        {
            log::warn!("Failed to cache {request}: {e}");
        }
    }

    async fn cache_first(&self, request: RequestKey) -> Result<FetchOutcome> {
        let content = &self.config.content_cache;
        if let Some(response) = self.store.get(content, &request).await? {
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }

        let response = self.fetcher.fetch(&FetchRequest::new(request.clone())).await?;
        if response.is_ok() {
            self.store_lazily(&request, &response).await;
        }
        Ok(FetchOutcome::Respond {
            response,
            source: ResponseSource::Network,
        })
    }

    async fn online_first(&self, request: RequestKey) -> Result<FetchOutcome> {
        match self.fetcher.fetch(&FetchRequest::new(request.clone())).await {
            Ok(response) => {
                if response.is_ok() {
                    self.store_lazily(&request, &response).await;
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(err) => {
                log::info!("Network unavailable for {request}, falling back to cache: {err}");
                match self.store.get(&self.config.content_cache, &request).await {
                    Ok(Some(response)) => Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::Cache,
                    }),
                    Ok(None) => Err(err),
                    Err(store_err) => {
                        log::warn!("Cache lookup for {request} failed: {store_err}");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Fetches every manifest resource that is not yet in the content cache.
    ///
    /// Presence is decided by logical key. Like install this is
    /// all-or-nothing: one failed fetch means nothing new is stored.
    ///
    /// # Errors
    ///
    /// Returns the first fetch or store error.
    pub async fn download_offline(&self) -> Result<OfflineReport> {
        let content = &self.config.content_cache;
        self.store.open(content).await?;

        let cached: HashSet<String> = self
            .store
            .keys(content)
            .await?
            .iter()
            .map(|key| self.origin.entry_key(&key.url))
            .collect();

        let missing: Vec<String> = self
            .manifest
            .keys()
            .filter(|key| !cached.contains(*key))
            .map(str::to_string)
            .collect();
        let already_cached = self.manifest.len() - missing.len();

        let requests = missing
            .iter()
            .map(|key| Ok(FetchRequest::new(RequestKey::get(&self.origin.resolve(key)?))))
            .collect::<Result<Vec<_>>>()?;
        let added = self.add_all(content, requests).await?;
        log::info!(
            "Downloaded {added} resources for offline use ({already_cached} already cached)"
        );

        Ok(OfflineReport {
            fetched: missing,
            already_cached,
        })
    }

    /// Handles a message posted by a client page.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested action fails.
    pub async fn handle_message(&self, data: &str) -> Result<MessageOutcome> {
        match data.parse::<WorkerMessage>() {
            Ok(WorkerMessage::SkipWaiting) => {
                self.host.skip_waiting().await?;
                Ok(MessageOutcome::SkippedWaiting)
            }
            Ok(WorkerMessage::DownloadOffline) => {
                Ok(MessageOutcome::Downloaded(self.download_offline().await?))
            }
            Err(e) => {
                log::debug!("Ignoring {e}");
                Ok(MessageOutcome::Ignored)
            }
        }
    }
}
