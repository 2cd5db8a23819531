//! Hooks into the runtime that hosts the reconciler.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle controls provided by the hosting runtime.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Asks the runtime to activate this version now instead of waiting for
    /// the previous one to release its clients.
    async fn skip_waiting(&self) -> Result<()>;

    /// Takes control of all currently open client pages without a reload.
    async fn claim_clients(&self) -> Result<()>;
}

/// A host that only records and logs lifecycle requests.
///
/// Used by the command-line driver, where each invocation is a single event
/// and there are no client pages to take over.
#[derive(Debug, Default)]
pub struct LocalHost {
    skip_waiting: AtomicUsize,
    claims: AtomicUsize,
}

impl LocalHost {
    /// Creates a new host with zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            skip_waiting: AtomicUsize::new(0),
            claims: AtomicUsize::new(0),
        }
    }

    /// Number of skip-waiting requests received.
    #[must_use]
    pub fn skip_waiting_count(&self) -> usize {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    /// Number of client claims received.
    #[must_use]
    pub fn claim_count(&self) -> usize {
        self.claims.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkerHost for LocalHost {
    async fn skip_waiting(&self) -> Result<()> {
        self.skip_waiting.fetch_add(1, Ordering::Relaxed);
        log::info!("Requested immediate activation");
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        self.claims.fetch_add(1, Ordering::Relaxed);
        log::info!("Claimed open clients");
        Ok(())
    }
}
