//! Result types returned by the reconciler's entry points.

use crate::response::CachedResponse;

/// What activation did to the content cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// True if no manifest record existed and the content cache was rebuilt.
    pub first_install: bool,
    /// Number of content entries kept because their fingerprint did not change.
    pub kept: usize,
    /// Logical keys of the content entries that were evicted.
    pub evicted: Vec<String>,
    /// Number of staging entries copied into the content cache.
    pub promoted: usize,
}

/// What an offline download fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfflineReport {
    /// Manifest keys fetched and added to the content cache.
    pub fetched: Vec<String>,
    /// Manifest keys that were already cached.
    pub already_cached: usize,
}

impl OfflineReport {
    /// Returns true if nothing needed to be fetched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.fetched.is_empty()
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the content cache.
    Cache,
    /// Fetched live from the network.
    Network,
}

/// Result of offering a request to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The request is not handled; default network handling applies.
    Passthrough,
    /// The reconciler answered the request.
    Respond {
        /// Response for the client.
        response: CachedResponse,
        /// Origin of the response.
        source: ResponseSource,
    },
}

impl FetchOutcome {
    /// Returns the response, if the request was intercepted.
    #[must_use]
    pub const fn response(&self) -> Option<&CachedResponse> {
        match self {
            Self::Passthrough => None,
            Self::Respond { response, .. } => Some(response),
        }
    }

    /// Returns the response source, if the request was intercepted.
    #[must_use]
    pub const fn source(&self) -> Option<ResponseSource> {
        match self {
            Self::Passthrough => None,
            Self::Respond { source, .. } => Some(*source),
        }
    }
}

/// Result of handling a client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Immediate activation was requested from the host.
    SkippedWaiting,
    /// Missing manifest resources were downloaded.
    Downloaded(OfflineReport),
    /// The message was not recognized and was ignored.
    Ignored,
}
