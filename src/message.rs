//! Commands accepted from the hosting page.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A message posted to the reconciler by a client page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// Activate a waiting version immediately.
    #[serde(rename = "skipWaiting")]
    SkipWaiting,
    /// Fetch every manifest resource missing from the content cache.
    #[serde(rename = "downloadOffline")]
    DownloadOffline,
}

impl WorkerMessage {
    /// Wire name of the message.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkipWaiting => "skipWaiting",
            Self::DownloadOffline => "downloadOffline",
        }
    }
}

impl fmt::Display for WorkerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a message is not one of the known commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMessage(pub String);

impl fmt::Display for UnknownMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown message {:?}", self.0)
    }
}

impl std::error::Error for UnknownMessage {}

impl FromStr for WorkerMessage {
    type Err = UnknownMessage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skipWaiting" => Ok(Self::SkipWaiting),
            "downloadOffline" => Ok(Self::DownloadOffline),
            other => Err(UnknownMessage(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_commands() {
        assert_eq!("skipWaiting".parse(), Ok(WorkerMessage::SkipWaiting));
        assert_eq!("downloadOffline".parse(), Ok(WorkerMessage::DownloadOffline));
    }

    #[test]
    fn commands_are_case_sensitive() {
        assert!("skipwaiting".parse::<WorkerMessage>().is_err());
        assert!(" downloadOffline".parse::<WorkerMessage>().is_err());
    }

    #[test]
    fn json_uses_wire_names() {
        let json = serde_json::to_string(&WorkerMessage::DownloadOffline).unwrap();
        assert_eq!(json, "\"downloadOffline\"");
        let parsed: WorkerMessage = serde_json::from_str("\"skipWaiting\"").unwrap();
        assert_eq!(parsed, WorkerMessage::SkipWaiting);
    }
}
