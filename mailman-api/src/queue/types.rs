//! Inbound queue entry format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the engine queue injected posts are delivered to.
pub const INBOUND_QUEUE: &str = "in";

/// One message waiting in the inbound queue.
///
/// The raw message is stored verbatim; the engine's incoming runner does all
/// parsing, moderation and delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEntry {
    /// List the message is addressed to
    pub listname: String,
    /// When the entry was queued
    pub received_at: DateTime<Utc>,
    /// Raw RFC 5322 message (headers + body)
    pub message: String,
}

impl InboundEntry {
    /// Create an entry stamped with the current time.
    pub fn new(listname: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            listname: listname.into(),
            received_at: Utc::now(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_entry_serialization() {
        let entry = InboundEntry::new("dev", "From: a@example.com\r\n\r\nHi");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"listname\":\"dev\""));
        assert!(json.contains("\"received_at\""));
    }
}
