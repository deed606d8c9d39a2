//! Persisted record shapes.
//!
//! The store writes two kinds of line: an event record (the canonical form
//! of `{event, valid, error?}`) and a message record. The message record's
//! field order is fixed, so it is a plain struct whose declaration order is
//! the serialization order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `strftime` layout of `MessageRecord::time`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Value of the `error` field on an event record that failed verification.
pub const INVALID_SIGNATURE: &str = "Invalid signature";

/// A signed text message as it appears in the log.
///
/// Serializes as `{"time": .., "message": .., "signature": ..}`, in that
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// UTC timestamp formatted with `TIME_FORMAT`.
    pub time: String,
    pub message: String,
    pub signature: String,
}

impl MessageRecord {
    /// Split a `"<signature> <message>"` string at its first whitespace.
    ///
    /// Input without whitespace is treated as a bare signature with an
    /// empty message.
    pub fn from_signed_message(raw: &str, at: DateTime<Utc>) -> Self {
        let (signature, message) = match raw.split_once(char::is_whitespace) {
            Some((signature, message)) => (signature, message),
            None => (raw, ""),
        };
        Self {
            time: at.format(TIME_FORMAT).to_string(),
            message: message.to_string(),
            signature: signature.to_string(),
        }
    }
}
