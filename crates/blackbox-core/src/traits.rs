//! The persistence seam between the recorder and its store.
//!
//! The recorder decides *whether* something is recorded; an `AuditStore`
//! decides *how*. Keeping the seam a trait lets the recorder be exercised
//! against in-memory stores in tests and the append-only file store in
//! production.

use std::sync::Arc;

use blackbox_contracts::{error::BlackBoxResult, event::Event};

/// An append-only sink for verified records.
///
/// Implementations must never modify or delete a record once appended.
pub trait AuditStore: Send + Sync {
    /// Append one event record.
    ///
    /// Returns whether the event's signature is valid under the store's own
    /// check. Fails with `Configuration` if the store has no public key,
    /// `Serialization` if the event cannot be canonicalized and
    /// `Persistence` if the write fails.
    fn append_event_record(&self, event: &Event) -> BlackBoxResult<bool>;

    /// Append one `"<signature> <message>"` record.
    ///
    /// Fails with `Configuration` if the store has no public key and
    /// `Persistence` if the write fails.
    fn append_message_record(&self, raw_signed_message: &str) -> BlackBoxResult<bool>;
}

impl<S: AuditStore + ?Sized> AuditStore for Arc<S> {
    fn append_event_record(&self, event: &Event) -> BlackBoxResult<bool> {
        (**self).append_event_record(event)
    }

    fn append_message_record(&self, raw_signed_message: &str) -> BlackBoxResult<bool> {
        (**self).append_message_record(raw_signed_message)
    }
}
