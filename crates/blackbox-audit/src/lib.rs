//! # blackbox-audit
//!
//! Append-only NDJSON audit log for the blackbox recorder.
//!
//! ## Overview
//!
//! `FileAuditStore` is the production `AuditStore`. Each event the recorder
//! accepts is re-verified and written as the canonical JSON of
//! `{"event": .., "valid": .., "error"?: ..}`; each signed message is written
//! as `{"time": .., "message": .., "signature": ..}`. Lines are never
//! rewritten once appended.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use blackbox_audit::{read_records, FileAuditStore};
//! use blackbox_core::traits::AuditStore;
//!
//! let store = FileAuditStore::create("blackbox.log", Some(public_key))?;
//! assert!(store.append_event_record(&signed_event)?);
//!
//! for record in read_records("blackbox.log")? {
//!     println!("{record}");
//! }
//! ```

pub mod file;

pub use file::{read_records, FileAuditStore};

// ── Tests ─────────────────────────────────────────────────────────────────────
