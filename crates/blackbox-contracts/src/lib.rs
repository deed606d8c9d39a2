//! # blackbox-contracts
//!
//! Shared types for the blackbox recorder: the event envelope, the payload
//! value model, persisted record shapes and the error taxonomy.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions and error types.

pub mod error;
pub mod event;
pub mod record;
pub mod value;

pub use error::{BlackBoxError, BlackBoxResult, CanonicalError};
pub use event::{ChannelMessage, ControlEvent, Event};
pub use record::MessageRecord;
pub use value::Value;
