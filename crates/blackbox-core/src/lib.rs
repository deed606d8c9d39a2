//! # blackbox-core
//!
//! The verifying recorder for the blackbox audit log.
//!
//! This crate provides:
//! - The `AuditStore` trait, the seam between verification and persistence
//! - The `Recorder` that drains the event channel, verifies every event and
//!   forwards only the verified ones to its store
//! - The `QueueDirectory` producers use to find the recorder's channel
//! - `Producer`, a signing client for that channel
//! - `RecorderConfig`, loaded from TOML
//!
//! ## Usage
//!
//! ```rust,ignore
//! use blackbox_core::{Producer, QueueDirectory, Recorder, EVENTS_QUEUE_NAME};
//!
//! let directory = QueueDirectory::new();
//! let handle = Recorder::new(store, public_key, &directory)?.spawn();
//!
//! let producer = Producer::connect("svc", private_key, &directory, EVENTS_QUEUE_NAME)?;
//! producer.log_event("mgr", json!({ "id": 7 }))?;
//!
//! handle.send_control(ControlEvent::stop())?;
//! let stats = handle.join().await?;
//! ```

pub mod config;
pub mod producer;
pub mod queues;
pub mod recorder;
pub mod stop;
pub mod traits;

pub use config::{RecorderConfig, SessionMode};
pub use producer::Producer;
pub use queues::{QueueDirectory, QueueSender};
pub use recorder::{
    Recorder, RecorderHandle, RecorderState, RecorderStats, DEFAULT_POLL_INTERVAL,
    EVENTS_QUEUE_NAME, SECURITY_TARGET,
};
pub use stop::StopToken;
pub use traits::AuditStore;
