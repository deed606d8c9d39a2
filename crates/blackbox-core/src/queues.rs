//! Named-queue directory.
//!
//! Producers never hold a reference to the recorder. They look up its event
//! channel by name here and receive a sender, which is the only capability
//! they get: they can enqueue, nothing more.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use blackbox_contracts::{
    error::{BlackBoxError, BlackBoxResult},
    event::ChannelMessage,
};

/// Sending half of a recorder channel.
pub type QueueSender = UnboundedSender<ChannelMessage>;

/// Maps well-known names to channel senders. Clones share one registry.
#[derive(Debug, Clone, Default)]
pub struct QueueDirectory {
    queues: Arc<RwLock<HashMap<String, QueueSender>>>,
}

impl QueueDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` under `name`.
    ///
    /// Fails with `Configuration` if the name is already taken: a second
    /// consumer must not silently capture another recorder's traffic.
    pub fn register(&self, name: &str, sender: QueueSender) -> BlackBoxResult<()> {
        let mut queues = self.queues.write().map_err(|e| BlackBoxError::Configuration {
            reason: format!("queue directory lock poisoned: {}", e),
        })?;
        if queues.contains_key(name) {
            return Err(BlackBoxError::Configuration {
                reason: format!("queue '{}' is already registered", name),
            });
        }
        queues.insert(name.to_string(), sender);
        debug!(queue = %name, "queue registered");
        Ok(())
    }

    /// Remove the registration for `name`, if any.
    pub fn unregister(&self, name: &str) {
        if let Ok(mut queues) = self.queues.write() {
            if queues.remove(name).is_some() {
                debug!(queue = %name, "queue unregistered");
            }
        }
    }

    /// Look up the sender registered under `name`.
    pub fn get(&self, name: &str) -> Option<QueueSender> {
        self.queues.read().ok()?.get(name).cloned()
    }
}
