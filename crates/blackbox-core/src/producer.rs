//! Producer side of the recorder protocol.
//!
//! A `Producer` signs what it sends with its own private key and pushes it
//! onto the recorder's event channel. Log messages carry two signatures:
//! the inner one over the message text, kept in the persisted record so an
//! auditor can check the text later, and the outer event signature the
//! recorder checks before accepting anything.

use tracing::debug;

use blackbox_contracts::{
    error::{BlackBoxError, BlackBoxResult},
    event::{ChannelMessage, Event, LOG_EVENT, LOG_MESSAGE},
    value::Value,
};
use blackbox_signing::{sign_value, signed_event, PrivateKey};

use crate::queues::{QueueDirectory, QueueSender};

pub struct Producer {
    name: String,
    key: PrivateKey,
    sender: QueueSender,
}

impl Producer {
    pub fn new(name: impl Into<String>, key: PrivateKey, sender: QueueSender) -> Self {
        Self {
            name: name.into(),
            key,
            sender,
        }
    }

    /// Look up `queue` in `directory` and build a producer that sends to it.
    pub fn connect(
        name: impl Into<String>,
        key: PrivateKey,
        directory: &QueueDirectory,
        queue: &str,
    ) -> BlackBoxResult<Self> {
        let sender = directory.get(queue).ok_or_else(|| BlackBoxError::Configuration {
            reason: format!("queue '{}' is not registered", queue),
        })?;
        Ok(Self::new(name, key, sender))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sign `event` with this producer's key and enqueue it.
    pub fn send(&self, event: Event) -> BlackBoxResult<()> {
        let event = signed_event(event, &self.key)?;
        debug!(
            producer = %self.name,
            operation = %event.operation,
            "enqueueing signed event"
        );
        self.send_raw(ChannelMessage::Event(event))
    }

    /// Enqueue `message` exactly as given, without signing anything.
    pub fn send_raw(&self, message: ChannelMessage) -> BlackBoxResult<()> {
        self.sender
            .send(message)
            .map_err(|_| BlackBoxError::RecorderTerminated {
                reason: "event channel is closed".to_string(),
            })
    }

    /// Ask the recorder to persist an event record carrying `parameters`.
    pub fn log_event(
        &self,
        destination: impl Into<String>,
        parameters: impl Into<Value>,
    ) -> BlackBoxResult<()> {
        self.send(Event::new(self.name.clone(), destination, LOG_EVENT, parameters))
    }

    /// Ask the recorder to persist `message` together with its signature.
    pub fn log_message(&self, destination: impl Into<String>, message: &str) -> BlackBoxResult<()> {
        let signature = sign_value(message, &self.key)?;
        let raw = format!("{} {}", signature, message);
        self.send(Event::new(self.name.clone(), destination, LOG_MESSAGE, raw))
    }
}
