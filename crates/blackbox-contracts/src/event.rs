//! Event envelope and control message types.
//!
//! `Event` is the wire-level record a producer signs and pushes onto the
//! recorder's event channel. `ControlEvent` is the supervisor's command
//! type. Both travel inside a `ChannelMessage`, which also admits raw JSON
//! bytes from producers that serialize themselves.

use serde::{Deserialize, Serialize};

use crate::{
    error::{BlackBoxError, BlackBoxResult},
    value::Value,
};

/// Operation that asks the recorder to persist the event itself.
pub const LOG_EVENT: &str = "log_event";

/// Operation that asks the recorder to persist a signed text message.
pub const LOG_MESSAGE: &str = "log_message";

/// Control operation that stops the recorder.
pub const STOP: &str = "stop";

/// A message describing an action to audit.
///
/// The `signature` covers the canonical form of the other five fields only.
/// Changing any of them after signing invalidates the signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Component that produced the event.
    pub source: String,
    /// Component the event is addressed to.
    pub destination: String,
    /// What the recipient should do with it (`log_event`, `log_message`, ...).
    pub operation: String,
    /// The payload.
    pub parameters: Value,
    /// Auxiliary metadata; an empty map unless the producer sets it.
    #[serde(default)]
    pub extra_parameters: Value,
    /// Base64 signature, absent until the producer signs the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Event {
    /// Build an unsigned event with empty `extra_parameters`.
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        operation: impl Into<String>,
        parameters: impl Into<Value>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            operation: operation.into(),
            parameters: parameters.into(),
            extra_parameters: Value::empty_map(),
            signature: None,
        }
    }

    pub fn with_extra_parameters(mut self, extra: impl Into<Value>) -> Self {
        self.extra_parameters = extra.into();
        self
    }

    /// True when a non-empty signature is attached.
    pub fn is_signed(&self) -> bool {
        self.signature.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// An operator command addressed to the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub operation: String,
}

impl ControlEvent {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn stop() -> Self {
        Self::new(STOP)
    }

    pub fn is_stop(&self) -> bool {
        self.operation == STOP
    }
}

/// One item on a recorder channel.
///
/// Nothing on a channel is trusted: the recorder decodes each item into the
/// shape that channel expects and drops whatever does not fit.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Event(Event),
    Control(ControlEvent),
    /// JSON bytes from a producer that serializes its own messages.
    Wire(Vec<u8>),
}

impl ChannelMessage {
    /// Decode this item as an `Event`.
    ///
    /// Returns `MalformedMessage` for control messages and for wire bytes
    /// that are not a JSON-encoded `Event`.
    pub fn into_event(self) -> BlackBoxResult<Event> {
        match self {
            ChannelMessage::Event(event) => Ok(event),
            ChannelMessage::Control(control) => Err(BlackBoxError::MalformedMessage {
                reason: format!(
                    "control message '{}' on the event channel",
                    control.operation
                ),
            }),
            ChannelMessage::Wire(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| BlackBoxError::MalformedMessage {
                    reason: format!("wire bytes are not an event: {}", e),
                })
            }
        }
    }

    /// Decode this item as a `ControlEvent`.
    pub fn into_control(self) -> BlackBoxResult<ControlEvent> {
        match self {
            ChannelMessage::Control(control) => Ok(control),
            ChannelMessage::Event(event) => Err(BlackBoxError::MalformedMessage {
                reason: format!("event '{}' on the control channel", event.operation),
            }),
            ChannelMessage::Wire(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| BlackBoxError::MalformedMessage {
                    reason: format!("wire bytes are not a control event: {}", e),
                })
            }
        }
    }
}

impl From<Event> for ChannelMessage {
    fn from(event: Event) -> Self {
        ChannelMessage::Event(event)
    }
}

impl From<ControlEvent> for ChannelMessage {
    fn from(control: ControlEvent) -> Self {
        ChannelMessage::Control(control)
    }
}
