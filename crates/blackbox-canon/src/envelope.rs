//! Canonical forms of the envelope types.
//!
//! An `Event` has two canonical forms. The full form, written to the log,
//! includes the signature when one is attached. The signing payload omits
//! it: that is the exact preimage producers sign and the recorder verifies.
//! For an unsigned event the two forms are byte-identical.

use blackbox_contracts::{
    error::CanonicalError,
    event::Event,
    value::Value,
};

use crate::canonical::{Canonicalize, Canonicalizer};

/// Qualified type name under which events are canonicalized.
pub const EVENT_TYPE_NAME: &str = "blackbox.event.Event";

/// Borrowed view of an event without its signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningPayload<'a> {
    event: &'a Event,
}

impl<'a> SigningPayload<'a> {
    pub fn of(event: &'a Event) -> Self {
        Self { event }
    }
}

impl Canonicalize for SigningPayload<'_> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        let e = self.event;
        Ok(cx
            .object(EVENT_TYPE_NAME)
            .field("source", &e.source)?
            .field("destination", &e.destination)?
            .field("operation", &e.operation)?
            .field("parameters", &e.parameters)?
            .field("extra_parameters", &e.extra_parameters)?
            .finish())
    }
}

impl Canonicalize for Event {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        let signature = self.signature.as_ref().filter(|s| !s.is_empty());
        Ok(cx
            .object(EVENT_TYPE_NAME)
            .field("source", &self.source)?
            .field("destination", &self.destination)?
            .field("operation", &self.operation)?
            .field("parameters", &self.parameters)?
            .field("extra_parameters", &self.extra_parameters)?
            .optional_field("signature", signature)?
            .finish())
    }
}
