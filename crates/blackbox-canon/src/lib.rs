//! # blackbox-canon
//!
//! Deterministic canonical serialization for the blackbox recorder.
//!
//! ## Overview
//!
//! Signatures are only meaningful if producer and recorder derive the same
//! bytes from the same logical value. `canonicalize` guarantees that: map
//! key order, set iteration order, timezone and object identity never
//! influence the output. Values that cannot be encoded faithfully (cycles,
//! runaway nesting, non-finite floats) fail with a `CanonicalError`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use blackbox_canon::canonicalize;
//! use serde_json::json;
//!
//! let a = canonicalize(&json!({ "b": 1, "a": 2 }))?;
//! let b = canonicalize(&json!({ "a": 2, "b": 1 }))?;
//! assert_eq!(a, b);
//! ```

pub mod canonical;
mod encode;
pub mod envelope;

pub use canonical::{Bytes, Canonicalize, Canonicalizer, ObjectBuilder, DEFAULT_MAX_DEPTH};
pub use envelope::SigningPayload;

use blackbox_contracts::{error::CanonicalError, value::Value};

/// Reduce `value` to its canonical `Value` tree.
pub fn to_value<T: Canonicalize + ?Sized>(value: &T) -> Result<Value, CanonicalError> {
    Canonicalizer::new().nested(value)
}

/// Reduce `value` to its canonical bytes.
pub fn canonicalize<T: Canonicalize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    encode::encode(&to_value(value)?)
}

/// Like `canonicalize`, with an explicit nesting limit.
pub fn canonicalize_with_limit<T: Canonicalize + ?Sized>(
    value: &T,
    max_depth: usize,
) -> Result<Vec<u8>, CanonicalError> {
    let tree = Canonicalizer::with_max_depth(max_depth).nested(value)?;
    encode::encode(&tree)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
