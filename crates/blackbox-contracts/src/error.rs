//! Error types for the blackbox recorder.
//!
//! All fallible operations in the workspace return `BlackBoxResult<T>`.
//! Variants map onto how the recorder treats them: configuration,
//! serialization and persistence failures propagate to the caller, while
//! verification and malformed-message failures are recovered locally by
//! dropping the offending item.

use thiserror::Error;

/// Failures raised while building the canonical form of a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalError {
    /// The value nests deeper than the canonicalizer allows.
    #[error("recursion limit of {limit} exceeded while canonicalizing")]
    RecursionLimit { limit: usize },

    /// A shared value refers back to itself.
    #[error("cyclic value detected in '{type_name}'")]
    Cyclic { type_name: String },

    /// NaN and infinities have no canonical text form.
    #[error("non-finite float cannot be canonicalized")]
    NonFiniteFloat,

    /// A lock guarding part of the value was poisoned by a panicking writer.
    #[error("lock poisoned while reading '{type_name}'")]
    LockPoisoned { type_name: String },

    /// The lowered JSON could not be written out.
    #[error("canonical encoding failed: {reason}")]
    Encoding { reason: String },
}

/// The unified error type for the blackbox recorder.
#[derive(Debug, Error)]
pub enum BlackBoxError {
    /// A required configuration value is missing or invalid.
    ///
    /// Raised immediately by the operation that needed it, e.g. an append
    /// attempted on a store that has no public key.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// A signature was absent, malformed or did not verify.
    #[error("verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// A channel item did not have the expected shape.
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// The value could not be reduced to canonical bytes.
    #[error("serialization failure: {0}")]
    Serialization(#[from] CanonicalError),

    /// The backing file could not be written.
    #[error("persistence failure on '{path}': {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The recorder task is gone: it panicked, was aborted, or has already
    /// terminated and closed its channels.
    #[error("recorder terminated: {reason}")]
    RecorderTerminated { reason: String },
}

impl BlackBoxError {
    /// Shorthand for the configuration error raised when no public key is set.
    pub fn missing_public_key() -> Self {
        Self::Configuration {
            reason: "Public key is not set".to_string(),
        }
    }
}

/// Convenience alias used throughout the blackbox crates.
pub type BlackBoxResult<T> = Result<T, BlackBoxError>;
