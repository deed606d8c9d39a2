//! Recorder configuration.
//!
//! `RecorderConfig` is loaded from a TOML string or file. Every field has a
//! default, so an empty document is a valid configuration apart from the
//! public key, which must be supplied either inline or by path before the
//! recorder can start.
//!
//! Example:
//! ```toml
//! storage_path = "blackbox.log"
//! events_queue = "black_box"
//! poll_interval_ms = 500
//! public_key_path = "keys/recorder.pub.pem"
//! session = "fresh"
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use blackbox_contracts::error::{BlackBoxError, BlackBoxResult};
use blackbox_signing::PublicKey;

use crate::recorder::EVENTS_QUEUE_NAME;

/// What the store does with an existing log file when it opens.
///
/// Expressed in TOML as `"fresh"` or `"preserve"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Truncate: the previous session's media is not trusted.
    #[default]
    Fresh,
    /// Keep prior records and append after them.
    Preserve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
    /// File the store appends to.
    pub storage_path: PathBuf,

    /// Name the recorder registers its event channel under.
    pub events_queue: String,

    /// Milliseconds between poll cycles. Must be non-zero.
    pub poll_interval_ms: u64,

    /// Path to the trusted public key (SubjectPublicKeyInfo PEM).
    pub public_key_path: Option<PathBuf>,

    /// Inline trusted public key. Takes precedence over `public_key_path`.
    pub public_key_pem: Option<String>,

    pub session: SessionMode,

    /// Minimum severity for diagnostics when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("blackbox.log"),
            events_queue: EVENTS_QUEUE_NAME.to_string(),
            poll_interval_ms: 500,
            public_key_path: None,
            public_key_pem: None,
            session: SessionMode::Fresh,
            log_level: "info".to_string(),
        }
    }
}

impl RecorderConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `Configuration` if the TOML is malformed, has unknown keys or
    /// specifies a zero poll interval.
    pub fn from_toml_str(s: &str) -> BlackBoxResult<Self> {
        let config: RecorderConfig = toml::from_str(s).map_err(|e| BlackBoxError::Configuration {
            reason: format!("failed to parse recorder TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML.
    pub fn from_file(path: &Path) -> BlackBoxResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BlackBoxError::Configuration {
            reason: format!("failed to read recorder config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> BlackBoxResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(BlackBoxError::Configuration {
                reason: "poll_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.events_queue.is_empty() {
            return Err(BlackBoxError::Configuration {
                reason: "events_queue must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load the trusted public key, if one is configured.
    ///
    /// `Ok(None)` when neither `public_key_pem` nor `public_key_path` is set;
    /// `Configuration` when the configured key cannot be read or parsed.
    pub fn public_key(&self) -> BlackBoxResult<Option<PublicKey>> {
        if let Some(pem) = &self.public_key_pem {
            return PublicKey::from_pem(pem).map(Some);
        }
        match &self.public_key_path {
            Some(path) => PublicKey::from_file(path).map(Some),
            None => Ok(None),
        }
    }

    /// Load the trusted public key, failing if none is configured.
    pub fn require_public_key(&self) -> BlackBoxResult<PublicKey> {
        self.public_key()?
            .ok_or_else(BlackBoxError::missing_public_key)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use blackbox_contracts::error::BlackBoxError;
    use blackbox_signing::PrivateKey;

    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RecorderConfig::from_toml_str("").unwrap();
        assert_eq!(config, RecorderConfig::default());
        assert_eq!(config.events_queue, EVENTS_QUEUE_NAME);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.session, SessionMode::Fresh);
        assert!(config.public_key().unwrap().is_none());
    }

    #[test]
    fn test_full_document_parses() {
        let config = RecorderConfig::from_toml_str(
            r#"
            storage_path = "/var/log/blackbox/audit.log"
            events_queue = "ward_7"
            poll_interval_ms = 50
            public_key_path = "/etc/blackbox/recorder.pub.pem"
            session = "preserve"
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_path, PathBuf::from("/var/log/blackbox/audit.log"));
        assert_eq!(config.events_queue, "ward_7");
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.session, SessionMode::Preserve);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_documents_rejected() {
        for doc in [
            "poll_interval_ms = 0",
            "events_queue = \"\"",
            "session = \"sometimes\"",
            "unexpected = true",
            "poll_interval_ms = ",
        ] {
            let result = RecorderConfig::from_toml_str(doc);
            assert!(
                matches!(result, Err(BlackBoxError::Configuration { .. })),
                "expected Configuration error for {:?}",
                doc
            );
        }
    }

    #[test]
    fn test_inline_key_loaded() {
        let public = PrivateKey::from_seed([3u8; 32]).public_key();
        let config = RecorderConfig {
            public_key_pem: Some(public.to_pem().unwrap()),
            public_key_path: Some(PathBuf::from("/nonexistent/key.pem")),
            ..RecorderConfig::default()
        };
        // Inline PEM wins over the path, which would fail to read.
        assert_eq!(config.require_public_key().unwrap(), public);
    }

    #[test]
    fn test_key_loaded_from_file() {
        let public = PrivateKey::from_seed([4u8; 32]).public_key();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.pub.pem");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(public.to_pem().unwrap().as_bytes())
            .unwrap();

        let config = RecorderConfig::from_toml_str(&format!(
            "public_key_path = {:?}",
            path.display().to_string()
        ))
        .unwrap();
        assert_eq!(config.public_key().unwrap(), Some(public));
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = RecorderConfig::default().require_public_key().unwrap_err();
        assert!(matches!(err, BlackBoxError::Configuration { .. }));
        assert!(err.to_string().contains("Public key is not set"));
    }

    #[test]
    fn test_from_file_missing_path() {
        let result = RecorderConfig::from_file(Path::new("/nonexistent/blackbox.toml"));
        assert!(matches!(result, Err(BlackBoxError::Configuration { .. })));
    }
}
