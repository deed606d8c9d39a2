//! File-backed implementation of `AuditStore`.
//!
//! `FileAuditStore` writes one JSON object per line to a single file and
//! never rewrites what it has written. The only destructive operation is
//! the truncation performed when a fresh session opens the file.
//!
//! Every append is one `write_all` of a complete line while the file mutex
//! is held, so concurrent appends from several threads never interleave.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info, warn};

use blackbox_canon::{canonicalize, to_value};
use blackbox_contracts::{
    error::{BlackBoxError, BlackBoxResult},
    event::Event,
    record::{MessageRecord, INVALID_SIGNATURE},
    value::Value,
};
use blackbox_core::{traits::AuditStore, SessionMode, SECURITY_TARGET};
use blackbox_signing::{verify_event, PublicKey};

// ── Store ─────────────────────────────────────────────────────────────────────

/// An append-only NDJSON audit log.
pub struct FileAuditStore {
    path: PathBuf,
    public_key: Option<PublicKey>,
    file: Mutex<File>,
}

impl FileAuditStore {
    /// Open `path` for a fresh session, discarding anything already there.
    pub fn create(path: impl AsRef<Path>, public_key: Option<PublicKey>) -> BlackBoxResult<Self> {
        Self::open(path, public_key, SessionMode::Fresh)
    }

    /// Open `path` in the given session mode.
    ///
    /// `Fresh` truncates the file; `Preserve` keeps prior records and
    /// appends after them. Either way the file is created if missing.
    pub fn open(
        path: impl AsRef<Path>,
        public_key: Option<PublicKey>,
        session: SessionMode,
    ) -> BlackBoxResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        match session {
            SessionMode::Fresh => options.write(true).create(true).truncate(true),
            SessionMode::Preserve => options.append(true).create(true),
        };
        let file = options.open(&path).map_err(|source| persistence(&path, source))?;

        let fingerprint = public_key
            .as_ref()
            .map(PublicKey::fingerprint)
            .unwrap_or_else(|| "none".to_string());
        info!(
            path = %path.display(),
            session = ?session,
            key = %fingerprint,
            "audit log opened"
        );

        Ok(Self {
            path,
            public_key,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    /// Install the key used to re-verify events.
    pub fn set_public_key(&mut self, public_key: PublicKey) {
        self.public_key = Some(public_key);
    }

    fn require_key(&self) -> BlackBoxResult<&PublicKey> {
        self.public_key
            .as_ref()
            .ok_or_else(BlackBoxError::missing_public_key)
    }

    /// Append `line` plus a newline as a single write.
    fn append_line(&self, mut line: Vec<u8>) -> BlackBoxResult<()> {
        line.push(b'\n');
        let mut file = self.file.lock().map_err(|e| BlackBoxError::Persistence {
            path: self.path.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("audit file lock poisoned: {}", e),
            ),
        })?;
        file.write_all(&line)
            .and_then(|()| file.flush())
            .map_err(|source| persistence(&self.path, source))
    }
}

fn persistence(path: &Path, source: std::io::Error) -> BlackBoxError {
    BlackBoxError::Persistence {
        path: path.display().to_string(),
        source,
    }
}

// ── AuditStore impl ───────────────────────────────────────────────────────────

impl AuditStore for FileAuditStore {
    /// Re-verify `event` and append `{"event", "valid", "error"?}` in
    /// canonical form.
    fn append_event_record(&self, event: &Event) -> BlackBoxResult<bool> {
        let key = self.require_key()?;
        let valid = verify_event(event, key)?;

        let mut record = Value::empty_map();
        if let Value::Map(fields) = &mut record {
            fields.insert("event".to_string(), to_value(event)?);
            fields.insert("valid".to_string(), Value::Bool(valid));
            if !valid {
                fields.insert("error".to_string(), Value::from(INVALID_SIGNATURE));
            }
        }

        self.append_line(canonicalize(&record)?)?;

        if valid {
            debug!(source = %event.source, "event record appended");
        } else {
            warn!(
                target: SECURITY_TARGET,
                source = %event.source,
                "event record appended with invalid signature"
            );
        }
        Ok(valid)
    }

    fn append_message_record(&self, raw_signed_message: &str) -> BlackBoxResult<bool> {
        self.require_key()?;
        let record = MessageRecord::from_signed_message(raw_signed_message, Utc::now());
        let line = serde_json::to_vec(&record).map_err(|e| BlackBoxError::MalformedMessage {
            reason: format!("message record not serializable: {}", e),
        })?;
        self.append_line(line)?;
        debug!(time = %record.time, "message record appended");
        Ok(true)
    }
}

// ── Reading back ──────────────────────────────────────────────────────────────

/// Read every record in the log at `path`, in file order.
///
/// Blank lines are skipped. A line that is not JSON is reported as
/// `MalformedMessage` with its 1-based line number.
pub fn read_records(path: impl AsRef<Path>) -> BlackBoxResult<Vec<serde_json::Value>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| persistence(path, source))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| BlackBoxError::MalformedMessage {
                reason: format!("{}:{}: {}", path.display(), n + 1, e),
            })
        })
        .collect()
}
