// src/store.rs
// Persistence boundary. The store is a single-writer, file-backed JSON
// collaborator: callers serialize access (the driver's run lease does this
// for the pipeline). Writes go through a tmp-file-then-rename so a crashed
// run never leaves a half-written file behind.

use crate::ledger::IdempotencyLedger;
use crate::types::{EventRecord, SessionStatus};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub trait EventStore: Send + Sync {
    fn list_records(&self) -> Result<Vec<EventRecord>>;
    fn add_record(&self, record: &EventRecord) -> Result<()>;

    fn load_ledger(&self) -> Result<IdempotencyLedger>;
    fn save_ledger(&self, ledger: &IdempotencyLedger) -> Result<()>;

    /// Persist poster bytes, returning the store-relative path.
    fn save_poster(&self, bytes: &[u8]) -> Result<String>;

    fn load_session_status(&self) -> Result<SessionStatus>;
    fn save_session_status(&self, status: &SessionStatus) -> Result<()>;
}

/// JSON-file store rooted at a data directory:
/// `events.json`, `sync-state.json`, `session-status.json`, `posters/`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("posters"))
            .with_context(|| format!("creating data dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn events_path(&self) -> PathBuf {
        self.root.join("events.json")
    }

    fn ledger_path(&self) -> PathBuf {
        self.root.join("sync-state.json")
    }

    fn status_path(&self) -> PathBuf {
        self.root.join("session-status.json")
    }

    fn read_or_default<T: serde::de::DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))
    }

    fn write_atomic(&self, path: &Path, json: &str) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(json.as_bytes())
                .with_context(|| format!("writing {}", tmp.display()))?;
        }
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("serializing store file")?;
        self.write_atomic(path, &json)
    }
}

impl EventStore for JsonFileStore {
    fn list_records(&self) -> Result<Vec<EventRecord>> {
        self.read_or_default(&self.events_path())
    }

    fn add_record(&self, record: &EventRecord) -> Result<()> {
        let mut records = self.list_records()?;
        records.push(record.clone());
        self.write_json(&self.events_path(), &records)
    }

    fn load_ledger(&self) -> Result<IdempotencyLedger> {
        self.read_or_default(&self.ledger_path())
    }

    fn save_ledger(&self, ledger: &IdempotencyLedger) -> Result<()> {
        self.write_json(&self.ledger_path(), ledger)
    }

    fn save_poster(&self, bytes: &[u8]) -> Result<String> {
        let name = format!("{}.jpg", Uuid::new_v4());
        let path = self.root.join("posters").join(&name);
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(format!("posters/{name}"))
    }

    fn load_session_status(&self) -> Result<SessionStatus> {
        self.read_or_default(&self.status_path())
    }

    fn save_session_status(&self, status: &SessionStatus) -> Result<()> {
        self.write_json(&self.status_path(), status)
    }
}
