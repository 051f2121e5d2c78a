//! Ledger file storage (`instance_states.json`).
//!
//! The file is one JSON object mapping instance id to that instance's
//! ledger. A process only ever rewrites its own entry: saving re-reads the
//! file and keeps every other entry as raw JSON, so ledgers written by other
//! versions of the bot survive untouched.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::ledger::InstanceLedger;

pub const DEFAULT_LEDGER_FILE: &str = "instance_states.json";

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger for `instance_id`, or start a fresh one.
    ///
    /// A missing file, a missing entry, or an entry that no longer parses all
    /// yield a fresh ledger; only an unreadable file is an error. The device
    /// id is refreshed from configuration on every load.
    pub fn load_or_create(&self, instance_id: &str, device_id: &str) -> Result<InstanceLedger> {
        let entries = self.read_entries()?;
        let mut ledger = match entries.get(instance_id) {
            Some(raw) => match serde_json::from_value::<InstanceLedger>(raw.clone()) {
                Ok(ledger) => {
                    debug!(instance = instance_id, "ledger loaded");
                    ledger
                }
                Err(err) => {
                    warn!(
                        instance = instance_id,
                        err = %err,
                        "ledger entry unreadable, starting fresh"
                    );
                    InstanceLedger::new(instance_id, device_id)
                }
            },
            None => {
                debug!(instance = instance_id, "no ledger entry, starting fresh");
                InstanceLedger::new(instance_id, device_id)
            }
        };
        ledger.id = instance_id.to_string();
        ledger.device_id = device_id.to_string();
        ledger.initialize_build_queue();
        ledger.normalize();
        Ok(ledger)
    }

    /// Ledger for `instance_id` as stored, without creating one.
    pub fn load(&self, instance_id: &str) -> Result<Option<InstanceLedger>> {
        let entries = self.read_entries()?;
        let Some(raw) = entries.get(instance_id) else {
            return Ok(None);
        };
        let mut ledger: InstanceLedger = serde_json::from_value(raw.clone())
            .with_context(|| format!("parse ledger {instance_id} in {}", self.path.display()))?;
        ledger.normalize();
        Ok(Some(ledger))
    }

    /// Atomically rewrite this ledger's entry, preserving all others.
    pub fn save(&self, ledger: &InstanceLedger) -> Result<()> {
        debug!(
            path = %self.path.display(),
            instance = %ledger.id,
            cursor = ledger.current_task_index,
            "writing ledger"
        );
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "existing ledger file unreadable, rewriting");
                Map::new()
            }
        };
        let value = serde_json::to_value(ledger).context("serialize ledger")?;
        entries.insert(ledger.id.clone(), value);
        let mut buf = serde_json::to_string_pretty(&Value::Object(entries))?;
        buf.push('\n');
        super::write_atomic(&self.path, "json.tmp", &buf)
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read ledger file {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(entries)) => Ok(entries),
            Ok(_) => {
                warn!(path = %self.path.display(), "ledger file is not a JSON object, ignoring");
                Ok(Map::new())
            }
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "ledger file corrupt, ignoring");
                Ok(Map::new())
            }
        }
    }
}
