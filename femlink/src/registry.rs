//! Session-owned segment bookkeeping
//!
//! Each transport instance owns its registry; nothing is process-global, so
//! independent sessions can coexist in one process and tests never observe
//! each other's state. `list` reports only what this session registered; it
//! is bookkeeping, not a kernel-wide enumeration.

use crate::error::ExchangeResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Bookkeeping record for one registered segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    /// Logical segment name
    pub name: String,
    /// Payload capacity in bytes
    pub data_size: usize,
    /// Whether this session created the OS object
    pub created_here: bool,
    /// Pid of the registering process
    pub owner_pid: u32,
    /// Registration time
    pub created_at: SystemTime,
}

impl SegmentRecord {
    /// Whether the registering process is still alive
    ///
    /// A dead owner marks the segment as a leftover from a crashed session.
    pub fn owner_alive(&self) -> bool {
        crate::platform::process_alive(self.owner_pid)
    }
}

/// Instance-owned registry of segments touched by one session
pub struct SegmentRegistry {
    records: HashMap<String, SegmentRecord>,
    sidecar_dir: PathBuf,
    namespace: String,
}

impl SegmentRegistry {
    /// New registry writing sidecar records under `sidecar_dir`
    pub fn new(sidecar_dir: &Path, namespace: &str) -> Self {
        Self {
            records: HashMap::new(),
            sidecar_dir: sidecar_dir.to_path_buf(),
            namespace: namespace.to_string(),
        }
    }

    /// Register a segment and drop a JSON sidecar record for inspection
    ///
    /// The sidecar is best-effort: a failure is logged, never fatal, because
    /// bookkeeping must not alter the operation's success contract.
    pub fn register(&mut self, record: SegmentRecord) {
        let sidecar = self.sidecar_path(&record.name);
        match serde_json::to_string_pretty(&record) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&sidecar, json) {
                    warn!(segment = %record.name, error = %e, "sidecar record not written");
                }
            }
            Err(e) => warn!(segment = %record.name, error = %e, "sidecar record not serialized"),
        }
        self.records.insert(record.name.clone(), record);
    }

    /// Remove a segment from bookkeeping together with its sidecar record
    pub fn unregister(&mut self, name: &str) -> ExchangeResult<()> {
        self.records.remove(name);
        let sidecar = self.sidecar_path(name);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Record for a registered segment, if any
    pub fn get(&self, name: &str) -> Option<&SegmentRecord> {
        self.records.get(name)
    }

    /// Names of all segments registered by this session, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered segments
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load the sidecar record left by whichever session registered `name`
    ///
    /// Works across sessions; used to spot segments whose creator has died.
    pub fn read_sidecar(&self, name: &str) -> Option<SegmentRecord> {
        let text = std::fs::read_to_string(self.sidecar_path(name)).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn sidecar_path(&self, name: &str) -> PathBuf {
        self.sidecar_dir
            .join(format!("{}{}.json", self.namespace, name))
    }
}
