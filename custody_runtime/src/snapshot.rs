//! Session snapshots: the full ledger state as of a sequence number,
//! stored as `snapshot_NNNNNN.json` beside the call log.
//!
//! The log stays authoritative. A snapshot is accepted only when the kernel
//! version, the sequence in its file name, its state hash and the state
//! invariants all check out. Snapshots never carry timestamps.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use custody_ledger::hashing::canonical_hash;
use custody_ledger::invariants::validate_invariants;
use custody_ledger::{CustodyLedger, LedgerState, KERNEL_VERSION};

use crate::error::RuntimeError;

const PREFIX: &str = "snapshot_";
const SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    pub kernel_version: u32,
    /// Last call folded into `state`.
    pub sequence: u64,
    /// `canonical_hash(state)` at write time.
    pub hash: String,
    pub state: LedgerState,
}

impl Snapshot {
    pub fn capture(sequence: u64, state: &LedgerState) -> Self {
        Self {
            kernel_version: KERNEL_VERSION,
            sequence,
            hash: canonical_hash(state),
            state: state.clone(),
        }
    }

    /// Header and content checks. Does not consult the call log.
    pub fn verify(&self) -> Result<(), RuntimeError> {
        if self.kernel_version != KERNEL_VERSION {
            return Err(RuntimeError::SnapshotVersion {
                sequence: self.sequence,
                expected: KERNEL_VERSION,
                actual: self.kernel_version,
            });
        }
        let actual = canonical_hash(&self.state);
        if actual != self.hash {
            return Err(self.corrupt(format!("hash {} recorded, state hashes to {}", self.hash, actual)));
        }
        validate_invariants(&self.state).map_err(|e| self.corrupt(e.to_string()))
    }

    /// Resume a ledger from this snapshot.
    pub fn into_ledger(self) -> Result<CustodyLedger, RuntimeError> {
        self.verify()?;
        Ok(CustodyLedger::from_state(self.state, self.sequence)?)
    }

    fn corrupt(&self, reason: String) -> RuntimeError {
        RuntimeError::CorruptSnapshot {
            sequence: self.sequence,
            reason,
        }
    }
}

pub fn snapshot_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!("{}{:06}{}", PREFIX, sequence, SUFFIX))
}

/// Write a snapshot of `state` at `sequence`. The file appears complete
/// or not at all.
pub fn save_snapshot(dir: &Path, sequence: u64, state: &LedgerState) -> Result<PathBuf, RuntimeError> {
    fs::create_dir_all(dir)?;
    let snap = Snapshot::capture(sequence, state);
    let path = snapshot_path(dir, sequence);
    let staging = path.with_extension("json.tmp");

    let mut file = File::create(&staging)?;
    file.write_all(serde_json::to_string(&snap)?.as_bytes())?;
    file.sync_all()?;
    fs::rename(&staging, &path)?;

    info!(sequence, hash = %snap.hash, "snapshot saved");
    Ok(path)
}

/// Load and verify the snapshot at `sequence`, if one was written.
pub fn load_snapshot(dir: &Path, sequence: u64) -> Result<Option<Snapshot>, RuntimeError> {
    let path = snapshot_path(dir, sequence);
    if !path.exists() {
        return Ok(None);
    }

    let snap: Snapshot = serde_json::from_str(&fs::read_to_string(&path)?).map_err(|e| {
        RuntimeError::CorruptSnapshot {
            sequence,
            reason: e.to_string(),
        }
    })?;
    if snap.sequence != sequence {
        return Err(RuntimeError::CorruptSnapshot {
            sequence,
            reason: format!("file holds the snapshot for sequence {}", snap.sequence),
        });
    }
    snap.verify()?;
    Ok(Some(snap))
}

/// Sequences with a snapshot file in `dir`, ascending.
pub fn list_snapshots(dir: &Path) -> Result<Vec<u64>, RuntimeError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut sequences = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let seq = name
            .to_str()
            .and_then(|n| n.strip_prefix(PREFIX))
            .and_then(|n| n.strip_suffix(SUFFIX))
            .and_then(|n| n.parse::<u64>().ok());
        sequences.extend(seq);
    }
    sequences.sort_unstable();
    Ok(sequences)
}

/// Load and verify the newest snapshot in `dir`.
pub fn load_latest_snapshot(dir: &Path) -> Result<Option<Snapshot>, RuntimeError> {
    match list_snapshots(dir)?.last() {
        Some(&seq) => load_snapshot(dir, seq),
        None => Ok(None),
    }
}
