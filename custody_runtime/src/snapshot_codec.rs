//! Snapshot Codec — full LedgerState encoder/decoder.
//!
//! Pure codec layer. No side-effects, no timestamps, no envelope.
//!
//! - `encode_snapshot`:  LedgerState → JSON string
//! - `decode_snapshot`:  JSON string → LedgerState (strict, no defaults)
//! - `restore_snapshot`: decode + invariant validation
//! - `export_snapshot_to_file` / `import_snapshot_from_file`: file I/O
//! - `snapshot_hash`:    SHA-256 of the encoded JSON (lowercase hex)

use std::fs;
use std::io;
use std::path::Path;

use custody_ledger::hashing::sha256_hex;
use custody_ledger::invariants::validate_invariants;
use custody_ledger::{LedgerError, LedgerState};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// All possible snapshot codec failures.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// JSON serialization failed.
    #[error("SerializationError: {0}")]
    Serialization(String),
    /// JSON deserialization failed (malformed, missing fields, unknown fields).
    #[error("DeserializationError: {0}")]
    Deserialization(String),
    /// Loaded state violates kernel invariants.
    #[error("InvariantViolation: {0}")]
    InvariantViolation(#[from] LedgerError),
    /// File I/O error.
    #[error("IoError: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Encoder / decoder
// ---------------------------------------------------------------------------

/// Encode a LedgerState to JSON. Ordered maps keep the output stable.
pub fn encode_snapshot(state: &LedgerState) -> Result<String, SnapshotError> {
    serde_json::to_string(state).map_err(|e| SnapshotError::Serialization(e.to_string()))
}

/// Decode a JSON string into a LedgerState.
///
/// Strict: `deny_unknown_fields` rejects unexpected fields and missing
/// fields fail. No invariant validation — use `restore_snapshot` for
/// validated loading.
pub fn decode_snapshot(json: &str) -> Result<LedgerState, SnapshotError> {
    serde_json::from_str::<LedgerState>(json)
        .map_err(|e| SnapshotError::Deserialization(e.to_string()))
}

/// Decode and validate invariants immediately.
///
/// This is the safe entry point for loading state from untrusted sources.
pub fn restore_snapshot(json: &str) -> Result<LedgerState, SnapshotError> {
    let state = decode_snapshot(json)?;
    validate_invariants(&state)?;
    Ok(state)
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Export a LedgerState to a file. Creates parent directories if needed.
pub fn export_snapshot_to_file(state: &LedgerState, path: &Path) -> Result<(), SnapshotError> {
    let json = encode_snapshot(state)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json.as_bytes())?;
    Ok(())
}

/// Import a LedgerState from a file, with invariant validation.
pub fn import_snapshot_from_file(path: &Path) -> Result<LedgerState, SnapshotError> {
    let json = fs::read_to_string(path)?;
    restore_snapshot(&json)
}

/// SHA-256 of the encoded state. Lowercase hex.
pub fn snapshot_hash(state: &LedgerState) -> Result<String, SnapshotError> {
    Ok(sha256_hex(encode_snapshot(state)?.as_bytes()))
}
