//! Runtime error types.

use std::io;

use custody_ledger::LedgerError;

/// Errors raised by the runtime around the kernel.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Kernel rejected a call or a restored state
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Event log or snapshot file I/O
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted call that cannot be turned back into an envelope
    #[error("malformed log record at sequence {sequence}: {reason}")]
    MalformedRecord {
        /// Sequence of the bad record
        sequence: u64,
        /// What was wrong with it
        reason: String,
    },

    /// Session directory was created for another deployment
    #[error("session {session_id} was deployed with a different admin or config")]
    GenesisMismatch {
        /// Session being opened
        session_id: String,
    },

    /// Snapshot written by a different kernel version
    #[error("snapshot {sequence} was written by kernel v{actual}, running v{expected}")]
    SnapshotVersion {
        /// Sequence the snapshot covers
        sequence: u64,
        /// Running kernel version
        expected: u32,
        /// Version recorded in the snapshot
        actual: u32,
    },

    /// Snapshot contents fail their own checks
    #[error("snapshot {sequence} is corrupt: {reason}")]
    CorruptSnapshot {
        /// Sequence the snapshot claims to cover
        sequence: u64,
        /// Which check failed
        reason: String,
    },

    /// Two replays of the same log disagreed
    #[error("determinism failure: run 1 = {first}, run 2 = {second}")]
    Determinism {
        /// Hash of the first replay
        first: String,
        /// Hash of the second replay
        second: String,
    },

    /// A thread panicked while holding the session lock
    #[error("session lock poisoned")]
    LockPoisoned,
}
