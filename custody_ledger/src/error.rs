//! Ledger error types.
//!
//! Every variant aborts the call that produced it. The ledger state is
//! left exactly as it was before the attempt.

use crate::calldata::Selector;
use crate::domain::{Address, DeviceId, TokenId};
use crate::felt::Felt;

/// Errors raised by entry points and the call boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// `init_device` on an id that is already registered
    #[error("device {device_id} is already registered")]
    DuplicateDevice {
        /// Offending device id
        device_id: DeviceId,
    },

    /// `init_cycle` by an identity holding no device
    #[error("caller {caller} holds no device and cannot initiate a cycle")]
    UnauthorizedInitiator {
        /// Rejected caller
        caller: Address,
    },

    /// `init_device` with the owner also named as watcher
    #[error("watcher {watcher} must differ from the device owner")]
    WatcherIsOwner {
        /// Address given for both roles
        watcher: Address,
    },

    /// `init_cycle` on a token that already has a cycle
    #[error("token {token_id} already has a cycle")]
    DuplicateToken {
        /// Reused token id
        token_id: TokenId,
    },

    /// Entry point name not exposed by the ledger
    #[error("unknown entry point: {0:?}")]
    UnknownEntryPoint(String),

    /// Wrong number of positional calldata words
    #[error("{selector} expects {expected} calldata words, got {actual}")]
    CalldataLength {
        /// Entry point being decoded
        selector: Selector,
        /// Required word count
        expected: usize,
        /// Supplied word count
        actual: usize,
    },

    /// Half of a `uint256` argument wider than 128 bits
    #[error("uint256 {half} word {value} exceeds 128 bits")]
    WordOutOfRange {
        /// `"low"` or `"high"`
        half: &'static str,
        /// Offending word
        value: Felt,
    },

    /// Text that does not parse as a calldata word
    #[error("malformed calldata word: {0:?}")]
    MalformedWord(String),

    /// Read-only query submitted as a transaction
    #[error("{0} is a read-only query and cannot be invoked")]
    NotAnInvoke(Selector),

    /// Mutating entry point issued as a query
    #[error("{0} mutates state and cannot be called as a query")]
    NotAView(Selector),

    /// Mutating call without an authenticated caller
    #[error("{0} requires an authenticated caller")]
    Unauthenticated(Selector),

    /// Envelope built for another schema
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersion {
        /// Supported schema
        expected: u32,
        /// Envelope schema
        actual: u32,
    },

    /// Envelope out of order
    #[error("sequence violation: expected {expected}, got {actual}")]
    SequenceViolation {
        /// Next accepted sequence
        expected: u64,
        /// Envelope sequence
        actual: u64,
    },

    /// A monotonic counter would wrap
    #[error("counter {0} overflowed")]
    CounterOverflow(&'static str),

    /// State failed post-transition validation
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
