#![deny(unsafe_code)]

//! Custody Ledger — a device-custody registry with cycle accounting.
//!
//! Devices are registered once under an owner/watcher pair; device owners
//! initiate custody-transfer cycles against 256-bit token ids. Every
//! mutation is a pure function of (state, caller, arguments) and either
//! commits in full or leaves the state untouched.

/// Kernel v1. Behavioral changes require a new kernel version.
pub const KERNEL_VERSION: u32 = 1;

pub mod error;
pub mod felt;
pub mod domain;
pub mod calldata;
pub mod events;
pub mod state;
pub mod transitions;
pub mod invariants;
pub mod hashing;
pub mod engine;
pub mod script;

pub use calldata::Selector;
pub use domain::{Address, Cycle, Device, DeviceId, LedgerConfig, LedgerState, TokenId};
pub use engine::{CustodyLedger, PreparedCall};
pub use error::{LedgerError, LedgerResult};
pub use felt::{Felt, U256};
