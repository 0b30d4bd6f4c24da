/// Custody Ledger — Core Domain Types
///
/// Pure data. No transition logic.
/// Ordered maps only, so serialization is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::felt::{felt_to_hex, Felt, U256};

// ── Identifiers ────────────────────────────────────────────────────

/// An authenticated identity (account address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub Felt);

/// Externally supplied device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub Felt);

/// Token a cycle is initiated against. Full 256-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub U256);

impl Address {
    pub fn from_u64(value: u64) -> Self {
        Self(Felt::from(value))
    }
}

impl DeviceId {
    pub fn from_u64(value: u64) -> Self {
        Self(Felt::from(value))
    }
}

impl TokenId {
    pub fn from_u64(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&felt_to_hex(&self.0))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Records ────────────────────────────────────────────────────────

/// A registered device and its custody pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    pub device_id: DeviceId,
    pub owner: Address,
    pub watcher: Address,
}

/// A custody-transfer cycle. `cycle_id` is its 1-based position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cycle {
    pub cycle_id: u64,
    pub token_id: TokenId,
    pub initiator: Address,
}

// ── Configuration ──────────────────────────────────────────────────

/// Policy switches fixed at deploy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LedgerConfig {
    /// Only identities owning at least one device may call `init_cycle`.
    pub require_device_owner: bool,
    /// `init_device` rejects `owner == watcher`.
    pub require_distinct_watcher: bool,
    /// A token id may back at most one cycle.
    pub unique_token_ids: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            require_device_owner: true,
            require_distinct_watcher: true,
            unique_token_ids: false,
        }
    }
}

// ── State ──────────────────────────────────────────────────────────

/// Complete ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerState {
    pub admin: Address,
    pub config: LedgerConfig,
    pub devices: BTreeMap<DeviceId, Device>,
    pub cycles: Vec<Cycle>,
    pub device_count: u64,
    pub cycle_count: u64,
    /// Only users with at least one cycle have an entry.
    pub user_cycle_count: BTreeMap<Address, u64>,
    /// Devices held per owner. Derived from `devices`.
    pub devices_by_owner: BTreeMap<Address, u64>,
    /// Every token that backs a cycle. Derived from `cycles`.
    pub cycle_tokens: BTreeSet<TokenId>,
}

impl LedgerState {
    /// Number of devices currently held by `owner`.
    pub fn devices_owned_by(&self, owner: &Address) -> u64 {
        self.devices_by_owner.get(owner).copied().unwrap_or(0)
    }

    pub fn holds_custody(&self, who: &Address) -> bool {
        self.devices_by_owner.contains_key(who)
    }
}
