/// Custody Ledger — State Construction

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Address, LedgerConfig, LedgerState};

/// Create the state of a freshly deployed ledger.
pub fn create_initial_state(admin: Address, config: LedgerConfig) -> LedgerState {
    LedgerState {
        admin,
        config,
        devices: BTreeMap::new(),
        cycles: Vec::new(),
        device_count: 0,
        cycle_count: 0,
        user_cycle_count: BTreeMap::new(),
        devices_by_owner: BTreeMap::new(),
        cycle_tokens: BTreeSet::new(),
    }
}
