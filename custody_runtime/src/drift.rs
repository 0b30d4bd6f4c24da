//! Drift detection — determinism verification and state comparison.
//!
//! Counters are compared as i64 deltas; ledgers only grow, so a
//! negative delta means the states were compared in the wrong order
//! or come from different logs.

use std::collections::BTreeSet;

use custody_ledger::events::CallEnvelope;
use custody_ledger::{Address, DeviceId, LedgerConfig, LedgerState};

use crate::error::RuntimeError;
use crate::replay;

/// Verify determinism by replaying the same calls twice and comparing
/// hashes.
pub fn verify_determinism(
    admin: Address,
    config: LedgerConfig,
    envelopes: &[CallEnvelope],
) -> Result<(), RuntimeError> {
    let first = replay::rebuild_hash(admin, config, envelopes)?;
    let second = replay::rebuild_hash(admin, config, envelopes)?;

    if first != second {
        return Err(RuntimeError::Determinism { first, second });
    }
    Ok(())
}

/// Structured comparison of two ledger states, `a` taken before `b`.
pub fn compare_states(state_a: &LedgerState, state_b: &LedgerState) -> DriftReport {
    let ids_a: BTreeSet<&DeviceId> = state_a.devices.keys().collect();
    let ids_b: BTreeSet<&DeviceId> = state_b.devices.keys().collect();

    let added_devices = ids_b.difference(&ids_a).map(|id| **id).collect();
    let removed_devices = ids_a.difference(&ids_b).map(|id| **id).collect();

    let new_initiators = state_b
        .user_cycle_count
        .keys()
        .filter(|user| !state_a.user_cycle_count.contains_key(*user))
        .copied()
        .collect();

    let users: BTreeSet<&Address> = state_a
        .user_cycle_count
        .keys()
        .chain(state_b.user_cycle_count.keys())
        .collect();
    let user_cycle_deltas = users
        .into_iter()
        .filter_map(|user| {
            let before = state_a.user_cycle_count.get(user).copied().unwrap_or(0);
            let after = state_b.user_cycle_count.get(user).copied().unwrap_or(0);
            let change = delta(before, after);
            (change != 0).then_some((*user, change))
        })
        .collect();

    DriftReport {
        device_count_a: state_a.device_count,
        device_count_b: state_b.device_count,
        device_count_delta: delta(state_a.device_count, state_b.device_count),
        cycle_count_a: state_a.cycle_count,
        cycle_count_b: state_b.cycle_count,
        cycle_count_delta: delta(state_a.cycle_count, state_b.cycle_count),
        added_devices,
        removed_devices,
        new_initiators,
        user_cycle_deltas,
    }
}

fn delta(before: u64, after: u64) -> i64 {
    i64::try_from(after)
        .unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(before).unwrap_or(i64::MAX))
}

/// Structured drift report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftReport {
    pub device_count_a: u64,
    pub device_count_b: u64,
    pub device_count_delta: i64,
    pub cycle_count_a: u64,
    pub cycle_count_b: u64,
    pub cycle_count_delta: i64,
    pub added_devices: Vec<DeviceId>,
    pub removed_devices: Vec<DeviceId>,
    /// Identities with a cycle in `b` and none in `a`.
    pub new_initiators: Vec<Address>,
    /// Non-zero per-user cycle count changes, ordered by address.
    pub user_cycle_deltas: Vec<(Address, i64)>,
}

impl DriftReport {
    /// True when neither counters nor registrations moved.
    pub fn is_empty(&self) -> bool {
        self.device_count_delta == 0
            && self.cycle_count_delta == 0
            && self.added_devices.is_empty()
            && self.removed_devices.is_empty()
            && self.user_cycle_deltas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_ledger::{CustodyLedger, TokenId};

    #[test]
    fn test_drift_between_checkpoints() {
        let mut ledger = CustodyLedger::deploy(Address::from_u64(0xa0), LedgerConfig::default());
        let u1 = Address::from_u64(1);
        let u3 = Address::from_u64(3);
        ledger
            .init_device(u1, DeviceId::from_u64(1), u1, Address::from_u64(2))
            .unwrap();
        ledger.init_cycle(u1, TokenId::from_u64(1)).unwrap();
        let before = ledger.state().clone();

        ledger
            .init_device(u3, DeviceId::from_u64(2), u3, Address::from_u64(4))
            .unwrap();
        ledger.init_cycle(u3, TokenId::from_u64(2)).unwrap();
        ledger.init_cycle(u1, TokenId::from_u64(3)).unwrap();

        let report = compare_states(&before, ledger.state());
        assert_eq!(report.device_count_delta, 1);
        assert_eq!(report.cycle_count_delta, 2);
        assert_eq!(report.added_devices, vec![DeviceId::from_u64(2)]);
        assert!(report.removed_devices.is_empty());
        assert_eq!(report.new_initiators, vec![u3]);
        assert_eq!(report.user_cycle_deltas, vec![(u1, 1), (u3, 1)]);
        assert!(!report.is_empty());
        assert!(compare_states(&before, &before).is_empty());
    }
}
