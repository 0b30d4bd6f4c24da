/// Custody Ledger — Invariant Checks
///
/// `validate_step` runs on every planned transition before it is written
/// and only looks at what that transition touches. `validate_invariants`
/// sweeps the whole state; it runs on restore and at the end of a replay.
/// Both return the first failure as `LedgerError::InvariantViolation`.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Address, LedgerState};
use crate::error::{LedgerError, LedgerResult};
use crate::transitions::Planned;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all invariant checks.
pub fn validate_invariants(state: &LedgerState) -> LedgerResult<()> {
    check_device_count(state).map_err(LedgerError::InvariantViolation)?;
    check_device_keys(state).map_err(LedgerError::InvariantViolation)?;
    check_cycle_log(state).map_err(LedgerError::InvariantViolation)?;
    check_user_cycle_counts(state).map_err(LedgerError::InvariantViolation)?;
    check_distinct_watchers(state).map_err(LedgerError::InvariantViolation)?;
    check_unique_tokens(state).map_err(LedgerError::InvariantViolation)?;
    check_initiator_custody(state).map_err(LedgerError::InvariantViolation)?;
    check_owner_index(state).map_err(LedgerError::InvariantViolation)?;
    check_token_index(state).map_err(LedgerError::InvariantViolation)?;
    Ok(())
}

/// Check a planned transition against the state it will be written to.
pub fn validate_step(state: &LedgerState, planned: &Planned) -> LedgerResult<()> {
    check_step(state, planned).map_err(LedgerError::InvariantViolation)
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn check_step(state: &LedgerState, planned: &Planned) -> Result<(), String> {
    match planned {
        Planned::Device {
            device,
            device_count,
            owner_devices,
        } => {
            if state.devices.contains_key(&device.device_id) {
                return Err(format!(
                    "[INVARIANT:device_key] device {} would be stored twice",
                    device.device_id
                ));
            }
            if *device_count != state.devices.len() as u64 + 1 {
                return Err(format!(
                    "[INVARIANT:device_count] device_count would be {} with {} devices registered",
                    device_count,
                    state.devices.len() + 1
                ));
            }
            if *owner_devices != state.devices_owned_by(&device.owner) + 1 {
                return Err(format!(
                    "[INVARIANT:owner_index] owner {} would hold {} devices, expected {}",
                    device.owner,
                    owner_devices,
                    state.devices_owned_by(&device.owner) + 1
                ));
            }
            if state.config.require_distinct_watcher && device.owner == device.watcher {
                return Err(format!(
                    "[INVARIANT:distinct_watcher] device {} names {} as both owner and watcher",
                    device.device_id, device.owner
                ));
            }
        }
        Planned::Cycle { cycle, user_count } => {
            if cycle.cycle_id != state.cycles.len() as u64 + 1 {
                return Err(format!(
                    "[INVARIANT:cycle_order] cycle id {} appended after {} cycles",
                    cycle.cycle_id,
                    state.cycles.len()
                ));
            }
            let previous = state
                .user_cycle_count
                .get(&cycle.initiator)
                .copied()
                .unwrap_or(0);
            if *user_count != previous + 1 {
                return Err(format!(
                    "[INVARIANT:user_cycle_count] {} would go from {} to {} cycles",
                    cycle.initiator, previous, user_count
                ));
            }
            if state.config.unique_token_ids && state.cycle_tokens.contains(&cycle.token_id) {
                return Err(format!(
                    "[INVARIANT:unique_token] token {} backs more than one cycle",
                    cycle.token_id
                ));
            }
            if state.config.require_device_owner && !state.holds_custody(&cycle.initiator) {
                return Err(format!(
                    "[INVARIANT:initiator_custody] initiator {} holds no device",
                    cycle.initiator
                ));
            }
        }
    }
    Ok(())
}

fn check_device_count(state: &LedgerState) -> Result<(), String> {
    if state.device_count != state.devices.len() as u64 {
        return Err(format!(
            "[INVARIANT:device_count] device_count={} but {} devices are registered",
            state.device_count,
            state.devices.len()
        ));
    }
    Ok(())
}

fn check_device_keys(state: &LedgerState) -> Result<(), String> {
    for (key, device) in &state.devices {
        if *key != device.device_id {
            return Err(format!(
                "[INVARIANT:device_key] device stored under {} carries id {}",
                key, device.device_id
            ));
        }
    }
    Ok(())
}

/// Cycle ids are 1..=cycle_count, in log order.
fn check_cycle_log(state: &LedgerState) -> Result<(), String> {
    if state.cycle_count != state.cycles.len() as u64 {
        return Err(format!(
            "[INVARIANT:cycle_count] cycle_count={} but the log holds {} cycles",
            state.cycle_count,
            state.cycles.len()
        ));
    }
    for (pos, cycle) in state.cycles.iter().enumerate() {
        let expected = pos as u64 + 1;
        if cycle.cycle_id != expected {
            return Err(format!(
                "[INVARIANT:cycle_order] cycle at position {} has id {}, expected {}",
                pos, cycle.cycle_id, expected
            ));
        }
    }
    Ok(())
}

fn check_user_cycle_counts(state: &LedgerState) -> Result<(), String> {
    let mut tally: BTreeMap<Address, u64> = BTreeMap::new();
    for cycle in &state.cycles {
        *tally.entry(cycle.initiator).or_insert(0) += 1;
    }
    if tally != state.user_cycle_count {
        return Err(format!(
            "[INVARIANT:user_cycle_count] per-user counters {:?} disagree with the cycle log {:?}",
            state.user_cycle_count, tally
        ));
    }

    // Redundant with the map equality above unless a counter is zero.
    let total: u64 = state.user_cycle_count.values().sum();
    if total != state.cycle_count {
        return Err(format!(
            "[INVARIANT:user_cycle_sum] per-user counters sum to {}, cycle_count={}",
            total, state.cycle_count
        ));
    }
    Ok(())
}

fn check_distinct_watchers(state: &LedgerState) -> Result<(), String> {
    if !state.config.require_distinct_watcher {
        return Ok(());
    }
    for device in state.devices.values() {
        if device.owner == device.watcher {
            return Err(format!(
                "[INVARIANT:distinct_watcher] device {} names {} as both owner and watcher",
                device.device_id, device.owner
            ));
        }
    }
    Ok(())
}

fn check_unique_tokens(state: &LedgerState) -> Result<(), String> {
    if !state.config.unique_token_ids {
        return Ok(());
    }
    let mut seen = BTreeSet::new();
    for cycle in &state.cycles {
        if !seen.insert(cycle.token_id) {
            return Err(format!(
                "[INVARIANT:unique_token] token {} backs more than one cycle",
                cycle.token_id
            ));
        }
    }
    Ok(())
}

/// Devices are never removed, so every initiator still holds custody.
fn check_initiator_custody(state: &LedgerState) -> Result<(), String> {
    if !state.config.require_device_owner {
        return Ok(());
    }
    for user in state.user_cycle_count.keys() {
        if !state.holds_custody(user) {
            return Err(format!(
                "[INVARIANT:initiator_custody] initiator {} holds no device",
                user
            ));
        }
    }
    Ok(())
}

fn check_owner_index(state: &LedgerState) -> Result<(), String> {
    let mut tally: BTreeMap<Address, u64> = BTreeMap::new();
    for device in state.devices.values() {
        *tally.entry(device.owner).or_insert(0) += 1;
    }
    if tally != state.devices_by_owner {
        return Err(format!(
            "[INVARIANT:owner_index] owner index {:?} disagrees with the registry {:?}",
            state.devices_by_owner, tally
        ));
    }
    Ok(())
}

fn check_token_index(state: &LedgerState) -> Result<(), String> {
    let tokens: BTreeSet<_> = state.cycles.iter().map(|c| c.token_id).collect();
    if tokens != state.cycle_tokens {
        return Err(format!(
            "[INVARIANT:token_index] {} indexed tokens, {} distinct tokens in the cycle log",
            state.cycle_tokens.len(),
            tokens.len()
        ));
    }
    Ok(())
}
