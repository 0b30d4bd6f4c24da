/// Custody Ledger — Centralized Transition Logic
///
/// ALL state-mutation logic lives here, in two phases:
///   1. `plan_call` reads the state, checks every precondition and
///      computes the new counter values. Nothing is written.
///   2. `commit` writes a plan. It cannot fail.
///
/// `apply_call` runs both on a clone for callers that want the old state
/// kept; the engine plans against its own state and commits in place.

use tracing::debug;

use crate::calldata::Invoke;
use crate::domain::{Address, Cycle, Device, DeviceId, LedgerState, TokenId};
use crate::error::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::felt::checked_increment;

/// A checked, not yet written transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    Device {
        device: Device,
        device_count: u64,
        owner_devices: u64,
    },
    Cycle {
        cycle: Cycle,
        user_count: u64,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Check `call` made by `caller` against `state`.
pub fn plan_call(state: &LedgerState, caller: Address, call: &Invoke) -> LedgerResult<Planned> {
    match call {
        Invoke::InitDevice {
            device_id,
            owner,
            watcher,
        } => plan_init_device(state, *device_id, *owner, *watcher),
        Invoke::InitCycle { token_id } => plan_init_cycle(state, caller, *token_id),
    }
}

/// Write a plan produced by `plan_call` against this same state.
pub fn commit(state: &mut LedgerState, planned: Planned) -> LedgerEvent {
    match planned {
        Planned::Device {
            device,
            device_count,
            owner_devices,
        } => {
            let (device_id, owner, watcher) = (device.device_id, device.owner, device.watcher);
            state.devices.insert(device_id, device);
            state.devices_by_owner.insert(owner, owner_devices);
            state.device_count = device_count;

            debug!(%device_id, %owner, %watcher, device_count, "device initialized");
            LedgerEvent::DeviceInitialized {
                device_id,
                owner,
                watcher,
            }
        }
        Planned::Cycle { cycle, user_count } => {
            let (cycle_id, token_id, initiator) = (cycle.cycle_id, cycle.token_id, cycle.initiator);
            state.cycles.push(cycle);
            state.cycle_tokens.insert(token_id);
            state.user_cycle_count.insert(initiator, user_count);
            state.cycle_count = cycle_id;

            debug!(%token_id, %initiator, cycle_count = cycle_id, user_count, "cycle initiated");
            LedgerEvent::CycleInitiated {
                cycle_id,
                token_id,
                initiator,
            }
        }
    }
}

/// Apply `call` made by `caller` to a copy of `state`, returning the new
/// state and the events it emitted. On error nothing is returned but the
/// error.
pub fn apply_call(
    state: &LedgerState,
    caller: Address,
    call: &Invoke,
) -> LedgerResult<(LedgerState, Vec<LedgerEvent>)> {
    let planned = plan_call(state, caller, call)?;
    let mut new_state = state.clone();
    let event = commit(&mut new_state, planned);
    Ok((new_state, vec![event]))
}

// ---------------------------------------------------------------------------
// Individual planners (private)
// ---------------------------------------------------------------------------

fn plan_init_device(
    state: &LedgerState,
    device_id: DeviceId,
    owner: Address,
    watcher: Address,
) -> LedgerResult<Planned> {
    if state.devices.contains_key(&device_id) {
        return Err(LedgerError::DuplicateDevice { device_id });
    }
    if state.config.require_distinct_watcher && owner == watcher {
        return Err(LedgerError::WatcherIsOwner { watcher });
    }

    Ok(Planned::Device {
        device: Device {
            device_id,
            owner,
            watcher,
        },
        device_count: checked_increment(state.device_count, "device_count")?,
        owner_devices: checked_increment(state.devices_owned_by(&owner), "devices_by_owner")?,
    })
}

fn plan_init_cycle(state: &LedgerState, caller: Address, token_id: TokenId) -> LedgerResult<Planned> {
    if state.config.require_device_owner && !state.holds_custody(&caller) {
        return Err(LedgerError::UnauthorizedInitiator { caller });
    }
    if state.config.unique_token_ids && state.cycle_tokens.contains(&token_id) {
        return Err(LedgerError::DuplicateToken { token_id });
    }

    let cycle_count = checked_increment(state.cycle_count, "cycle_count")?;
    let user_count = checked_increment(
        state.user_cycle_count.get(&caller).copied().unwrap_or(0),
        "user_cycle_count",
    )?;

    Ok(Planned::Cycle {
        cycle: Cycle {
            cycle_id: cycle_count,
            token_id,
            initiator: caller,
        },
        user_count,
    })
}
