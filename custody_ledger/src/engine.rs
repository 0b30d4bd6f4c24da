/// Custody Ledger — Engine
///
/// Top-level orchestrator. Decodes calldata at the boundary, plans the
/// transition, checks the plan against the step invariants, and commits
/// only when every step succeeded. Restored states get the full sweep.
///
/// Strict sequence enforcement: rejected calls do not consume a sequence.

use tracing::{info, warn};

use crate::calldata::{decode_invoke, decode_query, Query, Selector};
use crate::domain::{Address, Cycle, Device, DeviceId, LedgerConfig, LedgerState, TokenId};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{CallEnvelope, CallReceipt, SCHEMA_VERSION};
use crate::felt::{checked_increment, split_words, Felt};
use crate::invariants::{validate_invariants, validate_step};
use crate::state::create_initial_state;
use crate::transitions::{commit, plan_call, Planned};

/// A call that passed every check but has not been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    sequence: u64,
    selector: Selector,
    planned: Planned,
}

impl PreparedCall {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Stateful ledger wrapping the pure transition layer.
#[derive(Debug, Clone)]
pub struct CustodyLedger {
    state: LedgerState,
    last_sequence: u64,
}

impl CustodyLedger {
    /// Deploy a fresh ledger. The admin is the only constructor argument
    /// visible to callers; `config` fixes the policy switches.
    pub fn deploy(admin: Address, config: LedgerConfig) -> Self {
        info!(%admin, ?config, "custody ledger deployed");
        Self {
            state: create_initial_state(admin, config),
            last_sequence: 0,
        }
    }

    /// Resume from a previously validated state.
    pub fn from_state(state: LedgerState, last_sequence: u64) -> LedgerResult<Self> {
        validate_invariants(&state)?;
        Ok(Self {
            state,
            last_sequence,
        })
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Sequence number the next accepted call must carry.
    pub fn next_sequence(&self) -> LedgerResult<u64> {
        checked_increment(self.last_sequence, "sequence")
    }

    /// Build the envelope for the next call from `caller`.
    pub fn envelope(
        &self,
        caller: Address,
        selector: Selector,
        calldata: Vec<Felt>,
    ) -> LedgerResult<CallEnvelope> {
        Ok(CallEnvelope::new(self.next_sequence()?, caller, selector, calldata))
    }

    /// Apply a single envelope:
    ///   1. Validate schema version
    ///   2. Validate sequence (strictly increasing, no gaps)
    ///   3. Decode calldata
    ///   4. Plan the transition (all preconditions, nothing written)
    ///   5. Check the plan against the step invariants
    ///   6. Commit in place and return the receipt
    pub fn invoke(&mut self, envelope: &CallEnvelope) -> LedgerResult<CallReceipt> {
        let prepared = self.prepare(envelope)?;
        self.commit(prepared)
    }

    /// Steps 1-5 of `invoke`. The ledger is not touched; hand the result
    /// to `commit` once the call is durable elsewhere.
    pub fn prepare(&self, envelope: &CallEnvelope) -> LedgerResult<PreparedCall> {
        let result = self.try_prepare(envelope);
        if let Err(err) = &result {
            warn!(
                sequence = envelope.sequence,
                caller = %envelope.caller,
                selector = %envelope.selector,
                error = %err,
                "call rejected"
            );
        }
        result
    }

    /// Step 6. Fails only if the ledger moved since `prepare`.
    pub fn commit(&mut self, prepared: PreparedCall) -> LedgerResult<CallReceipt> {
        let expected = self.next_sequence()?;
        if prepared.sequence != expected {
            return Err(LedgerError::SequenceViolation {
                expected,
                actual: prepared.sequence,
            });
        }

        let event = commit(&mut self.state, prepared.planned);
        self.last_sequence = prepared.sequence;

        Ok(CallReceipt {
            sequence: prepared.sequence,
            selector: prepared.selector,
            events: vec![event],
        })
    }

    fn try_prepare(&self, envelope: &CallEnvelope) -> LedgerResult<PreparedCall> {
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(LedgerError::SchemaVersion {
                expected: SCHEMA_VERSION,
                actual: envelope.schema_version,
            });
        }

        let expected = self.next_sequence()?;
        if envelope.sequence != expected {
            return Err(LedgerError::SequenceViolation {
                expected,
                actual: envelope.sequence,
            });
        }

        let call = decode_invoke(envelope.selector, &envelope.calldata)?;
        let planned = plan_call(&self.state, envelope.caller, &call)?;
        validate_step(&self.state, &planned)?;

        Ok(PreparedCall {
            sequence: envelope.sequence,
            selector: envelope.selector,
            planned,
        })
    }

    /// Submit a positional call as `caller` at the next sequence.
    pub fn submit(
        &mut self,
        caller: Address,
        selector: Selector,
        calldata: Vec<Felt>,
    ) -> LedgerResult<CallReceipt> {
        let envelope = self.envelope(caller, selector, calldata)?;
        self.invoke(&envelope)
    }

    /// `init_device(device_id, owner, watcher)` as `caller`.
    pub fn init_device(
        &mut self,
        caller: Address,
        device_id: DeviceId,
        owner: Address,
        watcher: Address,
    ) -> LedgerResult<CallReceipt> {
        self.submit(
            caller,
            Selector::InitDevice,
            vec![device_id.0, owner.0, watcher.0],
        )
    }

    /// `init_cycle(token_id)` as `caller`. The token is split into
    /// `[low, high]` on the way in, like any external call.
    pub fn init_cycle(&mut self, caller: Address, token_id: TokenId) -> LedgerResult<CallReceipt> {
        self.submit(caller, Selector::InitCycle, split_words(token_id.0).to_vec())
    }

    /// Read-only query through the call boundary.
    pub fn call(&self, selector: Selector, calldata: &[Felt]) -> LedgerResult<Vec<Felt>> {
        let value = match decode_query(selector, calldata)? {
            Query::DeviceCount => Felt::from(self.device_count()),
            Query::CycleCount => Felt::from(self.cycle_count()),
            Query::UserCycleCount { user } => Felt::from(self.user_cycle_count(&user)),
            Query::Admin => self.admin().0,
        };
        Ok(vec![value])
    }

    // -- typed queries ---

    pub fn device_count(&self) -> u64 {
        self.state.device_count
    }

    pub fn cycle_count(&self) -> u64 {
        self.state.cycle_count
    }

    /// Zero for any identity that never initiated a cycle.
    pub fn user_cycle_count(&self, user: &Address) -> u64 {
        self.state.user_cycle_count.get(user).copied().unwrap_or(0)
    }

    pub fn admin(&self) -> Address {
        self.state.admin
    }

    pub fn device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.state.devices.get(device_id)
    }

    /// Cycle ids start at 1.
    pub fn cycle(&self, cycle_id: u64) -> Option<&Cycle> {
        let index = usize::try_from(cycle_id.checked_sub(1)?).ok()?;
        self.state.cycles.get(index)
    }

    pub fn devices_owned_by(&self, owner: &Address) -> u64 {
        self.state.devices_owned_by(owner)
    }

    /// Apply an ordered run of envelopes, stopping at the first rejection.
    pub fn apply_sequence(&mut self, envelopes: &[CallEnvelope]) -> LedgerResult<Vec<CallReceipt>> {
        envelopes.iter().map(|e| self.invoke(e)).collect()
    }

    /// Event-sourced reconstruction: deploy fresh and replay.
    pub fn replay(
        admin: Address,
        config: LedgerConfig,
        envelopes: &[CallEnvelope],
    ) -> LedgerResult<Self> {
        let mut ledger = Self::deploy(admin, config);
        ledger.apply_sequence(envelopes)?;
        validate_invariants(&ledger.state)?;
        info!(
            calls = envelopes.len(),
            device_count = ledger.device_count(),
            cycle_count = ledger.cycle_count(),
            "ledger replayed"
        );
        Ok(ledger)
    }
}
