//! Replay orchestrator — rebuild ledger state from the call log.
//!
//! Delegates all domain logic to the kernel. No shortcuts, no cached
//! state logic.

use custody_ledger::events::CallEnvelope;
use custody_ledger::hashing::canonical_hash;
use custody_ledger::{Address, CustodyLedger, LedgerConfig, LedgerResult, LedgerState};

/// Rebuild the ledger state from a sequence of accepted calls.
///
/// 1. Deploy a fresh ledger with the recorded admin and config
/// 2. Pass each envelope sequentially to the kernel
/// 3. Return (final_state, canonical_hash)
pub fn rebuild_state(
    admin: Address,
    config: LedgerConfig,
    envelopes: &[CallEnvelope],
) -> LedgerResult<(LedgerState, String)> {
    let ledger = CustodyLedger::replay(admin, config, envelopes)?;
    let state = ledger.state().clone();
    let hash = canonical_hash(&state);
    Ok((state, hash))
}

/// Rebuild state and return only the canonical hash.
pub fn rebuild_hash(
    admin: Address,
    config: LedgerConfig,
    envelopes: &[CallEnvelope],
) -> LedgerResult<String> {
    rebuild_state(admin, config, envelopes).map(|(_, hash)| hash)
}
