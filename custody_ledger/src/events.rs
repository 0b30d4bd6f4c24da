/// Custody Ledger — Call Envelopes and Emitted Events
///
/// Envelopes are pure data: the authenticated caller, the entry point,
/// and its positional calldata. They contain ZERO transition logic.
///
/// Schema version is locked at 1. Envelopes with any other version
/// are rejected by the engine.

use serde::{Deserialize, Serialize};

use crate::calldata::Selector;
use crate::domain::{Address, DeviceId, TokenId};
use crate::felt::Felt;

/// Schema version for v1 kernel envelopes.
pub const SCHEMA_VERSION: u32 = 1;

/// One accepted (or to-be-accepted) mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallEnvelope {
    pub sequence: u64,
    pub caller: Address,
    pub selector: Selector,
    pub calldata: Vec<Felt>,
    pub schema_version: u32,
}

impl CallEnvelope {
    pub fn new(sequence: u64, caller: Address, selector: Selector, calldata: Vec<Felt>) -> Self {
        Self {
            sequence,
            caller,
            selector,
            calldata,
            schema_version: SCHEMA_VERSION,
        }
    }
}

/// Event emitted by an accepted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    DeviceInitialized {
        device_id: DeviceId,
        owner: Address,
        watcher: Address,
    },
    CycleInitiated {
        cycle_id: u64,
        token_id: TokenId,
        initiator: Address,
    },
}

/// Outcome of an accepted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReceipt {
    pub sequence: u64,
    pub selector: Selector,
    pub events: Vec<LedgerEvent>,
}
