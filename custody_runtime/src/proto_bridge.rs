//! Proto ↔ Kernel conversion bridge.
//!
//! Converts between the protobuf log record (proto_types.rs) and the
//! kernel's CallEnvelope. Words travel as fixed 32-byte big-endian
//! strings; anything else is a malformed record.

use custody_ledger::events::CallEnvelope;
use custody_ledger::felt::{felt_from_be_bytes, felt_to_be_bytes, Felt};
use custody_ledger::{Address, Selector};

use crate::error::RuntimeError;
use crate::proto_types::ProtoCallEnvelope;

/// Convert a kernel envelope into its log record.
pub fn kernel_to_proto(envelope: &CallEnvelope) -> ProtoCallEnvelope {
    ProtoCallEnvelope {
        sequence: envelope.sequence,
        caller: felt_to_be_bytes(&envelope.caller.0).to_vec(),
        selector: envelope.selector.name().to_string(),
        calldata: envelope
            .calldata
            .iter()
            .map(|w| felt_to_be_bytes(w).to_vec())
            .collect(),
        schema_version: envelope.schema_version,
    }
}

/// Convert a log record back into a kernel envelope.
pub fn proto_to_kernel(proto: &ProtoCallEnvelope) -> Result<CallEnvelope, RuntimeError> {
    let malformed = |reason: String| RuntimeError::MalformedRecord {
        sequence: proto.sequence,
        reason,
    };

    let selector: Selector = proto
        .selector
        .parse()
        .map_err(|e: custody_ledger::LedgerError| malformed(e.to_string()))?;
    let caller = decode_word(&proto.caller).ok_or_else(|| {
        malformed(format!("caller is {} bytes, expected 32", proto.caller.len()))
    })?;
    let calldata = proto
        .calldata
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            decode_word(bytes).ok_or_else(|| {
                malformed(format!("calldata[{}] is {} bytes, expected 32", i, bytes.len()))
            })
        })
        .collect::<Result<Vec<Felt>, _>>()?;

    Ok(CallEnvelope {
        sequence: proto.sequence,
        caller: Address(caller),
        selector,
        calldata,
        schema_version: proto.schema_version,
    })
}

fn decode_word(bytes: &[u8]) -> Option<Felt> {
    let fixed: &[u8; 32] = bytes.try_into().ok()?;
    Some(felt_from_be_bytes(fixed))
}
