/// Custody Ledger — Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing.
///
/// Rules:
///   - Devices sorted by device_id (numeric order)
///   - Cycles in log order
///   - Per-user counters sorted by address
///   - Every word rendered as lowercase 0x-hex
///   - UTF-8 JSON, no whitespace
///   - Derived indexes (devices_by_owner, cycle_tokens) are not hashed

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::LedgerState;
use crate::felt::felt_to_hex;
use crate::KERNEL_VERSION;

/// Canonical serialization of LedgerState to UTF-8 JSON bytes.
pub fn canonical_serialize(state: &LedgerState) -> Vec<u8> {
    // Serializing a Value built from strings, numbers and bools cannot fail.
    build_canonical_value(state).to_string().into_bytes()
}

/// SHA-256 of canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &LedgerState) -> String {
    sha256_hex(&canonical_serialize(state))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

fn hex(value: &crate::felt::Felt) -> Value {
    Value::String(felt_to_hex(value))
}

/// Build the canonical Value in strict field order.
///
/// Field order: kernel_version, admin, config, devices, cycles,
///              device_count, cycle_count, user_cycle_count
fn build_canonical_value(state: &LedgerState) -> Value {
    // -- devices (BTreeMap is already sorted by id) ---
    let devices: Vec<Value> = state
        .devices
        .values()
        .map(|d| {
            let mut m = Map::new();
            m.insert("device_id".to_string(), hex(&d.device_id.0));
            m.insert("owner".to_string(), hex(&d.owner.0));
            m.insert("watcher".to_string(), hex(&d.watcher.0));
            Value::Object(m)
        })
        .collect();

    // -- cycles (log order) ---
    let cycles: Vec<Value> = state
        .cycles
        .iter()
        .map(|c| {
            let mut m = Map::new();
            m.insert("cycle_id".to_string(), Value::Number(c.cycle_id.into()));
            m.insert("token_id".to_string(), hex(&c.token_id.0));
            m.insert("initiator".to_string(), hex(&c.initiator.0));
            Value::Object(m)
        })
        .collect();

    // -- user counters ---
    let users: Vec<Value> = state
        .user_cycle_count
        .iter()
        .map(|(user, count)| {
            let mut m = Map::new();
            m.insert("user".to_string(), hex(&user.0));
            m.insert("count".to_string(), Value::Number((*count).into()));
            Value::Object(m)
        })
        .collect();

    let mut config = Map::new();
    config.insert(
        "require_device_owner".to_string(),
        Value::Bool(state.config.require_device_owner),
    );
    config.insert(
        "require_distinct_watcher".to_string(),
        Value::Bool(state.config.require_distinct_watcher),
    );
    config.insert(
        "unique_token_ids".to_string(),
        Value::Bool(state.config.unique_token_ids),
    );

    // kernel_version MUST be first — it is part of the kernel identity.
    let mut root = Map::new();
    root.insert(
        "kernel_version".to_string(),
        Value::Number(KERNEL_VERSION.into()),
    );
    root.insert("admin".to_string(), hex(&state.admin.0));
    root.insert("config".to_string(), Value::Object(config));
    root.insert("devices".to_string(), Value::Array(devices));
    root.insert("cycles".to_string(), Value::Array(cycles));
    root.insert(
        "device_count".to_string(),
        Value::Number(state.device_count.into()),
    );
    root.insert(
        "cycle_count".to_string(),
        Value::Number(state.cycle_count.into()),
    );
    root.insert("user_cycle_count".to_string(), Value::Array(users));

    Value::Object(root)
}
