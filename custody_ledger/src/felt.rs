//! Custody Ledger — Calldata Words
//!
//! Every calldata word is a `Felt`, carried as a 256-bit unsigned integer.
//! A `uint256` argument crosses the call boundary as two 128-bit words,
//! `[low, high]`, and is joined back into one `U256` here. The state
//! machine never sees the split form.

// Allow clippy warnings from the uint crate's construct_uint macro
#![allow(clippy::manual_div_ceil)]
#![allow(clippy::assign_op_pattern)]

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uint::construct_uint;

use crate::error::{LedgerError, LedgerResult};

construct_uint! {
    /// 256-bit unsigned integer.
    pub struct U256(4);
}

/// One host calldata word.
pub type Felt = U256;

/// Width of each half of a split `uint256`.
pub const WORD_BITS: usize = 128;

/// Parse a word from `0x`-prefixed hex or plain decimal text.
pub fn parse_felt(text: &str) -> LedgerResult<Felt> {
    let malformed = || LedgerError::MalformedWord(text.to_string());
    let trimmed = text.trim();
    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some("") => Err(malformed()),
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|_| malformed()),
        None if trimmed.is_empty() => Err(malformed()),
        None => U256::from_dec_str(trimmed).map_err(|_| malformed()),
    }
}

/// Lowercase `0x` hex rendering used everywhere a word is shown.
pub fn felt_to_hex(value: &Felt) -> String {
    format!("0x{:x}", value)
}

fn low_mask() -> U256 {
    (U256::one() << WORD_BITS) - U256::one()
}

/// Split a 256-bit value into its `[low, high]` calldata words.
pub fn split_words(value: U256) -> [Felt; 2] {
    [value & low_mask(), value >> WORD_BITS]
}

/// Join `[low, high]` calldata words. Each half must fit in 128 bits.
pub fn join_words(low: Felt, high: Felt) -> LedgerResult<U256> {
    if low.bits() > WORD_BITS {
        return Err(LedgerError::WordOutOfRange { half: "low", value: low });
    }
    if high.bits() > WORD_BITS {
        return Err(LedgerError::WordOutOfRange { half: "high", value: high });
    }
    Ok(low | (high << WORD_BITS))
}

/// 32-byte big-endian encoding of a word.
pub fn felt_to_be_bytes(value: &Felt) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    // limbs are stored least significant first
    for (i, limb) in value.0.iter().rev().enumerate() {
        bytes[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_be_bytes());
    }
    bytes
}

/// Inverse of `felt_to_be_bytes`.
pub fn felt_from_be_bytes(bytes: &[u8; 32]) -> Felt {
    let mut limbs = [0u64; 4];
    for (i, chunk) in bytes.chunks_exact(8).enumerate() {
        let mut limb = [0u8; 8];
        limb.copy_from_slice(chunk);
        limbs[3 - i] = u64::from_be_bytes(limb);
    }
    U256(limbs)
}

/// Checked counter increment. Counters never wrap.
pub fn checked_increment(counter: u64, name: &'static str) -> LedgerResult<u64> {
    counter
        .checked_add(1)
        .ok_or(LedgerError::CounterOverflow(name))
}

impl Serialize for U256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&felt_to_hex(self))
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_felt(&text).map_err(serde::de::Error::custom)
    }
}
