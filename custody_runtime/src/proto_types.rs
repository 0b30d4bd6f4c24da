//! Hand-written protobuf types for the call log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Every calldata word is a 32-byte big-endian string.

use prost::Message;

// ── Call Envelope ──────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoCallEnvelope {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub caller: Vec<u8>,
    /// Entry-point name, e.g. `init_cycle`.
    #[prost(string, tag = "3")]
    pub selector: String,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub calldata: Vec<Vec<u8>>,
    #[prost(uint32, tag = "5")]
    pub schema_version: u32,
}
