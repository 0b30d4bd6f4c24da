/// Custody Ledger — Call Boundary
///
/// Maps entry-point names and positional calldata onto typed calls.
/// Wide integers exist in split form only on this side of the boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Address, DeviceId, TokenId};
use crate::error::{LedgerError, LedgerResult};
use crate::felt::{join_words, split_words, Felt};

/// Named entry points exposed by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    InitDevice,
    InitCycle,
    DeviceCount,
    CycleCount,
    UserCycleCount,
    Admin,
}

impl Selector {
    pub const ALL: [Selector; 6] = [
        Selector::InitDevice,
        Selector::InitCycle,
        Selector::DeviceCount,
        Selector::CycleCount,
        Selector::UserCycleCount,
        Selector::Admin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Selector::InitDevice => "init_device",
            Selector::InitCycle => "init_cycle",
            Selector::DeviceCount => "device_count",
            Selector::CycleCount => "cycle_count",
            Selector::UserCycleCount => "user_cycle_count",
            Selector::Admin => "admin",
        }
    }

    /// Read-only entry points.
    pub fn is_view(self) -> bool {
        !matches!(self, Selector::InitDevice | Selector::InitCycle)
    }

    /// Positional calldata words expected.
    pub fn arity(self) -> usize {
        match self {
            Selector::InitDevice => 3,
            Selector::InitCycle => 2,
            Selector::UserCycleCount => 1,
            Selector::DeviceCount | Selector::CycleCount | Selector::Admin => 0,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Selector {
    type Err = LedgerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Selector::ALL
            .iter()
            .copied()
            .find(|s| s.name() == name)
            .ok_or_else(|| LedgerError::UnknownEntryPoint(name.to_string()))
    }
}

/// A decoded mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invoke {
    InitDevice {
        device_id: DeviceId,
        owner: Address,
        watcher: Address,
    },
    InitCycle {
        token_id: TokenId,
    },
}

/// A decoded read-only query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    DeviceCount,
    CycleCount,
    UserCycleCount { user: Address },
    Admin,
}

fn check_arity(selector: Selector, calldata: &[Felt]) -> LedgerResult<()> {
    if calldata.len() != selector.arity() {
        return Err(LedgerError::CalldataLength {
            selector,
            expected: selector.arity(),
            actual: calldata.len(),
        });
    }
    Ok(())
}

/// Decode calldata for a mutating entry point.
pub fn decode_invoke(selector: Selector, calldata: &[Felt]) -> LedgerResult<Invoke> {
    if selector.is_view() {
        return Err(LedgerError::NotAnInvoke(selector));
    }
    check_arity(selector, calldata)?;

    match selector {
        Selector::InitDevice => Ok(Invoke::InitDevice {
            device_id: DeviceId(calldata[0]),
            owner: Address(calldata[1]),
            watcher: Address(calldata[2]),
        }),
        Selector::InitCycle => Ok(Invoke::InitCycle {
            token_id: TokenId(join_words(calldata[0], calldata[1])?),
        }),
        _ => Err(LedgerError::NotAnInvoke(selector)),
    }
}

/// Decode calldata for a read-only query.
pub fn decode_query(selector: Selector, calldata: &[Felt]) -> LedgerResult<Query> {
    if !selector.is_view() {
        return Err(LedgerError::NotAView(selector));
    }
    check_arity(selector, calldata)?;

    Ok(match selector {
        Selector::DeviceCount => Query::DeviceCount,
        Selector::CycleCount => Query::CycleCount,
        Selector::UserCycleCount => Query::UserCycleCount {
            user: Address(calldata[0]),
        },
        Selector::Admin => Query::Admin,
        Selector::InitDevice | Selector::InitCycle => {
            return Err(LedgerError::NotAView(selector))
        }
    })
}

/// Encode a typed call back into its positional form.
pub fn encode_invoke(call: &Invoke) -> (Selector, Vec<Felt>) {
    match call {
        Invoke::InitDevice {
            device_id,
            owner,
            watcher,
        } => (Selector::InitDevice, vec![device_id.0, owner.0, watcher.0]),
        Invoke::InitCycle { token_id } => (Selector::InitCycle, split_words(token_id.0).to_vec()),
    }
}
