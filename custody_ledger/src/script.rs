/// Custody Ledger — Call Scripts
///
/// A script deploys a ledger and runs an ordered list of calls against it,
/// the way an external test harness would. Rejections are recorded, not
/// fatal: a rejected call leaves the ledger untouched and the run goes on.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calldata::Selector;
use crate::domain::{Address, LedgerConfig};
use crate::engine::CustodyLedger;
use crate::error::{LedgerError, LedgerResult};
use crate::felt::Felt;

/// Script file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallScript {
    pub admin: Address,
    #[serde(default)]
    pub config: Option<LedgerConfig>,
    pub calls: Vec<ScriptCall>,
}

/// One scripted call. `caller` is required for mutating entry points and
/// ignored for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptCall {
    #[serde(default)]
    pub caller: Option<Address>,
    pub entry_point: String,
    #[serde(default)]
    pub calldata: Vec<Felt>,
}

/// What happened to a single scripted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Accepted { sequence: u64 },
    Returned(Vec<Felt>),
    Rejected(LedgerError),
}

/// Result of running a script.
#[derive(Debug)]
pub struct ScriptReport {
    pub ledger: CustodyLedger,
    pub outcomes: Vec<CallOutcome>,
}

impl ScriptReport {
    pub fn rejected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CallOutcome::Rejected(_)))
            .count()
    }
}

impl CallScript {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Run `script`. `config` overrides the script's own config when given.
pub fn run_script(script: &CallScript, config: Option<LedgerConfig>) -> ScriptReport {
    let config = config.or(script.config).unwrap_or_default();
    let mut ledger = CustodyLedger::deploy(script.admin, config);

    let outcomes = script
        .calls
        .iter()
        .map(|call| match run_call(&mut ledger, call) {
            Ok(outcome) => outcome,
            Err(err) => CallOutcome::Rejected(err),
        })
        .collect();

    ScriptReport { ledger, outcomes }
}

fn run_call(ledger: &mut CustodyLedger, call: &ScriptCall) -> LedgerResult<CallOutcome> {
    let selector: Selector = call.entry_point.parse()?;
    if selector.is_view() {
        let values = ledger.call(selector, &call.calldata)?;
        debug!(%selector, ?values, "query answered");
        return Ok(CallOutcome::Returned(values));
    }

    let caller = call.caller.ok_or(LedgerError::Unauthenticated(selector))?;
    let receipt = ledger.submit(caller, selector, call.calldata.clone())?;
    Ok(CallOutcome::Accepted {
        sequence: receipt.sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"{
        "admin": "0xa0",
        "calls": [
            {"caller": "0x1", "entry_point": "init_device", "calldata": ["12342", "0x1", "0x2"]},
            {"entry_point": "device_count"},
            {"caller": "0x3", "entry_point": "init_cycle", "calldata": ["1", "0"]},
            {"caller": "0x1", "entry_point": "init_cycle", "calldata": ["1", "0"]},
            {"entry_point": "user_cycle_count", "calldata": ["0x1"]},
            {"caller": "0x1", "entry_point": "burn", "calldata": []}
        ]
    }"#;

    #[test]
    fn test_script_runs_and_records_rejections() {
        let script = CallScript::from_json(SCRIPT).unwrap();
        let report = run_script(&script, None);

        assert_eq!(report.outcomes[0], CallOutcome::Accepted { sequence: 1 });
        assert_eq!(report.outcomes[1], CallOutcome::Returned(vec![Felt::one()]));
        assert_eq!(
            report.outcomes[2],
            CallOutcome::Rejected(LedgerError::UnauthorizedInitiator {
                caller: Address::from_u64(3)
            })
        );
        assert_eq!(report.outcomes[3], CallOutcome::Accepted { sequence: 2 });
        assert_eq!(report.outcomes[4], CallOutcome::Returned(vec![Felt::one()]));
        assert!(matches!(
            report.outcomes[5],
            CallOutcome::Rejected(LedgerError::UnknownEntryPoint(_))
        ));
        assert_eq!(report.rejected(), 2);
        assert_eq!(report.ledger.cycle_count(), 1);
    }

    #[test]
    fn test_config_override_wins() {
        let script = CallScript::from_json(SCRIPT).unwrap();
        let open = LedgerConfig {
            require_device_owner: false,
            ..LedgerConfig::default()
        };
        let report = run_script(&script, Some(open));
        assert_eq!(report.ledger.cycle_count(), 2);
        assert_eq!(report.ledger.user_cycle_count(&Address::from_u64(3)), 1);
    }

    #[test]
    fn test_unknown_script_fields_rejected() {
        assert!(CallScript::from_json(r#"{"admin": "0x1", "calls": [], "extra": 1}"#).is_err());
    }
}
