//! Session manager: isolated ledgers, each call persisted before it is applied.
//!
//! Each session gets its own directory with a genesis record, a call log
//! and snapshots. Concurrency: Mutex for write serialization, no global
//! mutable state.
//!
//! Order per call:
//!   1. ledger.prepare(envelope)    rejected calls stop here
//!   2. event_store.append_event()  a failed write leaves ledger and log as they were
//!   3. ledger.commit(prepared)
//!   4. snapshot if interval reached

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use custody_ledger::events::{CallEnvelope, CallReceipt};
use custody_ledger::hashing::canonical_hash;
use custody_ledger::{Address, CustodyLedger, Felt, LedgerConfig, LedgerState, Selector};

use crate::error::RuntimeError;
use crate::event_store::EventStore;
use crate::proto_bridge::{kernel_to_proto, proto_to_kernel};
use crate::replay;
use crate::snapshot;

const GENESIS_FILE: &str = "genesis.json";
const EVENTS_FILE: &str = "events.log";
const SNAPSHOT_DIR: &str = "snapshots";

/// Deployment parameters, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Genesis {
    admin: Address,
    config: LedgerConfig,
}

/// An isolated ledger session with its own call log and state.
pub struct Session {
    session_id: String,
    session_dir: PathBuf,
    genesis: Genesis,
    ledger: CustodyLedger,
    event_store: EventStore,
    snapshot_interval: u64,
}

impl Session {
    /// Open or create a session in the given base directory.
    ///
    /// Directory structure:
    ///   <base_dir>/<session_id>/genesis.json
    ///   <base_dir>/<session_id>/events.log
    ///   <base_dir>/<session_id>/snapshots/
    ///
    /// Reopening an existing session replays its log. The admin and config
    /// must match the ones it was created with.
    pub fn new(
        base_dir: &Path,
        session_id: &str,
        admin: Address,
        config: LedgerConfig,
        snapshot_interval: u64,
    ) -> Result<Self, RuntimeError> {
        let session_dir = base_dir.join(session_id);
        fs::create_dir_all(&session_dir)?;

        let genesis = Genesis { admin, config };
        let genesis_path = session_dir.join(GENESIS_FILE);
        if genesis_path.exists() {
            let recorded: Genesis = serde_json::from_str(&fs::read_to_string(&genesis_path)?)?;
            if recorded != genesis {
                return Err(RuntimeError::GenesisMismatch {
                    session_id: session_id.to_string(),
                });
            }
        } else {
            fs::write(&genesis_path, serde_json::to_string(&genesis)?)?;
        }

        let event_store = EventStore::open(&session_dir.join(EVENTS_FILE))?;
        let envelopes = load_envelopes(&event_store)?;
        let ledger = CustodyLedger::replay(admin, config, &envelopes)?;

        info!(
            session_id,
            sequence = ledger.last_sequence(),
            "session opened"
        );

        Ok(Self {
            session_id: session_id.to_string(),
            session_dir,
            genesis,
            ledger,
            event_store,
            snapshot_interval,
        })
    }

    /// Submit a call as `caller`: validate via the kernel, then persist.
    ///
    /// A rejected call leaves both the ledger and the log untouched. If the
    /// log write fails, the log drops the partial frame and the ledger was
    /// never touched, so the same call can be submitted again.
    pub fn submit(
        &mut self,
        caller: Address,
        selector: Selector,
        calldata: Vec<Felt>,
    ) -> Result<CallReceipt, RuntimeError> {
        let envelope = self.ledger.envelope(caller, selector, calldata)?;
        self.apply(&envelope)
    }

    /// Apply a prepared envelope. Same semantics as `submit`.
    pub fn apply(&mut self, envelope: &CallEnvelope) -> Result<CallReceipt, RuntimeError> {
        let prepared = self.ledger.prepare(envelope)?;
        self.event_store.append_event(&kernel_to_proto(envelope))?;
        let receipt = self.ledger.commit(prepared)?;
        debug!(session_id = %self.session_id, sequence = receipt.sequence, "call persisted");

        if self.snapshot_interval > 0 && receipt.sequence % self.snapshot_interval == 0 {
            // Snapshots are advisory; the log stays authoritative.
            if let Err(err) =
                snapshot::save_snapshot(&self.snapshot_dir(), receipt.sequence, self.ledger.state())
            {
                warn!(sequence = receipt.sequence, error = %err, "snapshot save failed");
            }
        }

        Ok(receipt)
    }

    /// Read-only query against the current ledger.
    pub fn query(&self, selector: Selector, calldata: &[Felt]) -> Result<Vec<Felt>, RuntimeError> {
        Ok(self.ledger.call(selector, calldata)?)
    }

    /// Full replay from the call log; the in-memory ledger is replaced
    /// by the replayed one.
    pub fn replay_full(&mut self) -> Result<(LedgerState, String), RuntimeError> {
        let envelopes = load_envelopes(&self.event_store)?;
        let ledger = CustodyLedger::replay(self.genesis.admin, self.genesis.config, &envelopes)?;
        let state = ledger.state().clone();
        let hash = canonical_hash(&state);
        self.ledger = ledger;
        Ok((state, hash))
    }

    /// Check the latest snapshot against a replay of the log prefix it
    /// covers. `None` when no snapshot has been written yet.
    pub fn check_snapshot(&self) -> Result<Option<bool>, RuntimeError> {
        let snap = match snapshot::load_latest_snapshot(&self.snapshot_dir()) {
            Ok(Some(snap)) => snap,
            Ok(None) => return Ok(None),
            Err(
                err @ (RuntimeError::SnapshotVersion { .. } | RuntimeError::CorruptSnapshot { .. }),
            ) => {
                warn!(session_id = %self.session_id, error = %err, "latest snapshot unusable");
                return Ok(Some(false));
            }
            Err(err) => return Err(err),
        };

        let envelopes = load_envelopes(&self.event_store)?;
        let prefix = usize::try_from(snap.sequence)
            .ok()
            .and_then(|n| envelopes.get(..n))
            .ok_or_else(|| RuntimeError::MalformedRecord {
                sequence: snap.sequence,
                reason: format!("snapshot is ahead of a log with {} calls", envelopes.len()),
            })?;
        let hash = replay::rebuild_hash(self.genesis.admin, self.genesis.config, prefix)?;
        Ok(Some(hash == snap.hash))
    }

    pub fn ledger(&self) -> &CustodyLedger {
        &self.ledger
    }

    pub fn state(&self) -> &LedgerState {
        self.ledger.state()
    }

    /// Get current canonical hash.
    pub fn current_hash(&self) -> String {
        canonical_hash(self.ledger.state())
    }

    pub fn current_sequence(&self) -> u64 {
        self.ledger.last_sequence()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.session_dir.join(SNAPSHOT_DIR)
    }
}

fn load_envelopes(store: &EventStore) -> Result<Vec<CallEnvelope>, RuntimeError> {
    store
        .load_all_events()?
        .iter()
        .map(proto_to_kernel)
        .collect()
}

/// Thread-safe session handle. Callers are served one at a time, so
/// calls reach the ledger in a single total order.
pub struct SharedSession {
    inner: Mutex<Session>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>, RuntimeError> {
        self.inner.lock().map_err(|_| RuntimeError::LockPoisoned)
    }

    /// Submit a call under lock.
    pub fn submit(
        &self,
        caller: Address,
        selector: Selector,
        calldata: Vec<Felt>,
    ) -> Result<CallReceipt, RuntimeError> {
        self.lock()?.submit(caller, selector, calldata)
    }

    pub fn query(&self, selector: Selector, calldata: &[Felt]) -> Result<Vec<Felt>, RuntimeError> {
        self.lock()?.query(selector, calldata)
    }

    pub fn current_hash(&self) -> Result<String, RuntimeError> {
        Ok(self.lock()?.current_hash())
    }

    pub fn current_sequence(&self) -> Result<u64, RuntimeError> {
        Ok(self.lock()?.current_sequence())
    }
}
