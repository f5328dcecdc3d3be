//! Durable key-value storage of the ledger.
//!
//! State is split over keys so that a mutation rewrites only what it
//! touched:
//! - `head`: server principal and current round
//! - `graph`: registrations and adjacency
//! - `round/<n>`: open timestamp and every check record of round `n`
//!
//! Each value is a format version byte followed by canonical CBOR. The state
//! root is the SHA-256 of the whole [`LedgerState`] encoded the same way.

use crate::adjacency::AdjacencyGraph;
use crate::crypto::sha256;
use crate::engine::{ChangeSet, LedgerState};
use crate::error::{Result, RsuError};
use crate::registry::{CheckRegistry, RoundRecords};
use crate::round::RoundState;
use crate::serialization::{from_canonical_cbor, to_canonical_cbor, SerializationError};
use crate::types::{Hash256, ParticipantId, RoundNumber};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Value format version
pub const FORMAT_VERSION: u8 = 1;

const HEAD_KEY: &str = "head";
const GRAPH_KEY: &str = "graph";
const ROUND_PREFIX: &str = "round/";

/// Keyed byte storage provided by the host.
pub trait StateStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Write all `entries` or none of them.
    fn apply(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()>;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        (**self).scan_prefix(prefix)
    }

    fn apply(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        (**self).apply(entries)
    }
}

/// Volatile store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .entries()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn apply(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        self.entries().extend(entries);
        Ok(())
    }
}

/// Store backed by a `sled` database directory.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened ledger database");
        Ok(Self { db })
    }
}

impl StateStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.db
            .scan_prefix(prefix)
            .map(|item| -> Result<(String, Vec<u8>)> {
                let (key, value) = item?;
                let key = String::from_utf8(key.to_vec())
                    .map_err(|_| RsuError::Storage("non-UTF-8 key".to_string()))?;
                Ok((key, value.to_vec()))
            })
            .collect()
    }

    fn apply(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            batch.insert(key.as_bytes(), value);
        }
        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Head {
    server: Option<ParticipantId>,
    current: RoundNumber,
}

#[derive(Debug, Serialize, Deserialize)]
struct RoundRecord {
    opened: Option<DateTime<Utc>>,
    checks: RoundRecords,
}

fn round_key(round: RoundNumber) -> String {
    format!("{}{:020}", ROUND_PREFIX, round)
}

fn parse_round_key(key: &str) -> Result<RoundNumber> {
    key.strip_prefix(ROUND_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| RsuError::Storage(format!("invalid round key: {:?}", key)))
}

/// Encode `value` behind the format version byte.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = vec![FORMAT_VERSION];
    bytes.extend(to_canonical_cbor(value)?);
    Ok(bytes)
}

pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    match bytes.split_first() {
        Some((&FORMAT_VERSION, body)) => Ok(from_canonical_cbor(body)?),
        Some((&version, _)) => Err(SerializationError::Version(version).into()),
        None => Err(RsuError::Storage("empty value".to_string())),
    }
}

/// SHA-256 over the encoding of the whole `state`.
pub fn state_root(state: &LedgerState) -> Result<Hash256> {
    Ok(sha256(&encode_value(state)?))
}

/// Store entries for the parts of `state` named in `changes`.
pub fn changed_entries(
    state: &LedgerState,
    changes: &ChangeSet,
) -> Result<Vec<(String, Vec<u8>)>> {
    let mut entries = Vec::new();
    if changes.head {
        let head = Head {
            server: state.server.clone(),
            current: state.rounds.current(),
        };
        entries.push((HEAD_KEY.to_string(), encode_value(&head)?));
    }
    if changes.graph {
        entries.push((GRAPH_KEY.to_string(), encode_value(&state.graph)?));
    }
    for &round in &changes.rounds {
        let record = RoundRecord {
            opened: state.rounds.timestamp_of(round).ok(),
            checks: state.checks.round_records(round),
        };
        entries.push((round_key(round), encode_value(&record)?));
    }
    Ok(entries)
}

/// Persist the parts of `state` named in `changes` in one atomic write.
pub fn save_changes<S: StateStore + ?Sized>(
    store: &S,
    state: &LedgerState,
    changes: &ChangeSet,
) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    store.apply(changed_entries(state, changes)?)
}

/// Rebuild the ledger from `store`, or `None` if nothing was ever saved.
pub fn load_ledger<S: StateStore + ?Sized>(store: &S) -> Result<Option<LedgerState>> {
    let head: Option<Head> = store.get(HEAD_KEY)?.map(|b| decode_value(&b)).transpose()?;
    let graph: Option<AdjacencyGraph> =
        store.get(GRAPH_KEY)?.map(|b| decode_value(&b)).transpose()?;
    let stored_rounds = store.scan_prefix(ROUND_PREFIX)?;
    if head.is_none() && graph.is_none() && stored_rounds.is_empty() {
        return Ok(None);
    }

    let head = head.unwrap_or_default();
    let mut timestamps = BTreeMap::new();
    let mut checks = CheckRegistry::new();
    for (key, bytes) in stored_rounds {
        let round = parse_round_key(&key)?;
        if round > head.current {
            return Err(RsuError::Storage(format!(
                "round {} stored beyond current round {}",
                round, head.current
            )));
        }
        let record: RoundRecord = decode_value(&bytes)?;
        if let Some(opened) = record.opened {
            timestamps.insert(round, opened);
        }
        checks.restore_round(round, record.checks);
    }

    Ok(Some(LedgerState {
        server: head.server,
        graph: graph.unwrap_or_default(),
        rounds: RoundState::from_parts(head.current, timestamps),
        checks,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AttestationEngine;
    use crate::error::ErrorKind;
    use crate::types::{BasicInfo, InitializeInput, ReciteInput, RoundInfoInput};

    fn id(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    fn register(engine: &mut AttestationEngine, name: &str, peers: &[&str]) {
        let input = InitializeInput {
            info: BasicInfo {
                reg_time: Utc::now(),
                server_sign: format!("sign-{}", name),
            },
            adjacent: peers.iter().map(|p| id(p)).collect(),
        };
        engine.initialize(&id(name), input).unwrap();
    }

    /// Round 1 open with a declared node check for `a`, recitable by `b`.
    fn sample_engine() -> AttestationEngine {
        let mut engine = AttestationEngine::new();
        engine.system_initialize(&id("server")).unwrap();
        register(&mut engine, "a", &[]);
        register(&mut engine, "b", &["a"]);
        let plan = RoundInfoInput {
            node_list: Some(vec![id("a")]),
            cloud_list: Some(vec![id("b")]),
            ..RoundInfoInput::default()
        };
        engine.next_round(&id("server"), plan).unwrap();
        engine.declare_node_check(&id("a"), "h1").unwrap();
        engine
    }

    #[test]
    fn test_ledger_round_trip() {
        let store = MemoryStore::new();
        assert!(load_ledger(&store).unwrap().is_none());

        let mut engine = sample_engine();
        let changes = engine.take_changes();
        save_changes(&store, engine.state(), &changes).unwrap();
        assert_eq!(load_ledger(&store).unwrap().as_ref(), Some(engine.state()));
    }

    #[test]
    fn test_recite_rewrites_only_its_round() {
        let store = MemoryStore::new();
        let mut engine = sample_engine();
        let changes = engine.take_changes();
        save_changes(&store, engine.state(), &changes).unwrap();

        let input = ReciteInput {
            round: 1,
            to: id("a"),
            result: true,
        };
        engine.recite_node(&id("b"), input).unwrap();
        let changes = engine.take_changes();
        let entries = changed_entries(engine.state(), &changes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, round_key(1));

        store.apply(entries).unwrap();
        assert_eq!(load_ledger(&store).unwrap().as_ref(), Some(engine.state()));
    }

    #[test]
    fn test_state_root_tracks_changes() {
        let state = sample_engine().state().clone();
        let root = state_root(&state).unwrap();
        assert_eq!(root, state_root(&state.clone()).unwrap());

        let mut changed = state;
        changed.checks.node_check_mut(1, &id("a")).unwrap().is_uploaded = true;
        assert_ne!(root, state_root(&changed).unwrap());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = encode_value(&LedgerState::default()).unwrap();
        bytes[0] = 9;
        let err = decode_value::<LedgerState>(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_round_beyond_head_rejected() {
        let store = MemoryStore::new();
        let record = RoundRecord {
            opened: None,
            checks: RoundRecords::default(),
        };
        store
            .apply(vec![(round_key(3), encode_value(&record).unwrap())])
            .unwrap();
        let err = load_ledger(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_round_keys_sort_numerically() {
        assert!(round_key(9) < round_key(10));
        assert_eq!(parse_round_key(&round_key(1234)).unwrap(), 1234);
        assert!(parse_round_key("round/x").is_err());
    }

    #[test]
    fn test_sled_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sled");
        let mut engine = sample_engine();
        {
            let store = SledStore::open(&path).unwrap();
            let changes = engine.take_changes();
            save_changes(&store, engine.state(), &changes).unwrap();
        }

        let reopened = SledStore::open(&path).unwrap();
        assert_eq!(load_ledger(&reopened).unwrap().as_ref(), Some(engine.state()));
        assert_eq!(reopened.scan_prefix(ROUND_PREFIX).unwrap().len(), 1);
        assert!(reopened.get("missing").unwrap().is_none());
    }
}
