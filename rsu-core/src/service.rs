//! Serialized request processing over a persistent ledger.
//!
//! One `tokio::sync::Mutex` guards the engine, so every request runs to
//! completion before the next one observes any state. A mutating request
//! that succeeds is persisted before the lock is released, writing only the
//! keys it touched; store I/O runs on the blocking pool. If persisting fails
//! the engine reloads the last stored state.

use crate::clock::Clock;
use crate::config::RsuConfig;
use crate::engine::{AttestationEngine, ChangeSet, LedgerState};
use crate::error::{Result, RsuError};
use crate::storage::{changed_entries, load_ledger, state_root, StateStore};
use crate::types::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct RsuService<C: Clock, S: StateStore> {
    engine: Mutex<AttestationEngine<C>>,
    store: Arc<S>,
}

/// Run store I/O off the async worker threads.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RsuError::Storage(format!("storage task failed: {}", e)))?
}

impl<C: Clock, S: StateStore> RsuService<C, S> {
    /// Open the ledger stored in `store`, or start an empty one.
    pub fn open(config: RsuConfig, clock: C, store: S) -> Result<Self> {
        let engine = match load_ledger(&store)? {
            Some(state) => {
                info!(round = state.rounds.current(), "ledger restored from store");
                AttestationEngine::from_state(config, clock, state)?
            }
            None => AttestationEngine::with_config(config, clock)?,
        };
        Ok(Self {
            engine: Mutex::new(engine),
            store: Arc::new(store),
        })
    }

    /// Run `op` with exclusive access and persist what it wrote.
    pub async fn execute<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut AttestationEngine<C>) -> Result<T>,
    {
        let mut engine = self.engine.lock().await;
        let result = op(&mut *engine);
        let changes = engine.take_changes();
        let value = result?;

        if let Err(e) = self.persist(engine.state(), &changes).await {
            error!(error = %e, "failed to persist ledger, reloading stored state");
            let store = Arc::clone(&self.store);
            match run_blocking(move || load_ledger(&*store)).await {
                Ok(stored) => engine.replace_state(stored.unwrap_or_default()),
                Err(reload) => {
                    error!(error = %reload, "reload failed, memory is ahead of the store")
                }
            }
            return Err(e);
        }
        Ok(value)
    }

    async fn persist(&self, state: &LedgerState, changes: &ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let entries = changed_entries(state, changes)?;
        let store = Arc::clone(&self.store);
        run_blocking(move || store.apply(entries)).await
    }

    /// Run a read-only `op` with exclusive access.
    pub async fn query<T, F>(&self, op: F) -> T
    where
        F: FnOnce(&AttestationEngine<C>) -> T,
    {
        let engine = self.engine.lock().await;
        op(&*engine)
    }

    pub async fn system_initialize(&self, caller: &ParticipantId) -> Result<()> {
        self.execute(|engine| engine.system_initialize(caller)).await
    }

    pub async fn initialize(&self, caller: &ParticipantId, input: InitializeInput) -> Result<()> {
        self.execute(|engine| engine.initialize(caller, input)).await
    }

    pub async fn next_round(
        &self,
        caller: &ParticipantId,
        input: RoundInfoInput,
    ) -> Result<RoundNumber> {
        self.execute(|engine| engine.next_round(caller, input)).await
    }

    pub async fn declare_node_check(&self, caller: &ParticipantId, data_hash: &str) -> Result<()> {
        self.execute(|engine| engine.declare_node_check(caller, data_hash))
            .await
    }

    pub async fn recite_node(&self, caller: &ParticipantId, input: ReciteInput) -> Result<()> {
        self.execute(|engine| engine.recite_node(caller, input)).await
    }

    pub async fn upload_positive_check_result(
        &self,
        caller: &ParticipantId,
        input: PosCheckInput,
    ) -> Result<()> {
        self.execute(|engine| engine.upload_positive_check_result(caller, input))
            .await
    }

    pub async fn upload_cloud_check_result(
        &self,
        caller: &ParticipantId,
        input: CloudCheckInput,
    ) -> Result<()> {
        self.execute(|engine| engine.upload_cloud_check_result(caller, input))
            .await
    }

    pub async fn update_long_term_cache(
        &self,
        caller: &ParticipantId,
        data_hash: &str,
    ) -> Result<RoundNumber> {
        self.execute(|engine| engine.update_long_term_cache(caller, data_hash))
            .await
    }

    pub async fn check_result(&self, round: RoundNumber) -> RoundResult {
        self.query(|engine| engine.check_result(round)).await
    }

    pub async fn cloud_hash_by_time(
        &self,
        caller: &ParticipantId,
        window: TimeWindow,
    ) -> Result<Vec<String>> {
        self.query(|engine| engine.cloud_hash_by_time(caller, &window))
            .await
    }

    pub async fn data_hash(&self, caller: &ParticipantId, round: RoundNumber) -> String {
        self.query(|engine| engine.data_hash(caller, round)).await
    }

    pub async fn status(&self) -> StatusResult {
        self.query(|engine| engine.status()).await
    }

    pub async fn adj_list(&self, participant: &ParticipantId) -> Vec<ParticipantId> {
        self.query(|engine| engine.adj_list(participant)).await
    }

    pub async fn node_info(&self, participant: &ParticipantId) -> Option<BasicInfo> {
        self.query(|engine| engine.node_info(participant)).await
    }

    /// SHA-256 of the current ledger encoding.
    pub async fn state_root(&self) -> Result<Hash256> {
        self.query(|engine| state_root(engine.state())).await
    }
}
