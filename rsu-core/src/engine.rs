//! Round-based attestation engine.
//!
//! The engine owns all ledger state. Every operation takes `&mut self`, so a
//! call has exclusive access for its whole duration, and every operation runs
//! all of its checks before its first write: a rejected call leaves the state
//! untouched.
//!
//! ## Round lifecycle
//! 1. The server calls `system_initialize`, participants call `initialize`.
//! 2. `next_round` finalizes node-check results of the current round, opens
//!    the next one and creates its check lists.
//! 3. Within a round, participants declare and recite node checks and the
//!    server uploads cloud and positive check results.
//! 4. Long-term cache confirmations and time queries scan historical rounds.

use crate::adjacency::AdjacencyGraph;
use crate::cache::LongTermCacheResolver;
use crate::clock::{Clock, SystemClock};
use crate::config::RsuConfig;
use crate::error::{Result, RsuError};
use crate::registry::CheckRegistry;
use crate::round::RoundState;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Everything the ledger persists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerState {
    /// Set once by `system_initialize`
    pub server: Option<ParticipantId>,
    pub graph: AdjacencyGraph,
    pub rounds: RoundState,
    pub checks: CheckRegistry,
}

/// Parts of [`LedgerState`] written since the last
/// [`AttestationEngine::take_changes`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    /// Server principal or round counter
    pub head: bool,
    pub graph: bool,
    /// Rounds whose open timestamp or check records changed
    pub rounds: BTreeSet<RoundNumber>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.head && !self.graph && self.rounds.is_empty()
    }
}

pub struct AttestationEngine<C: Clock = SystemClock> {
    config: RsuConfig,
    clock: C,
    cache: LongTermCacheResolver,
    state: LedgerState,
    changes: ChangeSet,
}

impl AttestationEngine<SystemClock> {
    /// Engine with default configuration on the system clock.
    pub fn new() -> Self {
        Self {
            config: RsuConfig::default(),
            clock: SystemClock,
            cache: LongTermCacheResolver::new(&RsuConfig::default()),
            state: LedgerState::default(),
            changes: ChangeSet::default(),
        }
    }
}

impl Default for AttestationEngine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> AttestationEngine<C> {
    pub fn with_config(config: RsuConfig, clock: C) -> Result<Self> {
        Self::from_state(config, clock, LedgerState::default())
    }

    /// Resume from previously persisted state.
    pub fn from_state(config: RsuConfig, clock: C, state: LedgerState) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: LongTermCacheResolver::new(&config),
            config,
            clock,
            state,
            changes: ChangeSet::default(),
        })
    }

    pub fn config(&self) -> &RsuConfig {
        &self.config
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub(crate) fn replace_state(&mut self, state: LedgerState) {
        self.state = state;
        self.changes = ChangeSet::default();
    }

    /// Drain the record of what was written since the previous call.
    pub fn take_changes(&mut self) -> ChangeSet {
        std::mem::take(&mut self.changes)
    }

    pub fn current_round(&self) -> RoundNumber {
        self.state.rounds.current()
    }

    fn ensure_server(&self, caller: &ParticipantId) -> Result<()> {
        if self.state.server.as_ref() == Some(caller) {
            Ok(())
        } else {
            warn!(caller = %caller, "rejected server-only operation");
            Err(RsuError::unauthorized("not allowed"))
        }
    }

    fn ensure_current(&self, round: RoundNumber) -> Result<()> {
        let current = self.current_round();
        if round == current {
            Ok(())
        } else {
            Err(RsuError::invalid(format!(
                "not current round's check: got {}, current {}",
                round, current
            )))
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Make `caller` the server principal. Round stays at 0.
    pub fn system_initialize(&mut self, caller: &ParticipantId) -> Result<()> {
        if self.state.server.is_some() {
            return Err(RsuError::AlreadyInitialized);
        }
        self.state.server = Some(caller.clone());
        self.changes.head = true;
        info!(server = %caller, "system initialized");
        Ok(())
    }

    /// Register `caller` with its basic info and adjacency. A second call by
    /// the same principal changes nothing.
    pub fn initialize(&mut self, caller: &ParticipantId, input: InitializeInput) -> Result<()> {
        let registered = self
            .state
            .graph
            .register(caller.clone(), input.info, &input.adjacent);
        if registered {
            self.changes.graph = true;
            info!(
                participant = %caller,
                peers = self.state.graph.peers(caller).count(),
                "participant registered"
            );
        } else {
            debug!(participant = %caller, "participant already registered");
        }
        Ok(())
    }

    /// Close the current round and open the next one.
    pub fn next_round(
        &mut self,
        caller: &ParticipantId,
        input: RoundInfoInput,
    ) -> Result<RoundNumber> {
        self.ensure_server(caller)?;

        let closing = self.current_round();
        if let Some(missing) = input
            .node_result
            .keys()
            .find(|p| self.state.checks.node_check(closing, p).is_none())
        {
            return Err(RsuError::precondition(format!(
                "no check required in prior round: {}",
                missing
            )));
        }

        for (participant, result) in &input.node_result {
            self.state
                .checks
                .finalize_node_result(closing, participant, *result)?;
            self.changes.rounds.insert(closing);
        }

        let round = self.state.rounds.advance(self.clock.now());
        self.changes.head = true;
        self.changes.rounds.insert(round);
        if let Some(list) = &input.cloud_list {
            self.state.checks.open_cloud_checks(round, list);
        }
        if let Some(list) = &input.positive_list {
            self.state.checks.open_positive_checks(round, list);
        }
        if let Some(list) = &input.node_list {
            self.state.checks.open_node_checks(round, list);
        }

        info!(
            round,
            finalized = input.node_result.len(),
            node_checks = input.node_list.as_ref().map_or(0, Vec::len),
            cloud_checks = input.cloud_list.as_ref().map_or(0, Vec::len),
            positive_checks = input.positive_list.as_ref().map_or(0, Vec::len),
            "round opened"
        );
        Ok(round)
    }

    /// Declare the caller's data hash for this round's node check and seed a
    /// pending recite entry for every current peer.
    pub fn declare_node_check(
        &mut self,
        caller: &ParticipantId,
        data_hash: impl Into<String>,
    ) -> Result<()> {
        let round = self.current_round();
        let peers: Vec<ParticipantId> = self.state.graph.peers(caller).cloned().collect();
        let record = self
            .state
            .checks
            .node_check_mut(round, caller)
            .ok_or_else(|| RsuError::precondition("no nodeCheck needed"))?;

        record.data_hash = data_hash.into();
        // Re-declaring keeps verdicts already given this round.
        for peer in peers {
            record.recite_list.entry(peer).or_insert(Verdict::Pending);
        }
        let pending = record.recite_list.len();
        self.changes.rounds.insert(round);

        debug!(round, participant = %caller, peers = pending, "node check declared");
        Ok(())
    }

    /// Record `caller`'s attestation of `input.to`'s declaration.
    pub fn recite_node(&mut self, caller: &ParticipantId, input: ReciteInput) -> Result<()> {
        self.ensure_current(input.round)?;
        let round = input.round;

        if self.state.checks.node_check(round, &input.to).is_none() {
            return Err(RsuError::precondition("no nodeCheck needed"));
        }
        if !self.state.graph.is_adjacent(&input.to, caller) {
            warn!(round, from = %caller, to = %input.to, "recite from non-adjacent participant");
            return Err(RsuError::unauthorized("not adjacent"));
        }

        let record = self
            .state
            .checks
            .node_check_mut(round, &input.to)
            .ok_or_else(|| RsuError::precondition("no nodeCheck needed"))?;
        let entry = record
            .recite_list
            .get_mut(caller)
            .ok_or_else(|| RsuError::precondition("no pending recite"))?;
        if !entry.is_pending() {
            return Err(RsuError::AlreadyDone("already checked".to_string()));
        }
        *entry = Verdict::from_result(input.result);
        self.changes.rounds.insert(round);

        debug!(round, from = %caller, to = %input.to, result = input.result, "node recited");
        Ok(())
    }

    /// Server upload of observations made by `input.to`.
    pub fn upload_positive_check_result(
        &mut self,
        caller: &ParticipantId,
        input: PosCheckInput,
    ) -> Result<()> {
        self.ensure_server(caller)?;
        let round = self.current_round();
        let one_shot = self.config.one_shot_positive_checks;

        let record = self
            .state
            .checks
            .positive_check(round, &input.to)
            .ok_or_else(|| RsuError::precondition("no positiveCheck needed"))?;
        self.ensure_current(input.round)?;
        if one_shot {
            let seen = input
                .results
                .keys()
                .find(|id| record.check_result.contains_key(*id));
            if let Some(seen) = seen {
                return Err(RsuError::AlreadyDone(format!("already checked: {}", seen)));
            }
        }

        let record = self
            .state
            .checks
            .positive_check_mut(round, &input.to)
            .ok_or_else(|| RsuError::precondition("no positiveCheck needed"))?;
        for (observed, result) in &input.results {
            record
                .check_result
                .insert(observed.clone(), Verdict::from_result(*result));
        }
        self.changes.rounds.insert(round);

        debug!(
            round,
            observer = %input.to,
            observations = input.results.len(),
            "positive check uploaded"
        );
        Ok(())
    }

    /// Upload the cloud-side verdict for `input.to`.
    ///
    /// Any caller may upload unless `server_only_cloud_upload` is set.
    pub fn upload_cloud_check_result(
        &mut self,
        caller: &ParticipantId,
        input: CloudCheckInput,
    ) -> Result<()> {
        if self.config.server_only_cloud_upload {
            self.ensure_server(caller)?;
        }
        let round = self.current_round();
        if self.state.checks.cloud_check(round, &input.to).is_none() {
            return Err(RsuError::precondition("no cloudCheck needed"));
        }
        self.ensure_current(input.round)?;

        let record = self
            .state
            .checks
            .cloud_check_mut(round, &input.to)
            .ok_or_else(|| RsuError::precondition("no cloudCheck needed"))?;
        record.result = input.result;
        record.data_hash = input.data_hash;
        record.server_sign = input.server_sign;
        self.changes.rounds.insert(round);

        debug!(
            round,
            subject = %input.to,
            from = %caller,
            result = input.result,
            "cloud check uploaded"
        );
        Ok(())
    }

    /// Confirm `data_hash` into the caller's long-term cache.
    pub fn update_long_term_cache(
        &mut self,
        caller: &ParticipantId,
        data_hash: &str,
    ) -> Result<RoundNumber> {
        let result = self
            .cache
            .update(&self.state.rounds, &mut self.state.checks, caller, data_hash);
        match &result {
            Ok(round) => {
                self.changes.rounds.insert(*round);
                debug!(round = *round, participant = %caller, "long-term cache updated")
            }
            Err(_) => warn!(participant = %caller, "long-term cache confirmation expired"),
        }
        result
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All check records of `round` belonging to registered participants.
    pub fn check_result(&self, round: RoundNumber) -> RoundResult {
        let checks = &self.state.checks;
        let mut result = RoundResult::default();
        for participant in self.state.graph.participants() {
            if let Some(record) = checks.node_check(round, participant) {
                result.node_checks.insert(participant.clone(), record.clone());
            }
            if let Some(record) = checks.positive_check(round, participant) {
                result.positive_checks.insert(participant.clone(), record.clone());
            }
            if let Some(record) = checks.cloud_check(round, participant) {
                result.cloud_checks.insert(participant.clone(), record.clone());
            }
        }
        result
    }

    /// Hashes the caller confirmed into the long-term cache within `window`.
    pub fn cloud_hash_by_time(
        &self,
        caller: &ParticipantId,
        window: &TimeWindow,
    ) -> Result<Vec<String>> {
        self.cache.hashes_by_time(
            &self.state.rounds,
            &self.state.checks,
            caller,
            window,
            self.clock.now(),
        )
    }

    /// The caller's declared hash of `round`, or [`INVALID_DATA_HASH`] unless
    /// that round's result was positive.
    pub fn data_hash(&self, caller: &ParticipantId, round: RoundNumber) -> String {
        match self.state.checks.node_check(round, caller) {
            Some(record) if record.is_positive() => record.data_hash.clone(),
            _ => INVALID_DATA_HASH.to_string(),
        }
    }

    pub fn status(&self) -> StatusResult {
        StatusResult {
            round: self.current_round(),
            nodes: self.state.graph.participants().to_vec(),
        }
    }

    pub fn adj_list(&self, participant: &ParticipantId) -> Vec<ParticipantId> {
        self.state.graph.peers(participant).cloned().collect()
    }

    pub fn node_info(&self, participant: &ParticipantId) -> Option<BasicInfo> {
        self.state.graph.info(participant).cloned()
    }
}
