//! Per-round check lists.
//!
//! Three independent tables (node, cloud and positive checks) map
//! (round, participant) to a record. A record exists iff the participant was
//! named in the matching list when the round was opened. Absence is reported
//! as `None`; callers decide whether it is fatal.

use crate::error::{Result, RsuError};
use crate::types::{
    CarPosCheckRecord, CloudCheckRecord, NodeCheckRecord, ParticipantId, RoundNumber,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Records of one check category, keyed by round then participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundTable<R> {
    rounds: BTreeMap<RoundNumber, BTreeMap<ParticipantId, R>>,
}

impl<R> Default for RoundTable<R> {
    fn default() -> Self {
        Self {
            rounds: BTreeMap::new(),
        }
    }
}

impl<R: Default> RoundTable<R> {
    /// Create an empty record per participant. Re-opening resets a record.
    fn open(&mut self, round: RoundNumber, participants: &[ParticipantId]) {
        for participant in participants {
            self.rounds
                .entry(round)
                .or_default()
                .insert(participant.clone(), R::default());
        }
    }
}

impl<R> RoundTable<R> {
    pub fn get(&self, round: RoundNumber, participant: &ParticipantId) -> Option<&R> {
        self.rounds.get(&round)?.get(participant)
    }

    fn get_mut(&mut self, round: RoundNumber, participant: &ParticipantId) -> Option<&mut R> {
        self.rounds.get_mut(&round)?.get_mut(participant)
    }

    /// All records of `round`.
    pub fn round(&self, round: RoundNumber) -> impl Iterator<Item = (&ParticipantId, &R)> {
        self.rounds.get(&round).into_iter().flatten()
    }

    fn restore(&mut self, round: RoundNumber, records: BTreeMap<ParticipantId, R>) {
        if records.is_empty() {
            self.rounds.remove(&round);
        } else {
            self.rounds.insert(round, records);
        }
    }
}

impl<R: Clone> RoundTable<R> {
    fn records(&self, round: RoundNumber) -> BTreeMap<ParticipantId, R> {
        self.rounds.get(&round).cloned().unwrap_or_default()
    }
}

/// Every check record of one round, the unit the ledger is persisted in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundRecords {
    pub node: BTreeMap<ParticipantId, NodeCheckRecord>,
    pub cloud: BTreeMap<ParticipantId, CloudCheckRecord>,
    pub positive: BTreeMap<ParticipantId, CarPosCheckRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckRegistry {
    node: RoundTable<NodeCheckRecord>,
    cloud: RoundTable<CloudCheckRecord>,
    positive: RoundTable<CarPosCheckRecord>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_node_checks(&mut self, round: RoundNumber, participants: &[ParticipantId]) {
        self.node.open(round, participants);
    }

    pub fn open_cloud_checks(&mut self, round: RoundNumber, participants: &[ParticipantId]) {
        self.cloud.open(round, participants);
    }

    pub fn open_positive_checks(&mut self, round: RoundNumber, participants: &[ParticipantId]) {
        self.positive.open(round, participants);
    }

    pub fn node_check(
        &self,
        round: RoundNumber,
        participant: &ParticipantId,
    ) -> Option<&NodeCheckRecord> {
        self.node.get(round, participant)
    }

    pub fn node_check_mut(
        &mut self,
        round: RoundNumber,
        participant: &ParticipantId,
    ) -> Option<&mut NodeCheckRecord> {
        self.node.get_mut(round, participant)
    }

    pub fn cloud_check(
        &self,
        round: RoundNumber,
        participant: &ParticipantId,
    ) -> Option<&CloudCheckRecord> {
        self.cloud.get(round, participant)
    }

    pub fn cloud_check_mut(
        &mut self,
        round: RoundNumber,
        participant: &ParticipantId,
    ) -> Option<&mut CloudCheckRecord> {
        self.cloud.get_mut(round, participant)
    }

    pub fn positive_check(
        &self,
        round: RoundNumber,
        participant: &ParticipantId,
    ) -> Option<&CarPosCheckRecord> {
        self.positive.get(round, participant)
    }

    pub fn positive_check_mut(
        &mut self,
        round: RoundNumber,
        participant: &ParticipantId,
    ) -> Option<&mut CarPosCheckRecord> {
        self.positive.get_mut(round, participant)
    }

    pub fn node_table(&self) -> &RoundTable<NodeCheckRecord> {
        &self.node
    }

    /// Copy of every record of `round`.
    pub fn round_records(&self, round: RoundNumber) -> RoundRecords {
        RoundRecords {
            node: self.node.records(round),
            cloud: self.cloud.records(round),
            positive: self.positive.records(round),
        }
    }

    /// Replace every record of `round`.
    pub fn restore_round(&mut self, round: RoundNumber, records: RoundRecords) {
        self.node.restore(round, records.node);
        self.cloud.restore(round, records.cloud);
        self.positive.restore(round, records.positive);
    }

    /// Store the server's verdict for a node check: `1` if `result`,
    /// otherwise `-1`.
    pub fn finalize_node_result(
        &mut self,
        round: RoundNumber,
        participant: &ParticipantId,
        result: bool,
    ) -> Result<()> {
        let record = self.node.get_mut(round, participant).ok_or_else(|| {
            RsuError::precondition(format!("no check required in prior round: {}", participant))
        })?;
        record.result = if result { 1 } else { -1 };
        Ok(())
    }
}
