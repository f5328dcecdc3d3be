//! Participant registry and the symmetric "can attest" relation.

use crate::types::{BasicInfo, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Registered participants and their adjacency sets.
///
/// Edges are only ever added, and only between registered participants.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdjacencyGraph {
    /// Registration order
    nodes: Vec<ParticipantId>,
    info: BTreeMap<ParticipantId, BasicInfo>,
    adjacency: BTreeMap<ParticipantId, BTreeSet<ParticipantId>>,
}

impl AdjacencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `participant` and connect it to every already-registered
    /// peer in `initial_peers`. Unknown peers and self-references are
    /// ignored.
    ///
    /// Returns `false` (and changes nothing) if the participant was already
    /// registered.
    pub fn register(
        &mut self,
        participant: ParticipantId,
        info: BasicInfo,
        initial_peers: &[ParticipantId],
    ) -> bool {
        if self.info.contains_key(&participant) {
            return false;
        }

        let mut own = BTreeSet::new();
        for peer in initial_peers {
            if peer == &participant {
                continue;
            }
            if let Some(peer_set) = self.adjacency.get_mut(peer) {
                peer_set.insert(participant.clone());
                own.insert(peer.clone());
            }
        }

        self.nodes.push(participant.clone());
        self.info.insert(participant.clone(), info);
        self.adjacency.insert(participant, own);
        true
    }

    pub fn is_registered(&self, participant: &ParticipantId) -> bool {
        self.info.contains_key(participant)
    }

    pub fn is_adjacent(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        self.adjacency
            .get(a)
            .map(|peers| peers.contains(b))
            .unwrap_or(false)
    }

    /// Adjacency set of `participant` (empty if unregistered).
    pub fn peers(&self, participant: &ParticipantId) -> impl Iterator<Item = &ParticipantId> {
        self.adjacency.get(participant).into_iter().flatten()
    }

    pub fn participants(&self) -> &[ParticipantId] {
        &self.nodes
    }

    pub fn info(&self, participant: &ParticipantId) -> Option<&BasicInfo> {
        self.info.get(participant)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
