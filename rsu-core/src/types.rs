//! Core types shared by the round, registry and attestation components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// SHA-256 hash (32 bytes)
pub type Hash256 = [u8; 32];

/// Round number. Round 0 exists after system initialization; every
/// `NextRound` call opens the next one.
pub type RoundNumber = u64;

/// Returned by `GetDataHash` when the caller has no positive node check in
/// the requested round.
pub const INVALID_DATA_HASH: &str = "invalid dataHash!";

/// Authenticated principal (RSU node, server or observer).
///
/// The host authenticates callers; here the identifier is opaque.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        ParticipantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        ParticipantId(id.to_string())
    }
}

/// A single attestation value.
///
/// Serialized as the signed integer `-1`, `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Verdict {
    /// The attester rejected the subject
    Reject,
    /// Seeded but not yet attested
    #[default]
    Pending,
    /// The attester accepted the subject
    Accept,
}

impl Verdict {
    /// Map a boolean attestation onto `Accept`/`Reject`.
    pub fn from_result(result: bool) -> Self {
        if result {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }

    pub fn value(self) -> i8 {
        match self {
            Verdict::Reject => -1,
            Verdict::Pending => 0,
            Verdict::Accept => 1,
        }
    }

    pub fn is_pending(self) -> bool {
        self == Verdict::Pending
    }
}

impl From<Verdict> for i8 {
    fn from(verdict: Verdict) -> Self {
        verdict.value()
    }
}

impl TryFrom<i8> for Verdict {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Verdict::Reject),
            0 => Ok(Verdict::Pending),
            1 => Ok(Verdict::Accept),
            other => Err(format!("invalid verdict value: {}", other)),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Registration information supplied by a participant on `Initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    /// Registration time as reported by the participant
    pub reg_time: DateTime<Utc>,
    /// Server-issued registration token (opaque, not verified here)
    pub server_sign: String,
}

/// Node-check record for one (round, participant).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeCheckRecord {
    /// Declared data hash (empty until `DeclareNodeCheck`)
    pub data_hash: String,
    /// Finalized result; positive iff the server reported success
    pub result: i64,
    /// Set once the hash has been confirmed into the long-term cache
    pub is_uploaded: bool,
    /// Peer attestations, seeded from the subject's adjacency on declaration
    pub recite_list: BTreeMap<ParticipantId, Verdict>,
}

impl NodeCheckRecord {
    pub fn is_positive(&self) -> bool {
        self.result > 0
    }

    /// Whether the subject has declared a hash this round.
    pub fn is_declared(&self) -> bool {
        !self.data_hash.is_empty()
    }

    /// Number of peers that have attested either way.
    pub fn attested_count(&self) -> usize {
        self.recite_list.values().filter(|v| !v.is_pending()).count()
    }
}

/// Cloud-check record for one (round, participant).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CloudCheckRecord {
    pub result: bool,
    pub data_hash: String,
    /// Server-issued token (opaque)
    pub server_sign: String,
}

/// Positive (car) check record for one (round, observer).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CarPosCheckRecord {
    /// Observed entity ID -> verdict
    pub check_result: BTreeMap<String, Verdict>,
}

/// Input of `Initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeInput {
    pub info: BasicInfo,
    /// Peers the caller can attest and be attested by
    #[serde(default)]
    pub adjacent: Vec<ParticipantId>,
}

/// Input of `NextRound`.
///
/// `node_result` finalizes the current round; the three optional lists open
/// check obligations in the next one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundInfoInput {
    #[serde(default)]
    pub node_result: BTreeMap<ParticipantId, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_list: Option<Vec<ParticipantId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_list: Option<Vec<ParticipantId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_list: Option<Vec<ParticipantId>>,
}

/// Input of `ReciteNode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReciteInput {
    pub round: RoundNumber,
    pub to: ParticipantId,
    pub result: bool,
}

/// Input of `UploadPositiveCheckResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosCheckInput {
    pub round: RoundNumber,
    pub to: ParticipantId,
    /// Observed entity ID -> accepted
    pub results: BTreeMap<String, bool>,
}

/// Input of `UploadCloudCheckResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCheckInput {
    pub round: RoundNumber,
    pub to: ParticipantId,
    pub data_hash: String,
    pub result: bool,
    pub server_sign: String,
}

/// Time window of `GetCloudHashByTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// All check records of one round, restricted to registered participants.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundResult {
    pub node_checks: BTreeMap<ParticipantId, NodeCheckRecord>,
    pub cloud_checks: BTreeMap<ParticipantId, CloudCheckRecord>,
    pub positive_checks: BTreeMap<ParticipantId, CarPosCheckRecord>,
}

/// Output of `GetStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub round: RoundNumber,
    /// Registered participants in registration order
    pub nodes: Vec<ParticipantId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_display() {
        let id = ParticipantId::from("rsu-01");
        assert_eq!(id.to_string(), "rsu-01");
        assert_eq!(id.as_str(), "rsu-01");
    }

    #[test]
    fn test_verdict_values() {
        assert_eq!(Verdict::from_result(true).value(), 1);
        assert_eq!(Verdict::from_result(false).value(), -1);
        assert_eq!(Verdict::default(), Verdict::Pending);
        assert!(Verdict::try_from(2).is_err());
    }

    #[test]
    fn test_verdict_serializes_as_integer() {
        let json = serde_json::to_string(&Verdict::Reject).unwrap();
        assert_eq!(json, "-1");
        let back: Verdict = serde_json::from_str("1").unwrap();
        assert_eq!(back, Verdict::Accept);
    }

    #[test]
    fn test_node_check_record_counts() {
        let mut record = NodeCheckRecord::default();
        assert!(!record.is_declared());
        assert!(!record.is_positive());

        record.data_hash = "h1".to_string();
        record.recite_list.insert("b".into(), Verdict::Accept);
        record.recite_list.insert("c".into(), Verdict::Pending);
        assert!(record.is_declared());
        assert_eq!(record.attested_count(), 1);
    }
}
