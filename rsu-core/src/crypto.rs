//! Participant keys and registration endorsements.
//!
//! A principal is the hex SHA-256 of an Ed25519 public key. The server
//! endorses a registration by signing the participant and its registration
//! time; the signature travels as the opaque `BasicInfo::server_sign`.

use crate::types::{BasicInfo, Hash256, ParticipantId};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

const ENDORSEMENT_DOMAIN: &str = "rsu-registration";

pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

impl ParticipantId {
    /// Principal of a public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        ParticipantId(hex::encode(sha256(key.as_bytes())))
    }
}

fn endorsement_message(participant: &ParticipantId, reg_time: DateTime<Utc>) -> Vec<u8> {
    format!(
        "{}:{}:{}",
        ENDORSEMENT_DOMAIN,
        participant,
        reg_time.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
    .into_bytes()
}

/// Ed25519 key pair of one participant.
pub struct NodeKey {
    signing_key: SigningKey,
}

impl NodeKey {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn participant_id(&self) -> ParticipantId {
        ParticipantId::from_verifying_key(&self.public_key())
    }

    /// Registration info for `participant`, endorsed by this (server) key.
    pub fn endorse(&self, participant: &ParticipantId, reg_time: DateTime<Utc>) -> BasicInfo {
        let signature = self
            .signing_key
            .sign(&endorsement_message(participant, reg_time));
        BasicInfo {
            reg_time,
            server_sign: hex::encode(signature.to_bytes()),
        }
    }
}

/// Check that `info` was endorsed for `participant` by `server`.
pub fn verify_endorsement(
    server: &VerifyingKey,
    participant: &ParticipantId,
    info: &BasicInfo,
) -> bool {
    let Ok(bytes) = hex::decode(&info.server_sign) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
        return false;
    };
    let message = endorsement_message(participant, info.reg_time);
    server
        .verify(&message, &Signature::from_bytes(&bytes))
        .is_ok()
}
