//! # RSU Core
//!
//! Round-based trust attestation bookkeeping for a peer-to-peer road-side-unit
//! network.
//!
//! Each round the server designates which nodes are checked by their peers
//! (node checks), which are checked against cloud-side records (cloud checks)
//! and which report on observed vehicles (positive checks). Nodes declare data
//! hashes, adjacent peers attest them, and confirmed declarations can later be
//! promoted into a long-term cache and recovered by time window.
//!
//! ## Key Features
//! - **Single sequencing authority**: one round counter, advanced atomically
//!   together with finalization of the closing round
//! - **Adjacency-gated attestation**: only registered neighbours may recite,
//!   each exactly once per round
//! - **Bounded history scans**: long-term cache confirmation and time-window
//!   queries over recent rounds
//! - **Incremental persistence**: per-round canonical CBOR records in `sled`,
//!   with a SHA-256 state root over the whole ledger

pub mod adjacency;
pub mod cache;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod plan;
pub mod registry;
pub mod round;
pub mod serialization;
#[cfg(feature = "async")]
pub mod service;
pub mod storage;
pub mod types;

pub use adjacency::AdjacencyGraph;
pub use cache::LongTermCacheResolver;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RsuConfig;
pub use crypto::{verify_endorsement, NodeKey};
pub use engine::{AttestationEngine, ChangeSet, LedgerState};
pub use error::{ErrorKind, RsuError};
pub use plan::RoundPlanBuilder;
pub use registry::CheckRegistry;
pub use round::RoundState;
#[cfg(feature = "async")]
pub use service::RsuService;
pub use storage::{MemoryStore, SledStore, StateStore};
pub use types::*;
