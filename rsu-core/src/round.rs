//! Round counter and per-round open timestamps.
//!
//! The counter is the only sequencing authority of the ledger: every
//! per-round lookup is keyed by its value at call time.

use crate::error::{Result, RsuError};
use crate::types::RoundNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundState {
    current: RoundNumber,
    timestamps: BTreeMap<RoundNumber, DateTime<Utc>>,
}

impl RoundState {
    /// Round 0, nothing opened yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a stored counter and open timestamps.
    pub fn from_parts(
        current: RoundNumber,
        timestamps: BTreeMap<RoundNumber, DateTime<Utc>>,
    ) -> Self {
        Self {
            current,
            timestamps,
        }
    }

    pub fn current(&self) -> RoundNumber {
        self.current
    }

    /// Open the next round at `now` and return its number.
    pub fn advance(&mut self, now: DateTime<Utc>) -> RoundNumber {
        self.current += 1;
        self.timestamps.insert(self.current, now);
        self.current
    }

    /// Open timestamp of `round`. Round 0 is never opened by `advance`.
    pub fn timestamp_of(&self, round: RoundNumber) -> Result<DateTime<Utc>> {
        self.timestamps
            .get(&round)
            .copied()
            .ok_or(RsuError::NotFound(round))
    }

    /// Rounds `current - i` for `i` in `0..=max_offset`, newest first,
    /// stopping at round 0.
    pub fn recent(&self, max_offset: u64) -> impl Iterator<Item = RoundNumber> {
        let current = self.current;
        (0..=max_offset).map_while(move |i| current.checked_sub(i))
    }
}
