//! Long-term cache: bounded backward scans over historical node checks.
//!
//! A node-check declaration becomes a long-term cache entry once its owner
//! confirms it within `long_term_cache_window` rounds of the current one, and
//! the round's finalized result was positive with a matching hash.

use crate::config::RsuConfig;
use crate::error::{Result, RsuError};
use crate::registry::CheckRegistry;
use crate::round::RoundState;
use crate::types::{ParticipantId, RoundNumber, TimeWindow};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct LongTermCacheResolver {
    window: u64,
    lookback: u64,
}

impl LongTermCacheResolver {
    pub fn new(config: &RsuConfig) -> Self {
        Self {
            window: config.long_term_cache_window,
            lookback: config.hash_lookback,
        }
    }

    /// Mark the newest matching node check of `caller` as uploaded and
    /// return its round. First match wins, scanning from the current round
    /// backward.
    pub fn update(
        &self,
        rounds: &RoundState,
        checks: &mut CheckRegistry,
        caller: &ParticipantId,
        data_hash: &str,
    ) -> Result<RoundNumber> {
        let matched = rounds.recent(self.window.saturating_sub(1)).find(|&round| {
            checks
                .node_check(round, caller)
                .map(|record| record.is_positive() && record.data_hash == data_hash)
                .unwrap_or(false)
        });

        let round = matched.ok_or_else(|| RsuError::precondition("Previous NodeCheck Expired"))?;
        if let Some(record) = checks.node_check_mut(round, caller) {
            record.is_uploaded = true;
        }
        Ok(round)
    }

    /// Hashes `caller` confirmed into the long-term cache in rounds opened
    /// inside `window`.
    ///
    /// Collection starts at the first scanned round opened before
    /// `end_time` and stops after the first round opened before
    /// `start_time`. Rounds where `caller` had no node check are skipped.
    /// Duplicates are kept.
    pub fn hashes_by_time(
        &self,
        rounds: &RoundState,
        checks: &CheckRegistry,
        caller: &ParticipantId,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        if window.end_time > now {
            return Err(RsuError::invalid("invalid end time"));
        }
        let first_round = rounds
            .timestamp_of(1)
            .map_err(|_| RsuError::precondition("invalid start time: round 1 not opened"))?;
        if window.start_time < first_round {
            return Err(RsuError::invalid("invalid start time"));
        }

        let mut collecting = false;
        let mut hashes = Vec::new();
        for round in rounds.recent(self.lookback) {
            // Round 0 carries no timestamp and no checks.
            let Ok(opened) = rounds.timestamp_of(round) else {
                break;
            };
            if opened < window.end_time {
                collecting = true;
            }
            if collecting {
                if let Some(record) = checks.node_check(round, caller) {
                    if record.is_uploaded {
                        hashes.push(record.data_hash.clone());
                    }
                }
            }
            if opened < window.start_time {
                break;
            }
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn id(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// Open `n` rounds one minute apart, each with a node check for `a`
    /// declaring `h{round}` and finalized positive.
    fn history(n: u64) -> (RoundState, CheckRegistry) {
        let mut rounds = RoundState::new();
        let mut checks = CheckRegistry::new();
        for i in 1..=n {
            let round = rounds.advance(t0() + Duration::minutes(i as i64));
            checks.open_node_checks(round, &[id("a")]);
            checks.node_check_mut(round, &id("a")).unwrap().data_hash = format!("h{}", round);
            checks.finalize_node_result(round, &id("a"), true).unwrap();
        }
        (rounds, checks)
    }

    #[test]
    fn test_update_marks_matching_round() {
        let (rounds, mut checks) = history(3);
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());

        let round = resolver.update(&rounds, &mut checks, &id("a"), "h2").unwrap();
        assert_eq!(round, 2);
        assert!(checks.node_check(2, &id("a")).unwrap().is_uploaded);
        assert!(!checks.node_check(3, &id("a")).unwrap().is_uploaded);
    }

    #[test]
    fn test_update_requires_positive_result() {
        let (rounds, mut checks) = history(2);
        checks.finalize_node_result(2, &id("a"), false).unwrap();
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());

        let err = resolver.update(&rounds, &mut checks, &id("a"), "h2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(err.to_string().contains("Previous NodeCheck Expired"));
    }

    #[test]
    fn test_update_window_expires() {
        let (rounds, mut checks) = history(12);
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());

        // Window covers rounds 3..=12
        assert!(resolver.update(&rounds, &mut checks, &id("a"), "h3").is_ok());
        assert!(resolver.update(&rounds, &mut checks, &id("a"), "h2").is_err());
    }

    #[test]
    fn test_update_prefers_newest_duplicate() {
        let (rounds, mut checks) = history(4);
        checks.node_check_mut(4, &id("a")).unwrap().data_hash = "h2".to_string();
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());

        assert_eq!(resolver.update(&rounds, &mut checks, &id("a"), "h2").unwrap(), 4);
        assert!(!checks.node_check(2, &id("a")).unwrap().is_uploaded);
    }

    #[test]
    fn test_hashes_by_time_window() {
        let (rounds, mut checks) = history(6);
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());
        for hash in ["h2", "h3", "h5"] {
            resolver.update(&rounds, &mut checks, &id("a"), hash).unwrap();
        }

        // Rounds open at t0 + i minutes; collect rounds opened before t0+5m
        // down to the first one opened before t0+3m.
        let window = TimeWindow {
            start_time: t0() + Duration::minutes(3),
            end_time: t0() + Duration::minutes(5),
        };
        let now = t0() + Duration::hours(1);
        let hashes = resolver.hashes_by_time(&rounds, &checks, &id("a"), &window, now).unwrap();
        assert_eq!(hashes, vec!["h3".to_string(), "h2".to_string()]);
    }

    #[test]
    fn test_hashes_by_time_skips_absent_records() {
        let (mut rounds, mut checks) = history(2);
        rounds.advance(t0() + Duration::minutes(3));
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());
        resolver.update(&rounds, &mut checks, &id("a"), "h1").unwrap();

        let window = TimeWindow {
            start_time: t0() + Duration::minutes(1),
            end_time: t0() + Duration::minutes(10),
        };
        let hashes = resolver
            .hashes_by_time(&rounds, &checks, &id("a"), &window, t0() + Duration::hours(1))
            .unwrap();
        assert_eq!(hashes, vec!["h1".to_string()]);
    }

    #[test]
    fn test_hashes_by_time_lookback_limit() {
        let (rounds, mut checks) = history(5);
        for round in 1..=5 {
            checks.node_check_mut(round, &id("a")).unwrap().is_uploaded = true;
        }
        // Window reaches back to round 1, so only the lookback ends the scan.
        let window = TimeWindow {
            start_time: t0() + Duration::minutes(1),
            end_time: t0() + Duration::minutes(10),
        };
        let now = t0() + Duration::hours(1);

        let short = LongTermCacheResolver::new(&RsuConfig {
            hash_lookback: 2,
            ..RsuConfig::default()
        });
        let hashes = short.hashes_by_time(&rounds, &checks, &id("a"), &window, now).unwrap();
        assert_eq!(hashes, vec!["h5", "h4", "h3"]);

        let full = LongTermCacheResolver::new(&RsuConfig::default());
        let hashes = full.hashes_by_time(&rounds, &checks, &id("a"), &window, now).unwrap();
        assert_eq!(hashes, vec!["h5", "h4", "h3", "h2", "h1"]);
    }

    #[test]
    fn test_hashes_by_time_bounds() {
        let (rounds, checks) = history(2);
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());
        let now = t0() + Duration::hours(1);

        let future = TimeWindow {
            start_time: t0() + Duration::minutes(1),
            end_time: now + Duration::seconds(1),
        };
        let err = resolver.hashes_by_time(&rounds, &checks, &id("a"), &future, now).unwrap_err();
        assert!(err.to_string().contains("invalid end time"));

        // Round 1 opened at t0+1m; anything earlier is rejected.
        let early = TimeWindow {
            start_time: t0(),
            end_time: now,
        };
        let err = resolver.hashes_by_time(&rounds, &checks, &id("a"), &early, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("invalid start time"));
    }

    #[test]
    fn test_hashes_by_time_before_first_round() {
        let resolver = LongTermCacheResolver::new(&RsuConfig::default());
        let window = TimeWindow {
            start_time: t0(),
            end_time: t0(),
        };
        let err = resolver
            .hashes_by_time(&RoundState::new(), &CheckRegistry::new(), &id("a"), &window, t0())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    proptest! {
        #[test]
        fn prop_update_succeeds_iff_within_window(total in 1u64..30, target in 1u64..30) {
            prop_assume!(target <= total);
            let (rounds, mut checks) = history(total);
            let resolver = LongTermCacheResolver::new(&RsuConfig::default());
            let result = resolver.update(&rounds, &mut checks, &id("a"), &format!("h{}", target));
            prop_assert_eq!(result.is_ok(), total - target < 10);
        }
    }
}
