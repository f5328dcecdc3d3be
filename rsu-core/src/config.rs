//! Ledger configuration.

use crate::error::{Result, RsuError};
use serde::{Deserialize, Serialize};

/// Configuration for the attestation ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsuConfig {
    /// Rounds scanned by `UpdateLongTermCache`, current round inclusive
    pub long_term_cache_window: u64,
    /// Largest backward offset scanned by `GetCloudHashByTime`
    pub hash_lookback: u64,
    /// Reject repeated observations in `UploadPositiveCheckResult`
    pub one_shot_positive_checks: bool,
    /// Only the server may call `UploadCloudCheckResult`
    pub server_only_cloud_upload: bool,
}

impl Default for RsuConfig {
    fn default() -> Self {
        Self {
            long_term_cache_window: 10,
            hash_lookback: 1000,
            one_shot_positive_checks: false,
            server_only_cloud_upload: false,
        }
    }
}

impl RsuConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: RsuConfig = serde_json::from_str(content)
            .map_err(|e| RsuError::invalid(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.long_term_cache_window == 0 {
            return Err(RsuError::invalid("config: long_term_cache_window must be positive"));
        }
        if self.hash_lookback == 0 {
            return Err(RsuError::invalid("config: hash_lookback must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RsuConfig::default();
        assert_eq!(config.long_term_cache_window, 10);
        assert_eq!(config.hash_lookback, 1000);
        assert!(!config.one_shot_positive_checks);
        assert!(!config.server_only_cloud_upload);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = RsuConfig::from_json_str(r#"{"server_only_cloud_upload": true}"#).unwrap();
        assert!(config.server_only_cloud_upload);
        assert_eq!(config.long_term_cache_window, 10);
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = RsuConfig::from_json_str(r#"{"long_term_cache_window": 0}"#).unwrap_err();
        assert!(err.to_string().contains("long_term_cache_window"));
    }
}
