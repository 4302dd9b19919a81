//! Protocol configuration shared by all three roles.

use serde::Deserialize;
use std::str::FromStr;

use crate::solver::SignMode;

/// Tunables of the localization protocol. Defaults match the deployed
/// devices; each numeric field can also be overridden through a
/// `LOCUS_*` environment variable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Minimum chord length (meters) between the first sample and each
    /// subsequent one. Keeps the bisector system well-conditioned.
    pub threshold_m: f32,
    /// Consecutive-timeout bound: gates sample 1 acceptance on the ranging
    /// node and terminates gateway aggregation.
    pub retry_limit: u32,
    /// Number of release frames sent back-to-back in a flood.
    pub flood_count: u32,
    /// Consecutive-timeout ceiling after which a listening phase that is
    /// making no progress gives up entirely.
    pub listen_abort_limit: u32,
    /// Sign handling of the solver output.
    pub sign_mode: SignMode,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            threshold_m: env_or("LOCUS_CHORD_THRESHOLD_M", 5.0),
            retry_limit: env_or("LOCUS_RETRY_LIMIT", 1000),
            flood_count: env_or("LOCUS_FLOOD_COUNT", 1000),
            listen_abort_limit: env_or("LOCUS_LISTEN_ABORT_LIMIT", 10_000),
            sign_mode: SignMode::default(),
        }
    }
}

fn env_or<T: FromStr + Copy>(key: &str, fallback: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_devices() {
        let cfg = ProtocolConfig::default();
        assert_eq!(cfg.threshold_m, 5.0);
        assert_eq!(cfg.retry_limit, 1000);
        assert_eq!(cfg.flood_count, 1000);
        assert_eq!(cfg.sign_mode, SignMode::ForcePositive);
    }

    #[test]
    fn deserializes_partial_toml() {
        let cfg: ProtocolConfig =
            toml::from_str("threshold_m = 2.5\nretry_limit = 10\nsign_mode = \"signed\"").unwrap();
        assert_eq!(cfg.threshold_m, 2.5);
        assert_eq!(cfg.retry_limit, 10);
        assert_eq!(cfg.sign_mode, SignMode::Signed);
        assert_eq!(cfg.flood_count, 1000);
    }
}
