//! Configuration for the client.

use crate::recovery::RECOVERY_STORAGE_KEY;
use crate::store::GAMES_STORAGE_KEY;
use std::env;

/// Client configuration.
///
/// Defaults are suitable for production; `from_env` allows overrides for
/// deployments and tests.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Storage key of the games document.
    pub games_key: String,
    /// Storage key of the recovery ledger document.
    pub recovery_key: String,
    /// Debounce window for non-immediate recovery saves, in milliseconds.
    pub save_debounce_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            games_key: GAMES_STORAGE_KEY.to_string(),
            recovery_key: RECOVERY_STORAGE_KEY.to_string(),
            save_debounce_ms: 2000,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            games_key: env::var("TALLY_GAMES_KEY").unwrap_or(defaults.games_key),
            recovery_key: env::var("TALLY_RECOVERY_KEY").unwrap_or(defaults.recovery_key),
            save_debounce_ms: env::var("TALLY_SAVE_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.save_debounce_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_well_known_keys() {
        let config = ClientConfig::default();
        assert_eq!(config.games_key, "tally.games");
        assert_eq!(config.recovery_key, "tally.recovery");
        assert_eq!(config.save_debounce_ms, 2000);
    }
}
