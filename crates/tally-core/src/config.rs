use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts applied by proposers and responders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// How long a proposer waits for a counterparty's reply (milliseconds).
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    /// How long a proposer waits for the finality service (milliseconds).
    #[serde(default = "default_finality_timeout_ms")]
    pub finality_timeout_ms: u64,
}

fn default_session_timeout_ms() -> u64 {
    30_000
}

fn default_finality_timeout_ms() -> u64 {
    30_000
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout_ms(),
            finality_timeout_ms: default_finality_timeout_ms(),
        }
    }
}

impl ProtocolConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_millis(self.finality_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtocolConfig::default();
        assert_eq!(config.session_timeout(), Duration::from_secs(30));
        assert_eq!(config.finality_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ProtocolConfig = serde_json::from_str(r#"{"session_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.session_timeout_ms, 250);
        assert_eq!(config.finality_timeout_ms, 30_000);
    }
}
