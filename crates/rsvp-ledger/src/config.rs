use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Configuration for the reservation ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long one attempt waits for an event's lock when the caller gives
    /// no deadline, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Backoff applied to transient store failures.
    pub retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
            retry: RetryPolicy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = LedgerConfig::default();
        assert_eq!(c.lock_timeout(), Duration::from_millis(250));
        assert_eq!(c.retry.max_retries, 3);
    }

    #[test]
    fn toml_overrides_nested_fields() {
        let c: LedgerConfig = toml::from_str(
            r#"
            lock_timeout_ms = 40

            [retry]
            max_retries = 1
            "#,
        )
        .unwrap();
        assert_eq!(c.lock_timeout_ms, 40);
        assert_eq!(c.retry.max_retries, 1);
        assert_eq!(c.retry.multiplier, 2.0);
    }
}
