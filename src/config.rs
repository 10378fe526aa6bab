//! Runtime tunables. Defaults live in code; deployments may override via a
//! deserialized config file section.

use serde::Deserialize;
use std::time::Duration;

/// How long `steer` waits between the interrupt signal and the injected
/// directive, so the redirected process has observably stopped first.
pub const DEFAULT_STEER_GRACE_MS: u64 = 250;
/// How often the ledger reconciles against the process service when no
/// explicit refresh is requested.
pub const DEFAULT_LEDGER_POLL_INTERVAL_MS: u64 = 500;
/// Character cap applied to each exported text block before scrubbing.
pub const DEFAULT_EXPORT_MAX_CHARS: usize = 16_384;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub steer_grace_ms: u64,
    pub ledger_poll_interval_ms: u64,
    pub export_max_chars: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            steer_grace_ms: DEFAULT_STEER_GRACE_MS,
            ledger_poll_interval_ms: DEFAULT_LEDGER_POLL_INTERVAL_MS,
            export_max_chars: DEFAULT_EXPORT_MAX_CHARS,
        }
    }
}

impl RuntimeConfig {
    pub fn steer_grace(&self) -> Duration {
        Duration::from_millis(self.steer_grace_ms)
    }

    pub fn ledger_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ledger_poll_interval_ms)
    }
}
