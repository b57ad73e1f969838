//! Sync engine configuration
//!
//! Retry counts and wait intervals are tuned empirically for serial-radio
//! latency; they are configuration, not invariants. Callers targeting slow
//! telemetry radios can ship a TOML override.

use std::time::Duration;

use serde::Deserialize;

use crate::param::Tolerance;

/// Tunable sync engine behavior.
///
/// ```
/// use paramsync::SyncConfig;
///
/// let config = SyncConfig::from_toml_str(
///     "max_attempts = 5\nretry_backoff_ms = 500\n",
/// )
/// .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.reboot_timeout_ms, 30_000); // default kept
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Write-then-verify attempts per parameter before giving up
    pub max_attempts: u32,
    /// Pause between attempts (ms)
    pub retry_backoff_ms: u64,
    /// How long to wait for the heartbeat to resume after a reboot (ms)
    pub reboot_timeout_ms: u64,
    /// Relative tolerance for float verification
    pub float_rel_tol: f32,
    /// Absolute tolerance for float verification
    pub float_abs_tol: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 200,
            reboot_timeout_ms: 30_000,
            float_rel_tol: 1e-4,
            float_abs_tol: 1e-8,
        }
    }
}

impl SyncConfig {
    /// Parse a TOML override; unset fields keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Pause between write attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Post-reboot heartbeat wait.
    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_millis(self.reboot_timeout_ms)
    }

    /// Verification tolerance.
    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            rel: self.float_rel_tol,
            abs: self.float_abs_tol,
        }
    }
}
