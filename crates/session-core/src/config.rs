//! Coordinator configuration
//!
//! Durations are stored in milliseconds so that config files stay plain
//! integers. Zero disables `establish_timeout_ms`; a zero
//! `auto_reset_delay_ms` collapses `Ended` on the next mailbox turn.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{Result, SessionError};

/// Environment variable overriding `establish_timeout_ms`
pub const ENV_ESTABLISH_TIMEOUT_MS: &str = "CALLVITA_ESTABLISH_TIMEOUT_MS";
/// Environment variable overriding `auto_reset_delay_ms`
pub const ENV_AUTO_RESET_DELAY_MS: &str = "CALLVITA_AUTO_RESET_DELAY_MS";

/// How the app registers with the host telephony provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Name shown by the system call UI
    pub localized_name: String,
    pub supports_video: bool,
    /// Only one call at a time is supported
    pub max_calls_per_group: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            localized_name: "CallVita".to_string(),
            supports_video: false,
            max_calls_per_group: 1,
        }
    }
}

/// Configuration for `CallSessionCoordinator`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Delay between entering `Ended` and the internal `Reset`
    pub auto_reset_delay_ms: u64,
    /// Fail a call stuck in `Connecting` or outgoing `Ringing`
    pub establish_timeout_ms: u64,
    /// Duration timer tick
    pub timer_tick_ms: u64,
    /// Interval between ring haptic pulses
    pub ring_pulse_interval_ms: u64,
    pub provider: ProviderConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            auto_reset_delay_ms: 0,
            establish_timeout_ms: 45_000,
            timer_tick_ms: 1_000,
            ring_pulse_interval_ms: 1_600,
            provider: ProviderConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_reset_delay(&self) -> Duration {
        Duration::from_millis(self.auto_reset_delay_ms)
    }

    /// `None` when disabled
    pub fn establish_timeout(&self) -> Option<Duration> {
        (self.establish_timeout_ms > 0).then(|| Duration::from_millis(self.establish_timeout_ms))
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms)
    }

    pub fn ring_pulse_interval(&self) -> Duration {
        Duration::from_millis(self.ring_pulse_interval_ms)
    }

    pub fn with_auto_reset_delay(mut self, delay: Duration) -> Self {
        self.auto_reset_delay_ms = millis(delay);
        self
    }

    /// Pass `None` to disable the establishment timeout
    pub fn with_establish_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.establish_timeout_ms = timeout.map(millis).unwrap_or(0);
        self
    }

    pub fn with_timer_tick(mut self, tick: Duration) -> Self {
        self.timer_tick_ms = millis(tick);
        self
    }

    pub fn with_ring_pulse_interval(mut self, interval: Duration) -> Self {
        self.ring_pulse_interval_ms = millis(interval);
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = provider;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timer_tick_ms == 0 {
            return Err(SessionError::config("timer_tick_ms must be greater than zero"));
        }
        if self.ring_pulse_interval_ms == 0 {
            return Err(SessionError::config("ring_pulse_interval_ms must be greater than zero"));
        }
        if self.provider.localized_name.trim().is_empty() {
            return Err(SessionError::config("provider.localized_name must not be empty"));
        }
        if self.provider.max_calls_per_group != 1 {
            return Err(SessionError::config(format!(
                "provider.max_calls_per_group must be 1, got {}",
                self.provider.max_calls_per_group
            )));
        }
        Ok(())
    }

    /// Load from a `.json` or `.toml` file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SessionError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .map_err(|e| SessionError::config(format!("{}: {}", path.display(), e)))?,
            Some("toml") => toml::from_str(&contents)
                .map_err(|e| SessionError::config(format!("{}: {}", path.display(), e)))?,
            other => {
                return Err(SessionError::config(format!(
                    "unsupported config format {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply `CALLVITA_*` environment overrides
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Some(ms) = read_env_millis(ENV_ESTABLISH_TIMEOUT_MS)? {
            self.establish_timeout_ms = ms;
        }
        if let Some(ms) = read_env_millis(ENV_AUTO_RESET_DELAY_MS)? {
            self.auto_reset_delay_ms = ms;
        }
        Ok(self)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let config = Self::default().apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn read_env_millis(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| SessionError::config(format!("{}={:?}: {}", name, value, e))),
        Err(_) => Ok(None),
    }
}
