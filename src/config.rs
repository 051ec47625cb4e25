//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Engine-level knobs are grouped in
//! [`SyncSettings`] so that tests can build them without touching the
//! environment.

use std::time::Duration;

use crate::error::SyncError;

/// Timing knobs of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Cadence of the polling fallback.
    pub poll_interval: Duration,
    /// Whether views start a polling fallback at all.
    pub polling_enabled: bool,
    /// Upper bound on a confirming mutation request.
    pub mutation_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            polling_enabled: true,
            mutation_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncSettings {
    /// Checks that every duration in use is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for a zero poll interval (when
    /// polling is enabled) or a zero mutation timeout.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.polling_enabled && self.poll_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.mutation_timeout.is_zero() {
            return Err(SyncError::InvalidConfig(
                "mutation timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level client configuration.
///
/// Loaded once at startup via [`SyncConfig::from_env`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the marketplace REST API (e.g. `http://localhost:5000/api`).
    pub api_base_url: String,

    /// WebSocket URL of the push server.
    pub push_url: String,

    /// Milliseconds between polling fallback fetches.
    pub poll_interval_ms: u64,

    /// Master switch for the polling fallback.
    pub polling_enabled: bool,

    /// Timeout in milliseconds for a confirming mutation request.
    pub mutation_timeout_ms: u64,

    /// Timeout in milliseconds for any single HTTP request.
    pub http_timeout_ms: u64,

    /// Delay in milliseconds before reconnecting a dropped push channel.
    pub push_reconnect_delay_ms: u64,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Order to track in the `track-order` binary.
    pub track_order_id: Option<String>,
}

impl SyncConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the resulting settings fail
    /// [`SyncSettings::validate`].
    pub fn from_env() -> Result<Self, SyncError> {
        dotenvy::dotenv().ok();

        let api_base_url = std::env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:5000/api".to_string());
        let push_url =
            std::env::var("PUSH_URL").unwrap_or_else(|_| "ws://localhost:5000/ws".to_string());

        let poll_interval_ms = parse_env("POLL_INTERVAL_MS", 10_000);
        let polling_enabled = parse_env_bool("POLLING_ENABLED", true);
        let mutation_timeout_ms = parse_env("MUTATION_TIMEOUT_MS", 10_000);
        let http_timeout_ms = parse_env("HTTP_TIMEOUT_MS", 10_000);
        let push_reconnect_delay_ms = parse_env("PUSH_RECONNECT_DELAY_MS", 3_000);

        let event_bus_capacity = parse_env("EVENT_BUS_CAPACITY", 1_024);

        let track_order_id = std::env::var("TRACK_ORDER_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        let config = Self {
            api_base_url,
            push_url,
            poll_interval_ms,
            polling_enabled,
            mutation_timeout_ms,
            http_timeout_ms,
            push_reconnect_delay_ms,
            event_bus_capacity,
            track_order_id,
        };
        config.settings().validate()?;
        Ok(config)
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub const fn settings(&self) -> SyncSettings {
        SyncSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            polling_enabled: self.polling_enabled,
            mutation_timeout: Duration::from_millis(self.mutation_timeout_ms),
        }
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Push reconnect delay.
    #[must_use]
    pub const fn push_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.push_reconnect_delay_ms)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        tokio_test::assert_ok!(SyncSettings::default().validate());
    }

    #[test]
    fn zero_poll_interval_rejected_only_when_polling() {
        let mut settings = SyncSettings {
            poll_interval: Duration::ZERO,
            ..SyncSettings::default()
        };
        assert!(matches!(settings.validate(), Err(SyncError::InvalidConfig(_))));

        settings.polling_enabled = false;
        tokio_test::assert_ok!(settings.validate());
    }

    #[test]
    fn zero_mutation_timeout_rejected() {
        let settings = SyncSettings {
            mutation_timeout: Duration::ZERO,
            ..SyncSettings::default()
        };
        tokio_test::assert_err!(settings.validate());
    }
}
