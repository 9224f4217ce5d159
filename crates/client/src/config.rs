//! Client configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Prefix that marks a locally minted, non-server credential.
pub const DEFAULT_SYNTHETIC_PREFIX: &str = "mock_token_";

/// Auto-reconnect behaviour for the real-time channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Connection attempts per failure episode before giving up.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (1-based), clamped to
    /// `[initial_delay, max_delay]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis =
            self.initial_delay.as_millis() as f64 * f64::from(self.backoff_multiplier).powi(exponent);
        let delay = Duration::from_millis(millis.min(u64::MAX as f64) as u64);
        delay.clamp(self.initial_delay, self.max_delay.max(self.initial_delay))
    }
}

/// Liveness probing and synthetic-session detection.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub synthetic_prefix: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            synthetic_prefix: DEFAULT_SYNTHETIC_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub ws_url: String,
    pub health_path: String,
    pub request_timeout: Duration,
    pub reconnect: ReconnectConfig,
    pub monitor: MonitorConfig,
    /// `None` keeps sessions in memory only.
    pub storage_dir: Option<PathBuf>,
    pub local_fare_fallback: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let api_url = "http://localhost:3000".to_string();
        Self {
            ws_url: ws_url_for(&api_url),
            api_url,
            health_path: "/health".to_string(),
            request_timeout: Duration::from_secs(15),
            reconnect: ReconnectConfig::default(),
            monitor: MonitorConfig::default(),
            storage_dir: dirs::config_dir().map(|d| d.join("ridewave")),
            local_fare_fallback: true,
        }
    }
}

impl ClientConfig {
    /// Build configuration from the environment.
    ///
    /// Environment variables:
    /// - `RIDEWAVE_API_URL` (default: "http://localhost:3000")
    /// - `RIDEWAVE_WS_URL` (default: the API URL with a ws scheme and `/ws` path)
    /// - `RIDEWAVE_HEALTH_PATH` (default: "/health")
    /// - `RIDEWAVE_HEALTH_INTERVAL_SECS` / `RIDEWAVE_HEALTH_TIMEOUT_SECS` (default: 30 / 5)
    /// - `RIDEWAVE_RECONNECT_ATTEMPTS` (default: 5)
    /// - `RIDEWAVE_RECONNECT_DELAY_MS` / `RIDEWAVE_RECONNECT_MAX_DELAY_MS` (default: 1000 / 5000)
    /// - `RIDEWAVE_SYNTHETIC_PREFIX` (default: "mock_token_")
    /// - `RIDEWAVE_STORAGE_DIR` (default: platform config dir + `ridewave/`)
    /// - `RIDEWAVE_LOCAL_FARES` (default: "true")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let api_url = lookup("RIDEWAVE_API_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        let ws_url = lookup("RIDEWAVE_WS_URL").unwrap_or_else(|| ws_url_for(&api_url));

        let reconnect = ReconnectConfig {
            max_attempts: parse_u64("RIDEWAVE_RECONNECT_ATTEMPTS")
                .map(|v| v as u32)
                .unwrap_or(defaults.reconnect.max_attempts),
            initial_delay: parse_u64("RIDEWAVE_RECONNECT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.initial_delay),
            max_delay: parse_u64("RIDEWAVE_RECONNECT_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.max_delay),
            ..defaults.reconnect
        };

        let monitor = MonitorConfig {
            interval: parse_u64("RIDEWAVE_HEALTH_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.monitor.interval),
            timeout: parse_u64("RIDEWAVE_HEALTH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.monitor.timeout),
            synthetic_prefix: lookup("RIDEWAVE_SYNTHETIC_PREFIX")
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.monitor.synthetic_prefix),
        };

        Self {
            api_url,
            ws_url,
            health_path: lookup("RIDEWAVE_HEALTH_PATH").unwrap_or(defaults.health_path),
            request_timeout: defaults.request_timeout,
            reconnect,
            monitor,
            storage_dir: lookup("RIDEWAVE_STORAGE_DIR")
                .map(PathBuf::from)
                .or(defaults.storage_dir),
            local_fare_fallback: lookup("RIDEWAVE_LOCAL_FARES")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.local_fare_fallback),
        }
    }
}

/// Convert an HTTP base URL into the real-time endpoint URL.
pub fn ws_url_for(api_url: &str) -> String {
    match url::Url::parse(api_url) {
        Ok(mut url) => {
            let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
            // set_scheme only fails for special/non-special mismatches, which
            // http -> ws never is.
            let _ = url.set_scheme(scheme);
            url.set_path("/ws");
            url.to_string()
        }
        Err(_) => format!("{}/ws", api_url.trim_end_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_delay_grows_and_is_clamped() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_millis(1500));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_millis(2250));
        assert_eq!(cfg.delay_for_attempt(10), Duration::from_millis(5000));
        assert_eq!(cfg.delay_for_attempt(0), Duration::from_millis(1000));
    }

    #[test]
    fn test_ws_url_for() {
        assert_eq!(ws_url_for("http://localhost:3000"), "ws://localhost:3000/ws");
        assert_eq!(ws_url_for("https://api.ride.example"), "wss://api.ride.example/ws");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            ("RIDEWAVE_API_URL", "https://api.example.com/"),
            ("RIDEWAVE_RECONNECT_ATTEMPTS", "3"),
            ("RIDEWAVE_HEALTH_INTERVAL_SECS", "10"),
            ("RIDEWAVE_LOCAL_FARES", "false"),
        ]
        .into_iter()
        .collect();
        let cfg = ClientConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.api_url, "https://api.example.com");
        assert_eq!(cfg.ws_url, "wss://api.example.com/ws");
        assert_eq!(cfg.reconnect.max_attempts, 3);
        assert_eq!(cfg.reconnect.max_delay, Duration::from_millis(5000));
        assert_eq!(cfg.monitor.interval, Duration::from_secs(10));
        assert_eq!(cfg.monitor.timeout, Duration::from_secs(5));
        assert!(!cfg.local_fare_fallback);
    }

    #[test]
    fn test_defaults_without_env() {
        let cfg = ClientConfig::from_lookup(|_| None);
        assert_eq!(cfg.health_path, "/health");
        assert_eq!(cfg.monitor.synthetic_prefix, DEFAULT_SYNTHETIC_PREFIX);
        assert_eq!(cfg.reconnect, ReconnectConfig::default());
    }
}
