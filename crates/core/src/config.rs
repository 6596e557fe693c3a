use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide configuration for the engine, loaded once at boot via
/// [`crate::config_loader::ConfigLoader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub vault: VaultConfig,
    pub venue: VenueConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub pairs: PairsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Configuration for the Credential Vault (spec §4.3 / §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Environment variable holding the 32-byte (hex or base64) process secret.
    pub secret_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secret_env: "ARB_ENGINE_VAULT_SECRET".to_string(),
        }
    }
}

/// Default venue-HTTP behavior (spec §6 Configuration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(with = "humantime_serde", default = "default_http_timeout")]
    pub http_timeout: Duration,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            http_timeout: default_http_timeout(),
        }
    }
}

const fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

/// WebSocket reconnection envelope (spec §4.2 / §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

const fn default_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

const fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

/// Risk Manager sweep cadence and stale-tick policy (spec §4.9, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(with = "humantime_serde", default = "default_sweep_period")]
    pub sweep_period: Duration,
    #[serde(with = "humantime_serde", default = "default_stale_tick_threshold")]
    pub stale_tick_threshold: Duration,
    /// Safety margin applied on top of required notional during margin preflight.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sweep_period: default_sweep_period(),
            stale_tick_threshold: default_stale_tick_threshold(),
            safety_margin: default_safety_margin(),
        }
    }
}

const fn default_sweep_period() -> Duration {
    Duration::from_millis(500)
}

const fn default_stale_tick_threshold() -> Duration {
    Duration::from_secs(5)
}

const fn default_safety_margin() -> f64 {
    0.10
}

/// Pair task tick interval and the process-wide pair cap (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsConfig {
    #[serde(with = "humantime_serde", default = "default_pair_tick")]
    pub tick_interval: Duration,
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,
    /// Optional process-wide throttle on new ENTERING transitions (spec §4.8, §9 Open Question b).
    #[serde(default)]
    pub max_concurrent_trades: Option<usize>,
}

impl Default for PairsConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_pair_tick(),
            max_pairs: default_max_pairs(),
            max_concurrent_trades: None,
        }
    }
}

const fn default_pair_tick() -> Duration {
    Duration::from_millis(100)
}

const fn default_max_pairs() -> usize {
    30
}

/// Notification retention policy (spec §4.10, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

const fn default_retention() -> usize {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            vault: VaultConfig::default(),
            venue: VenueConfig::default(),
            reconnect: ReconnectConfig::default(),
            risk: RiskConfig::default(),
            pairs: PairsConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

/// `serde` support for `Duration` fields expressed as human-readable strings
/// ("500ms", "10s") in config files, mirroring the executor config convention.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        humantime::format_duration(*value)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
