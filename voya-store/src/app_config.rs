use serde::Deserialize;
use std::env;
use std::time::Duration;
use voya_core::allocation::{AllocationPolicy, DEFAULT_MAX_ACTIVE_BOOKINGS};
use voya_core::window::{BookingWindowPolicy, MAX_WINDOW_HOURS, MIN_WINDOW_HOURS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// No database configured means the in-memory store.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub waitlist: WaitlistRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WaitlistRules {
    #[serde(default = "default_min_window_hours")]
    pub min_window_hours: u32,
    #[serde(default = "default_max_window_hours")]
    pub max_window_hours: u32,
    #[serde(default = "default_max_active_bookings")]
    pub max_active_bookings: u32,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_conflict_retry_attempts")]
    pub conflict_retry_attempts: u32,
    #[serde(default = "default_conflict_retry_backoff_ms")]
    pub conflict_retry_backoff_ms: u64,
}

fn default_min_window_hours() -> u32 { MIN_WINDOW_HOURS }
fn default_max_window_hours() -> u32 { MAX_WINDOW_HOURS }
fn default_max_active_bookings() -> u32 { DEFAULT_MAX_ACTIVE_BOOKINGS }
fn default_sweep_interval_seconds() -> u64 { 300 }
fn default_conflict_retry_attempts() -> u32 { 3 }
fn default_conflict_retry_backoff_ms() -> u64 { 50 }

impl Default for WaitlistRules {
    fn default() -> Self {
        Self {
            min_window_hours: default_min_window_hours(),
            max_window_hours: default_max_window_hours(),
            max_active_bookings: default_max_active_bookings(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            conflict_retry_attempts: default_conflict_retry_attempts(),
            conflict_retry_backoff_ms: default_conflict_retry_backoff_ms(),
        }
    }
}

impl WaitlistRules {
    pub fn allocation_policy(&self) -> AllocationPolicy {
        AllocationPolicy {
            window: BookingWindowPolicy::new(self.min_window_hours, self.max_window_hours),
            max_active_bookings: self.max_active_bookings,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notification_topic")]
    pub topic: String,
}

fn default_notification_topic() -> String { "waitlist.notifications".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `VOYA_WAITLIST__SWEEP_INTERVAL_SECONDS=60`
            .add_source(config::Environment::with_prefix("VOYA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_waitlist_rules_default_when_missing() {
        let config = parse("[server]\nport = 8080\n");
        assert!(config.database.is_none());
        assert_eq!(config.waitlist.sweep_interval(), Duration::from_secs(300));

        let policy = config.waitlist.allocation_policy();
        assert_eq!(policy.window.min_hours, 2);
        assert_eq!(policy.window.max_hours, 48);
        assert_eq!(policy.max_active_bookings, 3);
    }

    #[test]
    fn test_waitlist_rules_override() {
        let config = parse(
            "[server]\nport = 9000\n[database]\nurl = \"postgres://localhost/voya\"\n\
             [waitlist]\nmax_window_hours = 24\nsweep_interval_seconds = 3600\n",
        );
        assert_eq!(config.database.unwrap().max_connections, 5);
        assert_eq!(config.waitlist.max_window_hours, 24);
        assert_eq!(config.waitlist.min_window_hours, 2);
        assert_eq!(config.waitlist.sweep_interval(), Duration::from_secs(3600));
    }
}
