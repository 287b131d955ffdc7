use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cancellation: CancellationRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/diveops".to_string()
}

/// Refund policy thresholds; mirrored by the cancellation policy in the
/// services crate. Policy, not code: shops tune these per deployment.
#[derive(Debug, Deserialize, Clone)]
pub struct CancellationRules {
    #[serde(default = "default_full_refund_hours")]
    pub full_refund_hours: i64,
    #[serde(default = "default_partial_refund_hours")]
    pub partial_refund_hours: i64,
    #[serde(default = "default_partial_refund_percent")]
    pub partial_refund_percent: u32,
}

impl Default for CancellationRules {
    fn default() -> Self {
        Self {
            full_refund_hours: default_full_refund_hours(),
            partial_refund_hours: default_partial_refund_hours(),
            partial_refund_percent: default_partial_refund_percent(),
        }
    }
}

fn default_full_refund_hours() -> i64 {
    48
}

fn default_partial_refund_hours() -> i64 {
    24
}

fn default_partial_refund_percent() -> u32 {
    50
}

impl Config {
    /// Layered load: config/default, then config/{RUN_MODE}, then
    /// config/local (all optional), then DIVEOPS_-prefixed environment
    /// variables. Every field has a serde default, so an empty environment
    /// still yields a working config.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("DIVEOPS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_any_source() {
        let config = Config::default();
        assert_eq!(config.cancellation.full_refund_hours, 48);
        assert_eq!(config.cancellation.partial_refund_hours, 24);
        assert_eq!(config.cancellation.partial_refund_percent, 50);
        assert!(config.database.url.starts_with("postgres://"));
    }

    #[test]
    fn file_values_override_defaults() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                "[cancellation]\nfull_refund_hours = 72\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: Config = s.try_deserialize().unwrap();
        assert_eq!(config.cancellation.full_refund_hours, 72);
        // Untouched fields keep their defaults.
        assert_eq!(config.cancellation.partial_refund_hours, 24);
    }
}
