// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use std::env;
use std::time::Duration;
use telemetry_core::constants::{DEFAULT_ADDRESS, UPDATES_PATH};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;
const DEFAULT_CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Collector `host:port`, or a base URL with scheme.
    pub address: String,
    /// Shared secret for payload signatures.
    pub key: Option<String>,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// Number of send workers and capacity of the report queue.
    pub rate_limit: usize,
    /// How long the host collector waits between two CPU readings.
    pub cpu_sample_window: Duration,
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            address: DEFAULT_ADDRESS.to_string(),
            key: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            rate_limit: 1,
            cpu_sample_window: DEFAULT_CPU_SAMPLE_WINDOW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

fn seconds(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<AgentConfig, ConfigError> {
        let defaults = AgentConfig::default();

        let address = env::var("ADDRESS").unwrap_or(defaults.address);
        let key = env::var("KEY").ok().filter(|key| !key.is_empty());
        let poll_interval = seconds("POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)?;
        let report_interval = seconds("REPORT_INTERVAL", DEFAULT_REPORT_INTERVAL_SECS)?;

        // non-positive limits fall back to a single worker
        let rate_limit = match env::var("RATE_LIMIT") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "RATE_LIMIT",
                    value: raw.clone(),
                })?
                .max(1),
            Err(_) => 1,
        };
        let rate_limit = usize::try_from(rate_limit).map_err(|_| ConfigError::InvalidValue {
            name: "RATE_LIMIT",
            value: rate_limit.to_string(),
        })?;

        let config = AgentConfig {
            address,
            key,
            poll_interval,
            report_interval,
            rate_limit,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid("collector address is empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll interval must be positive".to_string()));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "report interval must be positive".to_string(),
            ));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::Invalid("rate limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Endpoint receiving batches.
    #[must_use]
    pub fn updates_url(&self) -> String {
        let base = self.address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{UPDATES_PATH}")
        } else {
            format!("http://{base}{UPDATES_PATH}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "ADDRESS",
        "KEY",
        "POLL_INTERVAL",
        "REPORT_INTERVAL",
        "RATE_LIMIT",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.updates_url(), "http://localhost:8080/updates/");
    }

    #[test]
    #[serial]
    fn test_reads_env() {
        clear_env();
        env::set_var("ADDRESS", "collector:9090");
        env::set_var("KEY", "secret");
        env::set_var("POLL_INTERVAL", "1");
        env::set_var("REPORT_INTERVAL", "5");
        env::set_var("RATE_LIMIT", "4");
        let config = AgentConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.address, "collector:9090");
        assert_eq!(config.key.as_deref(), Some("secret"));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.report_interval, Duration::from_secs(5));
        assert_eq!(config.rate_limit, 4);
    }

    #[test]
    #[serial]
    fn test_non_positive_rate_limit_becomes_one() {
        clear_env();
        env::set_var("RATE_LIMIT", "-3");
        let config = AgentConfig::from_env().unwrap();
        clear_env();
        assert_eq!(config.rate_limit, 1);
    }

    #[test]
    #[serial]
    fn test_invalid_values() {
        clear_env();
        env::set_var("POLL_INTERVAL", "soon");
        assert!(matches!(
            AgentConfig::from_env(),
            Err(ConfigError::InvalidValue {
                name: "POLL_INTERVAL",
                ..
            })
        ));
        env::set_var("POLL_INTERVAL", "0");
        assert!(matches!(
            AgentConfig::from_env(),
            Err(ConfigError::Invalid(_))
        ));
        clear_env();
    }

    #[test]
    fn test_updates_url_keeps_scheme() {
        let config = AgentConfig {
            address: "http://127.0.0.1:4000/".to_string(),
            ..AgentConfig::default()
        };
        assert_eq!(config.updates_url(), "http://127.0.0.1:4000/updates/");
    }
}
