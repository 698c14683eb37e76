//! Service settings
//!
//! Each setting resolves as: command line (or its env var) → `[server]`
//! table in config.toml → compiled default.

use std::time::Duration;

use qc_common::config::{defaults, ServerConfig};
use qc_common::{Error, Result};

use crate::selector::SelectionPolicy;

/// Values supplied on the command line; `None` defers to the config file
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub task_timeout_secs: Option<u64>,
    pub worker_count: Option<usize>,
    pub selection_policy: Option<String>,
    pub user_cookie: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub host: String,
    pub port: u16,
    /// Bounded wait when redeeming a selection
    pub task_timeout: Duration,
    pub worker_count: usize,
    pub selection_policy: SelectionPolicy,
    /// Cookie carrying the rater's user name
    pub user_cookie: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            task_timeout: Duration::from_secs(defaults::TASK_TIMEOUT_SECS),
            worker_count: defaults::WORKER_COUNT,
            selection_policy: SelectionPolicy::default(),
            user_cookie: defaults::USER_COOKIE.to_string(),
        }
    }
}

impl ServiceSettings {
    pub fn resolve(cli: SettingsOverrides, toml: &ServerConfig) -> Result<Self> {
        let task_timeout_secs = cli
            .task_timeout_secs
            .or(toml.task_timeout_secs)
            .unwrap_or(defaults::TASK_TIMEOUT_SECS);
        if task_timeout_secs == 0 {
            return Err(Error::Config("task_timeout_secs must be at least 1".to_string()));
        }

        let worker_count = cli
            .worker_count
            .or(toml.worker_count)
            .unwrap_or(defaults::WORKER_COUNT);
        if worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".to_string()));
        }

        let selection_policy = cli
            .selection_policy
            .or_else(|| toml.selection_policy.clone())
            .unwrap_or_else(|| defaults::SELECTION_POLICY.to_string())
            .parse::<SelectionPolicy>()
            .map_err(Error::Config)?;

        Ok(Self {
            host: cli
                .host
                .or_else(|| toml.host.clone())
                .unwrap_or_else(|| defaults::HOST.to_string()),
            port: cli.port.or(toml.port).unwrap_or(defaults::PORT),
            task_timeout: Duration::from_secs(task_timeout_secs),
            worker_count,
            selection_policy,
            user_cookie: cli
                .user_cookie
                .or_else(|| toml.user_cookie.clone())
                .unwrap_or_else(|| defaults::USER_COOKIE.to_string()),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_set() {
        let settings = ServiceSettings::resolve(SettingsOverrides::default(), &ServerConfig::default()).unwrap();
        assert_eq!(settings, ServiceSettings::default());
        assert_eq!(settings.bind_address(), "127.0.0.1:8000");
        assert_eq!(settings.task_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml = ServerConfig {
            port: Some(9000),
            worker_count: Some(8),
            selection_policy: Some("per-image".to_string()),
            ..Default::default()
        };
        let cli = SettingsOverrides {
            port: Some(9100),
            ..Default::default()
        };

        let settings = ServiceSettings::resolve(cli, &toml).unwrap();

        assert_eq!(settings.port, 9100);
        assert_eq!(settings.worker_count, 8);
        assert_eq!(settings.selection_policy, SelectionPolicy::PerImage);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_workers = SettingsOverrides {
            worker_count: Some(0),
            ..Default::default()
        };
        assert!(ServiceSettings::resolve(zero_workers, &ServerConfig::default()).is_err());

        let bad_policy = ServerConfig {
            selection_policy: Some("random".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ServiceSettings::resolve(SettingsOverrides::default(), &bad_policy),
            Err(Error::Config(_))
        ));
    }
}
