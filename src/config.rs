use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::monitor::registry::RegistryConfig;
use crate::monitor::service::ScopePolicy;
use crate::notifications::senders::WebhookConfig;

const ENV_PREFIX: &str = "PULSEWATCH_";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub log_dir: String,
    pub monitor: MonitorSettings,
    pub access: AccessSettings,
    pub notifications: NotificationSettings,
    pub targets: Vec<SeedTarget>,
    /// File the settings were read from; `None` when running on defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    pub min_interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// Defaults to the probe timeout.
    pub stop_grace_period_secs: Option<u64>,
    pub scope: ScopePolicy,
}

/// `native_admins` stands in for the platform's administrator role;
/// `admins` seeds the bot-admin set.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AccessSettings {
    pub native_admins: Vec<String>,
    pub admins: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub only_status_changes: bool,
    pub event_buffer: usize,
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SeedTarget {
    pub address: String,
    pub interval_secs: i64,
    #[serde(default = "default_seed_owner")]
    pub owner: String,
}

fn default_seed_owner() -> String {
    "config".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            monitor: MonitorSettings::default(),
            access: AccessSettings::default(),
            notifications: NotificationSettings::default(),
            targets: Vec::new(),
            source: None,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: 1,
            probe_timeout_secs: 10,
            stop_grace_period_secs: None,
            scope: ScopePolicy::Global,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            only_status_changes: false,
            event_buffer: 256,
            webhooks: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads the TOML file (if it exists), then applies `.env` and
    /// `PULSEWATCH_*` environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(config_path: Option<&str>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match config_path.map(Path::new) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                let mut config = Self::from_toml_str(&contents)?;
                config.source = Some(path.to_path_buf());
                config
            }
            _ => Self::default(),
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let secs = |name: &str| -> Result<Option<u64>, ConfigError> {
            var(name)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|e| {
                        ConfigError::Invalid(format!("{ENV_PREFIX}{name}={raw}: {e}"))
                    })
                })
                .transpose()
        };

        if let Some(log_dir) = var("LOG_DIR") {
            self.log_dir = log_dir;
        }
        if let Some(value) = secs("MIN_INTERVAL_SECS")? {
            self.monitor.min_interval_secs = value;
        }
        if let Some(value) = secs("PROBE_TIMEOUT_SECS")? {
            self.monitor.probe_timeout_secs = value;
        }
        if let Some(value) = secs("STOP_GRACE_PERIOD_SECS")? {
            self.monitor.stop_grace_period_secs = Some(value);
        }
        if let Some(scope) = var("SCOPE") {
            self.monitor.scope = scope.parse().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.min_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.min_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.monitor.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.probe_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.monitor.stop_grace_period_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "monitor.stop_grace_period_secs must be at least 1".to_string(),
            ));
        }
        if self.notifications.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "notifications.event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        let probe_timeout = Duration::from_secs(self.monitor.probe_timeout_secs);
        RegistryConfig {
            min_interval: Duration::from_secs(self.monitor.min_interval_secs),
            probe_timeout,
            stop_grace_period: self
                .monitor
                .stop_grace_period_secs
                .map(Duration::from_secs)
                .unwrap_or(probe_timeout),
        }
    }
}
