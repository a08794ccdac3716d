//! Configuration loading and config file resolution
//!
//! Priority order for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup; the relay logs a
//! warning and continues with compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SALESGATE_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Relay configuration (optional)
    #[serde(default)]
    pub relay: RelaySettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Staging relay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Bucket receiving submissions from intake
    pub inbound_bucket: String,
    /// Bucket holding normalized results for downstream consumers
    pub outbound_bucket: String,
    /// Bucket holding failed submissions and their diagnostics
    pub error_bucket: String,
    /// Topic carrying references to inbound objects
    pub inbound_topic: String,
    /// Topic carrying references to outbound objects
    pub outbound_topic: String,
    /// Republish timer interval in seconds (same for both timers)
    pub republish_interval_secs: u64,
    /// Maximum objects listed per bucket per timer tick
    pub list_limit: usize,
    /// Maximum pipeline tasks running at once
    pub max_concurrent_tasks: usize,
    /// Audit entry retention in seconds
    pub audit_ttl_secs: u64,
    /// Root directory for the filesystem object store
    ///
    /// When unset the relay keeps objects in memory.
    pub data_dir: Option<PathBuf>,
    /// TOML file of registry entries loaded at startup
    pub registry_seed: Option<PathBuf>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            inbound_bucket: "inbound".to_string(),
            outbound_bucket: "outbound".to_string(),
            error_bucket: "errors".to_string(),
            inbound_topic: "inbound".to_string(),
            outbound_topic: "outbound".to_string(),
            republish_interval_secs: 30,
            list_limit: 100,
            max_concurrent_tasks: 16,
            audit_ttl_secs: 3 * 24 * 60 * 60,
            data_dir: None,
            registry_seed: None,
        }
    }
}

impl RelaySettings {
    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.republish_interval_secs == 0 {
            return Err(Error::Config(
                "republish_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.list_limit == 0 {
            return Err(Error::Config("list_limit must be greater than zero".to_string()));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(Error::Config(
                "max_concurrent_tasks must be greater than zero".to_string(),
            ));
        }
        let buckets = [&self.inbound_bucket, &self.outbound_bucket, &self.error_bucket];
        for (i, a) in buckets.iter().enumerate() {
            for b in &buckets[i + 1..] {
                if a == b {
                    return Err(Error::Config(format!(
                        "bucket '{}' is configured for more than one role",
                        a
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve which TOML file to read
///
/// Returns `None` when neither an explicit path nor a platform config file
/// exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config locations
    default_config_file()
}

/// Platform config file: ~/.config/salesgate/config.toml, then /etc/salesgate/config.toml
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("salesgate").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/salesgate/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load a TOML config file, falling back to defaults when it is missing
///
/// A file that exists but does not parse is an error; a missing file is not.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using compiled defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relay_settings_are_valid() {
        let settings = RelaySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.audit_ttl_secs, 259_200);
    }

    #[test]
    fn test_validate_rejects_shared_bucket() {
        let settings = RelaySettings {
            error_bucket: "inbound".to_string(),
            ..RelaySettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let settings = RelaySettings {
            republish_interval_secs: 0,
            ..RelaySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [relay]
            list_limit = 5
            registry_seed = "/etc/salesgate/registry.toml"
            "#,
        )
        .unwrap();
        assert_eq!(config.relay.list_limit, 5);
        assert_eq!(
            config.relay.registry_seed,
            Some(PathBuf::from("/etc/salesgate/registry.toml"))
        );
        assert_eq!(config.relay.data_dir, None);
        assert_eq!(config.relay.inbound_bucket, "inbound");
        assert_eq!(config.logging.level, "info");
    }
}
