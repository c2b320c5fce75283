//! Configuration for the portal binaries.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. `portal.toml` in the working directory, or the file given with `--config`
//!
//! Command-line flags are applied on top by the binaries themselves.

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Configuration file not found: {0}")]
    MissingFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file holding placas, costos, envios, papeles and proveedores
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("portal.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Debug mode: permissive CORS and per-request trace logging
    pub debug: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            debug: true,
        }
    }
}

impl WebConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PortalConfig {
    /// Defaults merged with `path`.
    ///
    /// An explicit path must exist. Without one, `portal.toml` is used when
    /// present and silently skipped otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
        }

        Self::figment(path).extract().map_err(ConfigError::from)
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()));

        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if file.exists() {
            figment.merge(Toml::file(file))
        } else {
            figment
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_original_web_settings() {
        let config = PortalConfig::default();
        assert_eq!(config.web.bind_address(), "0.0.0.0:5000");
        assert!(config.web.debug);
        assert_eq!(config.database.path, PathBuf::from("portal.db"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn loads_without_any_file() {
        Jail::expect_with(|_jail| {
            let config = PortalConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config, PortalConfig::default());
            Ok(())
        });
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "portal.toml",
                r#"
[web]
host = "127.0.0.1"
port = 8080
debug = false

[database]
path = "/var/lib/portal/portal.db"
"#,
            )?;

            let config = PortalConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.web.bind_address(), "127.0.0.1:8080");
            assert!(!config.web.debug);
            assert_eq!(config.database.path, PathBuf::from("/var/lib/portal/portal.db"));
            assert_eq!(config.logging, LoggingConfig::default());
            Ok(())
        });
    }

    #[test]
    fn explicit_path_must_exist() {
        Jail::expect_with(|_jail| {
            let err = PortalConfig::load(Some(Path::new("missing.toml"))).unwrap_err();
            assert!(matches!(err, ConfigError::MissingFile(_)));
            Ok(())
        });
    }

    #[test]
    fn explicit_path_is_used() {
        Jail::expect_with(|jail| {
            jail.create_file("otro.toml", "[logging]\nlevel = \"debug\"\njson = true\n")?;

            let config = PortalConfig::load(Some(Path::new("otro.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, "debug");
            assert!(config.logging.json);
            Ok(())
        });
    }
}
