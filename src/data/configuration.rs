use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::family::render::DEFAULT_DATE_FORMAT;

pub const DATABASE_PATH_ENV: &str = "KINFOLK_DATABASE_PATH";
pub const STORAGE_PATH_ENV: &str = "KINFOLK_STORAGE_PATH";
pub const PUBLIC_BASE_URL_ENV: &str = "KINFOLK_PUBLIC_BASE_URL";

const MASK_AFTER: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("invalid display.date_format {0:?}")]
    DateFormat(String),
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct Configuration {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub accounts: HashMap<String, Account>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: String,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub public_base_url: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            date_format: default_date_format(),
        }
    }
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

/// A user allowed to sign in with a bearer token.
#[derive(Deserialize, Serialize, Default, Clone)]
pub struct Account {
    pub token: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
}

/// One line of the configuration diagnostics panel.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfigCheck {
    pub name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

fn mask(value: &str) -> String {
    if value.chars().count() <= MASK_AFTER {
        return value.to_string();
    }
    let head: String = value.chars().take(MASK_AFTER).collect();
    format!("{head}...")
}

fn setting_check(name: &str, value: &str) -> ConfigCheck {
    if value.trim().is_empty() {
        ConfigCheck {
            name: name.to_string(),
            status: CheckStatus::Error,
            value: None,
            message: "Setting is missing".to_string(),
        }
    } else {
        ConfigCheck {
            name: name.to_string(),
            status: CheckStatus::Ok,
            value: Some(mask(value)),
            message: "Setting is set".to_string(),
        }
    }
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = Self::from_toml(&config)?;
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_toml(config: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config)?)
    }

    /// Replace file settings with any non-empty values `lookup` returns for
    /// the `KINFOLK_*` variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = get(DATABASE_PATH_ENV) {
            self.database.path = path;
        }
        if let Some(path) = get(STORAGE_PATH_ENV) {
            self.storage.path = path;
        }
        if let Some(url) = get(PUBLIC_BASE_URL_ENV) {
            self.storage.public_base_url = url;
        }
    }

    pub fn diagnostics(&self) -> Vec<ConfigCheck> {
        let accounts = self.accounts.len();
        vec![
            setting_check("database.path", &self.database.path),
            setting_check("storage.path", &self.storage.path),
            setting_check("storage.public_base_url", &self.storage.public_base_url),
            ConfigCheck {
                name: "accounts".to_string(),
                status: if accounts > 0 {
                    CheckStatus::Ok
                } else {
                    CheckStatus::Error
                },
                value: None,
                message: format!("{accounts} account(s) configured"),
            },
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<String> = self
            .diagnostics()
            .into_iter()
            .filter(|check| check.status == CheckStatus::Error)
            .map(|check| check.name)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        if StrftimeItems::new(&self.display.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::DateFormat(self.display.date_format.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [database]
        path = "./data"

        [storage]
        path = "./data/pictures"
        public_base_url = "http://localhost:8080/pictures"

        [accounts.alice]
        token = "alice-token"
    "#;

    #[test]
    fn full_configuration_is_valid() {
        let cfg = Configuration::from_toml(FULL).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.display.date_format, DEFAULT_DATE_FORMAT);
        assert_eq!(cfg.accounts["alice"].token, "alice-token");
    }

    #[test]
    fn missing_settings_are_all_reported() {
        let cfg = Configuration::from_toml("[database]\npath = \"./data\"\n").unwrap();
        match cfg.validate() {
            Err(ConfigError::Missing(names)) => assert_eq!(
                names,
                vec!["storage.path", "storage.public_base_url", "accounts"]
            ),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bad_date_format_is_rejected() {
        let cfg = Configuration::from_toml(&format!("{FULL}\n[display]\ndate_format = \"%Q\"\n"))
            .unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::DateFormat(_))));
    }

    #[test]
    fn environment_overrides_file() {
        let mut cfg = Configuration::from_toml(FULL).unwrap();
        cfg.apply_overrides(|key| match key {
            DATABASE_PATH_ENV => Some("/var/lib/kinfolk".to_string()),
            STORAGE_PATH_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.database.path, "/var/lib/kinfolk");
        assert_eq!(cfg.storage.path, "./data/pictures");
    }

    #[test]
    fn diagnostics_mask_long_values() {
        let cfg = Configuration::from_toml(FULL).unwrap();
        let checks = cfg.diagnostics();
        let url = checks
            .iter()
            .find(|c| c.name == "storage.public_base_url")
            .unwrap();
        assert_eq!(url.value.as_deref(), Some("http://localhost:808..."));
        assert_eq!(checks[0].value.as_deref(), Some("./data"));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let cfg = Configuration::from_toml(FULL).unwrap();
        let printed = format!("{cfg:?}");
        assert!(printed.contains("alice"));
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("alice-token"));
    }

    #[test]
    fn unreadable_file_is_a_read_error() {
        let err = Configuration::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
