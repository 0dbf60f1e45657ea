use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::lists::{Limit, Limits, DEFAULT_LEVELS};

/// Defaults applied to every set or map built with `from_config`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListsConfig {
    pub levels: usize,
    /// `None` means the middle level.
    pub default_priority: Option<usize>,
    pub capacity: Limit,
    pub byte_capacity: Limit,
    pub max_element_bytes: Limit,
    pub enforce_limits: bool,
    pub order_maintained: bool,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
            default_priority: None,
            capacity: Limit::Unlimited,
            byte_capacity: Limit::Unlimited,
            max_element_bytes: Limit::Unlimited,
            enforce_limits: true,
            order_maintained: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
struct FileConfig {
    pub levels: Option<usize>,
    pub default_priority: Option<usize>,
    pub capacity: Option<i64>,
    pub byte_capacity: Option<i64>,
    pub max_element_bytes: Option<i64>,
    pub enforce_limits: Option<bool>,
    pub order_maintained: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config parse error: {0}")]
    Parse(String),
}

fn parse_env<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl ListsConfig {
    fn load_file<P: AsRef<Path>>(path: P) -> Result<FileConfig, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let cfg: FileConfig = toml::from_str(&raw)?;
        Ok(cfg)
    }

    /// Parses a TOML document, ignoring the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        Self::from_file(file).validated()
    }

    fn from_file(file: FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            levels: file.levels.unwrap_or(defaults.levels),
            default_priority: file.default_priority,
            capacity: file.capacity.map_or(defaults.capacity, Limit::from),
            byte_capacity: file.byte_capacity.map_or(defaults.byte_capacity, Limit::from),
            max_element_bytes: file
                .max_element_bytes
                .map_or(defaults.max_element_bytes, Limit::from),
            enforce_limits: file.enforce_limits.unwrap_or(defaults.enforce_limits),
            order_maintained: file.order_maintained.unwrap_or(defaults.order_maintained),
        }
    }

    /// Load configuration from an optional file path and environment variables.
    ///
    /// Precedence: built-in defaults, then the file (`path`, or
    /// `BLIPMQ_LISTS_CONFIG` when `path` is `None`), then `BLIPMQ_LISTS_*`
    /// variables. Non-positive bounds mean unlimited.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let env_path = env::var("BLIPMQ_LISTS_CONFIG").ok();
        let effective_path = path.map(|s| s.to_string()).or(env_path);

        let file_cfg = match effective_path {
            Some(p) => Self::load_file(p)?,
            None => FileConfig::default(),
        };
        let mut cfg = Self::from_file(file_cfg);

        // Env overrides.
        if let Some(v) = parse_env("BLIPMQ_LISTS_LEVELS")? {
            cfg.levels = v;
        }
        if let Some(v) = parse_env("BLIPMQ_LISTS_DEFAULT_PRIORITY")? {
            cfg.default_priority = Some(v);
        }
        if let Some(v) = parse_env::<i64>("BLIPMQ_LISTS_CAPACITY")? {
            cfg.capacity = Limit::from(v);
        }
        if let Some(v) = parse_env::<i64>("BLIPMQ_LISTS_BYTE_CAPACITY")? {
            cfg.byte_capacity = Limit::from(v);
        }
        if let Some(v) = parse_env::<i64>("BLIPMQ_LISTS_MAX_ELEMENT_BYTES")? {
            cfg.max_element_bytes = Limit::from(v);
        }
        if let Some(v) = parse_flag("BLIPMQ_LISTS_ENFORCE_LIMITS") {
            cfg.enforce_limits = v;
        }
        if let Some(v) = parse_flag("BLIPMQ_LISTS_ORDER_MAINTAINED") {
            cfg.order_maintained = v;
        }

        cfg.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.levels == 0 {
            return Err(ConfigError::Parse("levels must be at least 1".into()));
        }
        if let Some(priority) = self.default_priority {
            if priority >= self.levels {
                return Err(ConfigError::Parse(format!(
                    "default_priority {priority} is not below levels {}",
                    self.levels
                )));
            }
        }
        Ok(self)
    }

    /// The bounds a new collection starts with.
    pub fn limits(&self) -> Limits {
        let mut limits = Limits {
            enforce: self.enforce_limits,
            ..Limits::default()
        };
        limits.set_capacity(self.capacity);
        limits.set_byte_capacity(self.byte_capacity);
        limits.set_max_element_bytes(self.max_element_bytes);
        limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_and_unlimited_bounds() {
        let cfg = ListsConfig::from_toml_str(
            r#"
            levels = 4
            capacity = 100
            byte_capacity = -1
            enforce_limits = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.levels, 4);
        assert_eq!(cfg.capacity, Limit::AtMost(100));
        assert_eq!(cfg.byte_capacity, Limit::Unlimited);
        assert!(!cfg.limits().enforce);
        assert!(cfg.order_maintained);
    }

    #[test]
    fn default_priority_must_fit() {
        let err = ListsConfig::from_toml_str("levels = 3\ndefault_priority = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_types_are_toml_errors() {
        let err = ListsConfig::from_toml_str("levels = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
