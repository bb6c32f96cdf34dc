//! Formatter configuration.
//!
//! Settings are read from `query-expr.toml` in the working directory (or an
//! explicit path), then overridden by environment variables. A `.env` file
//! next to the config file is loaded first.
//!
//! Environment variables:
//! - QUERY_EXPR_DIALECT: preset to start from (`mysql`, `postgres`, `mssql`, `plain`)
//! - QUERY_EXPR_NAME_FORMAT: identifier template, `$1` is the identifier
//! - QUERY_EXPR_FORCE_ALIAS: `true`/`false`
//! - QUERY_EXPR_USE_ALIAS_KEYWORD: `true`/`false`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "query-expr.toml";

/// Environment variable names
pub const ENV_DIALECT: &str = "QUERY_EXPR_DIALECT";
pub const ENV_NAME_FORMAT: &str = "QUERY_EXPR_NAME_FORMAT";
pub const ENV_FORCE_ALIAS: &str = "QUERY_EXPR_FORCE_ALIAS";
pub const ENV_USE_ALIAS_KEYWORD: &str = "QUERY_EXPR_USE_ALIAS_KEYWORD";

/// Settings of the SQL formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterSettings {
    /// Identifier template; every `$1` is replaced by the identifier
    pub name_format: String,
    /// Give every plain selected member an alias named after its last segment
    pub force_alias: bool,
    /// Write `AS` between an expression and its alias
    pub use_alias_keyword: bool,
}

impl Default for FormatterSettings {
    fn default() -> Self {
        Self {
            name_format: "$1".to_string(),
            force_alias: false,
            use_alias_keyword: true,
        }
    }
}

impl FormatterSettings {
    pub fn mysql() -> Self {
        Self {
            name_format: "`$1`".to_string(),
            ..Self::default()
        }
    }

    pub fn postgres() -> Self {
        Self {
            name_format: "\"$1\"".to_string(),
            ..Self::default()
        }
    }

    pub fn mssql() -> Self {
        Self {
            name_format: "[$1]".to_string(),
            ..Self::default()
        }
    }

    /// Preset for a dialect name (case-insensitive).
    pub fn for_dialect(name: &str) -> QueryResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "plain" | "default" => Ok(Self::default()),
            "mysql" | "mariadb" => Ok(Self::mysql()),
            "postgres" | "postgresql" => Ok(Self::postgres()),
            "mssql" | "sqlserver" => Ok(Self::mssql()),
            other => Err(QueryError::ConfigError(format!(
                "Unknown dialect '{}'",
                other
            ))),
        }
    }
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Dialect preset applied before the explicit settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_alias: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_alias_keyword: Option<bool>,
}

impl Config {
    /// Load `query-expr.toml` from `dir`; a missing file yields the defaults.
    pub fn load(dir: &Path) -> QueryResult<Self> {
        Self::load_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Load a specific file, then apply environment overrides.
    pub fn load_file(path: &Path) -> QueryResult<Self> {
        if let Some(dir) = path.parent() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                dotenvy::from_path(&env_path).map_err(|e| {
                    QueryError::ConfigError(format!("Failed to load {}: {}", env_path.display(), e))
                })?;
            }
        }

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                QueryError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Self::parse(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> QueryResult<Self> {
        toml::from_str(content)
            .map_err(|e| QueryError::ConfigError(format!("Invalid config: {}", e)))
    }

    fn apply_env_overrides(&mut self) -> QueryResult<()> {
        if let Ok(dialect) = std::env::var(ENV_DIALECT) {
            if !dialect.is_empty() {
                self.dialect = Some(dialect);
            }
        }

        if let Ok(format) = std::env::var(ENV_NAME_FORMAT) {
            if !format.is_empty() {
                self.name_format = Some(format);
            }
        }

        if let Some(value) = env_flag(ENV_FORCE_ALIAS)? {
            self.force_alias = Some(value);
        }
        if let Some(value) = env_flag(ENV_USE_ALIAS_KEYWORD)? {
            self.use_alias_keyword = Some(value);
        }
        Ok(())
    }

    /// Resolve the formatter settings: dialect preset, then explicit values.
    pub fn settings(&self) -> QueryResult<FormatterSettings> {
        let mut settings = match &self.dialect {
            Some(dialect) => FormatterSettings::for_dialect(dialect)?,
            None => FormatterSettings::default(),
        };
        if let Some(format) = &self.name_format {
            if !format.contains("$1") {
                return Err(QueryError::ConfigError(format!(
                    "name_format '{}' must contain $1",
                    format
                )));
            }
            settings.name_format = format.clone();
        }
        if let Some(force_alias) = self.force_alias {
            settings.force_alias = force_alias;
        }
        if let Some(use_alias_keyword) = self.use_alias_keyword {
            settings.use_alias_keyword = use_alias_keyword;
        }
        Ok(settings)
    }
}

fn env_flag(name: &str) -> QueryResult<Option<bool>> {
    match std::env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(QueryError::ConfigError(format!(
                "{} must be a boolean, got '{}'",
                name, value
            ))),
        },
        Err(_) => Ok(None),
    }
}
