//! Configuration loading and validation.
//!
//! The backend is configured by a TOML file (default `./config/collab.toml`):
//!
//! ```toml
//! [db]
//! path = "./data/collab.sqlite"
//!
//! [logging]
//! level = "info"
//! format = "compact"        # or "json"
//!
//! [[matchers]]
//! match_type = "name_hash"
//! vector_type = "name_hash"
//! matcher_name = "Name Hash"
//! matcher_description = "Exact match on a hash of the symbol name"
//!
//! [[strategies]]
//! strategy_type = "all_strategy"
//! strategy_name = "All"
//! ```
//!
//! When no `[[matchers]]` or `[[strategies]]` are given the built-in
//! catalog ([`Catalog::builtin`]) is used for that list.

use anyhow::{bail, Context, Result};
use collab_core::models::{Catalog, Matcher, Strategy};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::logging::LogFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "compact".to_string()
}

impl LoggingConfig {
    pub fn log_format(&self) -> LogFormat {
        match self.format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

impl Config {
    /// The matcher/strategy catalog, falling back to the built-in lists.
    pub fn catalog(&self) -> Catalog {
        let builtin = Catalog::builtin();
        Catalog::new(
            if self.matchers.is_empty() {
                builtin.matchers
            } else {
                self.matchers.clone()
            },
            if self.strategies.is_empty() {
                builtin.strategies
            } else {
                self.strategies.clone()
            },
        )
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parses and validates configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.path.as_os_str().is_empty() {
        bail!("db.path must not be empty");
    }
    if config.db.max_connections == 0 {
        bail!("db.max_connections must be >= 1");
    }

    match config.logging.format.as_str() {
        "compact" | "json" => {}
        other => bail!(
            "Unknown logging format: '{}'. Must be compact or json.",
            other
        ),
    }

    let mut seen = HashSet::new();
    for m in &config.matchers {
        if m.match_type.is_empty() {
            bail!("matchers.match_type must not be empty");
        }
        if !seen.insert(m.match_type.as_str()) {
            bail!("duplicate matcher match_type: '{}'", m.match_type);
        }
    }

    let mut seen = HashSet::new();
    for s in &config.strategies {
        if s.strategy_type.is_empty() {
            bail!("strategies.strategy_type must not be empty");
        }
        if !seen.insert(s.strategy_type.as_str()) {
            bail!("duplicate strategy strategy_type: '{}'", s.strategy_type);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[db]\npath = \"/tmp/c.sqlite\"\n").unwrap();
        assert_eq!(cfg.db.max_connections, 5);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.log_format(), LogFormat::Compact);
        assert_eq!(cfg.catalog(), Catalog::builtin());
    }

    #[test]
    fn test_catalog_override() {
        let cfg = parse_config(
            r#"
[db]
path = "x.sqlite"

[[matchers]]
match_type = "fuzzy"
vector_type = "fuzzy_hash"
matcher_name = "Fuzzy"
"#,
        )
        .unwrap();
        let catalog = cfg.catalog();
        assert_eq!(catalog.matchers.len(), 1);
        assert!(catalog.matcher("fuzzy").is_some());
        assert_eq!(catalog.strategies, Catalog::builtin().strategies);
    }

    #[test]
    fn test_rejects_duplicate_matchers() {
        let err = parse_config(
            r#"
[db]
path = "x.sqlite"

[[matchers]]
match_type = "a"
vector_type = "a"
matcher_name = "A"

[[matchers]]
match_type = "a"
vector_type = "b"
matcher_name = "B"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate matcher"));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let err = parse_config("[db]\npath = \"x\"\n[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(err.to_string().contains("logging format"));
    }
}
