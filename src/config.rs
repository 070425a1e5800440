//! rowset configuration
//!
//! Read from `config.toml` in the platform config directory
//! (`~/.config/rowset/config.toml` on Linux). A missing file means defaults.
//!
//! ```toml
//! [fetch]
//! batch_size = 100
//!
//! [log]
//! filter = "rowset=debug"
//!
//! [database]
//! url = "sqlite://data.db"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FetchError, FetchResult};
use crate::rowset::DEFAULT_BATCH;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub fetch: FetchConfig,
    pub log: LogConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Rows per fetch cycle. Descriptor-backed columns allocate one
    /// descriptor per row of this size.
    pub batch_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `"warn"` or `"rowset=debug"`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rowset").join("config.toml"))
    }

    /// Load from `path`, or from [`default_path`](Self::default_path) when
    /// `None`. A missing default file yields defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> FetchResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> FetchResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| FetchError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> FetchResult<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| FetchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> FetchResult<()> {
        if self.fetch.batch_size == 0 {
            return Err(FetchError::Config("fetch.batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.fetch.batch_size, 100);
        assert_eq!(config.log.filter, "warn");
        assert_eq!(config.database.url, None);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r#"
            [fetch]
            batch_size = 25

            [database]
            url = "sqlite::memory:"
            "#,
        )
        .unwrap();
        assert_eq!(config.fetch.batch_size, 25);
        assert_eq!(config.log.filter, "warn");
        assert_eq!(config.database.url.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let err = Config::parse("[fetch]\nbatch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(Config::parse("[fetch]\nbatchsize = 5\n").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[log]\nfilter = \"rowset=trace\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.log.filter, "rowset=trace");

        let missing = file.path().with_extension("missing");
        assert!(matches!(Config::load(Some(&missing)), Err(FetchError::Io(_))));
    }
}
