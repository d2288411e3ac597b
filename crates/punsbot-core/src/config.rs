//! Configuration for punsbot.
//!
//! A [`PunsConfig`] is built once at startup and handed by reference to every
//! component that needs it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PunsError, PunsResult};

/// Default compiled-size limit for a single trigger regex.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Main punsbot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PunsConfig {
    /// Path to the SQLite database holding rules and chat options.
    pub db_path: PathBuf,
    /// Seed corpus loaded into the global scope at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_corpus_path: Option<PathBuf>,
    /// How long a store call waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Fixed seed for the response gate's RNG. `None` seeds from OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
    /// Compiled-size limit applied to every trigger regex.
    pub regex_size_limit: usize,
    /// Restrict user-submitted triggers to the accepted alphabet.
    pub restrict_trigger_charset: bool,
}

impl Default for PunsConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".punsbot"))
            .unwrap_or_else(|| PathBuf::from(".punsbot"));

        Self {
            db_path: data_dir.join("puns.db"),
            seed_corpus_path: None,
            busy_timeout_ms: 5_000,
            rng_seed: None,
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            restrict_trigger_charset: true,
        }
    }
}

impl PunsConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> PunsResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| PunsError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| PunsError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| PunsError::Configuration(e.to_string())),
            _ => Err(PunsError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Create config from environment variables, starting from the defaults.
    ///
    /// Reads:
    /// - `PUNSBOT_DB_PATH`
    /// - `PUNSBOT_SEED_PATH`
    /// - `PUNSBOT_BUSY_TIMEOUT_MS` (default: 5000)
    /// - `PUNSBOT_RNG_SEED` (default: None = OS entropy)
    /// - `PUNSBOT_REGEX_SIZE_LIMIT` (default: 1 MiB)
    /// - `PUNSBOT_ALLOW_ANY_TRIGGER_CHARS` (presence disables the alphabet check)
    pub fn from_env() -> PunsResult<Self> {
        Self::default().merge_env()
    }

    /// Overlay environment variables on top of an existing config.
    pub fn merge_env(mut self) -> PunsResult<Self> {
        if let Ok(path) = std::env::var("PUNSBOT_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("PUNSBOT_SEED_PATH") {
            self.seed_corpus_path = Some(PathBuf::from(path));
        }

        if let Ok(raw) = std::env::var("PUNSBOT_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = parse_env("PUNSBOT_BUSY_TIMEOUT_MS", &raw)?;
        }

        if let Ok(raw) = std::env::var("PUNSBOT_RNG_SEED") {
            self.rng_seed = Some(parse_env("PUNSBOT_RNG_SEED", &raw)?);
        }

        if let Ok(raw) = std::env::var("PUNSBOT_REGEX_SIZE_LIMIT") {
            self.regex_size_limit = parse_env("PUNSBOT_REGEX_SIZE_LIMIT", &raw)?;
        }

        if std::env::var("PUNSBOT_ALLOW_ANY_TRIGGER_CHARS").is_ok() {
            self.restrict_trigger_charset = false;
        }

        Ok(self)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> PunsConfigBuilder {
        PunsConfigBuilder::default()
    }

    /// Busy timeout as a [`std::time::Duration`].
    pub fn busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.busy_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> PunsResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| PunsError::Configuration(format!("{} is invalid: {}", name, e)))
}

/// Builder for PunsConfig.
#[derive(Default)]
pub struct PunsConfigBuilder {
    config: PunsConfig,
}

impl PunsConfigBuilder {
    /// Set database path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set seed corpus path.
    pub fn seed_corpus_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.seed_corpus_path = Some(path.into());
        self
    }

    /// Set busy timeout in milliseconds.
    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.busy_timeout_ms = ms;
        self
    }

    /// Fix the gate's RNG seed.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Set the compiled regex size limit.
    pub fn regex_size_limit(mut self, limit: usize) -> Self {
        self.config.regex_size_limit = limit;
        self
    }

    /// Toggle the trigger alphabet restriction.
    pub fn restrict_trigger_charset(mut self, restrict: bool) -> Self {
        self.config.restrict_trigger_charset = restrict;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PunsConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PunsConfig::default();
        assert!(config.db_path.ends_with("puns.db"));
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.rng_seed.is_none());
        assert!(config.restrict_trigger_charset);
    }

    #[test]
    fn test_builder() {
        let config = PunsConfig::builder()
            .db_path("/tmp/x.db")
            .rng_seed(7)
            .restrict_trigger_charset(false)
            .build();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.rng_seed, Some(7));
        assert!(!config.restrict_trigger_charset);
    }

    #[test]
    fn test_from_toml_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("punsbot.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "db_path = \"/var/lib/punsbot/puns.db\"").unwrap();
        writeln!(file, "rng_seed = 42").unwrap();

        let config = PunsConfig::from_file(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/punsbot/puns.db"));
        assert_eq!(config.rng_seed, Some(42));
        assert_eq!(config.regex_size_limit, DEFAULT_REGEX_SIZE_LIMIT);
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("punsbot.yaml");
        std::fs::write(&path, "busy_timeout_ms: 250\nrestrict_trigger_charset: false\n").unwrap();

        let config = PunsConfig::from_file(&path).unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(!config.restrict_trigger_charset);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("punsbot.ini");
        std::fs::write(&path, "").unwrap();

        let err = PunsConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, PunsError::Configuration(_)));
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        let err = parse_env::<u64>("PUNSBOT_RNG_SEED", "abc").unwrap_err();
        assert!(err.to_string().contains("PUNSBOT_RNG_SEED"));
    }
}
