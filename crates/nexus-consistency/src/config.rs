//! Checker and scan configuration
//!
//! Priority: environment variables > config file > defaults.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Default number of records per parallel shard
pub const DEFAULT_SHARD_SIZE: u64 = 1024;

/// Default batch size hint for node scans
pub const DEFAULT_BATCH_SIZE_HINT: usize = 100;

/// Where reported violations go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReporterMode {
    /// Keep every violation in memory
    #[default]
    Collect,
    /// Log every violation through `tracing`
    Log,
    /// Drop every violation
    Discard,
}

impl FromStr for ReporterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collect" => Ok(ReporterMode::Collect),
            "log" => Ok(ReporterMode::Log),
            "discard" => Ok(ReporterMode::Discard),
            other => Err(Error::config(format!("unknown reporter mode '{other}'"))),
        }
    }
}

/// Consistency check configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Worker threads (0 = one per core)
    pub threads: usize,
    /// Records per parallel shard
    pub shard_size: u64,
    /// Reporter selection
    pub reporter: ReporterMode,
    /// Check nodes, relationships, groups, properties and dynamic blocks
    pub check_graph: bool,
    /// Check index rules and index entries
    pub check_indexes: bool,
    /// Check label and relationship type scan stores
    pub check_token_scans: bool,
    /// Check the counts store
    pub check_counts: bool,
    /// Check that property and dynamic chains have exactly one owner
    pub check_property_owners: bool,
    /// Check schema rules and tokens
    pub check_schema: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            shard_size: DEFAULT_SHARD_SIZE,
            reporter: ReporterMode::Collect,
            check_graph: true,
            check_indexes: true,
            check_token_scans: true,
            check_counts: true,
            check_property_owners: true,
            check_schema: true,
        }
    }
}

impl CheckConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded consistency check configuration from {:?}", path);
        Ok(config)
    }

    /// Apply `NEXUS_CHECK_*` overrides from the process environment
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Apply `NEXUS_CHECK_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(threads) = lookup("NEXUS_CHECK_THREADS") {
            self.threads = threads
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("NEXUS_CHECK_THREADS: '{threads}'")))?;
        }
        if let Some(shard_size) = lookup("NEXUS_CHECK_SHARD_SIZE") {
            self.shard_size = shard_size
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("NEXUS_CHECK_SHARD_SIZE: '{shard_size}'")))?;
        }
        if let Some(reporter) = lookup("NEXUS_CHECK_REPORTER") {
            self.reporter = reporter.parse()?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.shard_size == 0 {
            return Err(Error::config("shard_size must be positive"));
        }
        Ok(())
    }
}

/// Node scan configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Ids reserved per batch
    pub batch_size_hint: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size_hint: DEFAULT_BATCH_SIZE_HINT,
        }
    }
}

impl ScanConfig {
    /// Apply the `NEXUS_SCAN_BATCH_SIZE` override read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(hint) = lookup("NEXUS_SCAN_BATCH_SIZE") {
            self.batch_size_hint = hint
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("NEXUS_SCAN_BATCH_SIZE: '{hint}'")))?;
        }
        if self.batch_size_hint == 0 {
            return Err(Error::config("batch_size_hint must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CheckConfig::default();
        assert_eq!(config.threads, 0);
        assert_eq!(config.shard_size, DEFAULT_SHARD_SIZE);
        assert_eq!(config.reporter, ReporterMode::Collect);
        assert!(config.check_counts);
        assert_eq!(ScanConfig::default().batch_size_hint, 100);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CheckConfig::from_toml_str(
            r#"
            threads = 4
            reporter = "discard"
            check_counts = false
            "#,
        )
        .unwrap();
        assert_eq!(config.threads, 4);
        assert_eq!(config.reporter, ReporterMode::Discard);
        assert!(!config.check_counts);
        assert!(config.check_indexes);
        assert_eq!(config.shard_size, DEFAULT_SHARD_SIZE);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            CheckConfig::from_toml_str("reporter = \"loud\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            CheckConfig::from_toml_str("shard_size = 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NEXUS_CHECK_THREADS", "8"),
            ("NEXUS_CHECK_REPORTER", "Log"),
        ]);
        let mut config = CheckConfig::default();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.threads, 8);
        assert_eq!(config.reporter, ReporterMode::Log);
        assert_eq!(config.shard_size, DEFAULT_SHARD_SIZE);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = CheckConfig::default();
        let result = config.apply_env(|name| {
            (name == "NEXUS_CHECK_SHARD_SIZE").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_scan_batch_override() {
        let mut scan = ScanConfig::default();
        scan.apply_env(|name| (name == "NEXUS_SCAN_BATCH_SIZE").then(|| "250".to_string()))
            .unwrap();
        assert_eq!(scan.batch_size_hint, 250);

        let mut zero = ScanConfig::default();
        let result = zero.apply_env(|_| Some("0".to_string()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.toml");
        std::fs::write(&path, "shard_size = 64\ncheck_schema = false\n").unwrap();
        let config = CheckConfig::from_file(&path).unwrap();
        assert_eq!(config.shard_size, 64);
        assert!(!config.check_schema);

        assert!(matches!(
            CheckConfig::from_file(dir.path().join("missing.toml")),
            Err(Error::Io(_))
        ));
    }
}
