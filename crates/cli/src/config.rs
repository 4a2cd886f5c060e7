//! Keywatch configuration file
//!
//! Stored as TOML at `<config dir>/keywatch/config.toml`. Every field has a
//! default, so a missing file or a partial file both work.

use anyhow::{Context, Result};
use keywatch_core::{NotifyFilter, RootKey, WatchTarget};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Complete CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeywatchConfig {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub demo: DemoConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// The key to watch and the value to report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Root scope, long or short name (default: HKLM)
    #[serde(default = "default_root")]
    pub root: RootKey,

    /// Key path below the root (default: SOFTWARE\Microsoft)
    #[serde(default = "default_path_in_root")]
    pub path: String,

    /// Also report changes in subkeys (default: false)
    #[serde(default)]
    pub watch_subtree: bool,

    /// Change kinds that fire a notification (default: ["last_set"])
    #[serde(default = "default_filter")]
    pub filter: NotifyFilter,

    /// DWORD value re-read on every change (default: TestDWORD)
    #[serde(default = "default_value")]
    pub value: String,
}

impl TargetConfig {
    pub fn watch_target(&self) -> WatchTarget {
        WatchTarget::new(self.root, self.path.as_str())
            .watch_subtree(self.watch_subtree)
            .filter(self.filter)
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            path: default_path_in_root(),
            watch_subtree: false,
            filter: default_filter(),
            value: default_value(),
        }
    }
}

/// Settings for the in-memory demonstration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Milliseconds between writes (default: 1000)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Number of writes before the demo ends, 0 = until Ctrl-C (default: 10)
    #[serde(default = "default_ticks")]
    pub ticks: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            ticks: default_ticks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of trace, debug, info, warn, error (default: info)
    #[serde(default = "default_level")]
    pub level: String,
}

impl LogConfig {
    pub fn level(&self) -> Result<Level> {
        self.level
            .parse::<Level>()
            .with_context(|| format!("Invalid log level '{}'", self.level))
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

fn default_root() -> RootKey {
    RootKey::LocalMachine
}

fn default_path_in_root() -> String {
    "SOFTWARE\\Microsoft".to_string()
}

fn default_filter() -> NotifyFilter {
    NotifyFilter::LAST_SET
}

fn default_value() -> String {
    "TestDWORD".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_ticks() -> u32 {
    10
}

fn default_level() -> String {
    "info".to_string()
}

/// Valid range for `demo.interval_ms`
const INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 10..=60_000;

impl KeywatchConfig {
    /// Check field ranges
    pub fn validate(&self) -> Result<()> {
        if self.target.path.trim_matches(&['\\', '/'][..]).is_empty() {
            anyhow::bail!("target.path must not be empty");
        }
        if self.target.filter.is_empty() {
            anyhow::bail!("target.filter must name at least one change kind");
        }
        if self.target.value.is_empty() {
            anyhow::bail!("target.value must not be empty");
        }
        if !INTERVAL_RANGE.contains(&self.demo.interval_ms) {
            anyhow::bail!(
                "demo.interval_ms must be between {} and {} (got {})",
                INTERVAL_RANGE.start(),
                INTERVAL_RANGE.end(),
                self.demo.interval_ms
            );
        }
        self.log.level()?;
        Ok(())
    }
}

/// Default config file location, if the platform has a config directory
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("keywatch").join("config.toml"))
}

/// Load and validate the config at `path`, or the defaults if it does not exist
pub fn load(path: &Path) -> Result<KeywatchConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(KeywatchConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: KeywatchConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Load from `path` when given, else from the default location
pub fn load_or_default(path: Option<&Path>) -> Result<KeywatchConfig> {
    match path {
        Some(path) => load(path),
        None => match default_path() {
            Some(path) => load(&path),
            None => Ok(KeywatchConfig::default()),
        },
    }
}

/// The defaults as a commented TOML file
pub fn example_config() -> String {
    let defaults = KeywatchConfig::default();
    let filter = defaults
        .target
        .filter
        .names()
        .iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"# Keywatch configuration

[target]
# Root scope: HKCR, HKCU, HKLM, HKU, HKCC (or the HKEY_* long names)
root = "{root}"
# Key path below the root
path = '{path}'
# Also report changes anywhere below the key
watch_subtree = {subtree}
# Change kinds: name, attributes, last_set, security, all
filter = [{filter}]
# DWORD value re-read on every change
value = "{value}"

[demo]
# Milliseconds between writes (10-60000)
interval_ms = {interval}
# Writes before the demo ends, 0 = until Ctrl-C
ticks = {ticks}

[log]
# trace, debug, info, warn, error
level = "{level}"
"#,
        root = defaults.target.root,
        path = defaults.target.path,
        subtree = defaults.target.watch_subtree,
        filter = filter,
        value = defaults.target.value,
        interval = defaults.demo.interval_ms,
        ticks = defaults.demo.ticks,
        level = defaults.log.level,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_demo_settings() {
        let config = KeywatchConfig::default();
        assert_eq!(config.target.root, RootKey::LocalMachine);
        assert_eq!(config.target.path, "SOFTWARE\\Microsoft");
        assert_eq!(config.target.filter, NotifyFilter::LAST_SET);
        assert_eq!(config.target.value, "TestDWORD");
        assert_eq!(config.demo.interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, KeywatchConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[target]\nroot = \"HKEY_CURRENT_USER\"\npath = 'Software\\Keywatch'\nfilter = [\"name\", \"last_set\"]\n\n[demo]\ninterval_ms = 50\n",
        )?;

        let config = load(&path)?;
        assert_eq!(config.target.root, RootKey::CurrentUser);
        assert_eq!(config.target.path, "Software\\Keywatch");
        assert_eq!(config.target.filter, NotifyFilter::NAME | NotifyFilter::LAST_SET);
        assert_eq!(config.target.value, "TestDWORD");
        assert_eq!(config.demo.interval_ms, 50);
        assert_eq!(config.demo.ticks, 10);
        assert_eq!(config.log.level, "info");
        Ok(())
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = KeywatchConfig::default();
        config.target.path = "\\".to_string();
        assert!(config.validate().is_err());

        let mut config = KeywatchConfig::default();
        config.target.filter = NotifyFilter::empty();
        assert!(config.validate().is_err());

        let mut config = KeywatchConfig::default();
        config.demo.interval_ms = 5;
        assert!(config.validate().is_err());
        config.demo.interval_ms = 60_001;
        assert!(config.validate().is_err());
        config.demo.interval_ms = 60_000;
        assert!(config.validate().is_ok());

        let mut config = KeywatchConfig::default();
        config.log.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");

        fs::write(&path, "[demo]\ninterval_ms = 1\n")?;
        assert!(load(&path).is_err());

        fs::write(&path, "[target]\nroot = \"HKEY_NOWHERE\"\n")?;
        assert!(load(&path).is_err());

        fs::write(&path, "[target]\nfilter = [\"bogus\"]\n")?;
        assert!(load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: KeywatchConfig = toml::from_str(&example_config()).unwrap();
        assert_eq!(config, KeywatchConfig::default());
    }

    #[test]
    fn test_watch_target_from_config() {
        let mut config = KeywatchConfig::default();
        config.target.watch_subtree = true;
        let target = config.target.watch_target();
        assert_eq!(target.root(), RootKey::LocalMachine);
        assert_eq!(target.path(), "SOFTWARE\\Microsoft");
        assert!(target.is_subtree());
        assert_eq!(target.notify_filter(), NotifyFilter::LAST_SET);
    }

    #[test]
    fn test_default_path_ends_in_keywatch_dir() {
        if let Some(path) = default_path() {
            assert!(path.ends_with("keywatch/config.toml"));
        }
    }
}
