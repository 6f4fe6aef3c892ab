//! Run configuration: which inventory to load, how many hosts to work on at once, where logs go,
//! and how to talk to devices.
//!
//! Everything has a default, so a missing `config.yaml` is not an error. A file that exists but
//! does not parse is.

use crate::logger::Level;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The name of the configuration file inside [config_dir].
pub const CONFIG_FILE: &str = "config.yaml";

/// Returns a [PathBuf] to the directory where netpilot's configuration should live.
///
/// When compiled for testing, this returns `CARGO_MANIFEST_DIR` plus `resources/etc/netpilot`.
/// Otherwise, it returns `/etc/netpilot`.
pub fn config_dir() -> PathBuf {
    // Omit the leading slash so that PathBuf::push appends instead of replacing.
    const CONFIG_DIR: &str = "etc/netpilot";

    let mut path = PathBuf::from("/");

    #[cfg(test)]
    {
        path.push(env!("CARGO_MANIFEST_DIR"));
        path.push("resources");
    }

    path.push(CONFIG_DIR);
    path
}

/// Top-level configuration for a run.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub runner: RunnerConfig,
    pub inventory: InventoryConfig,
    pub logging: LoggingConfig,
    pub eapi: EapiConfig,
}

impl Config {
    /// Loads `config.yaml` from [config_dir], falling back to defaults if it does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_file(config_dir().join(CONFIG_FILE))
    }

    /// Loads a configuration file, falling back to defaults if it does not exist.
    ///
    /// Relative paths inside the file are left alone; paths beginning with `~/` are expanded to
    /// the current user's home directory.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Config::default(),
            Ok(contents) => serde_yaml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Config::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        config.validate()?;
        Ok(config.expand_home())
    }

    /// Rejects values that would make a run impossible.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner.options.num_workers == 0 {
            bail!("runner.options.num_workers must be at least 1");
        }
        if self.eapi.timeout == 0 {
            bail!("eapi.timeout must be at least 1 second");
        }
        Ok(())
    }

    fn expand_home(mut self) -> Self {
        let options = &mut self.inventory.options;
        options.host_file = expand_home(&options.host_file);
        options.group_file = expand_home(&options.group_file);
        options.defaults_file = expand_home(&options.defaults_file);
        self.logging.directory = expand_home(&self.logging.directory);
        self
    }
}

/// Replaces a leading `~` with the current user's home directory, if one can be found.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// The runners netpilot knows about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerPlugin {
    /// Runs every host on its own task, at most `num_workers` at a time.
    #[default]
    Threaded,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub plugin: RunnerPlugin,
    pub options: RunnerOptions,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerOptions {
    /// The maximum number of hosts to work on at the same time.
    pub num_workers: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self { num_workers: 100 }
    }
}

/// The inventory formats netpilot knows about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum InventoryPlugin {
    /// Three YAML files: hosts, groups, and defaults.
    #[default]
    SimpleInventory,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryConfig {
    pub plugin: InventoryPlugin,
    pub options: SimpleInventoryOptions,
}

/// File locations for [InventoryPlugin::SimpleInventory].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimpleInventoryOptions {
    pub host_file: PathBuf,
    pub group_file: PathBuf,
    pub defaults_file: PathBuf,
}

impl Default for SimpleInventoryOptions {
    fn default() -> Self {
        Self {
            host_file: "/inventory/hosts.yaml".into(),
            group_file: "/inventory/groups.yaml".into(),
            defaults_file: "/inventory/defaults.yaml".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Where `netpilot.log` is written. Created if it does not exist.
    pub directory: PathBuf,

    /// Entries below this level are discarded.
    pub level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: ".".into(),
            level: Level::Info,
        }
    }
}

/// Settings for the eAPI driver.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EapiConfig {
    /// Per-request timeout, in seconds.
    pub timeout: u64,

    /// Whether to verify device TLS certificates. Most devices ship self-signed ones.
    pub verify_tls: bool,
}

impl EapiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for EapiConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            verify_tls: false,
        }
    }
}
