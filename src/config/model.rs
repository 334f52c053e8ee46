// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::exec::LaunchSpec;
use crate::registry::RegistryOptions;
use crate::supervisor::DEFAULT_TICK_INTERVAL;
use crate::types::{OutputMode, ShutdownPolicy};

/// Configuration file exactly as deserialized from TOML.
///
/// ```toml
/// [registry]
/// tick_interval = "1s"
/// force_kill_after = "10s"
/// output = "log"
///
/// [[process]]
/// executable = "sleep"
/// args = ["30"]
/// working_dir = "."
/// ```
///
/// All sections are optional and have reasonable defaults. Use
/// `ConfigFile::try_from` to validate it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Registry behaviour from `[registry]`.
    #[serde(default)]
    pub registry: RegistrySection,

    /// Processes to start at launch, in file order, from `[[process]]`.
    #[serde(default)]
    pub process: Vec<ProcessConfig>,
}

/// `[registry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    /// Supervisor period, e.g. `"1s"` or `"500ms"`.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: String,

    /// Escalate from SIGTERM to SIGKILL after this long. Absent means never.
    #[serde(default)]
    pub force_kill_after: Option<String>,

    #[serde(default)]
    pub output: OutputMode,

    /// Number of reaped processes remembered for `get`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default)]
    pub shutdown: ShutdownPolicy,

    /// Time allowed for SIGTERM to work during shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: String,
}

fn default_tick_interval() -> String {
    "1s".to_string()
}

fn default_history_limit() -> usize {
    64
}

fn default_shutdown_grace() -> String {
    "5s".to_string()
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            force_kill_after: None,
            output: OutputMode::default(),
            history_limit: default_history_limit(),
            shutdown: ShutdownPolicy::default(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// One `[[process]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    pub executable: String,

    /// Explicit argument list.
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Single argument string, split with shell quoting rules.
    /// Mutually exclusive with `args`.
    #[serde(default)]
    pub arguments: Option<String>,

    /// Relative paths are taken from the config file's directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tick_interval: Duration,
    pub shutdown: ShutdownPolicy,
    options: RegistryOptions,
    processes: Vec<LaunchSpec>,
}

impl ConfigFile {
    /// Build without validation; `TryFrom<RawConfigFile>` is the checked path.
    pub(crate) fn new_unchecked(
        tick_interval: Duration,
        shutdown: ShutdownPolicy,
        options: RegistryOptions,
        processes: Vec<LaunchSpec>,
    ) -> Self {
        Self {
            tick_interval,
            shutdown,
            options,
            processes,
        }
    }

    pub fn registry_options(&self) -> RegistryOptions {
        self.options.clone()
    }

    pub fn processes(&self) -> &[LaunchSpec] {
        &self.processes
    }

    /// Make relative working directories relative to `root` instead of the
    /// current directory.
    pub fn rebase_working_dirs(&mut self, root: &Path) {
        for spec in &mut self.processes {
            if spec.working_dir.is_relative() {
                spec.working_dir = root.join(&spec.working_dir);
            }
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(
            DEFAULT_TICK_INTERVAL,
            ShutdownPolicy::default(),
            RegistryOptions::default(),
            Vec::new(),
        )
    }
}
