#![allow(dead_code)]

use std::path::PathBuf;

use procreg::config::{ConfigFile, ProcessConfig, RawConfigFile};
use procreg::types::{OutputMode, ShutdownPolicy};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_process(mut self, process: ProcessConfig) -> Self {
        self.config.process.push(process);
        self
    }

    pub fn tick_interval(mut self, value: &str) -> Self {
        self.config.registry.tick_interval = value.to_string();
        self
    }

    pub fn force_kill_after(mut self, value: &str) -> Self {
        self.config.registry.force_kill_after = Some(value.to_string());
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.config.registry.output = mode;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.registry.history_limit = limit;
        self
    }

    pub fn shutdown(mut self, policy: ShutdownPolicy, grace: &str) -> Self {
        self.config.registry.shutdown = policy;
        self.config.registry.shutdown_grace = grace.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ProcessConfig`.
pub struct ProcessConfigBuilder {
    process: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn new(executable: &str) -> Self {
        Self {
            process: ProcessConfig {
                executable: executable.to_string(),
                args: None,
                arguments: None,
                working_dir: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.process
            .args
            .get_or_insert_with(Vec::new)
            .push(arg.to_string());
        self
    }

    pub fn arguments(mut self, line: &str) -> Self {
        self.process.arguments = Some(line.to_string());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.process.working_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> ProcessConfig {
        self.process
    }
}
