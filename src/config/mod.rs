//! Configuration management for the harness binary.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
//!
//! The library itself takes every parameter explicitly; only `main` reads
//! configuration sources.
mod binaries;
mod control;
mod convergence;
mod process;
mod topology;
mod workload;
pub use binaries::*;
pub use control::*;
pub use convergence::*;
pub use process::*;
pub use topology::*;
pub use workload::*;


use std::env;
use std::path::PathBuf;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for one harness invocation
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HarnessConfig {
    /// Node and ctl launch templates
    #[serde(default)]
    pub binaries: BinariesConfig,
    /// Control protocol transport and timeouts
    #[serde(default)]
    pub control: ControlConfig,
    /// Spawn readiness and termination parameters
    #[serde(default)]
    pub process: ProcessConfig,
    /// Convergence windows and polling strategy
    #[serde(default)]
    pub convergence: ConvergenceConfig,
    /// Address layout of the spawned cluster
    #[serde(default)]
    pub topology: TopologyConfig,
    /// Keys and values written by the replication scenario
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Write harness logs to `<log_dir>/harness.log` instead of stderr
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `HARNESS__` prefix (highest priority)
    ///
    /// Callers MUST call `validate()` before using the configuration.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path).required(true))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.binaries.validate()?;
        self.control.validate()?;
        self.process.validate()?;
        self.convergence.validate()?;
        self.topology.validate()?;
        self.workload.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("HARNESS")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
