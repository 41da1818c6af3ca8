use crate::{read_lossy, SchemaError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional `modweave.toml` run configuration. Command-line flags take
/// precedence over every value here.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

/// Limits for the runtime sandbox probe.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProbeSettings {
    /// VM instructions one file load or one event callback may execute.
    #[serde(default = "default_instruction_budget")]
    pub instruction_budget: u64,
    /// How many VM instructions run between two watchdog checks.
    #[serde(default = "default_check_interval")]
    pub check_interval: u32,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: usize,
    #[serde(default)]
    pub max_units: Option<usize>,
    #[serde(default)]
    pub max_files: Option<usize>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            instruction_budget: default_instruction_budget(),
            check_interval: default_check_interval(),
            memory_limit_mb: default_memory_limit_mb(),
            max_units: None,
            max_files: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    /// Where the last-run summary goes. Defaults to `last-run.json` next to
    /// the registry.
    #[serde(default)]
    pub summary: Option<PathBuf>,
}

fn default_instruction_budget() -> u64 {
    5_000_000
}

fn default_check_interval() -> u32 {
    1_000
}

fn default_memory_limit_mb() -> usize {
    512
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.probe.check_interval == 0 {
            return Err(SchemaError::InvalidConfig(
                "probe.check_interval must be greater than zero".to_owned(),
            ));
        }
        if self.probe.instruction_budget < u64::from(self.probe.check_interval) {
            return Err(SchemaError::InvalidConfig(
                "probe.instruction_budget must be at least probe.check_interval".to_owned(),
            ));
        }
        if self.probe.memory_limit_mb == 0 {
            return Err(SchemaError::InvalidConfig(
                "probe.memory_limit_mb must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

pub fn parse_config_str(input: &str) -> Result<RunConfig, SchemaError> {
    let config: RunConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig, SchemaError> {
    let content = read_lossy(path.as_ref())?;
    parse_config_str(&content)
}
