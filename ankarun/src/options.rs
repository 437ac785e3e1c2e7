//! Configuration for the anka runner.

use crate::constants::{anka, envs};
use crate::errors::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runner configuration shared across runs.
///
/// Loaded from defaults, the `ANKA_BIN` environment variable or a JSON file:
///
/// ```json
/// { "program": "/usr/local/bin/anka", "timeout_secs": 600 }
/// ```
///
/// `timeout_secs` accepts fractional seconds (`0.5`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOptions {
    /// Executable to launch.
    ///
    /// A bare name is resolved through `PATH` at spawn time.
    /// Default: `anka`
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Upper bound on a run, measured from launch.
    ///
    /// Default: none (wait forever)
    #[serde(default, rename = "timeout_secs", with = "secs")]
    pub timeout: Option<Duration>,
}

fn default_program() -> PathBuf {
    PathBuf::from(anka::PROGRAM)
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout: None,
        }
    }
}

impl RunnerOptions {
    /// Defaults, with the program overridden by `ANKA_BIN` when set.
    pub fn from_env() -> Self {
        Self::default().with_program_override(std::env::var_os(envs::ANKA_BIN))
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| RunnerError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn with_program_override(self, value: Option<OsString>) -> Self {
        match value {
            Some(program) if !program.is_empty() => self.with_program(program),
            _ => self,
        }
    }
}

/// Optional duration as (fractional) seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(de::Error::custom))
            .transpose()
    }
}
