//! Error types for the anka runner.
//!
//! Errors are split by the stage that raises them:
//! - `start`: [`RunnerError::PipeAcquisition`], [`RunnerError::ProcessLaunch`],
//!   [`RunnerError::InvalidParams`] (all fatal, nothing is running afterwards)
//! - `wait`: [`RunnerError::ProcessExit`], [`RunnerError::Relay`],
//!   [`RunnerError::TimedOut`], [`RunnerError::Cancelled`]

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::constants::exit_codes;
use crate::relay::StreamKind;
use crate::status::RunReport;

pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Creating one of the stdio pipes failed.
    #[error("{stream} pipe: {source}")]
    PipeAcquisition {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },

    /// The executable could not be spawned (not found, permission denied).
    #[error("launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process exited non-zero or was killed by a signal.
    #[error("process exited with {}", .0.outcome)]
    ProcessExit(Box<RunReport>),

    /// The process exited cleanly but an output relay failed.
    #[error("output relay failed: {}", .0.relay_failure_summary())]
    Relay(Box<RunReport>),

    /// Reaping the child failed.
    #[error("wait: {0}")]
    Wait(#[source] io::Error),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid run parameters: {0}")]
    InvalidParams(String),

    #[error("runner not started")]
    NotStarted,

    #[error("runner already started")]
    AlreadyStarted,

    #[error("config: {0}")]
    Config(String),
}

impl RunnerError {
    /// Best-effort integer exit status for this error.
    ///
    /// The child's own code when it exited normally, the generic failure code
    /// otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::ProcessExit(report) | RunnerError::Relay(report) => {
                report.outcome.exit_code()
            }
            _ => exit_codes::GENERIC_FAILURE,
        }
    }

    /// Run report attached to wait errors.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunnerError::ProcessExit(report) | RunnerError::Relay(report) => Some(&**report),
            _ => None,
        }
    }
}
