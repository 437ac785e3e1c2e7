//! Exit status resolution and run reports.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::constants::exit_codes;
use crate::relay::{RelayOutcome, StreamKind};

/// How the subprocess terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Process exited normally with exit code
    Code(i32),

    /// Process was terminated by signal
    Signal(i32),
}

impl ExitOutcome {
    /// Returns `true` if the process exited with code 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Code(0))
    }

    /// Integer exit status.
    ///
    /// The process's own code for a normal exit. Signal termination has no
    /// portable code and resolves to the generic failure code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitOutcome::Code(code) => *code,
            ExitOutcome::Signal(_) => exit_codes::GENERIC_FAILURE,
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitOutcome::Code(code),
            None => ExitOutcome::Signal(status.signal().unwrap_or_default()),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Code(code) => write!(f, "exit status {}", code),
            ExitOutcome::Signal(sig) => match Signal::try_from(*sig) {
                Ok(signal) => write!(f, "signal {}", signal.as_str()),
                Err(_) => write!(f, "signal {}", sig),
            },
        }
    }
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: ExitOutcome,
    /// Wall-clock time from launch until the process was reaped.
    pub elapsed: Duration,
    pub relays: Vec<RelayOutcome>,
}

impl RunReport {
    /// Bytes delivered to the sink of `stream`.
    pub fn bytes(&self, stream: StreamKind) -> u64 {
        self.relays
            .iter()
            .filter(|r| r.stream == stream)
            .map(|r| r.bytes)
            .sum()
    }

    pub fn relay_failures(&self) -> impl Iterator<Item = &RelayOutcome> {
        self.relays.iter().filter(|r| !r.is_ok())
    }

    pub fn has_relay_failures(&self) -> bool {
        self.relay_failures().next().is_some()
    }

    /// One-line description of the failed relays, e.g. `stdout: broken pipe`.
    pub fn relay_failure_summary(&self) -> String {
        self.relay_failures()
            .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {}", r.stream, e)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
