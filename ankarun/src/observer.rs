//! Run observation.
//!
//! The runner reports its lifecycle to a [`RunObserver`] instead of logging
//! directly. [`TracingObserver`] is the default and turns every event into a
//! `tracing` record.

use std::path::Path;

use crate::errors::RunnerError;
use crate::relay::{RelayOutcome, StreamKind};
use crate::status::RunReport;

/// What `wait` is currently blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    /// Relay tasks draining stdout/stderr.
    Streams,
    /// The child process itself.
    Process,
}

/// Receives runner lifecycle events. All methods default to no-ops.
///
/// Relay events are delivered from the relay tasks, so implementations must
/// be thread-safe.
pub trait RunObserver: Send + Sync {
    fn on_start(&self, _program: &Path, _args: &[String]) {}

    fn on_relay_started(&self, _stream: StreamKind) {}

    fn on_relay_finished(&self, _outcome: &RelayOutcome) {}

    fn on_wait(&self, _phase: WaitPhase) {}

    /// The process was reaped and all relays joined.
    fn on_finished(&self, _report: &RunReport) {}

    /// The run was stopped by a timeout or cancellation.
    fn on_interrupted(&self, _error: &RunnerError) {}

    fn on_exit_status(&self, _code: i32) {}
}

/// Observer forwarding events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_start(&self, program: &Path, args: &[String]) {
        tracing::info!(program = %program.display(), ?args, "Starting command");
    }

    fn on_relay_started(&self, stream: StreamKind) {
        tracing::debug!(%stream, "Copying stream");
    }

    fn on_relay_finished(&self, outcome: &RelayOutcome) {
        match &outcome.error {
            None => tracing::debug!(
                stream = %outcome.stream,
                bytes = outcome.bytes,
                "Copied stream, closing"
            ),
            Some(e) => tracing::warn!(
                stream = %outcome.stream,
                bytes = outcome.bytes,
                "Stream relay failed: {}", e
            ),
        }
    }

    fn on_wait(&self, phase: WaitPhase) {
        match phase {
            WaitPhase::Streams => tracing::debug!("Waiting for streams to finish"),
            WaitPhase::Process => tracing::debug!("Waiting for command to finish"),
        }
    }

    fn on_finished(&self, report: &RunReport) {
        tracing::info!(
            elapsed = ?report.elapsed,
            stdout_bytes = report.bytes(StreamKind::Stdout),
            stderr_bytes = report.bytes(StreamKind::Stderr),
            "Command finished"
        );
        if !report.outcome.success() {
            tracing::warn!("Command failed: {}", report.outcome);
        }
    }

    fn on_interrupted(&self, error: &RunnerError) {
        tracing::warn!("Command interrupted: {}", error);
    }

    fn on_exit_status(&self, code: i32) {
        tracing::info!(exit_code = code, "Command exited");
    }
}
