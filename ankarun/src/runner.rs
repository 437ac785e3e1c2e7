//! Process runner
//!
//! Launches `anka run ...`, relays stdout/stderr to the caller's sinks and
//! resolves the exit status. A runner is single use:
//! `new` -> `start` -> `wait` or `exit_status`.

use std::collections::VecDeque;
use std::io;
use std::io::{PipeReader, PipeWriter};
use std::mem;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::args::build_args;
use crate::constants::exit_codes;
use crate::errors::{RunnerError, RunnerResult};
use crate::observer::{RunObserver, TracingObserver, WaitPhase};
use crate::options::RunnerOptions;
use crate::params::RunParams;
use crate::relay::{self, RelayOutcome, StreamKind};
use crate::status::{ExitOutcome, RunReport};

/// How long interrupted relays may take to reach EOF before they are abandoned.
const RELAY_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs a command inside an Anka VM.
///
/// # Examples
///
/// ```rust,no_run
/// # async fn example() -> ankarun::RunnerResult<()> {
/// use ankarun::{RunParams, Runner, RunnerOptions};
/// use std::time::Duration;
///
/// let params = RunParams::new("vm1")
///     .command(["uname", "-a"])
///     .stdout(tokio::io::stdout());
///
/// let options = RunnerOptions::from_env().with_timeout(Duration::from_secs(60));
/// let mut runner = Runner::with_options(params, options);
///
/// runner.start()?;
/// let report = runner.wait().await?;
/// println!("finished in {:?}", report.elapsed);
/// # Ok(())
/// # }
/// ```
pub struct Runner {
    params: RunParams,
    args: Vec<String>,
    options: RunnerOptions,
    observer: Arc<dyn RunObserver>,
    cancel: CancellationToken,
    state: State,
}

enum State {
    Idle,
    Running(Running),
    /// `start` failed or the run was waited on.
    Done,
}

struct Running {
    child: Child,
    /// Leader of the child's process group.
    pgid: Option<Pid>,
    started: Instant,
    relays: VecDeque<PendingRelay>,
}

struct PendingRelay {
    stream: StreamKind,
    handle: JoinHandle<RelayOutcome>,
}

impl Runner {
    /// Create a runner with options taken from the environment.
    pub fn new(params: RunParams) -> Self {
        Self::with_options(params, RunnerOptions::from_env())
    }

    pub fn with_options(params: RunParams, options: RunnerOptions) -> Self {
        let args = build_args(&params);
        Self {
            params,
            args,
            options,
            observer: Arc::new(TracingObserver),
            cancel: CancellationToken::new(),
            state: State::Idle,
        }
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cancel the run when `token` fires while waiting.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Arguments passed to the executable.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn program(&self) -> &Path {
        &self.options.program
    }

    /// OS process id while the child is running.
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            State::Running(running) => running.child.id(),
            _ => None,
        }
    }

    /// Acquire the stdio pipes, launch the process and start the relays.
    ///
    /// Must be called from within a tokio runtime. Only one attempt is made;
    /// after a failure the runner cannot be started again.
    ///
    /// The child leads its own process group so an interrupted run can kill
    /// everything it spawned.
    pub fn start(&mut self) -> RunnerResult<()> {
        match mem::replace(&mut self.state, State::Done) {
            State::Idle => {}
            other => {
                self.state = other;
                return Err(RunnerError::AlreadyStarted);
            }
        }

        self.validate()?;

        // Pipe ends are owned handles: every early return below releases them.
        let (stdin_read, stdin_write) = open_pipe(StreamKind::Stdin)?;
        let (stdout_read, stdout_write) = open_pipe(StreamKind::Stdout)?;
        let (stderr_read, stderr_write) = open_pipe(StreamKind::Stderr)?;

        let mut cmd = Command::new(&self.options.program);
        cmd.args(&self.args)
            .stdin(Stdio::from(stdin_read))
            .stdout(Stdio::from(stdout_write))
            .stderr(Stdio::from(stderr_write))
            .process_group(0)
            .kill_on_drop(true);

        self.observer.on_start(&self.options.program, &self.args);

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| RunnerError::ProcessLaunch {
            program: self.options.program.display().to_string(),
            source,
        })?;

        let pgid = child
            .id()
            .and_then(|pid| i32::try_from(pid).ok())
            .map(Pid::from_raw);

        // The command still holds the child's pipe ends; the relays only see
        // EOF once these are closed.
        drop(cmd);

        // Input is not forwarded: the child sees EOF on stdin right away.
        drop(stdin_write);

        let (stdout_sink, stderr_sink) = self.params.take_sinks();
        let relays = VecDeque::from([
            PendingRelay {
                stream: StreamKind::Stdout,
                handle: relay::spawn_relay(
                    StreamKind::Stdout,
                    stdout_read,
                    stdout_sink,
                    self.observer.clone(),
                ),
            },
            PendingRelay {
                stream: StreamKind::Stderr,
                handle: relay::spawn_relay(
                    StreamKind::Stderr,
                    stderr_read,
                    stderr_sink,
                    self.observer.clone(),
                ),
            },
        ]);

        self.state = State::Running(Running {
            child,
            pgid,
            started,
            relays,
        });
        Ok(())
    }

    /// Wait for both relays, then for the process.
    ///
    /// Returns the run report on a clean exit. A non-zero exit or signal
    /// yields [`RunnerError::ProcessExit`]; a clean exit with a failed relay
    /// yields [`RunnerError::Relay`]. Both carry the report.
    pub async fn wait(&mut self) -> RunnerResult<RunReport> {
        let Running {
            mut child,
            pgid,
            started,
            mut relays,
        } = match mem::replace(&mut self.state, State::Done) {
            State::Running(running) => running,
            other => {
                self.state = other;
                return Err(RunnerError::NotStarted);
            }
        };

        let observer = self.observer.clone();
        let mut outcomes = Vec::with_capacity(relays.len());
        let limit = self.options.timeout().map(|t| (t, started + t));

        let result = tokio::select! {
            biased;
            status = join(&mut child, &mut relays, &mut outcomes, &*observer) => Ok(status),
            err = interrupted(&self.cancel, limit) => Err(err),
        };

        let status = match result {
            Ok(status) => status,
            Err(err) => {
                // Kill before reaping: the group id stays ours while the leader is unreaped.
                kill_process_group(&mut child, pgid);
                let _ = child.wait().await;
                drain_relays(relays).await;
                observer.on_interrupted(&err);
                return Err(err);
            }
        };

        let status = status.map_err(RunnerError::Wait)?;
        let report = RunReport {
            outcome: ExitOutcome::from(status),
            elapsed: started.elapsed(),
            relays: outcomes,
        };
        observer.on_finished(&report);

        if !report.outcome.success() {
            return Err(RunnerError::ProcessExit(Box::new(report)));
        }
        if report.has_relay_failures() {
            return Err(RunnerError::Relay(Box::new(report)));
        }
        Ok(report)
    }

    /// Wait for the run and resolve it to an integer exit status.
    ///
    /// 0 on a clean exit, the child's own code on a normal non-zero exit,
    /// 1 for everything else (signals, timeouts, launch never happened).
    pub async fn exit_status(&mut self) -> i32 {
        let code = match self.wait().await {
            Ok(_) => exit_codes::SUCCESS,
            Err(err) => err.exit_code(),
        };
        self.observer.on_exit_status(code);
        code
    }

    fn validate(&self) -> RunnerResult<()> {
        if self.params.vm_name.trim().is_empty() {
            return Err(RunnerError::InvalidParams("VM name is empty".into()));
        }
        if self.params.command.is_empty() {
            return Err(RunnerError::InvalidParams("command is empty".into()));
        }
        Ok(())
    }
}

fn open_pipe(stream: StreamKind) -> RunnerResult<(PipeReader, PipeWriter)> {
    io::pipe().map_err(|source| RunnerError::PipeAcquisition { stream, source })
}

/// Join the relays, then reap the child.
async fn join(
    child: &mut Child,
    relays: &mut VecDeque<PendingRelay>,
    outcomes: &mut Vec<RelayOutcome>,
    observer: &dyn RunObserver,
) -> io::Result<std::process::ExitStatus> {
    observer.on_wait(WaitPhase::Streams);
    join_relays(relays, outcomes).await;

    observer.on_wait(WaitPhase::Process);
    child.wait().await
}

/// Await pending relays in order.
///
/// A relay is removed only after its handle resolved, so this can be
/// cancelled and resumed.
async fn join_relays(relays: &mut VecDeque<PendingRelay>, outcomes: &mut Vec<RelayOutcome>) {
    while let Some(pending) = relays.front_mut() {
        let stream = pending.stream;
        let outcome = match (&mut pending.handle).await {
            Ok(outcome) => outcome,
            Err(e) => RelayOutcome::failed(stream, 0, io::Error::other(e)),
        };
        relays.pop_front();
        outcomes.push(outcome);
    }
}

/// Give interrupted relays a short grace period to see EOF, then abandon them.
///
/// Each relay reports its own outcome to the observer when it finishes.
async fn drain_relays(mut relays: VecDeque<PendingRelay>) {
    let drained = tokio::time::timeout(RELAY_DRAIN_GRACE, async {
        while let Some(pending) = relays.front_mut() {
            let _ = (&mut pending.handle).await;
            relays.pop_front();
        }
    })
    .await;

    if drained.is_err() {
        for pending in relays {
            tracing::warn!(stream = %pending.stream, "Abandoning stream still open after kill");
            pending.handle.abort();
        }
    }
}

/// SIGKILL the child's whole process group, falling back to the child alone.
fn kill_process_group(child: &mut Child, pgid: Option<Pid>) {
    if let Some(pgid) = pgid
        && killpg(pgid, Signal::SIGKILL).is_ok()
    {
        return;
    }
    // Fails only when the child already exited and was reaped.
    let _ = child.start_kill();
}

/// Resolves once the run must be stopped.
async fn interrupted(cancel: &CancellationToken, limit: Option<(Duration, Instant)>) -> RunnerError {
    match limit {
        Some((timeout, deadline)) => tokio::select! {
            _ = cancel.cancelled() => RunnerError::Cancelled,
            _ = tokio::time::sleep_until(deadline) => RunnerError::TimedOut(timeout),
        },
        None => {
            cancel.cancelled().await;
            RunnerError::Cancelled
        }
    }
}
