//! Shared test helpers for ankarun.
//!
//! - [`FakeAnka`]: shell scripts standing in for the `anka` executable
//! - [`RecordingObserver`]: captures runner lifecycle events
//! - [`SharedBuffer`]: inspectable output sink, optionally slow or failing
//! - [`serial_guard`]: serializes tests that write and exec scripts

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use ankarun::{
    ExitOutcome, RelayOutcome, RunObserver, RunReport, RunnerError, RunnerOptions, StreamKind,
    WaitPhase,
};
use parking_lot::{Mutex, MutexGuard};
use tempfile::TempDir;
use tokio::io::AsyncWrite;

const ARGS_LOG: &str = "args.log";

// Writing a script while another test thread forks can leak the write fd into
// that child and make exec fail with ETXTBSY.
static TEST_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Hold for the duration of a test that creates and runs a [`FakeAnka`].
pub fn serial_guard() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock()
}

/// Strips the anka argument grammar and runs the remaining command on the host.
const PASSTHROUGH_SCRIPT: &str = r#"
if [ "$1" = "--debug" ]; then shift; fi
if [ "$1" != "run" ]; then
    echo "fake anka: expected 'run', got '$1'" >&2
    exit 64
fi
shift
if [ "$1" = "--volumes-from" ]; then shift 2; fi
shift
exec "$@"
"#;

/// A fake `anka` executable living in its own temp directory.
///
/// Every invocation appends its arguments, one per line, to `args.log` next
/// to the script.
pub struct FakeAnka {
    dir: TempDir,
    path: PathBuf,
}

impl FakeAnka {
    /// Fake that executes the requested command directly on the host.
    pub fn passthrough() -> Self {
        Self::with_script(PASSTHROUGH_SCRIPT)
    }

    /// Fake running `body` as a POSIX shell script.
    pub fn with_script(body: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create fake anka directory");
        let path = dir.path().join("anka");
        let script = format!(
            "#!/bin/sh\nfor arg in \"$@\"; do printf '%s\\n' \"$arg\" >> \"$(dirname \"$0\")/{}\"; done\n{}\n",
            ARGS_LOG, body
        );

        std::fs::write(&path, script).expect("Failed to write fake anka");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to make fake anka executable");

        Self { dir, path }
    }

    /// Script file without the executable bit.
    pub fn not_executable() -> Self {
        let fake = Self::with_script("exit 0");
        std::fs::set_permissions(&fake.path, std::fs::Permissions::from_mode(0o644))
            .expect("Failed to clear executable bit");
        fake
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Runner options pointing at this fake.
    pub fn options(&self) -> RunnerOptions {
        RunnerOptions::default().with_program(&self.path)
    }

    /// Arguments received by the last invocations, in order.
    pub fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join(ARGS_LOG))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Event captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Start { program: PathBuf, args: Vec<String> },
    RelayStarted(StreamKind),
    RelayFinished { stream: StreamKind, bytes: u64, failed: bool },
    Wait(WaitPhase),
    Finished(ExitOutcome),
    Interrupted(String),
    ExitStatus(i32),
}

/// Observer that records every event for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().push(event);
    }
}

impl RunObserver for RecordingObserver {
    fn on_start(&self, program: &Path, args: &[String]) {
        self.push(ObservedEvent::Start {
            program: program.to_path_buf(),
            args: args.to_vec(),
        });
    }

    fn on_relay_started(&self, stream: StreamKind) {
        self.push(ObservedEvent::RelayStarted(stream));
    }

    fn on_relay_finished(&self, outcome: &RelayOutcome) {
        self.push(ObservedEvent::RelayFinished {
            stream: outcome.stream,
            bytes: outcome.bytes,
            failed: !outcome.is_ok(),
        });
    }

    fn on_wait(&self, phase: WaitPhase) {
        self.push(ObservedEvent::Wait(phase));
    }

    fn on_finished(&self, report: &RunReport) {
        self.push(ObservedEvent::Finished(report.outcome));
    }

    fn on_interrupted(&self, error: &RunnerError) {
        self.push(ObservedEvent::Interrupted(error.to_string()));
    }

    fn on_exit_status(&self, code: i32) {
        self.push(ObservedEvent::ExitStatus(code));
    }
}

#[derive(Debug, Clone, Copy)]
enum SinkMode {
    Normal,
    /// Yield before every write and accept at most this many bytes per call.
    Slow(usize),
    Failing,
}

/// In-memory sink whose contents stay readable after it was handed to a runner.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    mode: SinkMode,
    yielded: bool,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::with_mode(SinkMode::Normal)
    }

    /// Sink that accepts small chunks and yields to the scheduler between them.
    pub fn slow(max_write: usize) -> Self {
        Self::with_mode(SinkMode::Slow(max_write.max(1)))
    }

    /// Sink failing every write with `BrokenPipe`.
    pub fn failing() -> Self {
        Self::with_mode(SinkMode::Failing)
    }

    fn with_mode(mode: SinkMode) -> Self {
        Self {
            data: Arc::new(Mutex::new(Vec::new())),
            mode,
            yielded: false,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.data.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.mode {
            SinkMode::Normal => {
                this.data.lock().extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            SinkMode::Slow(max_write) => {
                if !this.yielded {
                    this.yielded = true;
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                this.yielded = false;
                let n = buf.len().min(max_write);
                this.data.lock().extend_from_slice(&buf[..n]);
                Poll::Ready(Ok(n))
            }
            SinkMode::Failing => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
