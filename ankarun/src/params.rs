//! Run parameters
//!
//! Describes which VM to target, what to run inside it and where its output goes.

use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Destination for one of the subprocess output streams.
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Input stream handed to a run. Accepted but never forwarded.
pub type InputSource = Box<dyn AsyncRead + Send + Unpin>;

/// Parameters for a single `anka run` invocation.
///
/// Provides a builder API similar to `std::process::Command`.
///
/// # Examples
///
/// ```rust
/// use ankarun::RunParams;
///
/// let params = RunParams::new("vm1")
///     .volumes_from("vm0")
///     .command(["ls", "-la"])
///     .debug(true);
///
/// assert_eq!(params.vm_name(), "vm1");
/// assert_eq!(params.volumes_from_ref(), Some("vm0"));
/// ```
pub struct RunParams {
    pub(crate) vm_name: String,
    pub(crate) volumes_from: String,
    pub(crate) command: Vec<String>,
    pub(crate) stdin: Option<InputSource>,
    pub(crate) stdout: Option<OutputSink>,
    pub(crate) stderr: Option<OutputSink>,
    pub(crate) debug: bool,
}

impl RunParams {
    /// Create parameters targeting the given VM.
    pub fn new(vm_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            volumes_from: String::new(),
            command: vec![],
            stdin: None,
            stdout: None,
            stderr: None,
            debug: false,
        }
    }

    /// Mount the volumes of another VM. An empty reference leaves it unset.
    pub fn volumes_from(mut self, source: impl Into<String>) -> Self {
        self.volumes_from = source.into();
        self
    }

    /// Append a single command token.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    /// Append multiple command tokens.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(command.into_iter().map(Into::into));
        self
    }

    /// Pass `--debug` to anka.
    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    /// Attach an input stream.
    ///
    /// The subprocess stdin is closed right after launch, so this input is
    /// never read.
    pub fn stdin(mut self, input: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(input));
        self
    }

    /// Sink receiving the subprocess stdout. Defaults to this process's stdout.
    pub fn stdout(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(sink));
        self
    }

    /// Sink receiving the subprocess stderr. Defaults to this process's stderr.
    pub fn stderr(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(sink));
        self
    }

    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    /// Volumes-from reference, `None` when unset or empty.
    pub fn volumes_from_ref(&self) -> Option<&str> {
        if self.volumes_from.is_empty() {
            None
        } else {
            Some(&self.volumes_from)
        }
    }

    pub fn command_tokens(&self) -> &[String] {
        &self.command
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn has_input(&self) -> bool {
        self.stdin.is_some()
    }

    /// Take the output sinks, falling back to the parent's stdio.
    pub(crate) fn take_sinks(&mut self) -> (OutputSink, OutputSink) {
        let stdout = self
            .stdout
            .take()
            .unwrap_or_else(|| Box::new(tokio::io::stdout()));
        let stderr = self
            .stderr
            .take()
            .unwrap_or_else(|| Box::new(tokio::io::stderr()));
        (stdout, stderr)
    }
}

impl fmt::Debug for RunParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunParams")
            .field("vm_name", &self.vm_name)
            .field("volumes_from", &self.volumes_from)
            .field("command", &self.command)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}
