//! Stream relay from subprocess pipes to caller sinks.
//!
//! One task per output pipe. Each task copies until end-of-stream, flushes its
//! sink and closes the pipe by dropping it. Failures are reported in the
//! outcome instead of being discarded.

use std::fmt;
use std::io;
use std::io::PipeReader;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::observer::RunObserver;
use crate::params::OutputSink;

const RELAY_BUFFER_SIZE: usize = 8 * 1024;

/// Standard stream of the subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdin => "stdin",
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of relaying one stream.
#[derive(Debug)]
pub struct RelayOutcome {
    pub stream: StreamKind,
    /// Bytes delivered to the sink.
    pub bytes: u64,
    /// First I/O error hit while reading the pipe or writing the sink.
    pub error: Option<io::Error>,
}

impl RelayOutcome {
    pub(crate) fn completed(stream: StreamKind, bytes: u64) -> Self {
        Self {
            stream,
            bytes,
            error: None,
        }
    }

    pub(crate) fn failed(stream: StreamKind, bytes: u64, error: io::Error) -> Self {
        Self {
            stream,
            bytes,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Spawn a relay task copying `pipe` into `sink`.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_relay(
    stream: StreamKind,
    pipe: PipeReader,
    sink: OutputSink,
    observer: Arc<dyn RunObserver>,
) -> JoinHandle<RelayOutcome> {
    tokio::spawn(async move {
        observer.on_relay_started(stream);

        let reader = tokio::fs::File::from_std(std::fs::File::from(OwnedFd::from(pipe)));
        let outcome = relay(stream, reader, sink).await;

        observer.on_relay_finished(&outcome);
        outcome
    })
}

/// Copy `reader` into `sink` until end-of-stream.
///
/// When the sink fails, the pipe is still drained to EOF so the child never
/// blocks on a full pipe; drained bytes are not counted.
pub(crate) async fn relay<R, W>(stream: StreamKind, mut reader: R, mut sink: W) -> RelayOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut bytes: u64 = 0;
    let mut sink_error: Option<io::Error> = None;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return RelayOutcome::failed(stream, bytes, sink_error.unwrap_or(e));
            }
        };

        if sink_error.is_some() {
            continue;
        }

        match sink.write_all(&buf[..n]).await {
            Ok(()) => bytes += n as u64,
            Err(e) => sink_error = Some(e),
        }
    }

    if let Some(e) = sink_error {
        return RelayOutcome::failed(stream, bytes, e);
    }

    match sink.flush().await {
        Ok(()) => RelayOutcome::completed(stream, bytes),
        Err(e) => RelayOutcome::failed(stream, bytes, e),
    }
}
