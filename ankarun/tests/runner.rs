//! Integration tests running the runner against fake anka executables.

use std::io;
use std::time::Duration;

use ankarun::{ExitOutcome, RunParams, Runner, RunnerError, StreamKind, WaitPhase};
use ankarun_test_utils::{FakeAnka, ObservedEvent, RecordingObserver, SharedBuffer, serial_guard};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_relays_stdout_and_stderr() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();

    let params = RunParams::new("vm1")
        .command(["sh", "-c", "echo out; echo err >&2"])
        .stdout(stdout.clone())
        .stderr(stderr.clone());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    let report = runner.wait().await.unwrap();

    assert_eq!(report.outcome, ExitOutcome::Code(0));
    assert_eq!(stdout.contents_string(), "out\n");
    assert_eq!(stderr.contents_string(), "err\n");
    assert_eq!(report.bytes(StreamKind::Stdout), 4);
    assert_eq!(report.bytes(StreamKind::Stderr), 4);
    assert_eq!(
        anka.recorded_args(),
        ["run", "vm1", "sh", "-c", "echo out; echo err >&2"]
    );
}

#[tokio::test]
async fn test_flags_are_forwarded() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();

    let params = RunParams::new("vm1")
        .volumes_from("vm0")
        .debug(true)
        .command(["true"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    assert_eq!(runner.exit_status().await, 0);
    assert_eq!(
        anka.recorded_args(),
        ["--debug", "run", "--volumes-from", "vm0", "vm1", "true"]
    );
}

#[tokio::test]
async fn test_exit_status_passthrough() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let observer = RecordingObserver::new();

    let params = RunParams::new("vm1")
        .command(["sh", "-c", "exit 3"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options()).with_observer(observer.clone());

    runner.start().unwrap();
    assert_eq!(runner.exit_status().await, 3);

    let events = observer.events();
    assert!(events.contains(&ObservedEvent::Finished(ExitOutcome::Code(3))));
    assert_eq!(events.last(), Some(&ObservedEvent::ExitStatus(3)));
}

#[tokio::test]
async fn test_wait_returns_process_exit_error() {
    let _guard = serial_guard();
    let anka = FakeAnka::with_script("echo 'vm not found' >&2; exit 2");
    let stderr = SharedBuffer::new();

    let params = RunParams::new("missing-vm")
        .command(["ls"])
        .stdout(SharedBuffer::new())
        .stderr(stderr.clone());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    let err = runner.wait().await.unwrap_err();

    let report = err.report().expect("exit error carries a report");
    assert_eq!(report.outcome, ExitOutcome::Code(2));
    assert!(!report.has_relay_failures());
    assert_eq!(err.exit_code(), 2);
    assert_eq!(stderr.contents_string(), "vm not found\n");
}

#[tokio::test]
async fn test_signal_resolves_to_generic_failure() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();

    let params = RunParams::new("vm1")
        .command(["sh", "-c", "kill -9 $$"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    match runner.wait().await {
        Err(RunnerError::ProcessExit(report)) => {
            assert_eq!(report.outcome, ExitOutcome::Signal(9));
            assert_eq!(report.outcome.exit_code(), 1);
        }
        other => panic!("expected signal exit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_large_output_through_slow_sink() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let stdout = SharedBuffer::slow(4096);
    let stderr = SharedBuffer::new();

    let params = RunParams::new("vm1")
        .command(["sh", "-c", "head -c 1000000 /dev/zero"])
        .stdout(stdout.clone())
        .stderr(stderr.clone());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    let report = runner.wait().await.unwrap();

    assert_eq!(stdout.len(), 1_000_000);
    assert!(stdout.contents().iter().all(|b| *b == 0));
    assert!(stderr.is_empty());
    assert_eq!(report.bytes(StreamKind::Stdout), 1_000_000);
    assert_eq!(report.bytes(StreamKind::Stderr), 0);
}

#[tokio::test]
async fn test_large_stderr_with_empty_stdout() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();

    let params = RunParams::new("vm1")
        .command(["sh", "-c", "head -c 500000 /dev/zero >&2"])
        .stdout(stdout.clone())
        .stderr(stderr.clone());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    runner.wait().await.unwrap();

    assert!(stdout.is_empty());
    assert_eq!(stderr.len(), 500_000);
}

/// Input is accepted but never forwarded: the child reads EOF immediately.
#[tokio::test]
async fn test_stdin_is_closed_not_forwarded() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let stdout = SharedBuffer::new();

    let params = RunParams::new("vm1")
        .command(["cat"])
        .stdin(&b"hello from the caller"[..])
        .stdout(stdout.clone())
        .stderr(SharedBuffer::new());
    assert!(params.has_input());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    assert_eq!(runner.exit_status().await, 0);
    assert!(stdout.is_empty());
}

#[tokio::test]
async fn test_missing_executable() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let options = anka.options().with_program(anka.dir().join("does-not-exist"));

    let mut runner = Runner::with_options(RunParams::new("vm1").command(["ls"]), options);

    match runner.start() {
        Err(RunnerError::ProcessLaunch { source, .. }) => {
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("expected launch error, got {other:?}"),
    }
    assert!(matches!(runner.wait().await, Err(RunnerError::NotStarted)));
}

#[tokio::test]
async fn test_not_executable() {
    let _guard = serial_guard();
    let anka = FakeAnka::not_executable();

    let mut runner = Runner::with_options(RunParams::new("vm1").command(["ls"]), anka.options());

    match runner.start() {
        Err(RunnerError::ProcessLaunch { source, .. }) => {
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("expected launch error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_kills_child() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let observer = RecordingObserver::new();

    let params = RunParams::new("vm1")
        .command(["sleep", "30"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let options = anka.options().with_timeout(Duration::from_secs(1));
    let mut runner = Runner::with_options(params, options).with_observer(observer.clone());

    runner.start().unwrap();
    let started = std::time::Instant::now();
    let err = runner.wait().await.unwrap_err();

    assert!(matches!(err, RunnerError::TimedOut(d) if d == Duration::from_secs(1)));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(
        observer
            .events()
            .iter()
            .any(|e| matches!(e, ObservedEvent::Interrupted(msg) if msg.contains("timed out")))
    );
}

#[tokio::test]
async fn test_cancellation() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let token = CancellationToken::new();

    let params = RunParams::new("vm1")
        .command(["sleep", "30"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options()).with_cancellation(token.clone());

    runner.start().unwrap();
    assert!(runner.pid().is_some());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    assert_eq!(runner.exit_status().await, 1);
}

#[tokio::test]
async fn test_timeout_kills_grandchildren() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let observer = RecordingObserver::new();
    let stdout = SharedBuffer::new();

    // The shell forks `sleep`, which keeps stdout/stderr open after the shell dies.
    let params = RunParams::new("vm1")
        .command(["sh", "-c", "echo before; sleep 30; true"])
        .stdout(stdout.clone())
        .stderr(SharedBuffer::new());
    let options = anka.options().with_timeout(Duration::from_secs(1));
    let mut runner = Runner::with_options(params, options).with_observer(observer.clone());

    runner.start().unwrap();
    let started = std::time::Instant::now();
    let err = runner.wait().await.unwrap_err();

    assert!(matches!(err, RunnerError::TimedOut(_)), "{err:?}");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "wait took {:?}",
        started.elapsed()
    );

    // Output copied before the kill still reaches the sink and the observer.
    assert_eq!(stdout.contents_string(), "before\n");
    assert!(observer.events().contains(&ObservedEvent::RelayFinished {
        stream: StreamKind::Stdout,
        bytes: 7,
        failed: false,
    }));
}

#[tokio::test]
async fn test_cancellation_kills_background_children() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let token = CancellationToken::new();

    let params = RunParams::new("vm1")
        .command(["sh", "-c", "sleep 30 & sleep 30 & wait"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options()).with_cancellation(token.clone());

    runner.start().unwrap();
    let started = std::time::Instant::now();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();
    });

    assert!(matches!(runner.wait().await, Err(RunnerError::Cancelled)));
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "wait took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_sub_second_timeout_not_exceeded() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let stdout = SharedBuffer::new();

    let params = RunParams::new("vm1")
        .command(["sh", "-c", "sleep 0.2; echo done"])
        .stdout(stdout.clone())
        .stderr(SharedBuffer::new());
    let options = anka.options().with_timeout(Duration::from_millis(900));
    let mut runner = Runner::with_options(params, options);

    runner.start().unwrap();
    runner.wait().await.unwrap();
    assert_eq!(stdout.contents_string(), "done\n");
}

#[tokio::test]
async fn test_sub_second_timeout_fires() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();

    let params = RunParams::new("vm1")
        .command(["sleep", "30"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let options = anka.options().with_timeout(Duration::from_millis(300));
    let mut runner = Runner::with_options(params, options);

    runner.start().unwrap();
    let started = std::time::Instant::now();
    let err = runner.wait().await.unwrap_err();

    assert!(matches!(err, RunnerError::TimedOut(d) if d == Duration::from_millis(300)));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_sink_failure_is_reported() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let observer = RecordingObserver::new();

    let params = RunParams::new("vm1")
        .command(["echo", "hi"])
        .stdout(SharedBuffer::failing())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options()).with_observer(observer.clone());

    runner.start().unwrap();
    match runner.wait().await {
        Err(RunnerError::Relay(report)) => {
            assert_eq!(report.outcome, ExitOutcome::Code(0));
            assert!(report.relay_failure_summary().starts_with("stdout:"));
        }
        other => panic!("expected relay error, got {other:?}"),
    }

    assert!(observer.events().contains(&ObservedEvent::RelayFinished {
        stream: StreamKind::Stdout,
        bytes: 0,
        failed: true,
    }));
}

#[tokio::test]
async fn test_sink_failure_keeps_zero_exit_status() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();

    let params = RunParams::new("vm1")
        .command(["echo", "hi"])
        .stdout(SharedBuffer::failing())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    assert_eq!(runner.exit_status().await, 0);
}

#[tokio::test]
async fn test_observer_sees_lifecycle() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();
    let observer = RecordingObserver::new();

    let params = RunParams::new("vm1")
        .command(["echo", "abc"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options()).with_observer(observer.clone());

    runner.start().unwrap();
    runner.wait().await.unwrap();

    let events = observer.events();
    assert_eq!(
        events.first(),
        Some(&ObservedEvent::Start {
            program: anka.path().to_path_buf(),
            args: vec!["run".into(), "vm1".into(), "echo".into(), "abc".into()],
        })
    );
    assert!(events.contains(&ObservedEvent::RelayStarted(StreamKind::Stdout)));
    assert!(events.contains(&ObservedEvent::RelayStarted(StreamKind::Stderr)));
    assert!(events.contains(&ObservedEvent::RelayFinished {
        stream: StreamKind::Stdout,
        bytes: 4,
        failed: false,
    }));

    let streams = events.iter().position(|e| *e == ObservedEvent::Wait(WaitPhase::Streams));
    let process = events.iter().position(|e| *e == ObservedEvent::Wait(WaitPhase::Process));
    assert!(streams.is_some() && process.is_some());
    assert!(streams < process);
    assert_eq!(
        events.last(),
        Some(&ObservedEvent::Finished(ExitOutcome::Code(0)))
    );
}

#[tokio::test]
async fn test_start_twice() {
    let _guard = serial_guard();
    let anka = FakeAnka::passthrough();

    let params = RunParams::new("vm1")
        .command(["true"])
        .stdout(SharedBuffer::new())
        .stderr(SharedBuffer::new());
    let mut runner = Runner::with_options(params, anka.options());

    runner.start().unwrap();
    assert!(matches!(runner.start(), Err(RunnerError::AlreadyStarted)));
    assert_eq!(runner.exit_status().await, 0);
    assert!(matches!(runner.wait().await, Err(RunnerError::NotStarted)));
}
