#![allow(dead_code)]

use ankarun_test_utils::{FakeAnka, serial_guard};
use assert_cmd::Command;
use parking_lot::MutexGuard;
use std::time::Duration;

pub struct TestContext {
    pub cmd: Command,
    pub anka: FakeAnka,
    // Hold the lock until the test is done
    pub _guard: MutexGuard<'static, ()>,
}

impl TestContext {
    /// Another invocation against the same fake anka.
    pub fn new_cmd(&self) -> Command {
        command_for(&self.anka)
    }
}

/// Context whose fake anka runs the requested command on the host.
pub fn ankarun() -> TestContext {
    with_fake(FakeAnka::passthrough)
}

/// Context whose fake anka runs `body` instead.
pub fn ankarun_with_script(body: &str) -> TestContext {
    with_fake(|| FakeAnka::with_script(body))
}

fn with_fake(make: impl FnOnce() -> FakeAnka) -> TestContext {
    let guard = serial_guard();
    let anka = make();
    let cmd = command_for(&anka);

    TestContext {
        cmd,
        anka,
        _guard: guard,
    }
}

fn command_for(anka: &FakeAnka) -> Command {
    let bin_path = env!("CARGO_BIN_EXE_ankarun");
    let mut cmd = Command::new(bin_path);
    // You can override this with .timeout(Duration::from_secs(N))
    cmd.timeout(Duration::from_secs(30));
    cmd.env_remove("ANKARUN_LOG_DIR").env_remove("RUST_LOG");
    cmd.env("ANKA_BIN", anka.path());
    cmd
}
