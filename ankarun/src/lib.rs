//! ankarun - run commands inside Anka virtual machines.
//!
//! Spawns `anka run <vm> <command...>` as a subprocess, relays its stdout and
//! stderr to caller-supplied sinks and resolves the exit status.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> ankarun::RunnerResult<()> {
//! use ankarun::{RunParams, Runner};
//!
//! let params = RunParams::new("vm1").command(["echo", "hi"]);
//! let mut runner = Runner::new(params);
//! runner.start()?;
//! let code = runner.exit_status().await;
//! println!("exited with {}", code);
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("ankarun drives the anka CLI and requires a Unix host");

pub mod args;
pub mod constants;
pub mod errors;
pub mod observer;
pub mod options;
pub mod params;
pub mod relay;
pub mod runner;
pub mod status;

pub use args::build_args;
pub use errors::{RunnerError, RunnerResult};
pub use observer::{RunObserver, TracingObserver, WaitPhase};
pub use options::RunnerOptions;
pub use params::{InputSource, OutputSink, RunParams};
pub use relay::{RelayOutcome, StreamKind};
pub use runner::Runner;
pub use status::{ExitOutcome, RunReport};
