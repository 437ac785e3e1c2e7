use std::path::PathBuf;
use std::time::Duration;

use ankarun::{RunParams, RunnerOptions};
use clap::Parser;

/// Run a command inside an Anka VM, relaying its output and exit status
#[derive(Parser, Debug)]
#[command(name = "ankarun", author, version)]
pub struct Cli {
    /// Pass --debug to anka
    #[arg(long)]
    pub debug: bool,

    /// Share volumes with another VM
    #[arg(long, value_name = "VM")]
    pub volumes_from: Option<String>,

    /// anka executable to launch
    #[arg(long, env = "ANKA_BIN", value_name = "PATH")]
    pub anka: Option<PathBuf>,

    /// Kill the command after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Runner options as a JSON file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write logs to daily rotated files in this directory instead of stderr
    #[arg(long, env = "ANKARUN_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Name of the target VM
    pub vm: String,

    /// Command and arguments to run inside the VM
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Config file first, then `--anka`/`ANKA_BIN`, then `--timeout`.
    pub fn runner_options(&self) -> anyhow::Result<RunnerOptions> {
        let mut options = match &self.config {
            Some(path) => RunnerOptions::from_file(path)?,
            None => RunnerOptions::default(),
        };

        if let Some(anka) = &self.anka {
            options = options.with_program(anka);
        }
        if let Some(secs) = self.timeout {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        Ok(options)
    }

    pub fn run_params(&self) -> RunParams {
        let mut params = RunParams::new(&self.vm)
            .command(&self.command)
            .debug(self.debug);
        if let Some(vm) = &self.volumes_from {
            params = params.volumes_from(vm);
        }
        params
    }
}
