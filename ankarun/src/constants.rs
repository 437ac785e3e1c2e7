//! Constants for the anka runner
//!
//! Centralized location for executable names, CLI flags and environment variables.

/// The anka executable and the flags we pass to it.
pub mod anka {
    /// Executable looked up on `PATH` when no override is configured
    pub const PROGRAM: &str = "anka";

    /// Subcommand that runs a command inside a VM
    pub const RUN: &str = "run";

    /// Global flag enabling anka's own debug output
    pub const DEBUG_FLAG: &str = "--debug";

    /// `run` flag mounting the volumes of another VM
    pub const VOLUMES_FROM_FLAG: &str = "--volumes-from";
}

pub mod envs {
    /// Overrides the anka executable path
    pub const ANKA_BIN: &str = "ANKA_BIN";

    /// Directory for CLI log files
    pub const LOG_DIR: &str = "ANKARUN_LOG_DIR";
}

/// Exit codes reported by `Runner::exit_status`
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;

    /// Used when the child's own code cannot be recovered
    pub const GENERIC_FAILURE: i32 = 1;
}
