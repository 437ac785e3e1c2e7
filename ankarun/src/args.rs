//! Argument vector for `anka run`.

use crate::constants::anka;
use crate::params::RunParams;

/// Build the anka argument vector for the given parameters.
///
/// Produces `[--debug] run [--volumes-from <ref>] <vm-name> <command...>`.
/// Tokens are passed through verbatim; no shell is involved, so nothing is quoted.
pub fn build_args(params: &RunParams) -> Vec<String> {
    let mut args = Vec::with_capacity(params.command.len() + 5);

    if params.debug {
        args.push(anka::DEBUG_FLAG.to_string());
    }

    args.push(anka::RUN.to_string());

    if let Some(source) = params.volumes_from_ref() {
        args.push(anka::VOLUMES_FROM_FLAG.to_string());
        args.push(source.to_string());
    }

    args.push(params.vm_name.clone());
    args.extend(params.command.iter().cloned());
    args
}
