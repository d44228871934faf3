//! CLI Exit Code Registry
//!
//! Single source of truth for `carecall` exit codes. Scheduled jobs and
//! shell scripts branch on these, so treat them as a contract.
//!
//! | Code | Meaning                                                    |
//! |------|------------------------------------------------------------|
//! | 0    | Success                                                    |
//! | 1    | General error (output could not be written, integrity)     |
//! | 2    | Usage error (bad args, missing config, unknown format)     |
//! | 3    | Config could not be parsed or failed validation            |
//! | 4    | A snapshot could not be read or parsed                     |
//! | 5    | `--strict`: the report needs manual review                 |
//!
//! A new code goes in this table, gets a constant below, and is wired in
//! through [`recon_exit_code`] or a `CliError` constructor.

use carecall_recon::ReconError;

/// Success - command completed; with `--strict`, also no review needed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing config file, unsupported snapshot
/// extension.
pub const EXIT_USAGE: u8 = 2;

/// Config TOML is malformed or a value is out of range.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 3;

/// Snapshot file missing, unreadable, or not JSON/CSV records.
pub const EXIT_RECON_INPUT: u8 = 4;

/// Run completed but found orphan assignments, ambiguous matches or
/// malformed records (only with `--strict`).
pub const EXIT_RECON_NEEDS_REVIEW: u8 = 5;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::InputParse { .. } => EXIT_RECON_INPUT,
        ReconError::Integrity(_) => EXIT_ERROR,
    }
}
