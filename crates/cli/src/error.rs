//! Structured errors for the sheetnews binary.

use sheetnews_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// First argument is not a known command.
    #[error("INVALID_INPUT: unknown command '{0}' (expected fetch, probe or stats)")]
    UnknownCommand(String),

    /// The command ran and failed; details were already printed.
    #[error("{0}: command failed")]
    Failed(ErrorKind),

    #[error("interrupted")]
    Interrupted,
}
