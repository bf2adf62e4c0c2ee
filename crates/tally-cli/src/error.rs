use thiserror::Error;

/// Errors surfaced to the user by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] tally::Error),

    /// Missing/unparsable credentials or query-set files. Always fatal
    /// before any remote work starts.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration process exited with {0}")]
    Migration(std::process::ExitStatus),
}

pub type CliResult<T> = Result<T, CliError>;
