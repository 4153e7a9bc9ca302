//! CLI error types with exit code handling
//!
//! Library errors keep their own diagnostics; this type only adds the
//! failures that exist at the command level and maps everything to an exit
//! code.

use miette::Diagnostic;
use stackchart_core::CoreError;
use stackchart_engine::EngineError;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    /// The chart on disk differs from what the configuration renders
    #[error("Chart at {path} is out of date: {changed} artifact(s) differ")]
    #[diagnostic(
        code(stackchart::cli::drift),
        help("run `stackchart render` to regenerate the chart")
    )]
    Drift { path: String, changed: usize },

    /// Output could not be produced (stdout closed, serialization failure)
    #[error("Failed to write output: {message}")]
    #[diagnostic(code(stackchart::cli::output))]
    Output { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(err) => engine_exit_code(err),
            CliError::Drift { .. } => exit_codes::ERROR,
            CliError::Output { .. } => exit_codes::IO_ERROR,
        }
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }
}

fn engine_exit_code(err: &EngineError) -> i32 {
    match err {
        EngineError::Core(CoreError::Validation { .. }) => exit_codes::VALIDATION_ERROR,
        EngineError::Core(CoreError::Io { .. }) => exit_codes::IO_ERROR,
        EngineError::Core(_) => exit_codes::CONFIG_ERROR,
        EngineError::Template(_) | EngineError::UnresolvedReference { .. } => {
            exit_codes::TEMPLATE_ERROR
        }
        EngineError::Write { .. } | EngineError::Io { .. } => exit_codes::IO_ERROR,
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::Engine(EngineError::Core(err))
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::output(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
