use std::path::PathBuf;

use thiserror::Error;

/// Application-level error type.
///
/// Only setup, configuration and final-flush failures travel as `AppError`
/// to the top level. Everything that goes wrong inside a single candidate's
/// evaluation is folded into a `Verdict` instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to persist {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        AppError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
