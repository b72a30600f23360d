//! Error types for the ingestion core.
//!
//! Every variant is fatal for the file (or roster) that produced it and for
//! nothing else; the pipeline catches them at the file boundary.

use serde::Serialize;
use thiserror::Error;

/// Coarse failure class used for run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required worksheet, cell, or column is missing.
    Schema,
    /// A student row failed structural checks.
    Validation,
    /// The underlying file is unreadable or corrupt.
    Io,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("worksheet `{0}` not found")]
    MissingSheet(String),

    #[error("required metadata `{field}` at ({row}, {col}) is missing or invalid")]
    MissingMetadata {
        field: &'static str,
        row: usize,
        col: usize,
    },

    #[error("no task columns discovered and no fallback task count available")]
    NoTaskStructure,

    #[error("no max score for task {task}")]
    MissingMaxScore { task: u32 },

    #[error("roster header row not found in the first {scanned} rows")]
    RosterHeaderNotFound { scanned: usize },

    #[error("roster column `{0}` could not be resolved")]
    RosterColumnMissing(&'static str),

    #[error("row {row}: {reason}")]
    Validation { row: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::MissingSheet(_)
            | IngestError::MissingMetadata { .. }
            | IngestError::NoTaskStructure
            | IngestError::MissingMaxScore { .. }
            | IngestError::RosterHeaderNotFound { .. }
            | IngestError::RosterColumnMissing(_) => ErrorKind::Schema,
            IngestError::Validation { .. } => ErrorKind::Validation,
            IngestError::Io(_)
            | IngestError::Workbook(_)
            | IngestError::Csv(_)
            | IngestError::UnsupportedFile(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn validation(row: usize, reason: impl Into<String>) -> Self {
        IngestError::Validation {
            row,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(IngestError::NoTaskStructure.kind(), ErrorKind::Schema);
        assert_eq!(
            IngestError::validation(4, "score above max").kind(),
            ErrorKind::Validation
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(IngestError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_validation_message_names_row() {
        let err = IngestError::validation(7, "task 3 score 5 exceeds max 2");
        assert_eq!(err.to_string(), "row 7: task 3 score 5 exceeds max 2");
    }
}
