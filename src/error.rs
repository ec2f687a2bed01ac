//! Error types for mvlib

use thiserror::Error;

use crate::mbe::ColumnKind;

/// Main error type for MBE operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed MBE header: {0}")]
    MalformedHeader(String),

    #[error("Unknown column kind: {0}")]
    UnknownColumnKind(String),

    #[error("Unexpected end of stream while reading {0}")]
    TruncatedStream(String),

    #[error("No cell present at row {row}, column {column}")]
    SchemaCellMismatch { row: i32, column: i32 },

    #[error("Invalid {kind} value {text:?} at row {row}, column {column}")]
    InvalidCellValue {
        row: i32,
        column: i32,
        kind: ColumnKind,
        text: String,
    },

    #[error("Row {row} has {found} fields but the header declares {expected} columns")]
    ColumnCountMismatch {
        row: i32,
        expected: usize,
        found: usize,
    },

    #[error("Invalid length {len} while reading {context}")]
    InvalidLength { context: String, len: i32 },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),
}

impl Error {
    /// Map a failed read to `TruncatedStream` when the stream simply ran out of bytes
    pub(crate) fn from_read(err: std::io::Error, context: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::TruncatedStream(context.to_string())
        } else {
            Error::Io(err)
        }
    }
}

/// Result type alias for mvlib operations
pub type Result<T> = std::result::Result<T, Error>;
