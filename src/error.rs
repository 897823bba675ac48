//! Error types for dataset-driven SQLite test sessions.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors raised by
//! user-supplied callbacks travel as `anyhow::Error` sources so their own
//! context chain survives.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sessions, connections, operations and comparisons
#[derive(Error, Debug)]
pub enum Error {
    // === Session lifecycle ===
    #[error("Test environment unavailable at {path}: {reason}")]
    EnvironmentUnavailable { path: PathBuf, reason: String },

    #[error("Database initialization callback failed: {0}")]
    DatabaseInitialization(#[source] anyhow::Error),

    #[error("Cannot {action} while session is {state}")]
    InvalidState { action: String, state: String },

    // === Connection ===
    #[error("Database connection error: {0}")]
    Connection(String),

    // === Operations ===
    #[error("{operation} failed on table '{table}': {reason}")]
    Operation {
        operation: String,
        table: String,
        reason: String,
    },

    // === Datasets ===
    #[error("No such table '{0}' in data set")]
    NoSuchTable(String),

    #[error("No such column '{column}' in table '{table}'")]
    NoSuchColumn { table: String, column: String },

    #[error("Invalid data set: {0}")]
    DataSet(String),

    #[error("Failed to load data set: {0}")]
    DataSetLoad(#[source] anyhow::Error),

    // === Comparison ===
    #[error("{0}")]
    ComparisonMismatch(Mismatch),

    // === Configuration ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn operation(
        operation: impl Into<String>,
        table: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Error::Operation {
            operation: operation.into(),
            table: table.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_state(action: &str, state: impl std::fmt::Display) -> Self {
        Error::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Whether this error came from the comparison engine
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Error::ComparisonMismatch(_))
    }
}

/// First divergence found while comparing two data sets
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// The sets of table names differ
    TableNames {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    /// An expected column is missing from the actual table
    MissingColumn { table: String, column: String },
    RowCount {
        table: String,
        expected: usize,
        actual: usize,
    },
    /// A cell value differs
    Value {
        table: String,
        row: usize,
        column: String,
        expected: String,
        actual: String,
    },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mismatch::TableNames { expected, actual } => write!(
                f,
                "table names differ: expected [{}] but was [{}]",
                expected.join(", "),
                actual.join(", ")
            ),
            Mismatch::MissingColumn { table, column } => write!(
                f,
                "table '{}' is missing expected column '{}'",
                table, column
            ),
            Mismatch::RowCount {
                table,
                expected,
                actual,
            } => write!(
                f,
                "row count differs in table '{}': expected {} but was {}",
                table, expected, actual
            ),
            Mismatch::Value {
                table,
                row,
                column,
                expected,
                actual,
            } => write!(
                f,
                "value differs in table '{}' at row {}, column '{}': expected {} but was {}",
                table, row, column, expected, actual
            ),
        }
    }
}
