//! Error types shared across the crate.

use thiserror::Error;

/// A service row that could not be turned into a [`crate::instance::Service`].
///
/// Rejected rows are reported individually and excluded from the registry;
/// they never abort loading of the remaining rows.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("line {line}: expected 10 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: invalid {field} '{value}'")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: end time {end} precedes start time {start}")]
    NegativeDuration { line: usize, start: String, end: String },

    #[error("line {line}: duplicate service identifier {id}")]
    DuplicateIdentifier { line: usize, id: u32 },

    #[error("line {line}: {source}")]
    Csv {
        line: usize,
        #[source]
        source: csv::Error,
    },
}

impl RecordError {
    /// Line number (1-based, header included) of the offending record.
    pub fn line(&self) -> usize {
        match self {
            RecordError::FieldCount { line, .. }
            | RecordError::InvalidField { line, .. }
            | RecordError::NegativeDuration { line, .. }
            | RecordError::DuplicateIdentifier { line, .. }
            | RecordError::Csv { line, .. } => *line,
        }
    }
}

/// Failure to load a service file as a whole.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read service file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse service file: {0}")]
    Csv(#[from] csv::Error),

    #[error("no valid service records ({rejected} rejected)")]
    Empty { rejected: usize },
}

/// Failure to read the JSON configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure raised by an LP backend itself, as opposed to a solve that ran to
/// an infeasible or iteration-limited status.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("LP backend error: {0}")]
    Backend(String),

    #[error("unsupported linear program: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Unavailable(&'static str),
}
