//! Crate-wide error type and result alias.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A query that can never return meaningful results: bad size range,
    /// too few labels, unknown prime label, label/results count mismatch.
    #[error("invalid query: {0}")]
    QueryValidity(String),

    /// A results table is missing columns an operation requires.
    #[error("malformed results: missing column(s) {}", .missing.join(", "))]
    MalformedResults { missing: Vec<String> },

    /// A results table row whose fields cannot be parsed.
    #[error("malformed results row: {0}")]
    MalformedResultsRow(String),

    #[error("malformed catalogue: {0}")]
    MalformedCatalogue(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid tokenizer pattern: {0}")]
    TokenizerPattern(#[from] regex::Error),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }
}
