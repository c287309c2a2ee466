//! Error types for DGRID

use thiserror::Error;

/// Errors raised while running queries and statements against the backend
#[derive(Error, Debug)]
pub enum DgridError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused to run the statement for the current user
    #[error("Disallowed: {0}")]
    Disallowed(String),
}

impl DgridError {
    /// Whether this error means the query was refused rather than failed
    pub fn is_disallowed(&self) -> bool {
        matches!(self, Self::Disallowed(_))
    }
}

/// Result type alias for DGRID operations
pub type Result<T> = std::result::Result<T, DgridError>;
