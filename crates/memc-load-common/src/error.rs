//! Error types for memc-load

use thiserror::Error;

/// Result type alias for memc-load operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Main error type for memc-load
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("No input files match pattern {0}")]
    NoInputFiles(String),
}
