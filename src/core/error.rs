use thiserror::Error;

/// Reasons a generation request is rejected before any provider is called.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("target word count must be a positive integer")]
    InvalidWordCount,
}
