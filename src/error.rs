//! Error types for calculation passes and data providers

use thiserror::Error;

/// Failures that abort a calculation pass
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("could not resolve material '{name}': {reason}")]
    ResolutionFailure { name: String, reason: String },
}

/// Failures reported by a data provider
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("data source unreachable: {0}")]
    Transport(String),
}
