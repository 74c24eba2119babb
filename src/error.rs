// src/error.rs
use crate::ir::ValidationError;
use thiserror::Error;

/// The error taxonomy surfaced by this crate: a bad configuration caught
/// before any pass runs, an IR construct a pass cannot obfuscate, or a
/// structural invariant a pass would otherwise have broken.
#[derive(Debug, Error)]
pub enum ObfuscationError {
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("unsupported IR construct in function '{function}': {detail}")]
    UnsupportedIr { function: String, detail: String },

    #[error("IR invariant violated: {0}")]
    InvariantViolation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ObfuscationResult<T> = Result<T, ObfuscationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_message() {
        let err = ObfuscationError::ConfigError("bcf_prob must be in 1..=100".to_string());
        assert!(err.to_string().contains("bcf_prob"));
    }
}
