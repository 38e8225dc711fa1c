//! Verification error types.

use thiserror::Error;

/// Errors surfaced by the verification components.
///
/// Every check runs at the start of a call, before any sampling or fitting,
/// so a failed call can simply be repeated with corrected input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationError {
    /// Parameter outside its admissible range (trial count, η, tolerance, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Too few samples for the requested statistic.
    #[error("Insufficient data for {what}: need at least {required}, got {actual}")]
    InsufficientData {
        what: &'static str,
        required: usize,
        actual: usize,
    },
    /// Aggregate requested from a fit over zero observations.
    #[error("Empty observation set: fit aggregate is undefined")]
    EmptyObservationSet,
    /// NaN or infinite value where a finite number is required.
    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
}

impl VerificationError {
    /// Create an InvalidConfiguration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an InsufficientData error.
    pub fn insufficient(what: &'static str, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            what,
            required,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, VerificationError>;
