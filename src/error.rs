//! Error type shared by the model, the likelihood and the fitter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MnnError {
    /// A disk parameter lies outside its admissible range (`b < 0`, or
    /// `a + b < 0` under [`crate::model::ScaleHeightPolicy::Reject`]).
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    /// The caller passed structurally malformed arguments. The requested
    /// operation was aborted and no state was altered.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type MnnResult<T> = Result<T, MnnError>;

impl MnnError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        MnnError::Usage(message.into())
    }
}
