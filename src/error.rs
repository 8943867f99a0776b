use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Failure modes the classification driver needs to tell apart.
///
/// The first four variants are "skip" conditions: a runner logs them and moves
/// on to the next identifier. The rest indicate a programming or input error.
#[derive(Error, Debug, Clone)]
pub enum ClassifyError {
    #[error("results file already exists: {path:?}")]
    ResultsFileExists { path: PathBuf },

    #[error("no train samples for {identifier}")]
    NoTrainSamples { identifier: String },

    #[error("no test samples for {identifier}: {message}")]
    NoTestSamples { identifier: String, message: String },

    #[error("only one class present for {identifier}")]
    OneClass { identifier: String },

    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,
}

impl ClassifyError {
    pub fn results_file_exists(path: impl Into<PathBuf>) -> Self {
        Self::ResultsFileExists { path: path.into() }
    }

    pub fn no_train_samples(identifier: impl Into<String>) -> Self {
        Self::NoTrainSamples { identifier: identifier.into() }
    }

    pub fn no_test_samples(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NoTestSamples {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    pub fn one_class(identifier: impl Into<String>) -> Self {
        Self::OneClass { identifier: identifier.into() }
    }

    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    /// Attach an identifier to an error raised below the driver, where the
    /// identifier is not known yet.
    pub fn with_identifier(self, identifier: &str) -> Self {
        match self {
            Self::OneClass { .. } => Self::one_class(identifier),
            Self::NoTrainSamples { .. } => Self::no_train_samples(identifier),
            Self::NoTestSamples { message, .. } => Self::no_test_samples(identifier, message),
            other => other,
        }
    }

    /// Reason string written to the skip log, `None` for hard errors.
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self {
            Self::ResultsFileExists { .. } => Some("file_exists"),
            Self::NoTrainSamples { .. } => Some("no_train_samples"),
            Self::NoTestSamples { .. } => Some("no_test_samples"),
            Self::OneClass { .. } => Some("one_class"),
            _ => None,
        }
    }
}
