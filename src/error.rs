//! Error types for rehydra-infer.

use thiserror::Error;

/// Result type for rehydra-infer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rehydra-infer operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Engine construction or warm-up failed. Fatal at startup: the process
    /// must not begin serving traffic.
    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    /// Inference requested before the session reached the Ready state.
    #[error("Model not loaded. Service is starting up.")]
    NotReady,

    /// A specific inference call failed after the session was Ready.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Feature not available in this build.
    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),
}

impl Error {
    /// Create a model initialization error.
    pub fn model_init(msg: impl Into<String>) -> Self {
        Error::ModelInit(msg.into())
    }

    /// Create an inference error.
    pub fn inference(msg: impl Into<String>) -> Self {
        Error::Inference(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a feature not available error.
    pub fn feature_not_available(feature: impl Into<String>) -> Self {
        Error::FeatureNotAvailable(feature.into())
    }
}
