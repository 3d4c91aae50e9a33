use std::path::PathBuf;

use crate::model::RuntimeError;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Configuration error for {parameter}: {message}")]
    ConfigurationError {
        message: String,
        parameter: String,
    },

    #[error("Model load failed: {0}")]
    LoadFailure(#[source] RuntimeError),

    #[error("{0}")]
    RuntimeGenerationFailure(#[source] RuntimeError),

    #[error("Generation stopped by user")]
    UserCancellation,

    #[error("Model type unknown")]
    ModelTypeUnknown,

    #[error("No runner available")]
    NoRunner,

    #[error("Bridge worker is not running")]
    WorkerUnavailable,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn configuration(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::ConfigurationError {
            message: message.into(),
            parameter: parameter.into(),
        }
    }
}

/// Extension trait for error handling utilities
pub(crate) trait ErrorExt {
    /// Short label used when counting errors
    fn kind(&self) -> &'static str;
}

impl ErrorExt for BridgeError {
    fn kind(&self) -> &'static str {
        match self {
            BridgeError::ConfigurationError { .. } => "configuration",
            BridgeError::LoadFailure(_) => "load",
            BridgeError::RuntimeGenerationFailure(_) => "generation",
            BridgeError::UserCancellation => "cancellation",
            BridgeError::ModelTypeUnknown => "model_type_unknown",
            BridgeError::NoRunner => "no_runner",
            BridgeError::WorkerUnavailable => "worker",
            BridgeError::Io { .. } => "io",
            BridgeError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BridgeError::configuration("model_path", "Model file not found");
        assert_eq!(
            error.to_string(),
            "Configuration error for model_path: Model file not found"
        );
        assert_eq!(BridgeError::ModelTypeUnknown.to_string(), "Model type unknown");
    }

    #[test]
    fn test_generation_failure_shows_runtime_message() {
        let error = BridgeError::RuntimeGenerationFailure(RuntimeError::new(7, "kernel crashed"));
        assert_eq!(error.to_string(), "kernel crashed");
        assert_eq!(error.kind(), "generation");
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(BridgeError::UserCancellation.kind(), "cancellation");
        assert_eq!(BridgeError::LoadFailure(RuntimeError::new(1, "bad weights")).kind(), "load");
        assert_eq!(BridgeError::WorkerUnavailable.kind(), "worker");
    }
}
