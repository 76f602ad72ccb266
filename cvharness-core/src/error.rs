//! Error types for the cvharness-core crate.

use thiserror::Error;

/// Top-level error type for splitting, cross-validation and training orchestration.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Mutually exclusive options were both set, or a required option is missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A corpus is malformed or its examples disagree on dimensions.
    #[error("Data error: {0}")]
    Data(String),

    /// Post-split sizes do not add up. Never expected in correct operation.
    #[error("Partition invariant violated in {context}: expected {expected} examples, got {actual}")]
    PartitionInvariant {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// The external model or trainer reported a failure.
    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration source error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl HarnessError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn partition(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::PartitionInvariant {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Whether the error was raised before any data was touched.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Figment(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HarnessError>;
