use std::fmt;

/// Result type for reinforce operations
pub type Result<T> = std::result::Result<T, ReinforceError>;

/// Main error type for the reinforce library
///
/// Shape violations inside the tensor and graph code are programming errors and
/// panic instead; this enum covers what a caller can reasonably recover from.
#[derive(Debug, Clone)]
pub enum ReinforceError {
    /// Input of the wrong length or count at an API boundary
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid hyperparameter or constructor argument
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Snapshot that parsed but cannot be used (bad shapes, non-finite values)
    InvalidSnapshot(String),

    /// Empty replay buffer
    EmptyBuffer(String),

    /// `learn` was asked to train before two states were observed
    MissingTransition,

    /// Shared weights lock was poisoned by a panicking agent
    LockPoisoned,
}

impl fmt::Display for ReinforceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReinforceError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            ReinforceError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            ReinforceError::IoError(msg) => write!(f, "IO error: {}", msg),
            ReinforceError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            ReinforceError::InvalidSnapshot(msg) => write!(f, "Invalid snapshot: {}", msg),
            ReinforceError::EmptyBuffer(msg) => write!(f, "Empty buffer: {}", msg),
            ReinforceError::MissingTransition => {
                write!(f, "No transition to learn from: act must be called at least twice")
            }
            ReinforceError::LockPoisoned => write!(f, "Shared weights lock poisoned"),
        }
    }
}

impl std::error::Error for ReinforceError {}

impl From<std::io::Error> for ReinforceError {
    fn from(err: std::io::Error) -> Self {
        ReinforceError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for ReinforceError {
    fn from(err: bincode::Error) -> Self {
        ReinforceError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for ReinforceError {
    fn from(err: serde_json::Error) -> Self {
        ReinforceError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl ReinforceError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        ReinforceError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        ReinforceError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Persistence problems a loader may treat as "no usable model"
    pub fn is_recoverable_load_failure(&self) -> bool {
        matches!(
            self,
            ReinforceError::IoError(_)
                | ReinforceError::SerializationError(_)
                | ReinforceError::InvalidSnapshot(_)
        )
    }
}
