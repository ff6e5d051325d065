//! Error types for modeltier
//!
//! All modules use `TierResult<T>` as their return type.

use crate::validate::IdRejection;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for modeltier operations
pub type TierResult<T> = Result<T, TierError>;

/// All errors that can occur in modeltier
#[derive(Error, Debug)]
pub enum TierError {
    // Identifier errors
    #[error("Invalid model identifier {model_id:?}: {reason}")]
    InvalidIdentifier {
        model_id: String,
        #[source]
        reason: IdRejection,
    },

    #[error("Rejected model identifier {model_id:?}: {reason}")]
    DangerousCharacter {
        model_id: String,
        #[source]
        reason: IdRejection,
    },

    #[error("Rejected model identifier {model_id:?}: {reason}")]
    PathTraversal {
        model_id: String,
        #[source]
        reason: IdRejection,
    },

    #[error("Path {path} escapes the cache-tier root {root}")]
    PathBoundaryViolation { path: PathBuf, root: PathBuf },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    // Placement errors
    #[error("Another placement holds the lock at {0}")]
    LockContention(PathBuf),

    #[error("Insufficient space on cache tier: required {required_gb:.2} GB, available {available_gb:.2} GB")]
    InsufficientSpace { required_gb: f64, available_gb: f64 },

    #[error("Fetch failed for {model_id}: {reason}")]
    FetchFailed { model_id: String, reason: String },

    #[error("Staged artifact for {model_id} failed validation: {reason}")]
    ArtifactValidationFailed { model_id: String, reason: String },

    #[error("Failed to promote {staging} to {target}: {source}")]
    PlacementFailed {
        staging: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TierError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Lift a validator rejection into the matching error kind
    pub fn from_rejection(model_id: impl Into<String>, reason: IdRejection) -> Self {
        let model_id = model_id.into();
        match reason {
            IdRejection::DangerousCharacter(_) => Self::DangerousCharacter { model_id, reason },
            IdRejection::PathTraversal => Self::PathTraversal { model_id, reason },
            IdRejection::UnknownProvider(name) => Self::UnknownProvider(name),
            _ => Self::InvalidIdentifier { model_id, reason },
        }
    }

    /// Check if error is retryable
    ///
    /// Lock contention and low space clear on their own. Nothing else
    /// should be retried without caller action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockContention(_) | Self::InsufficientSpace { .. })
    }

    /// Check if error originated from identifier or path validation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. }
                | Self::DangerousCharacter { .. }
                | Self::PathTraversal { .. }
                | Self::PathBoundaryViolation { .. }
                | Self::UnknownProvider(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockContention(_) => Some("Another placement is in progress. Retry shortly."),
            Self::InsufficientSpace { .. } => {
                Some("Run: modeltier evict && modeltier reclaim, or raise storage capacity")
            }
            Self::UnknownProvider(_) => Some("Supported providers: huggingface, ollama, vllm"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TierError::InsufficientSpace {
            required_gb: 20.0,
            available_gb: 5.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("required 20.00 GB"));
        assert!(msg.contains("available 5.50 GB"));
    }

    #[test]
    fn error_hint() {
        let err = TierError::LockContention(PathBuf::from("/mnt/nvme/.placement.lock"));
        assert!(err.hint().is_some());
        assert!(TierError::Internal("x".into()).hint().is_none());
    }

    #[test]
    fn error_retryable() {
        assert!(TierError::LockContention(PathBuf::from("/x")).is_retryable());
        assert!(TierError::InsufficientSpace {
            required_gb: 1.0,
            available_gb: 0.0
        }
        .is_retryable());
        assert!(!TierError::UnknownProvider("pytorch".into()).is_retryable());
    }

    #[test]
    fn rejection_maps_to_kind() {
        let err = TierError::from_rejection("a;b", IdRejection::DangerousCharacter(';'));
        assert!(matches!(err, TierError::DangerousCharacter { .. }));
        assert!(err.is_validation());

        let err = TierError::from_rejection("../x", IdRejection::PathTraversal);
        assert!(matches!(err, TierError::PathTraversal { .. }));

        let err = TierError::from_rejection("", IdRejection::Empty);
        assert!(matches!(err, TierError::InvalidIdentifier { .. }));

        let err = TierError::from_rejection("x", IdRejection::UnknownProvider("tf".into()));
        assert!(matches!(err, TierError::UnknownProvider(ref p) if p == "tf"));
    }
}
