//! Error types for store access and catalog builds

use thiserror::Error;

use crate::build::BuildState;

/// Errors raised by an [`ObjectStore`](crate::store::ObjectStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key, or the container a listing was asked for, does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// The key is not a valid repository identifier
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The store could not be reached or is misconfigured
    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// NotFound is the only variant callers are expected to shrug off.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A build that could not complete.
///
/// Only listing one of the top-level kinds can fail a build; every per-item
/// problem ends up in the [`ErrorReport`](crate::report::ErrorReport) instead.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("could not list {kind} while {state}: {source}")]
    Listing {
        kind: String,
        state: BuildState,
        #[source]
        source: StoreError,
    },
}

impl BuildError {
    /// The state the build was in when it failed.
    pub fn state(&self) -> BuildState {
        match self {
            BuildError::Listing { state, .. } => *state,
        }
    }

    /// Log the failure at error level.
    pub fn log(&self) {
        match self {
            BuildError::Listing { kind, state, source } => {
                tracing::error!(kind = %kind, state = %state, "catalog build aborted: {}", source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_the_only_ignorable_kind() {
        assert!(StoreError::NotFound("pkgs/a.pkg".into()).is_not_found());
        assert!(!StoreError::Connectivity("timeout".into()).is_not_found());
        assert!(!StoreError::InvalidKey("../x".into()).is_not_found());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!StoreError::from(io).is_not_found());
    }

    #[test]
    fn test_build_error_names_state_and_kind() {
        let err = BuildError::Listing {
            kind: "pkgsinfo".into(),
            state: BuildState::ListingPkgsinfo,
            source: StoreError::Connectivity("connection refused".into()),
        };
        assert_eq!(err.state(), BuildState::ListingPkgsinfo);
        let message = err.to_string();
        assert!(message.contains("pkgsinfo"));
        assert!(message.contains("connection refused"));
    }
}
