//! Placement error types.

use thiserror::Error;

/// Errors that abort host selection.
///
/// Narrowing the candidate set to nothing is not an error; filters return
/// an empty map for that and the caller decides how to report it.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("invalid affinity constraint `{0}`")]
    InvalidConstraint(String),

    #[error("no placed instances of [{target}] found for context [{context_id}]")]
    AffinityTargetNotFound { target: String, context_id: String },

    #[error("[{description}] cannot be placed on two different hosts required by {targets:?}")]
    ConflictingAffinity {
        description: String,
        targets: Vec<String>,
    },

    #[error("no connectivity group satisfies the network profiles of [{0}]")]
    NoConnectivity(String),

    #[error("no eligible host for [{0}]")]
    NoEligibleHost(String),

    #[error("compute description not found: {0}")]
    DescriptionNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("state store error: {0}")]
    State(#[from] berth_state::StateError),
}

pub type PlacementResult<T> = Result<T, PlacementError>;
