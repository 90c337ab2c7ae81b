//! berth host selection: affinity, anti-affinity, network and storage filters.
//!
//! A placement request starts from every host in a resource pool and
//! folds that candidate set through an ordered chain of filters. Each
//! filter reads the documents it needs through
//! [`berth_state::DocumentReader`] and returns a narrowed set, or an
//! error that stops the chain.
//!
//! # Components
//!
//! - **`selection`**: Candidate map and host conversion
//! - **`context`**: Per-request filter parameters
//! - **`constraint`**: Affinity declaration parser
//! - **`filter`**: The five host filters
//! - **`chain`**: Ordered fold over filters
//! - **`config`**: Chain configuration (TOML)
//! - **`task`**: Placement entry point

pub mod chain;
pub mod config;
pub mod constraint;
pub mod context;
pub mod error;
pub mod filter;
pub mod selection;
pub mod task;

#[cfg(test)]
mod test_support;

pub use chain::FilterChain;
pub use config::{FilterConfig, PlacementConfig};
pub use constraint::{AffinityConstraint, AffinityDirection, Enforcement, parse_constraints};
pub use context::{CLUSTER_SIZE_KEY, CLUSTERING_OPERATION_KEY, CONTEXT_ID_KEY, FilterContext};
pub use error::{PlacementError, PlacementResult};
pub use filter::{FilterKind, HostFilter};
pub use selection::{CandidateMap, HostSelection, candidates_from_hosts, host_to_selection};
pub use task::{PlacementDecision, PlacementRequest, place};
