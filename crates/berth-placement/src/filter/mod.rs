//! Host selection filters.
//!
//! Every filter narrows a [`CandidateMap`] for one compute description:
//! it reads what it needs through a [`DocumentReader`] and returns a new
//! map whose keys are a subset of its input, or an error that aborts the
//! chain. Filters hold no state between requests.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use berth_state::{ComputeDescription, DocumentReader};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::FilterConfig;
use crate::constraint::{AffinityConstraint, AffinityDirection};
use crate::context::FilterContext;
use crate::error::PlacementResult;
use crate::selection::CandidateMap;

pub mod cluster_anti_affinity;
pub mod network_affinity;
pub mod service_affinity;
pub mod service_anti_affinity;
pub mod storage_affinity;

pub use cluster_anti_affinity::ClusterAntiAffinityFilter;
pub use network_affinity::NetworkAffinityFilter;
pub use service_affinity::ServiceAffinityFilter;
pub use service_anti_affinity::ServiceAntiAffinityFilter;
pub use storage_affinity::StorageAffinityFilter;

/// The kinds of filter a chain can be assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    ClusterAntiAffinity,
    ServiceAffinity,
    ServiceAntiAffinity,
    NetworkAffinity,
    StorageAffinity,
}

impl FilterKind {
    /// All kinds in their default chain order.
    pub const ALL: [FilterKind; 5] = [
        FilterKind::ClusterAntiAffinity,
        FilterKind::ServiceAffinity,
        FilterKind::ServiceAntiAffinity,
        FilterKind::NetworkAffinity,
        FilterKind::StorageAffinity,
    ];
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterKind::ClusterAntiAffinity => "cluster_anti_affinity",
            FilterKind::ServiceAffinity => "service_affinity",
            FilterKind::ServiceAntiAffinity => "service_anti_affinity",
            FilterKind::NetworkAffinity => "network_affinity",
            FilterKind::StorageAffinity => "storage_affinity",
        };
        f.write_str(name)
    }
}

/// One configured filter, bound to the description under placement.
#[derive(Debug, Clone)]
pub enum HostFilter {
    ClusterAntiAffinity(ClusterAntiAffinityFilter),
    ServiceAffinity(ServiceAffinityFilter),
    ServiceAntiAffinity(ServiceAntiAffinityFilter),
    NetworkAffinity(NetworkAffinityFilter),
    StorageAffinity(StorageAffinityFilter),
}

impl HostFilter {
    pub fn new(kind: FilterKind, desc: Arc<ComputeDescription>, config: &FilterConfig) -> Self {
        match kind {
            FilterKind::ClusterAntiAffinity => {
                HostFilter::ClusterAntiAffinity(ClusterAntiAffinityFilter::new(desc))
            }
            FilterKind::ServiceAffinity => HostFilter::ServiceAffinity(ServiceAffinityFilter::new(desc)),
            FilterKind::ServiceAntiAffinity => {
                HostFilter::ServiceAntiAffinity(ServiceAntiAffinityFilter::new(desc))
            }
            FilterKind::NetworkAffinity => HostFilter::NetworkAffinity(
                NetworkAffinityFilter::new(desc).with_fail_fast(config.network_fail_fast),
            ),
            FilterKind::StorageAffinity => HostFilter::StorageAffinity(StorageAffinityFilter::new(desc)),
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            HostFilter::ClusterAntiAffinity(_) => FilterKind::ClusterAntiAffinity,
            HostFilter::ServiceAffinity(_) => FilterKind::ServiceAffinity,
            HostFilter::ServiceAntiAffinity(_) => FilterKind::ServiceAntiAffinity,
            HostFilter::NetworkAffinity(_) => FilterKind::NetworkAffinity,
            HostFilter::StorageAffinity(_) => FilterKind::StorageAffinity,
        }
    }

    /// Narrow `candidates` for the bound description.
    ///
    /// An empty input passes through untouched so that "filtered to
    /// nothing" upstream is never turned into an error downstream.
    pub async fn filter(
        &self,
        reader: &dyn DocumentReader,
        ctx: &FilterContext,
        candidates: &CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if candidates.is_empty() {
            return Ok(CandidateMap::new());
        }
        match self {
            HostFilter::ClusterAntiAffinity(f) => f.filter(reader, ctx, candidates).await,
            HostFilter::ServiceAffinity(f) => f.filter(reader, ctx, candidates).await,
            HostFilter::ServiceAntiAffinity(f) => f.filter(reader, ctx, candidates).await,
            HostFilter::NetworkAffinity(f) => f.filter(reader, ctx, candidates).await,
            HostFilter::StorageAffinity(f) => f.filter(reader, ctx, candidates).await,
        }
    }
}

// ── Shared lookups ─────────────────────────────────────────────────

/// Candidate hosts running an instance of the description named `target`
/// within the request's context.
pub(crate) async fn hosts_running(
    reader: &dyn DocumentReader,
    ctx: &FilterContext,
    target: &str,
    candidates: &CandidateMap,
) -> PlacementResult<BTreeSet<String>> {
    let names = [target.to_string()];
    let descs = reader.descriptions_named(&names).await?;
    if descs.is_empty() {
        return Ok(BTreeSet::new());
    }

    let links: Vec<String> = descs.into_iter().map(|d| d.link).collect();
    let instances = reader.instances_in_context(&ctx.context_id, &links).await?;
    Ok(instances
        .into_iter()
        .map(|i| i.host_link)
        .filter(|host| candidates.contains_key(host))
        .collect())
}

/// Resolve the host set of every constraint concurrently, in declaration order.
pub(crate) async fn hosts_per_constraint(
    reader: &dyn DocumentReader,
    ctx: &FilterContext,
    constraints: &[AffinityConstraint],
    candidates: &CandidateMap,
) -> PlacementResult<Vec<BTreeSet<String>>> {
    try_join_all(
        constraints
            .iter()
            .map(|c| hosts_running(reader, ctx, &c.target_name, candidates)),
    )
    .await
}

/// Constraints that *other* descriptions declare toward `desc`.
///
/// Each is returned from `desc`'s point of view: the target is the other
/// description, direction and enforcement are the ones it declared.
/// Entries that do not parse are skipped; they belong to another
/// description and must not fail this placement.
pub(crate) async fn reverse_constraints(
    reader: &dyn DocumentReader,
    desc: &ComputeDescription,
    direction: AffinityDirection,
) -> PlacementResult<Vec<AffinityConstraint>> {
    let others = reader.descriptions_with_affinity_to(&desc.name).await?;
    let mut reversed = Vec::new();
    for other in others.iter().filter(|o| o.link != desc.link) {
        for entry in &other.affinity {
            let parsed: AffinityConstraint = match entry.parse() {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(description = %other.name, %entry, error = %e, "ignoring malformed affinity entry");
                    continue;
                }
            };
            if parsed.target_name == desc.name && parsed.direction == direction {
                reversed.push(AffinityConstraint {
                    target_name: other.name.clone(),
                    enforcement: parsed.enforcement,
                    direction,
                });
            }
        }
    }
    reversed.sort_by(|a, b| a.target_name.cmp(&b.target_name));
    reversed.dedup();
    Ok(reversed)
}
