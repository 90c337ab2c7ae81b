//! Keep a new instance off hosts running named descriptions in the same
//! context.
//!
//! HARD exclusions always apply, even when they remove every candidate.
//! SOFT exclusions apply one at a time in declaration order, each only if
//! at least one host survives it. Anti-affinity is symmetric: a placed
//! description declaring `!name` repels `name` as well.

use std::collections::BTreeSet;
use std::sync::Arc;

use berth_state::{ComputeDescription, DocumentReader};
use tracing::{debug, info};

use crate::constraint::{AffinityConstraint, AffinityDirection, parse_constraints};
use crate::context::FilterContext;
use crate::error::PlacementResult;
use crate::filter::{hosts_per_constraint, reverse_constraints};
use crate::selection::{CandidateMap, retain_hosts};

#[derive(Debug, Clone)]
pub struct ServiceAntiAffinityFilter {
    desc: Arc<ComputeDescription>,
}

impl ServiceAntiAffinityFilter {
    pub fn new(desc: Arc<ComputeDescription>) -> Self {
        Self { desc }
    }

    pub async fn filter(
        &self,
        reader: &dyn DocumentReader,
        ctx: &FilterContext,
        candidates: &CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let mut constraints: Vec<AffinityConstraint> = parse_constraints(&self.desc.affinity)?
            .into_iter()
            .filter(AffinityConstraint::is_anti)
            .collect();
        constraints.extend(reverse_constraints(reader, &self.desc, AffinityDirection::AntiAffinity).await?);

        if constraints.is_empty() {
            return Ok(candidates.clone());
        }

        let host_sets = hosts_per_constraint(reader, ctx, &constraints, candidates).await?;

        let mut remaining: BTreeSet<String> = candidates.keys().cloned().collect();
        for (constraint, hosts) in constraints.iter().zip(&host_sets) {
            if constraint.is_hard() {
                remaining.retain(|h| !hosts.contains(h));
            }
        }
        let after_hard = remaining.len();

        for (constraint, hosts) in constraints.iter().zip(&host_sets) {
            if constraint.is_hard() || hosts.is_empty() {
                continue;
            }
            let narrowed: BTreeSet<String> = remaining.difference(hosts).cloned().collect();
            if narrowed.is_empty() {
                debug!(
                    description = %self.desc.name,
                    target = %constraint.target_name,
                    "soft anti-affinity would exclude every host, relaxing"
                );
                continue;
            }
            remaining = narrowed;
        }

        info!(
            description = %self.desc.name,
            constraints = constraints.len(),
            after_hard,
            kept = remaining.len(),
            "applied service anti-affinity"
        );
        Ok(retain_hosts(candidates, &remaining))
    }
}
