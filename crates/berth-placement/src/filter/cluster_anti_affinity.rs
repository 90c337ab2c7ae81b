//! Spread the instances of a clustered description across hosts.
//!
//! Active only when the description declares a cluster size above one.
//! Hosts already running the fewest same-description instances within the
//! request's context are kept; hosts without such instances count as zero.
//! A request placing several instances at once is left alone, since the
//! spread of a batch is decided after host selection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use berth_state::{ComputeDescription, DocumentReader};
use tracing::{debug, info};

use crate::context::FilterContext;
use crate::error::PlacementResult;
use crate::selection::{CandidateMap, retain_hosts};

#[derive(Debug, Clone)]
pub struct ClusterAntiAffinityFilter {
    desc: Arc<ComputeDescription>,
}

impl ClusterAntiAffinityFilter {
    pub fn new(desc: Arc<ComputeDescription>) -> Self {
        Self { desc }
    }

    pub async fn filter(
        &self,
        reader: &dyn DocumentReader,
        ctx: &FilterContext,
        candidates: &CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let Some(cluster_size) = ctx.cluster_size(&self.desc).filter(|size| *size > 1) else {
            return Ok(candidates.clone());
        };
        if ctx.resource_count > 1 {
            debug!(
                description = %self.desc.name,
                resource_count = ctx.resource_count,
                "batch placement, skipping cluster spread"
            );
            return Ok(candidates.clone());
        }

        let links = [self.desc.link.clone()];
        let instances = reader.instances_in_context(&ctx.context_id, &links).await?;

        let mut counts: BTreeMap<&str, usize> =
            candidates.keys().map(|link| (link.as_str(), 0)).collect();
        for instance in &instances {
            if let Some(count) = counts.get_mut(instance.host_link.as_str()) {
                *count += 1;
            }
        }

        let Some(min) = counts.values().copied().min() else {
            return Ok(candidates.clone());
        };
        let keep: BTreeSet<String> = counts
            .iter()
            .filter(|(_, count)| **count == min)
            .map(|(link, _)| link.to_string())
            .collect();

        info!(
            description = %self.desc.name,
            cluster_size,
            existing = instances.len(),
            min_per_host = min,
            kept = keep.len(),
            "spreading cluster"
        );
        Ok(retain_hosts(candidates, &keep))
    }
}
