//! Keep hosts whose datastores can hold every disk of the description.
//!
//! Disks are packed greedily, largest first, onto the host's datastores
//! ordered from least to most free space. A disk fits when it is strictly
//! smaller than what remains on a datastore. Capacity samples are fetched
//! once per datastore per invocation and shared by every host using it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use berth_state::{ComputeDescription, DocumentReader, StorageDescription};
use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::context::FilterContext;
use crate::error::PlacementResult;
use crate::selection::{CandidateMap, HostSelection, retain_hosts};

/// Free space assumed for a datastore that reports no capacity.
const UNLIMITED: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct StorageAffinityFilter {
    desc: Arc<ComputeDescription>,
}

impl StorageAffinityFilter {
    pub fn new(desc: Arc<ComputeDescription>) -> Self {
        Self { desc }
    }

    pub async fn filter(
        &self,
        reader: &dyn DocumentReader,
        _ctx: &FilterContext,
        candidates: &CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        if self.desc.disks.is_empty() {
            return Ok(candidates.clone());
        }
        let mut disks: Vec<u64> = self.desc.disks.iter().map(|d| d.capacity_bytes()).collect();
        disks.sort_unstable_by(|a, b| b.cmp(a));

        let endpoint_links: BTreeSet<&str> = candidates
            .values()
            .filter_map(|h| h.endpoint_link.as_deref())
            .collect();
        let endpoints = try_join_all(endpoint_links.iter().map(|link| reader.endpoint(link))).await?;
        let unmanaged: BTreeSet<&str> = endpoint_links
            .iter()
            .zip(&endpoints)
            .filter(|(_, ep)| matches!(ep, Some(ep) if !ep.supports_datastores))
            .map(|(link, _)| *link)
            .collect();

        let checked: Vec<&HostSelection> = candidates
            .values()
            .filter(|h| !h.endpoint_link.as_deref().is_some_and(|l| unmanaged.contains(l)))
            .collect();
        let datastores = try_join_all(checked.iter().map(|h| host_datastores(reader, h))).await?;

        let store_links: BTreeSet<&str> = datastores
            .iter()
            .flatten()
            .map(|ds| ds.link.as_str())
            .collect();
        let samples = try_join_all(store_links.iter().map(|link| reader.latest_metrics(link))).await?;
        let free: BTreeMap<&str, u64> = store_links
            .iter()
            .zip(samples)
            .map(|(link, sample)| {
                let bytes = sample.and_then(|s| s.available_bytes()).unwrap_or(UNLIMITED);
                (*link, bytes)
            })
            .collect();

        let mut keep: BTreeSet<String> = candidates
            .values()
            .filter(|h| h.endpoint_link.as_deref().is_some_and(|l| unmanaged.contains(l)))
            .map(|h| h.host_link.clone())
            .collect();
        for (host, stores) in checked.iter().zip(&datastores) {
            let capacities: Vec<(&str, u64)> = stores
                .iter()
                .map(|ds| (ds.link.as_str(), free.get(ds.link.as_str()).copied().unwrap_or(UNLIMITED)))
                .collect();
            if fits(&disks, capacities) {
                keep.insert(host.host_link.clone());
            } else {
                debug!(host = %host.host_link, datastores = stores.len(), "insufficient datastore capacity");
            }
        }

        info!(
            description = %self.desc.name,
            disks = disks.len(),
            checked = checked.len(),
            kept = keep.len(),
            "applied storage affinity"
        );
        Ok(retain_hosts(candidates, &keep))
    }
}

/// Datastores a host can use: its own links, or every datastore in its
/// region when it lists none. Links that resolve to nothing are dropped.
async fn host_datastores(
    reader: &dyn DocumentReader,
    host: &HostSelection,
) -> PlacementResult<Vec<StorageDescription>> {
    if host.datastore_links.is_empty() {
        return Ok(reader.storage_in_region(host.region_id.as_deref()).await?);
    }
    let stores = try_join_all(
        host.datastore_links
            .iter()
            .map(|link| reader.storage_description(link)),
    )
    .await?;
    Ok(stores.into_iter().flatten().collect())
}

/// First-fit of `disks` (largest first) onto datastores ordered by free space.
fn fits(disks: &[u64], mut datastores: Vec<(&str, u64)>) -> bool {
    datastores.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    let mut remaining: Vec<u64> = datastores.iter().map(|(_, free)| *free).collect();
    disks.iter().all(|disk| match remaining.iter_mut().find(|free| *disk < **free) {
        Some(free) => {
            *free -= disk;
            true
        }
        None => false,
    })
}
