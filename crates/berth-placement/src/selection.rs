//! Candidate hosts and the conversion from stored host documents.
//!
//! Bridges `berth_state::HostState` to the [`HostSelection`] entries that
//! flow through the filter chain.

use std::collections::{BTreeMap, BTreeSet};

use berth_state::HostState;

/// Working set of hosts keyed by host link.
///
/// Ordered so that iteration, and anything merged from concurrent
/// per-host queries, follows host identity rather than arrival order.
pub type CandidateMap = BTreeMap<String, HostSelection>;

/// One candidate host. Filters decide inclusion, they never modify entries.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostSelection {
    pub host_link: String,
    pub cluster_store: Option<String>,
    pub plugins: Option<serde_json::Value>,
    pub endpoint_link: Option<String>,
    pub region_id: Option<String>,
    pub zone_id: Option<String>,
    pub network_links: BTreeSet<String>,
    pub datastore_links: Vec<String>,
}

/// Convert a [`HostState`] to a [`HostSelection`].
pub fn host_to_selection(host: &HostState) -> HostSelection {
    HostSelection {
        host_link: host.link.clone(),
        cluster_store: host.cluster_store.clone(),
        plugins: host.plugins.clone(),
        endpoint_link: host.endpoint_link.clone(),
        region_id: host.region_id.clone(),
        zone_id: host.zone_id.clone(),
        network_links: host.network_links.clone(),
        datastore_links: host.datastore_links.clone(),
    }
}

/// Build the initial candidate map from the hosts of a resource pool.
pub fn candidates_from_hosts<'a>(hosts: impl IntoIterator<Item = &'a HostState>) -> CandidateMap {
    hosts
        .into_iter()
        .map(|h| (h.link.clone(), host_to_selection(h)))
        .collect()
}

/// Keep only the candidates whose link is in `keep`.
pub(crate) fn retain_hosts(candidates: &CandidateMap, keep: &BTreeSet<String>) -> CandidateMap {
    candidates
        .iter()
        .filter(|(link, _)| keep.contains(*link))
        .map(|(link, sel)| (link.clone(), sel.clone()))
        .collect()
}
