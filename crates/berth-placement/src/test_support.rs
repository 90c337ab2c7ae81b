//! Document builders shared by the filter unit tests.

use std::collections::{BTreeSet, HashMap};

use berth_state::{ComputeDescription, ComputeInstance, HostState, StateStore};

use crate::selection::{CandidateMap, candidates_from_hosts};

pub const POOL: &str = "/pools/default";

pub fn host(link: &str) -> HostState {
    HostState {
        link: link.to_string(),
        name: link.rsplit('/').next().unwrap_or(link).to_string(),
        resource_pool_link: POOL.to_string(),
        endpoint_link: None,
        region_id: None,
        zone_id: None,
        network_links: BTreeSet::new(),
        datastore_links: Vec::new(),
        cluster_store: None,
        plugins: None,
        custom_properties: HashMap::new(),
    }
}

pub fn desc(name: &str, affinity: &[&str]) -> ComputeDescription {
    ComputeDescription {
        link: format!("/descriptions/{name}"),
        name: name.to_string(),
        affinity: affinity.iter().map(|a| a.to_string()).collect(),
        disks: Vec::new(),
        network_interfaces: Vec::new(),
        custom_properties: HashMap::new(),
    }
}

/// Store `count` hosts named `/hosts/h0`.. and return them as candidates.
pub fn seed_hosts(store: &StateStore, count: usize) -> CandidateMap {
    let hosts: Vec<HostState> = (0..count).map(|i| host(&format!("/hosts/h{i}"))).collect();
    for h in &hosts {
        store.put_host(h).unwrap();
    }
    candidates_from_hosts(&hosts)
}

/// Record an instance of `desc` on `host_link` within `context_id`.
pub fn place_instance(store: &StateStore, context_id: &str, desc: &ComputeDescription, host_link: &str) {
    let seq = store
        .list_instances_in_context(context_id, &[])
        .unwrap()
        .len();
    store
        .put_instance(&ComputeInstance {
            link: format!("/compute/{}-{seq}-{}", desc.name, host_link.replace('/', "_")),
            name: format!("{}-{seq}", desc.name),
            description_link: desc.link.clone(),
            host_link: host_link.to_string(),
            context_id: Some(context_id.to_string()),
        })
        .unwrap();
}

pub fn links(map: &CandidateMap) -> Vec<&str> {
    map.keys().map(String::as_str).collect()
}
