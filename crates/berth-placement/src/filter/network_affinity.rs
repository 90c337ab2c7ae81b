//! Restrict candidates to one connectivity group compatible with every
//! compute network the description attaches to.
//!
//! A host is eligible when, for each resolved compute network, one of its
//! connectivity keys (its network links, or its region and zone when it has
//! none) satisfies at least one of the network's profiles. Eligible hosts
//! are then grouped by shared key and the largest group wins. Equal sizes are decided by a digest of
//! the context, the description and the group key, so repeated calls for
//! one context pick the same group whatever order the store answers in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use berth_state::{ComputeDescription, DocumentReader, IsolationType, NetworkProfile, Subnet};
use futures_util::future::try_join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::context::FilterContext;
use crate::error::{PlacementError, PlacementResult};
use crate::selection::{CandidateMap, HostSelection, retain_hosts};

/// Identity of a connectivity group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupKey {
    Network(String),
    Zone { region: String, zone: String },
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Network(link) => write!(f, "network:{link}"),
            GroupKey::Zone { region, zone } => write!(f, "zone:{region}/{zone}"),
        }
    }
}

/// Connectivity keys of one host: its network links, else its zone.
fn host_keys(host: &HostSelection) -> Vec<GroupKey> {
    if !host.network_links.is_empty() {
        return host.network_links.iter().cloned().map(GroupKey::Network).collect();
    }
    match (&host.region_id, &host.zone_id) {
        (Some(region), Some(zone)) => vec![GroupKey::Zone {
            region: region.clone(),
            zone: zone.clone(),
        }],
        _ => Vec::new(),
    }
}

/// Partition candidates into connectivity groups. A multi-homed host joins
/// the group of every network it is linked to.
pub fn connectivity_groups(candidates: &CandidateMap) -> BTreeMap<GroupKey, BTreeSet<String>> {
    let mut groups: BTreeMap<GroupKey, BTreeSet<String>> = BTreeMap::new();
    for (link, host) in candidates {
        for key in host_keys(host) {
            groups.entry(key).or_default().insert(link.clone());
        }
    }
    groups
}

/// A profile with its subnets loaded.
#[derive(Debug, Clone)]
struct ResolvedProfile {
    profile: NetworkProfile,
    subnets: Vec<Subnet>,
}

impl ResolvedProfile {
    fn satisfied_by(&self, key: &GroupKey) -> bool {
        if self.profile.isolation_type == IsolationType::Subnet {
            return matches!(
                (key, &self.profile.isolation_network_link),
                (GroupKey::Network(link), Some(isolation)) if link == isolation
            );
        }
        self.subnets.iter().any(|subnet| match key {
            GroupKey::Network(link) => &subnet.network_link == link,
            GroupKey::Zone { region, zone } => {
                subnet.region_id.as_deref() == Some(region.as_str())
                    && subnet.zone_id.as_deref() == Some(zone.as_str())
            }
        })
    }
}

/// A compute network with the profiles it may be realized with.
#[derive(Debug, Clone)]
struct ResolvedNetwork {
    name: String,
    profiles: Vec<ResolvedProfile>,
}

#[derive(Debug, Clone)]
pub struct NetworkAffinityFilter {
    desc: Arc<ComputeDescription>,
    fail_fast: bool,
}

impl NetworkAffinityFilter {
    pub fn new(desc: Arc<ComputeDescription>) -> Self {
        Self {
            desc,
            fail_fast: false,
        }
    }

    /// Report an empty result as [`PlacementError::NoConnectivity`].
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub async fn filter(
        &self,
        reader: &dyn DocumentReader,
        ctx: &FilterContext,
        candidates: &CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let names: BTreeSet<&str> = self
            .desc
            .network_interfaces
            .iter()
            .map(|nic| nic.network_name.as_str())
            .collect();
        if names.is_empty() {
            return Ok(candidates.clone());
        }

        let networks = try_join_all(names.iter().map(|name| self.resolve(reader, ctx, name))).await?;
        let networks: Vec<ResolvedNetwork> = networks
            .into_iter()
            .flatten()
            .filter(|n| !n.profiles.is_empty())
            .collect();
        if networks.is_empty() {
            debug!(description = %self.desc.name, "no constraining compute networks");
            return Ok(candidates.clone());
        }

        let eligible: BTreeSet<String> = candidates
            .values()
            .filter(|host| {
                let keys = host_keys(host);
                networks
                    .iter()
                    .all(|n| n.profiles.iter().any(|p| keys.iter().any(|k| p.satisfied_by(k))))
            })
            .map(|host| host.host_link.clone())
            .collect();
        let groups = connectivity_groups(&retain_hosts(candidates, &eligible));
        let chosen = groups
            .iter()
            .map(|(key, hosts)| (hosts.len(), self.tie_break(ctx, key), key, hosts))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

        let Some((size, _, key, hosts)) = chosen else {
            let networks: Vec<&str> = networks.iter().map(|n| n.name.as_str()).collect();
            warn!(
                description = %self.desc.name,
                context = %ctx.context_id,
                ?networks,
                candidates = candidates.len(),
                "no host satisfies network profiles"
            );
            if self.fail_fast {
                return Err(PlacementError::NoConnectivity(self.desc.name.clone()));
            }
            return Ok(CandidateMap::new());
        };

        info!(
            description = %self.desc.name,
            context = %ctx.context_id,
            group = %key,
            hosts = size,
            "selected connectivity group"
        );
        Ok(retain_hosts(candidates, hosts))
    }

    /// Load a compute network and its profiles. `None` when the network
    /// is not provisioned in this context.
    async fn resolve(
        &self,
        reader: &dyn DocumentReader,
        ctx: &FilterContext,
        name: &str,
    ) -> PlacementResult<Option<ResolvedNetwork>> {
        let Some(network) = reader.compute_network(&ctx.context_id, name).await? else {
            debug!(network = name, context = %ctx.context_id, "compute network not found");
            return Ok(None);
        };

        let profiles = try_join_all(
            network
                .profile_links
                .iter()
                .map(|link| resolve_profile(reader, link)),
        )
        .await?;

        Ok(Some(ResolvedNetwork {
            name: network.name,
            profiles: profiles.into_iter().flatten().collect(),
        }))
    }

    fn tie_break(&self, ctx: &FilterContext, key: &GroupKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ctx.context_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.desc.link.as_bytes());
        hasher.update(b"|");
        hasher.update(key.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

async fn resolve_profile(
    reader: &dyn DocumentReader,
    link: &str,
) -> PlacementResult<Option<ResolvedProfile>> {
    let Some(profile) = reader.network_profile(link).await? else {
        warn!(profile = link, "network profile not found");
        return Ok(None);
    };
    let subnets = try_join_all(profile.subnet_links.iter().map(|s| reader.subnet(s))).await?;
    Ok(Some(ResolvedProfile {
        subnets: subnets.into_iter().flatten().collect(),
        profile,
    }))
}
