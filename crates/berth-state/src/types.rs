//! Document types for the berth state store.
//!
//! These types are the read shapes host selection depends on: candidate
//! hosts, the compute descriptions being placed, instances already placed
//! within a provisioning context, and the network and storage documents
//! that decide connectivity and capacity. All types are serializable
//! to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Self link of a stored document (e.g. `/resources/compute/host-1`).
pub type DocumentLink = String;

/// Opaque id grouping every resource created by one logical request.
pub type ContextId = String;

/// Metric key holding a datastore's free capacity in bytes.
pub const STORAGE_AVAILABLE_BYTES: &str = "storage.available.bytes";

// ── Host ──────────────────────────────────────────────────────────

/// A compute host that new instances can be provisioned onto.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostState {
    pub link: DocumentLink,
    pub name: String,
    /// Resource pool this host is a member of.
    pub resource_pool_link: DocumentLink,
    /// Endpoint the host was enumerated from.
    #[serde(default)]
    pub endpoint_link: Option<DocumentLink>,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
    /// Networks the host is attached to.
    #[serde(default)]
    pub network_links: BTreeSet<DocumentLink>,
    /// Datastores the host can reach. Empty means "every datastore in the region".
    #[serde(default)]
    pub datastore_links: Vec<DocumentLink>,
    #[serde(default)]
    pub cluster_store: Option<String>,
    /// Free-form plugin descriptor reported by the host agent.
    #[serde(default)]
    pub plugins: Option<serde_json::Value>,
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,
}

// ── Compute description ───────────────────────────────────────────

/// Blueprint of a compute instance, including its placement constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeDescription {
    pub link: DocumentLink,
    pub name: String,
    /// Affinity declarations, e.g. `["db", "!cache:soft"]`.
    #[serde(default)]
    pub affinity: Vec<String>,
    #[serde(default)]
    pub disks: Vec<DiskDescription>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceDescription>,
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,
}

/// A disk the instance requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskDescription {
    pub name: String,
    pub capacity_mbytes: u64,
}

impl DiskDescription {
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_mbytes.saturating_mul(1024 * 1024)
    }
}

/// A NIC attached to a named compute network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterfaceDescription {
    pub name: String,
    pub network_name: String,
}

// ── Compute instance ──────────────────────────────────────────────

/// An instance that has already been placed on a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeInstance {
    pub link: DocumentLink,
    pub name: String,
    pub description_link: DocumentLink,
    /// Host the instance runs on.
    pub host_link: DocumentLink,
    /// Context the instance was provisioned in. Instances without one never
    /// match a context query.
    #[serde(default)]
    pub context_id: Option<ContextId>,
}

// ── Networking ────────────────────────────────────────────────────

/// A compute network provisioned within a context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeNetwork {
    pub link: DocumentLink,
    pub name: String,
    pub context_id: ContextId,
    pub network_type: NetworkType,
    /// Profiles the network may be realized with.
    #[serde(default)]
    pub profile_links: Vec<DocumentLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    External,
    Isolated,
    Public,
}

/// Describes which subnets (or isolation network) satisfy a compute network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkProfile {
    pub link: DocumentLink,
    #[serde(default)]
    pub subnet_links: Vec<DocumentLink>,
    #[serde(default)]
    pub isolation_type: IsolationType,
    /// Network in which isolated subnets are carved out.
    #[serde(default)]
    pub isolation_network_link: Option<DocumentLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationType {
    #[default]
    None,
    Subnet,
    SecurityGroup,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subnet {
    pub link: DocumentLink,
    pub network_link: DocumentLink,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
}

// ── Storage ───────────────────────────────────────────────────────

/// A datastore hosts can place disks on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageDescription {
    pub link: DocumentLink,
    pub name: String,
    #[serde(default)]
    pub region_id: Option<String>,
}

/// Endpoint a host was discovered through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointState {
    pub link: DocumentLink,
    /// Whether the endpoint models datastores at all.
    #[serde(default)]
    pub supports_datastores: bool,
}

// ── Metrics ───────────────────────────────────────────────────────

/// Point-in-time metric sample for a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceMetrics {
    pub resource_link: DocumentLink,
    pub timestamp_micros: u64,
    pub entries: HashMap<String, f64>,
}

impl ResourceMetrics {
    /// Free capacity in whole bytes, if the sample carries it.
    pub fn available_bytes(&self) -> Option<u64> {
        self.entries
            .get(STORAGE_AVAILABLE_BYTES)
            .map(|bytes| if *bytes <= 0.0 { 0 } else { *bytes as u64 })
    }
}

impl ComputeInstance {
    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        format!("{}|{}", self.context_id.as_deref().unwrap_or_default(), self.link)
    }
}

impl ComputeNetwork {
    /// Build the composite key for the networks table.
    pub fn table_key(&self) -> String {
        network_key(&self.context_id, &self.name)
    }
}

impl ResourceMetrics {
    /// Build the composite key for the metrics table.
    ///
    /// The timestamp is zero-padded so keys sort chronologically.
    pub fn table_key(&self) -> String {
        format!("{}|{:020}", self.resource_link, self.timestamp_micros)
    }
}

pub(crate) fn network_key(context_id: &str, name: &str) -> String {
    format!("{context_id}|{name}")
}
