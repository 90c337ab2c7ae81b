//! redb table definitions for the berth document store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized documents).
//! Most tables are keyed by the document link; instances and metrics use
//! composite keys so related records sit next to each other.

use redb::TableDefinition;

/// Compute hosts keyed by `{link}`.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

/// Compute descriptions keyed by `{link}`.
pub const DESCRIPTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("descriptions");

/// Placed compute instances keyed by `{context_id}|{link}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Compute networks keyed by `{context_id}|{name}`.
pub const NETWORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("networks");

/// Network profiles keyed by `{link}`.
pub const PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("profiles");

/// Subnets keyed by `{link}`.
pub const SUBNETS: TableDefinition<&str, &[u8]> = TableDefinition::new("subnets");

/// Datastores keyed by `{link}`.
pub const STORAGE: TableDefinition<&str, &[u8]> = TableDefinition::new("storage");

/// Endpoints keyed by `{link}`.
pub const ENDPOINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("endpoints");

/// Resource metric samples keyed by `{resource_link}|{timestamp_micros:020}`.
pub const METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("metrics");
