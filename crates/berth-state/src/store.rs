//! StateStore: redb-backed document persistence for berth.
//!
//! Provides typed put/get/list/delete over every document kind, plus the
//! query helpers host selection relies on. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type DocTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            HOSTS,
            DESCRIPTIONS,
            INSTANCES,
            NETWORKS,
            PROFILES,
            SUBNETS,
            STORAGE,
            ENDPOINTS,
            METRICS,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic table access ───────────────────────────────────────

    fn put_doc<T: Serialize>(&self, table: DocTable, key: &str, doc: &T) -> StateResult<()> {
        let value = serde_json::to_vec(doc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_doc<T: DeserializeOwned>(&self, table: DocTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let doc: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// Collect every document whose key starts with `prefix` (all of them for `""`).
    fn scan_docs<T: DeserializeOwned>(&self, table: DocTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let doc: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(doc);
            }
        }
        Ok(results)
    }

    fn delete_doc(&self, table: DocTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert or update a host.
    pub fn put_host(&self, host: &HostState) -> StateResult<()> {
        self.put_doc(HOSTS, &host.link, host)?;
        debug!(link = %host.link, "host stored");
        Ok(())
    }

    pub fn get_host(&self, link: &str) -> StateResult<Option<HostState>> {
        self.get_doc(HOSTS, link)
    }

    pub fn list_hosts(&self) -> StateResult<Vec<HostState>> {
        self.scan_docs(HOSTS, "")
    }

    /// List the hosts that are members of a resource pool.
    pub fn list_hosts_in_pool(&self, pool_link: &str) -> StateResult<Vec<HostState>> {
        let mut hosts = self.list_hosts()?;
        hosts.retain(|h| h.resource_pool_link == pool_link);
        Ok(hosts)
    }

    /// Delete a host by link. Returns true if it existed.
    pub fn delete_host(&self, link: &str) -> StateResult<bool> {
        let existed = self.delete_doc(HOSTS, link)?;
        debug!(%link, existed, "host deleted");
        Ok(existed)
    }

    // ── Compute descriptions ───────────────────────────────────────

    pub fn put_description(&self, desc: &ComputeDescription) -> StateResult<()> {
        self.put_doc(DESCRIPTIONS, &desc.link, desc)?;
        debug!(link = %desc.link, name = %desc.name, "compute description stored");
        Ok(())
    }

    pub fn get_description(&self, link: &str) -> StateResult<Option<ComputeDescription>> {
        self.get_doc(DESCRIPTIONS, link)
    }

    pub fn list_descriptions(&self) -> StateResult<Vec<ComputeDescription>> {
        self.scan_docs(DESCRIPTIONS, "")
    }

    /// Descriptions whose name is one of `names`.
    pub fn list_descriptions_named(&self, names: &[String]) -> StateResult<Vec<ComputeDescription>> {
        let mut descs = self.list_descriptions()?;
        descs.retain(|d| names.contains(&d.name));
        Ok(descs)
    }

    /// Descriptions that declare any affinity entry naming `name`.
    ///
    /// Matching is on the bare name: the `!` prefix and `:soft`/`:hard`
    /// suffixes are ignored here and interpreted by the caller.
    pub fn list_descriptions_with_affinity_to(
        &self,
        name: &str,
    ) -> StateResult<Vec<ComputeDescription>> {
        let mut descs = self.list_descriptions()?;
        descs.retain(|d| d.affinity.iter().any(|a| affinity_target(a) == name));
        Ok(descs)
    }

    pub fn delete_description(&self, link: &str) -> StateResult<bool> {
        self.delete_doc(DESCRIPTIONS, link)
    }

    // ── Compute instances ──────────────────────────────────────────

    pub fn put_instance(&self, instance: &ComputeInstance) -> StateResult<()> {
        self.put_doc(INSTANCES, &instance.table_key(), instance)
    }

    /// List the instances of a context, optionally restricted to descriptions.
    ///
    /// An empty `description_links` slice means "any description".
    pub fn list_instances_in_context(
        &self,
        context_id: &str,
        description_links: &[String],
    ) -> StateResult<Vec<ComputeInstance>> {
        let prefix = format!("{context_id}|");
        let mut instances: Vec<ComputeInstance> = self.scan_docs(INSTANCES, &prefix)?;
        instances.retain(|i| {
            i.context_id.as_deref() == Some(context_id)
                && (description_links.is_empty() || description_links.contains(&i.description_link))
        });
        Ok(instances)
    }

    /// Delete an instance. Returns true if it existed.
    pub fn delete_instance(&self, instance: &ComputeInstance) -> StateResult<bool> {
        self.delete_doc(INSTANCES, &instance.table_key())
    }

    // ── Networking ─────────────────────────────────────────────────

    pub fn put_compute_network(&self, network: &ComputeNetwork) -> StateResult<()> {
        self.put_doc(NETWORKS, &network.table_key(), network)
    }

    /// Get the compute network named `name` within a context.
    pub fn get_compute_network(
        &self,
        context_id: &str,
        name: &str,
    ) -> StateResult<Option<ComputeNetwork>> {
        self.get_doc(NETWORKS, &network_key(context_id, name))
    }

    /// Compute networks provisioned for one context.
    pub fn list_compute_networks_in_context(&self, context_id: &str) -> StateResult<Vec<ComputeNetwork>> {
        let mut networks: Vec<ComputeNetwork> = self.scan_docs(NETWORKS, &format!("{context_id}|"))?;
        networks.retain(|n| n.context_id == context_id);
        Ok(networks)
    }

    pub fn delete_compute_network(&self, context_id: &str, name: &str) -> StateResult<bool> {
        self.delete_doc(NETWORKS, &network_key(context_id, name))
    }

    pub fn put_network_profile(&self, profile: &NetworkProfile) -> StateResult<()> {
        self.put_doc(PROFILES, &profile.link, profile)
    }

    pub fn get_network_profile(&self, link: &str) -> StateResult<Option<NetworkProfile>> {
        self.get_doc(PROFILES, link)
    }

    pub fn list_network_profiles(&self) -> StateResult<Vec<NetworkProfile>> {
        self.scan_docs(PROFILES, "")
    }

    pub fn delete_network_profile(&self, link: &str) -> StateResult<bool> {
        self.delete_doc(PROFILES, link)
    }

    pub fn put_subnet(&self, subnet: &Subnet) -> StateResult<()> {
        self.put_doc(SUBNETS, &subnet.link, subnet)
    }

    pub fn get_subnet(&self, link: &str) -> StateResult<Option<Subnet>> {
        self.get_doc(SUBNETS, link)
    }

    pub fn list_subnets(&self) -> StateResult<Vec<Subnet>> {
        self.scan_docs(SUBNETS, "")
    }

    pub fn delete_subnet(&self, link: &str) -> StateResult<bool> {
        self.delete_doc(SUBNETS, link)
    }

    // ── Storage ────────────────────────────────────────────────────

    pub fn put_storage(&self, storage: &StorageDescription) -> StateResult<()> {
        self.put_doc(STORAGE, &storage.link, storage)
    }

    pub fn get_storage(&self, link: &str) -> StateResult<Option<StorageDescription>> {
        self.get_doc(STORAGE, link)
    }

    /// Datastores in a region, or every datastore when `region_id` is `None`.
    pub fn list_storage_in_region(
        &self,
        region_id: Option<&str>,
    ) -> StateResult<Vec<StorageDescription>> {
        let mut all: Vec<StorageDescription> = self.scan_docs(STORAGE, "")?;
        if let Some(region) = region_id {
            all.retain(|s| s.region_id.as_deref() == Some(region));
        }
        Ok(all)
    }

    pub fn delete_storage(&self, link: &str) -> StateResult<bool> {
        self.delete_doc(STORAGE, link)
    }

    pub fn put_endpoint(&self, endpoint: &EndpointState) -> StateResult<()> {
        self.put_doc(ENDPOINTS, &endpoint.link, endpoint)
    }

    pub fn get_endpoint(&self, link: &str) -> StateResult<Option<EndpointState>> {
        self.get_doc(ENDPOINTS, link)
    }

    pub fn list_endpoints(&self) -> StateResult<Vec<EndpointState>> {
        self.scan_docs(ENDPOINTS, "")
    }

    pub fn delete_endpoint(&self, link: &str) -> StateResult<bool> {
        self.delete_doc(ENDPOINTS, link)
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Insert a metric sample.
    pub fn put_metrics(&self, sample: &ResourceMetrics) -> StateResult<()> {
        self.put_doc(METRICS, &sample.table_key(), sample)
    }

    /// Most recent metric sample for a resource.
    pub fn get_latest_metrics(&self, resource_link: &str) -> StateResult<Option<ResourceMetrics>> {
        let prefix = format!("{resource_link}|");
        let samples: Vec<ResourceMetrics> = self.scan_docs(METRICS, &prefix)?;
        Ok(samples
            .into_iter()
            .filter(|s| s.resource_link == resource_link)
            .max_by_key(|s| s.timestamp_micros))
    }

    /// Every sample of a resource, oldest first.
    pub fn list_metrics(&self, resource_link: &str) -> StateResult<Vec<ResourceMetrics>> {
        let prefix = format!("{resource_link}|");
        let mut samples: Vec<ResourceMetrics> = self.scan_docs(METRICS, &prefix)?;
        samples.retain(|s| s.resource_link == resource_link);
        samples.sort_by_key(|s| s.timestamp_micros);
        Ok(samples)
    }

    /// Drop every sample of a resource. Returns how many were removed.
    pub fn delete_metrics(&self, resource_link: &str) -> StateResult<usize> {
        let samples = self.list_metrics(resource_link)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METRICS).map_err(map_err!(Table))?;
            for sample in &samples {
                table.remove(sample.table_key().as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(resource = resource_link, removed = samples.len(), "metrics deleted");
        Ok(samples.len())
    }
}

/// Strip the anti-affinity prefix and enforcement suffix off an affinity entry.
///
/// Only a trailing `soft`/`hard` (whitespace allowed) is a suffix; any
/// other colon is part of the name.
fn affinity_target(entry: &str) -> &str {
    let entry = entry.trim();
    let entry = entry.strip_prefix('!').unwrap_or(entry);
    match entry.rsplit_once(':') {
        Some((name, suffix)) if matches!(suffix.trim(), "soft" | "hard") => name.trim(),
        _ => entry.trim(),
    }
}
