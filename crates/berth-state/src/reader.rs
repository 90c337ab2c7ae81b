//! Asynchronous read access to the document store.
//!
//! Host selection never writes. Every query it issues goes through
//! [`DocumentReader`], whose methods return boxed futures so filters can
//! issue several reads at once and join them without occupying a thread
//! while they wait.
//!
//! [`StateStore`] implements the trait by running each redb read on
//! tokio's blocking pool. Tests substitute their own readers to inject
//! upstream failures.

use std::future::Future;
use std::pin::Pin;

use crate::error::{StateError, StateResult};
use crate::store::StateStore;
use crate::types::*;

/// Boxed future alias for document reads.
pub type ReadFuture<'a, T> = Pin<Box<dyn Future<Output = StateResult<T>> + Send + 'a>>;

/// Read-only queries issued during host selection.
pub trait DocumentReader: Send + Sync {
    /// Fetch a compute description by link.
    fn description<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<ComputeDescription>>;

    /// Descriptions whose name is one of `names`.
    fn descriptions_named<'a>(&'a self, names: &'a [String])
    -> ReadFuture<'a, Vec<ComputeDescription>>;

    /// Descriptions declaring any affinity entry toward `name`.
    fn descriptions_with_affinity_to<'a>(
        &'a self,
        name: &'a str,
    ) -> ReadFuture<'a, Vec<ComputeDescription>>;

    /// Instances placed within `context_id`, restricted to `description_links`
    /// unless the slice is empty.
    fn instances_in_context<'a>(
        &'a self,
        context_id: &'a str,
        description_links: &'a [String],
    ) -> ReadFuture<'a, Vec<ComputeInstance>>;

    /// Hosts that are members of a resource pool.
    fn hosts_in_pool<'a>(&'a self, pool_link: &'a str) -> ReadFuture<'a, Vec<HostState>>;

    /// The compute network named `name` within `context_id`.
    fn compute_network<'a>(
        &'a self,
        context_id: &'a str,
        name: &'a str,
    ) -> ReadFuture<'a, Option<ComputeNetwork>>;

    fn network_profile<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<NetworkProfile>>;

    fn subnet<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<Subnet>>;

    fn storage_description<'a>(
        &'a self,
        link: &'a str,
    ) -> ReadFuture<'a, Option<StorageDescription>>;

    /// Datastores in a region; every datastore when `region_id` is `None`.
    fn storage_in_region<'a>(
        &'a self,
        region_id: Option<&'a str>,
    ) -> ReadFuture<'a, Vec<StorageDescription>>;

    /// Most recent metric sample recorded for a resource.
    fn latest_metrics<'a>(&'a self, resource_link: &'a str)
    -> ReadFuture<'a, Option<ResourceMetrics>>;

    fn endpoint<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<EndpointState>>;
}

impl StateStore {
    /// Run a synchronous store read on the blocking pool.
    fn read_blocking<T, F>(&self, read: F) -> ReadFuture<'static, T>
    where
        T: Send + 'static,
        F: FnOnce(&StateStore) -> StateResult<T> + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || read(&store))
                .await
                .map_err(|e| StateError::Read(format!("blocking read aborted: {e}")))?
        })
    }
}

impl DocumentReader for StateStore {
    fn description<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<ComputeDescription>> {
        let link = link.to_string();
        self.read_blocking(move |s| s.get_description(&link))
    }

    fn descriptions_named<'a>(
        &'a self,
        names: &'a [String],
    ) -> ReadFuture<'a, Vec<ComputeDescription>> {
        let names = names.to_vec();
        self.read_blocking(move |s| s.list_descriptions_named(&names))
    }

    fn descriptions_with_affinity_to<'a>(
        &'a self,
        name: &'a str,
    ) -> ReadFuture<'a, Vec<ComputeDescription>> {
        let name = name.to_string();
        self.read_blocking(move |s| s.list_descriptions_with_affinity_to(&name))
    }

    fn instances_in_context<'a>(
        &'a self,
        context_id: &'a str,
        description_links: &'a [String],
    ) -> ReadFuture<'a, Vec<ComputeInstance>> {
        let context_id = context_id.to_string();
        let links = description_links.to_vec();
        self.read_blocking(move |s| s.list_instances_in_context(&context_id, &links))
    }

    fn hosts_in_pool<'a>(&'a self, pool_link: &'a str) -> ReadFuture<'a, Vec<HostState>> {
        let pool_link = pool_link.to_string();
        self.read_blocking(move |s| s.list_hosts_in_pool(&pool_link))
    }

    fn compute_network<'a>(
        &'a self,
        context_id: &'a str,
        name: &'a str,
    ) -> ReadFuture<'a, Option<ComputeNetwork>> {
        let context_id = context_id.to_string();
        let name = name.to_string();
        self.read_blocking(move |s| s.get_compute_network(&context_id, &name))
    }

    fn network_profile<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<NetworkProfile>> {
        let link = link.to_string();
        self.read_blocking(move |s| s.get_network_profile(&link))
    }

    fn subnet<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<Subnet>> {
        let link = link.to_string();
        self.read_blocking(move |s| s.get_subnet(&link))
    }

    fn storage_description<'a>(
        &'a self,
        link: &'a str,
    ) -> ReadFuture<'a, Option<StorageDescription>> {
        let link = link.to_string();
        self.read_blocking(move |s| s.get_storage(&link))
    }

    fn storage_in_region<'a>(
        &'a self,
        region_id: Option<&'a str>,
    ) -> ReadFuture<'a, Vec<StorageDescription>> {
        let region_id = region_id.map(str::to_string);
        self.read_blocking(move |s| s.list_storage_in_region(region_id.as_deref()))
    }

    fn latest_metrics<'a>(
        &'a self,
        resource_link: &'a str,
    ) -> ReadFuture<'a, Option<ResourceMetrics>> {
        let resource_link = resource_link.to_string();
        self.read_blocking(move |s| s.get_latest_metrics(&resource_link))
    }

    fn endpoint<'a>(&'a self, link: &'a str) -> ReadFuture<'a, Option<EndpointState>> {
        let link = link.to_string();
        self.read_blocking(move |s| s.get_endpoint(&link))
    }
}
