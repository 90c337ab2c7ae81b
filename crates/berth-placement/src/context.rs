//! Per-request filter parameters.

use std::collections::HashMap;

use berth_state::ComputeDescription;

/// Custom property holding the context id of a provisioning request.
pub const CONTEXT_ID_KEY: &str = "__composition_context_id";

/// Custom property flagging a cluster scale-out (`"true"`/`"false"`).
pub const CLUSTERING_OPERATION_KEY: &str = "__clustering_operation";

/// Custom property declaring how many instances a clustered description targets.
pub const CLUSTER_SIZE_KEY: &str = "__cluster_size";

/// Parameters of one placement request, built once and shared by every filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterContext {
    /// Groups every resource created by one logical request.
    pub context_id: String,
    /// Number of new instances placed by this request (at least 1).
    pub resource_count: u32,
    pub custom_properties: HashMap<String, String>,
}

impl FilterContext {
    pub fn new(context_id: impl Into<String>, resource_count: u32) -> Self {
        Self {
            context_id: context_id.into(),
            resource_count: resource_count.max(1),
            custom_properties: HashMap::new(),
        }
    }

    /// Build a context from request custom properties.
    ///
    /// The context id is taken from [`CONTEXT_ID_KEY`], falling back to
    /// `default_context_id` when the request does not carry one.
    pub fn from_properties(
        custom_properties: HashMap<String, String>,
        resource_count: u32,
        default_context_id: &str,
    ) -> Self {
        let context_id = custom_properties
            .get(CONTEXT_ID_KEY)
            .cloned()
            .unwrap_or_else(|| default_context_id.to_string());
        Self {
            context_id,
            resource_count: resource_count.max(1),
            custom_properties,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }

    /// Whether this request scales out an existing cluster.
    pub fn is_clustering_operation(&self) -> bool {
        self.custom_properties
            .get(CLUSTERING_OPERATION_KEY)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Declared cluster size: request property first, then the description's.
    ///
    /// Values that are not positive integers are ignored.
    pub fn cluster_size(&self, desc: &ComputeDescription) -> Option<u32> {
        let parse = |props: &HashMap<String, String>| {
            props
                .get(CLUSTER_SIZE_KEY)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|size| *size > 0)
        };
        parse(&self.custom_properties).or_else(|| parse(&desc.custom_properties))
    }
}
