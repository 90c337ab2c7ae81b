//! Placement entry point: seed the chain from a resource pool and run it.

use std::collections::HashMap;
use std::sync::Arc;

use berth_state::DocumentReader;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chain::FilterChain;
use crate::config::PlacementConfig;
use crate::context::FilterContext;
use crate::error::{PlacementError, PlacementResult};
use crate::selection::{CandidateMap, candidates_from_hosts};

/// A request to place instances of one description into a resource pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    /// Used as the context id when the custom properties carry none.
    pub request_id: String,
    pub resource_pool_link: String,
    pub description_link: String,
    #[serde(default = "default_resource_count")]
    pub resource_count: u32,
    #[serde(default)]
    pub custom_properties: HashMap<String, String>,
}

fn default_resource_count() -> u32 {
    1
}

/// Hosts eligible for a request after every filter ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub request_id: String,
    pub context_id: String,
    pub description_link: String,
    pub hosts: CandidateMap,
}

/// Select the eligible hosts for `request`.
///
/// An empty selection is reported as [`PlacementError::NoEligibleHost`].
pub async fn place(
    reader: &dyn DocumentReader,
    config: &PlacementConfig,
    request: &PlacementRequest,
) -> PlacementResult<PlacementDecision> {
    let desc = reader
        .description(&request.description_link)
        .await?
        .ok_or_else(|| PlacementError::DescriptionNotFound(request.description_link.clone()))?;
    let desc = Arc::new(desc);

    let ctx = FilterContext::from_properties(
        request.custom_properties.clone(),
        request.resource_count,
        &request.request_id,
    );
    let hosts = reader.hosts_in_pool(&request.resource_pool_link).await?;
    let candidates = candidates_from_hosts(&hosts);

    info!(
        request = %request.request_id,
        context = %ctx.context_id,
        description = %desc.name,
        pool = %request.resource_pool_link,
        candidates = candidates.len(),
        resource_count = ctx.resource_count,
        "selecting hosts"
    );

    let chain = FilterChain::for_description(desc.clone(), &config.filters);
    let selected = chain.apply(reader, &ctx, candidates).await?;

    if selected.is_empty() {
        warn!(
            request = %request.request_id,
            description = %desc.name,
            "no eligible host"
        );
        return Err(PlacementError::NoEligibleHost(desc.name.clone()));
    }

    info!(
        request = %request.request_id,
        description = %desc.name,
        hosts = selected.len(),
        "hosts selected"
    );
    Ok(PlacementDecision {
        request_id: request.request_id.clone(),
        context_id: ctx.context_id,
        description_link: desc.link.clone(),
        hosts: selected,
    })
}
