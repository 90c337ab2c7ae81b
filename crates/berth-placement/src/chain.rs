//! Ordered composition of host filters.

use std::sync::Arc;

use berth_state::{ComputeDescription, DocumentReader};
use tracing::{debug, warn};

use crate::config::FilterConfig;
use crate::context::FilterContext;
use crate::error::PlacementResult;
use crate::filter::{FilterKind, HostFilter};
use crate::selection::CandidateMap;

/// Filters folded left to right: the output of one is the input of the
/// next. The first error stops the chain.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<HostFilter>,
}

impl FilterChain {
    pub fn new(filters: Vec<HostFilter>) -> Self {
        Self { filters }
    }

    /// Build the configured chain for one description.
    pub fn for_description(desc: Arc<ComputeDescription>, config: &FilterConfig) -> Self {
        let filters = config
            .order
            .iter()
            .map(|kind| HostFilter::new(*kind, desc.clone(), config))
            .collect();
        Self { filters }
    }

    pub fn kinds(&self) -> Vec<FilterKind> {
        self.filters.iter().map(HostFilter::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub async fn apply(
        &self,
        reader: &dyn DocumentReader,
        ctx: &FilterContext,
        candidates: CandidateMap,
    ) -> PlacementResult<CandidateMap> {
        let mut current = candidates;
        for filter in &self.filters {
            let before = current.len();
            current = match filter.filter(reader, ctx, &current).await {
                Ok(narrowed) => narrowed,
                Err(e) => {
                    warn!(
                        filter = %filter.kind(),
                        context = %ctx.context_id,
                        error = %e,
                        "filter failed, aborting chain"
                    );
                    return Err(e);
                }
            };
            debug!(
                filter = %filter.kind(),
                context = %ctx.context_id,
                before,
                after = current.len(),
                "filter applied"
            );
        }
        Ok(current)
    }
}
