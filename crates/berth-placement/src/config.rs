//! placement.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};
use crate::filter::FilterKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    #[serde(default)]
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filters in the order the chain runs them.
    #[serde(default = "default_order")]
    pub order: Vec<FilterKind>,
    /// Treat an empty network affinity result as an error.
    #[serde(default)]
    pub network_fail_fast: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            network_fail_fast: false,
        }
    }
}

fn default_order() -> Vec<FilterKind> {
    FilterKind::ALL.to_vec()
}

impl PlacementConfig {
    pub fn from_file(path: &Path) -> PlacementResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlacementError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PlacementResult<Self> {
        let config: PlacementConfig =
            toml::from_str(content).map_err(|e| PlacementError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> PlacementResult<String> {
        toml::to_string_pretty(self).map_err(|e| PlacementError::Config(e.to_string()))
    }

    /// Reject an order that lists a filter twice.
    pub fn validate(&self) -> PlacementResult<()> {
        let mut seen = HashSet::new();
        for kind in &self.filters.order {
            if !seen.insert(kind) {
                return Err(PlacementError::Config(format!(
                    "filter `{kind}` listed more than once"
                )));
            }
        }
        Ok(())
    }
}
