//! Subset configuration.

use serde::{Deserialize, Serialize};

use crate::traversal::JunctionConvention;
use crate::types::Crs;

/// Configuration for [`SubsetPipeline`](crate::pipeline::SubsetPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetConfig {
    /// Name of the layer holding the `{id, toid}` network (default: `network`).
    pub network_layer: String,
    /// Maximum layer extractions in flight (default: 4).
    pub concurrency: usize,
    /// Regex naming junction markers trimmed from the outlet (default: `^tnx-`).
    pub junction_pattern: String,
    /// CRS applied to geometry layers that do not carry one.
    pub default_crs: Option<Crs>,
    /// Layers extracted when the caller names none.
    pub layers: Vec<String>,
}

impl SubsetConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            network_layer: std::env::var("SUBSET_NETWORK_LAYER").unwrap_or(defaults.network_layer),
            concurrency: std::env::var("SUBSET_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.concurrency),
            junction_pattern: std::env::var("SUBSET_JUNCTION_PATTERN")
                .unwrap_or(defaults.junction_pattern),
            default_crs: std::env::var("SUBSET_DEFAULT_CRS")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(Crs::new),
            layers: std::env::var("SUBSET_LAYERS")
                .map(|s| parse_list(&s))
                .unwrap_or(defaults.layers),
        }
    }

    /// Builder: set the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Builder: set the default CRS.
    pub fn with_default_crs(mut self, crs: impl Into<String>) -> Self {
        self.default_crs = Some(Crs::new(crs));
        self
    }

    /// Concurrency limit, never below one.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Compile the junction pattern.
    pub fn junction(&self) -> Result<JunctionConvention, regex_lite::Error> {
        JunctionConvention::new(&self.junction_pattern)
    }
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            network_layer: "network".to_string(),
            concurrency: 4,
            junction_pattern: JunctionConvention::DEFAULT_PATTERN.to_string(),
            default_crs: None,
            layers: ["divides", "flowpaths", "network", "nexus"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Split a comma list, dropping blanks.
pub(crate) fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
