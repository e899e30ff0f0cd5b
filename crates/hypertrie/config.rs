use serde::{Deserialize, Serialize};

use crate::error::HypertrieError;

/// Largest depth any context can be configured for.
pub const MAX_DEPTH: usize = 5;

const DEFAULT_BULK_SIZE: usize = 1_000_000;

/// Per-context settings, fixed when the context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Deepest hypertrie the context accepts. Must lie in `1..=MAX_DEPTH`.
    pub max_depth: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
        }
    }
}

impl ContextConfig {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn validate(&self) -> Result<(), HypertrieError> {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH {
            return Err(HypertrieError::DepthOutOfRange(self.max_depth));
        }
        Ok(())
    }
}

/// Whether a bulk pipeline adds entries or takes them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkMode {
    #[default]
    Insert,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Number of entries collected before they are committed in one update.
    pub bulk_size: usize,
    pub mode: BulkMode,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            bulk_size: DEFAULT_BULK_SIZE,
            mode: BulkMode::Insert,
        }
    }
}

impl BulkConfig {
    pub fn new(bulk_size: usize, mode: BulkMode) -> Self {
        Self { bulk_size, mode }
    }

    /// Bulk size clamped to at least `min`.
    pub(crate) fn effective_bulk_size(&self, min: usize) -> usize {
        self.bulk_size.max(min)
    }

    /// Size at which the de-duplication set is cleared.
    pub(crate) fn deduplication_limit(&self, min: usize) -> usize {
        4 * self.effective_bulk_size(min)
    }
}
