//! Search criteria

use serde::{Deserialize, Serialize};
use solvanity_pattern::{PatternError, SearchPattern};

use crate::worker::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};

/// What to search for and how many workers to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCriteria {
    /// Required address prefix ("" = any)
    pub prefix: String,
    /// Accepted address suffixes, any one of which must match ([] = any)
    pub suffixes: Vec<String>,
    /// Compare case-sensitively
    pub match_case: bool,
    /// Requested worker count (0 = auto)
    pub workers: usize,
    /// Attempts per micro-batch between stop checks (0 = default)
    pub batch_size: usize,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffixes: Vec::new(),
            match_case: false,
            workers: 0, // Auto-detect
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SearchCriteria {
    /// Criteria with only a prefix
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Criteria with only a suffix
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self::default().with_suffix(suffix)
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffixes.push(suffix.into());
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.match_case = true;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validate and build the matcher the workers share
    pub fn compile(&self) -> Result<SearchPattern, PatternError> {
        SearchPattern::new(&self.prefix, self.suffixes.iter().cloned(), self.match_case)
    }

    /// Micro-batch size actually used by workers
    pub fn effective_batch_size(&self) -> usize {
        match self.batch_size {
            0 => DEFAULT_BATCH_SIZE,
            n => n.min(MAX_BATCH_SIZE),
        }
    }
}

/// Worker count for a request, leaving one unit for the controller.
///
/// `requested == 0` takes the upper bound.
pub fn effective_workers(requested: usize, available: usize) -> usize {
    let max = available.saturating_sub(1).max(1);
    if requested == 0 {
        max
    } else {
        requested.clamp(1, max)
    }
}
