//! Output-width policy.
//!
//! Checked before any query runs. Both thresholds are optional so the policy
//! can be advisory-only or uncapped.

use serde::{Deserialize, Serialize};

use super::errors::QueryGeneratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBudget {
    /// Warn when the column count reaches this value.
    pub warn_at: Option<usize>,
    /// Reject the request when the column count reaches this value.
    pub reject_at: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Within,
    Warn { count: usize, threshold: usize },
}

impl Default for ColumnBudget {
    fn default() -> Self {
        Self {
            warn_at: Some(50),
            reject_at: Some(100),
        }
    }
}

impl ColumnBudget {
    pub fn unlimited() -> Self {
        Self {
            warn_at: None,
            reject_at: None,
        }
    }

    pub fn check(&self, count: usize) -> Result<BudgetStatus, QueryGeneratorError> {
        if let Some(limit) = self.reject_at {
            if count >= limit {
                return Err(QueryGeneratorError::ColumnBudgetExceeded {
                    attempted: count,
                    limit,
                });
            }
        }
        match self.warn_at {
            Some(threshold) if count >= threshold => Ok(BudgetStatus::Warn { count, threshold }),
            _ => Ok(BudgetStatus::Within),
        }
    }
}
