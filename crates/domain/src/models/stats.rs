//! Pool statistics.

use serde::{Deserialize, Serialize};

/// Aggregate counters over the code inventory and the usage ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeStatistics {
    pub total: i64,
    /// Codes in status `available` with capacity left.
    pub available: i64,
    pub active: i64,
    pub exhausted: i64,
    pub invalid: i64,
    /// Every ledger row ever created (minus rows removed with their code).
    pub total_claims: i64,
    pub needs_review: i64,
}
