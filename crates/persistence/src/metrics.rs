//! Store-side instrumentation: per-query latency, pool occupancy and
//! failed operations. Recording is a no-op until the API installs a recorder.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

pub const QUERY_SECONDS: &str = "invite_store_query_seconds";
pub const POOL_CONNECTIONS: &str = "invite_store_pool_connections";
pub const FAILURES_TOTAL: &str = "invite_store_failures_total";

pub fn record_query_duration(query: &'static str, seconds: f64) {
    histogram!(QUERY_SECONDS, "query" => query).record(seconds);
}

/// Counts a store operation that ended in a rolled-back transaction or a
/// database error.
pub fn record_store_failure() {
    counter!(FAILURES_TOTAL).increment(1);
}

/// Connection counts read from the pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    pub open: u32,
    pub idle: u32,
    pub max: u32,
}

impl PoolUsage {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            open: pool.size(),
            idle: pool.num_idle() as u32,
            max: pool.options().get_max_connections(),
        }
    }

    /// Connections checked out by a query. Sampling races can briefly report
    /// more idle than open connections.
    pub fn busy(&self) -> u32 {
        self.open.saturating_sub(self.idle)
    }
}

/// Publishes the pool occupancy. Called on every health check.
pub fn record_pool_metrics(pool: &PgPool) {
    let usage = PoolUsage::of(pool);
    gauge!(POOL_CONNECTIONS, "state" => "busy").set(f64::from(usage.busy()));
    gauge!(POOL_CONNECTIONS, "state" => "idle").set(f64::from(usage.idle));
    gauge!(POOL_CONNECTIONS, "state" => "max").set(f64::from(usage.max));
}

/// Measures one named query. Repositories start it before the statement and
/// call [`QueryTimer::record`] once the result is in hand, success or not:
///
/// ```ignore
/// let timer = QueryTimer::new("find_invite_code_by_id");
/// let result = sqlx::query_as::<_, InviteCodeEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// result
/// ```
pub struct QueryTimer {
    query: &'static str,
    started: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            started: Instant::now(),
        }
    }

    pub fn record(self) {
        record_query_duration(self.query, self.started.elapsed().as_secs_f64());
    }
}
