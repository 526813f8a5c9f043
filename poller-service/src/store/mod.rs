pub mod postgres;

#[cfg(test)]
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;

pub use postgres::PgStatisticsStore;

/// One persisted hour of a cumulative series. `start` is the UTC hour
/// bucket, `state` the usage delta for that hour, `sum` the running total
/// through the end of it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StatPoint {
    pub start: OffsetDateTime,
    pub state: f64,
    pub sum: f64,
}

/// Series description written alongside the points.
#[derive(Debug, Clone)]
pub struct SeriesMetadata {
    pub statistic_id: String,
    pub name: String,
    pub unit: &'static str,
    pub has_sum: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("statistics store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Narrow interface over the durable statistics store.
///
/// Append calls for one series are always sequential (single poll at a
/// time), so implementations need no locking of their own. `append` must
/// treat a re-submitted hour as an update of that row, never as a second
/// row: the reconciliation engine re-emits hours downstream of a gap with
/// freshly computed sums and relies on the store to accept the continuation.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Every persisted hour with `from <= start < to`, keyed by UTC hour.
    async fn read_range(
        &self,
        series_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<BTreeMap<OffsetDateTime, StatPoint>, StoreError>;

    /// The most recently persisted point, if the series was ever written.
    async fn read_latest(&self, series_id: &str) -> Result<Option<StatPoint>, StoreError>;

    async fn append(
        &self,
        series_id: &str,
        metadata: &SeriesMetadata,
        points: &[StatPoint],
    ) -> Result<(), StoreError>;
}
