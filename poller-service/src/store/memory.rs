//! In-memory statistics store used by engine and poller tests. Mirrors the
//! Postgres upsert contract: one row per (series, hour), re-submitted hours
//! replace the row.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::store::{SeriesMetadata, StatPoint, StatisticsStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    series: Mutex<HashMap<String, BTreeMap<OffsetDateTime, StatPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a point directly, bypassing the append path.
    pub fn seed(&self, series_id: &str, point: StatPoint) {
        let mut series = self.series.lock().expect("store lock");
        series
            .entry(series_id.to_string())
            .or_default()
            .insert(point.start, point);
    }

    pub fn points(&self, series_id: &str) -> Vec<StatPoint> {
        let series = self.series.lock().expect("store lock");
        series
            .get(series_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatisticsStore for MemoryStore {
    async fn read_range(
        &self,
        series_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<BTreeMap<OffsetDateTime, StatPoint>, StoreError> {
        let series = self.series.lock().expect("store lock");
        Ok(series
            .get(series_id)
            .map(|m| {
                m.range(from..to)
                    .map(|(start, p)| (*start, p.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_latest(&self, series_id: &str) -> Result<Option<StatPoint>, StoreError> {
        let series = self.series.lock().expect("store lock");
        Ok(series
            .get(series_id)
            .and_then(|m| m.values().next_back().cloned()))
    }

    async fn append(
        &self,
        series_id: &str,
        _metadata: &SeriesMetadata,
        points: &[StatPoint],
    ) -> Result<(), StoreError> {
        let mut series = self.series.lock().expect("store lock");
        let entry = series.entry(series_id.to_string()).or_default();
        for p in points {
            entry.insert(p.start, p.clone());
        }
        Ok(())
    }
}
