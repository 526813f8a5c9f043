use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::config::StatisticsConfig;
use crate::store::{SeriesMetadata, StatPoint, StatisticsStore, StoreError};

/// Postgres-backed statistics store.
///
/// `(series_id, hour_start)` is the primary key; re-submitted hours update
/// the row in place, which is exactly the duplicate handling the
/// reconciliation engine expects.
pub struct PgStatisticsStore {
    pool: PgPool,
}

impl PgStatisticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(cfg: &StatisticsConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.uri)
            .await?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the statistics tables if they do not exist. Safe to call on
    /// every startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watermeter_statistics (
                series_id   TEXT             NOT NULL,
                hour_start  TIMESTAMPTZ      NOT NULL,
                state       DOUBLE PRECISION NOT NULL,
                running_sum DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (series_id, hour_start)
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watermeter_statistics_meta (
                statistic_id TEXT PRIMARY KEY,
                name         TEXT    NOT NULL,
                unit         TEXT    NOT NULL,
                has_sum      BOOLEAN NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl StatisticsStore for PgStatisticsStore {
    async fn read_range(
        &self,
        series_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<BTreeMap<OffsetDateTime, StatPoint>, StoreError> {
        let rows = sqlx::query_as::<_, StatPoint>(
            r#"
            SELECT
                hour_start  AS "start",
                state,
                running_sum AS "sum"
            FROM watermeter_statistics
            WHERE series_id = $1
              AND hour_start >= $2
              AND hour_start <  $3
            ORDER BY hour_start
            "#,
        )
        .bind(series_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|p| (p.start, p)).collect())
    }

    async fn read_latest(&self, series_id: &str) -> Result<Option<StatPoint>, StoreError> {
        let row = sqlx::query_as::<_, StatPoint>(
            r#"
            SELECT
                hour_start  AS "start",
                state,
                running_sum AS "sum"
            FROM watermeter_statistics
            WHERE series_id = $1
            ORDER BY hour_start DESC
            LIMIT 1
            "#,
        )
        .bind(series_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn append(
        &self,
        series_id: &str,
        metadata: &SeriesMetadata,
        points: &[StatPoint],
    ) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO watermeter_statistics_meta (statistic_id, name, unit, has_sum)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (statistic_id) DO UPDATE
                SET name = EXCLUDED.name,
                    unit = EXCLUDED.unit,
                    has_sum = EXCLUDED.has_sum
            "#,
        )
        .bind(&metadata.statistic_id)
        .bind(&metadata.name)
        .bind(metadata.unit)
        .bind(metadata.has_sum)
        .execute(&mut *tx)
        .await?;

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO watermeter_statistics (series_id, hour_start, state, running_sum) ",
        );
        builder.push_values(points, |mut b, p| {
            b.push_bind(series_id)
                .push_bind(p.start)
                .push_bind(p.state)
                .push_bind(p.sum);
        });
        builder.push(
            " ON CONFLICT (series_id, hour_start) DO UPDATE \
             SET state = EXCLUDED.state, running_sum = EXCLUDED.running_sum",
        );

        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        metrics::counter!("statistics_points_appended_total").increment(points.len() as u64);
        Ok(())
    }
}
