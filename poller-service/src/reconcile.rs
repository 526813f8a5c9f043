//! Merges irregular hourly usage batches from the cloud into the durable
//! cumulative series without duplicating already-recorded hours.
//!
//! The cloud syncs roughly four times a day and may backfill hours after the
//! fact. Each cycle re-examines the trailing window, finds hours the store
//! does not have yet, and rebuilds the running sum forward from the last
//! persisted point before the earliest missing hour. Hours downstream of
//! that anchor are re-emitted with freshly computed sums; the store updates
//! those rows in place so the series stays internally consistent.

use std::collections::BTreeMap;

use time::{Duration, OffsetDateTime, UtcOffset};
use tracing::debug;

use cloud_client::UsagePoint;

use crate::store::{SeriesMetadata, StatPoint, StatisticsStore, StoreError};

/// Raw buckets whose hour starts more than this far past `now` are dropped
/// as a guard against clock skew or malformed cloud data.
pub const FUTURE_TOLERANCE: Duration = Duration::hours(1);

/// How far back to look for the anchor point just before the first missing
/// hour.
const BASELINE_LOOKBACK: Duration = Duration::hours(2);

/// Truncate a timestamp to the top of its hour and express it in UTC.
///
/// Truncation happens in the timestamp's own offset before conversion, so a
/// reading at `10:45+02:00` lands in the `08:00 UTC` bucket.
pub fn hour_bucket(ts: OffsetDateTime) -> OffsetDateTime {
    let truncated = ts
        .replace_minute(0)
        .and_then(|t| t.replace_second(0))
        .and_then(|t| t.replace_nanosecond(0))
        .expect("zeroed sub-hour components are always in range");
    truncated.to_offset(UtcOffset::UTC)
}

/// Group raw readings by hour bucket, summing volumes. Null volumes mean
/// "no reading yet" and are excluded rather than counted as zero.
pub fn aggregate_hourly(
    points: &[UsagePoint],
    now: OffsetDateTime,
) -> BTreeMap<OffsetDateTime, f64> {
    let mut hourly = BTreeMap::new();

    for point in points {
        let Some(volume) = point.water else { continue };

        let bucket = hour_bucket(point.time);
        if bucket > now + FUTURE_TOLERANCE {
            debug!(bucket = %bucket, "discarding reading too far in the future");
            continue;
        }

        *hourly.entry(bucket).or_insert(0.0) += volume;
    }

    hourly
}

/// Reconcile one device's raw series against its persisted cumulative
/// series. Returns the number of points written; zero means the store
/// already covered every reported hour.
pub async fn reconcile_series(
    store: &dyn StatisticsStore,
    series_id: &str,
    metadata: &SeriesMetadata,
    raw: &[UsagePoint],
    now: OffsetDateTime,
    window: Duration,
) -> Result<usize, StoreError> {
    let hourly = aggregate_hourly(raw, now);
    if hourly.is_empty() {
        debug!(series_id, "no aggregatable readings in raw series");
        return Ok(0);
    }

    let existing = store.read_range(series_id, now - window, now).await?;

    let missing: Vec<OffsetDateTime> = hourly
        .keys()
        .filter(|hour| !existing.contains_key(*hour))
        .copied()
        .collect();

    let Some(&first_missing) = missing.first() else {
        debug!(series_id, "statistics already up to date");
        return Ok(0);
    };
    debug!(
        series_id,
        missing = missing.len(),
        first_missing = %first_missing,
        "found missing hours"
    );

    // Anchor the running sum on the last persisted point strictly before
    // the first missing hour. A series that was never written starts from
    // zero; so does one whose tail is older than the lookback, which shows
    // up as a reset in the total-increasing series.
    let (base_time, base_sum) = if store.read_latest(series_id).await?.is_none() {
        (None, 0.0)
    } else {
        let before = store
            .read_range(series_id, first_missing - BASELINE_LOOKBACK, first_missing)
            .await?;
        match before.into_iter().next_back() {
            Some((start, point)) => (Some(start), point.sum),
            None => (None, 0.0),
        }
    };

    let mut cumulative_sum = base_sum;
    let mut stat_points = Vec::new();

    for (&hour, &usage) in &hourly {
        if base_time.is_some_and(|base| hour <= base) {
            continue;
        }

        cumulative_sum += usage;

        // Hours from the first missing one onward are all emitted, even
        // those already persisted: their sums must carry the newly filled
        // gap forward. Hours between the anchor and the gap only feed the
        // running sum.
        if hour >= first_missing {
            stat_points.push(StatPoint {
                start: hour,
                state: usage,
                sum: cumulative_sum,
            });
        }
    }

    if stat_points.is_empty() {
        return Ok(0);
    }

    debug!(
        series_id,
        points = stat_points.len(),
        final_sum = cumulative_sum,
        "appending reconciled statistics"
    );
    store.append(series_id, metadata, &stat_points).await?;
    Ok(stat_points.len())
}
