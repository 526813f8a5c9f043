//! The poll cycle orchestrator: one cooperative loop that fetches cloud
//! data, drives reconciliation, and publishes fresh snapshots. A single
//! task owns the cycle, so polls never overlap; a manual refresh arriving
//! while a poll runs coalesces into at most one follow-up poll.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use time::{Duration, OffsetDateTime, UtcOffset};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use cloud_client::{CloudClient, Device, UsagePoint};

use crate::config::{CloudConfig, PollerConfig};
use crate::reconcile;
use crate::snapshot::{DeviceSnapshot, UNIT_LITERS};
use crate::store::{SeriesMetadata, StatisticsStore};

/// Source prefix for statistic ids, one series per physical device.
pub const STATISTIC_SOURCE: &str = "cloud_watermeter";

pub type SnapshotMap = HashMap<String, DeviceSnapshot>;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("update failed: {0}")]
    UpdateFailed(String),
}

pub struct Poller {
    client: CloudClient,
    store: Option<Arc<dyn StatisticsStore>>,
    home_id: i64,
    timezone: String,
    local_offset: UtcOffset,
    interval: std::time::Duration,
    window: Duration,
    snapshots: watch::Sender<SnapshotMap>,
    refresh: Arc<Notify>,
}

impl Poller {
    /// Build the poller and hand back the receiving side of the published
    /// snapshot map. The previous map stays readable until a successful
    /// cycle replaces it wholesale.
    pub fn new(
        client: CloudClient,
        store: Option<Arc<dyn StatisticsStore>>,
        cloud: &CloudConfig,
        poller: &PollerConfig,
    ) -> anyhow::Result<(Self, watch::Receiver<SnapshotMap>)> {
        let local_offset = UtcOffset::from_hms(cloud.utc_offset_hours, 0, 0)?;
        let (tx, rx) = watch::channel(SnapshotMap::new());

        Ok((
            Self {
                client,
                store,
                home_id: cloud.home_id,
                timezone: cloud.timezone.clone(),
                local_offset,
                interval: std::time::Duration::from_secs(poller.interval_minutes * 60),
                window: Duration::hours(poller.window_hours),
                snapshots: tx,
                refresh: Arc::new(Notify::new()),
            },
            rx,
        ))
    }

    /// Handle for requesting a poll outside the regular schedule.
    pub fn refresh_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.refresh)
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.refresh.notified() => {
                    debug!("manual refresh requested");
                }
            }
            self.poll_and_publish().await;
        }
    }

    async fn poll_and_publish(&self) {
        let started = Instant::now();
        match self.poll_once(OffsetDateTime::now_utc()).await {
            Ok(snapshots) => {
                metrics::counter!("poll_cycles_total").increment(1);
                metrics::histogram!("poll_cycle_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(devices = snapshots.len(), "poll cycle complete");
                self.snapshots.send_replace(snapshots);
            }
            Err(e) => {
                metrics::counter!("poll_failures_total").increment(1);
                warn!(error = %e, "poll cycle failed, keeping previous snapshots");
            }
        }
    }

    /// One full cycle against an explicit `now` (injected for tests).
    pub async fn poll_once(&self, now: OffsetDateTime) -> Result<SnapshotMap, PollError> {
        let devices = self
            .client
            .devices(self.home_id)
            .await
            .map_err(|e| PollError::UpdateFailed(format!("fetching device list: {e}")))?;

        let mut snapshots = SnapshotMap::new();
        for device in devices {
            if !device.is_watermeter() {
                continue;
            }
            debug!(identifier = %device.identifier, "found watermeter device, fetching data");

            let key = device.sanitized_id();
            match self.poll_device(device, now).await {
                Some(snapshot) => {
                    snapshots.insert(key, snapshot);
                }
                None => {
                    metrics::counter!("poll_devices_skipped_total").increment(1);
                }
            }
        }

        Ok(snapshots)
    }

    /// Fetch, reconcile and summarize one device. Returns `None` when the
    /// device is skipped this cycle; failures here never abort the cycle
    /// for other devices.
    async fn poll_device(&self, device: Device, now: OffsetDateTime) -> Option<DeviceSnapshot> {
        let today = now.to_offset(self.local_offset).date();
        let yesterday = today.previous_day()?;

        let stats_today = match self
            .client
            .hourly_series(&device.identifier, today, &self.timezone)
            .await
        {
            Ok(series) if !series.is_empty() => series,
            Ok(_) => {
                warn!(identifier = %device.identifier, "no data received for today, skipping device");
                return None;
            }
            Err(e) => {
                warn!(identifier = %device.identifier, error = %e, "failed to fetch today's series, skipping device");
                return None;
            }
        };

        let stats_yesterday = match self
            .client
            .hourly_series(&device.identifier, yesterday, &self.timezone)
            .await
        {
            Ok(series) if !series.is_empty() => series,
            Ok(_) => {
                warn!(identifier = %device.identifier, "no data received for yesterday, skipping device");
                return None;
            }
            Err(e) => {
                warn!(identifier = %device.identifier, error = %e, "failed to fetch yesterday's series, skipping device");
                return None;
            }
        };

        let mut combined: Vec<UsagePoint> = stats_yesterday.values;
        combined.extend(stats_today.values.iter().cloned());

        if let Some(store) = &self.store {
            let series_id = format!("{STATISTIC_SOURCE}:{}_total", device.sanitized_id());
            let metadata = SeriesMetadata {
                statistic_id: series_id.clone(),
                name: format!("{} Total", device.display_name()),
                unit: UNIT_LITERS,
                has_sum: true,
            };

            match reconcile::reconcile_series(
                store.as_ref(),
                &series_id,
                &metadata,
                &combined,
                now,
                self.window,
            )
            .await
            {
                Ok(0) => debug!(%series_id, "statistics already up to date"),
                Ok(appended) => info!(%series_id, appended, "injected reconciled statistics"),
                Err(e) => {
                    // The snapshot still goes out with freshly fetched data
                    // even when writing history failed.
                    metrics::counter!("store_write_errors_total").increment(1);
                    error!(%series_id, error = %e, "failed to write reconciled statistics");
                }
            }
        } else {
            debug!("statistics store not configured, skipping reconciliation");
        }

        Some(DeviceSnapshot::build(device, &stats_today.values, &combined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use cloud_client::CloudSession;
    use mockito::Matcher;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-10 12:00 UTC);

    fn poller_against(
        server: &mockito::ServerGuard,
        store: Option<Arc<dyn StatisticsStore>>,
    ) -> Poller {
        let cloud = CloudConfig {
            auth_base_url: server.url(),
            api_base_url: server.url(),
            email: "a@b.c".to_string(),
            password: "pw".to_string(),
            home_id: 42,
            timezone: "Europe/Amsterdam".to_string(),
            utc_offset_hours: 0,
        };
        let session = CloudSession::new(cloud.email.clone(), cloud.password.clone());
        let client =
            CloudClient::new(cloud.auth_base_url.clone(), cloud.api_base_url.clone(), session)
                .expect("client builds");
        let (poller, _rx) =
            Poller::new(client, store, &cloud, &PollerConfig::default()).expect("poller builds");
        poller
    }

    async fn mock_token(server: &mut mockito::ServerGuard) {
        server
            .mock("GET", "/v1/auth/account/token")
            .with_status(200)
            .with_body(r#"{"access_token": "tok"}"#)
            .create_async()
            .await;
    }

    async fn mock_devices(server: &mut mockito::ServerGuard, body: &str) {
        server
            .mock("GET", "/homes/42/devices")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;
    }

    async fn mock_usage(
        server: &mut mockito::ServerGuard,
        identifier: &str,
        date: &str,
        status: usize,
        body: &str,
    ) {
        server
            .mock("GET", format!("/devices/{identifier}/usage").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("date".into(), date.into()),
                Matcher::UrlEncoded("timezone".into(), "Europe/Amsterdam".into()),
            ]))
            .with_status(status)
            .with_body(body)
            .create_async()
            .await;
    }

    const TWO_METERS: &str = r#"{
        "data": {"home": {"devices": [
            {"identifier": "wtr-a", "type": "watermeter", "name": "Meter A"},
            {"identifier": "wtr-b", "type": "watermeter", "name": "Meter B"},
            {"identifier": "plug-1", "type": "socket"}
        ]}}
    }"#;

    #[tokio::test]
    async fn one_failing_device_does_not_block_the_others() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        mock_devices(&mut server, TWO_METERS).await;

        mock_usage(
            &mut server,
            "wtr-a",
            "2024-05-10",
            200,
            r#"{"values": [
                {"time": "2024-05-10T09:00:00Z", "water": 4.0},
                {"time": "2024-05-10T10:00:00Z", "water": 1.0},
                {"time": "2024-05-10T11:00:00Z", "water": null}
            ]}"#,
        )
        .await;
        mock_usage(
            &mut server,
            "wtr-a",
            "2024-05-09",
            200,
            r#"{"values": [{"time": "2024-05-09T22:00:00Z", "water": 2.0}]}"#,
        )
        .await;
        mock_usage(&mut server, "wtr-b", "2024-05-10", 500, "").await;

        let memory = Arc::new(MemoryStore::new());
        let poller = poller_against(&server, Some(memory.clone() as Arc<dyn StatisticsStore>));

        let snapshots = poller.poll_once(NOW).await.expect("cycle succeeds");

        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots["wtr-a"];
        assert_eq!(snapshot.daily_total, Some(5.0));
        assert_eq!(
            snapshot.last_sync_at,
            Some(datetime!(2024-05-10 10:00 UTC))
        );
        assert_eq!(snapshot.unit, "L");

        // Yesterday + today were reconciled into one continuous series.
        let points = memory.points("cloud_watermeter:wtr-a_total");
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].start, datetime!(2024-05-09 22:00 UTC));
        assert_eq!(points.last().map(|p| p.sum), Some(7.0));
    }

    #[tokio::test]
    async fn all_null_today_publishes_unknown_daily_total() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        mock_devices(
            &mut server,
            r#"{"data": {"home": {"devices": [
                {"identifier": "wtr-a", "type": "watermeter", "name": "Meter A"}
            ]}}}"#,
        )
        .await;
        mock_usage(
            &mut server,
            "wtr-a",
            "2024-05-10",
            200,
            r#"{"values": [{"time": "2024-05-10T09:00:00Z", "water": null}]}"#,
        )
        .await;
        mock_usage(
            &mut server,
            "wtr-a",
            "2024-05-09",
            200,
            r#"{"values": [{"time": "2024-05-09T20:00:00Z", "water": 3.0}]}"#,
        )
        .await;

        let poller = poller_against(&server, None);
        let snapshots = poller.poll_once(NOW).await.expect("cycle succeeds");

        let snapshot = &snapshots["wtr-a"];
        assert_eq!(snapshot.daily_total, None);
        assert_eq!(
            snapshot.last_sync_at,
            Some(datetime!(2024-05-09 20:00 UTC))
        );
    }

    #[tokio::test]
    async fn device_with_empty_series_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        mock_devices(
            &mut server,
            r#"{"data": {"home": {"devices": [
                {"identifier": "wtr-a", "type": "watermeter"}
            ]}}}"#,
        )
        .await;
        mock_usage(&mut server, "wtr-a", "2024-05-10", 200, r#"{"values": []}"#).await;

        let poller = poller_against(&server, None);
        let snapshots = poller.poll_once(NOW).await.expect("cycle succeeds");
        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn unreachable_device_list_fails_the_cycle() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/homes/42/devices")
            .with_status(502)
            .create_async()
            .await;

        let poller = poller_against(&server, None);
        let err = poller.poll_once(NOW).await.expect_err("cycle fails");
        assert!(matches!(err, PollError::UpdateFailed(_)));
    }
}
