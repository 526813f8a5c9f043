//! The transient per-cycle view of one device, plus the fixed value
//! projections the presentation layer reads. Snapshots are rebuilt wholesale
//! every poll and replaced atomically; nothing here is persisted.

use serde::Serialize;
use time::OffsetDateTime;

use cloud_client::{Device, UsagePoint};

pub const UNIT_LITERS: &str = "L";

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub device: Device,
    /// `None` while no actual reading exists for the current day. A day of
    /// confirmed zero usage is `Some(0.0)`; consumers must render the two
    /// differently.
    pub daily_total: Option<f64>,
    pub unit: &'static str,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
}

impl DeviceSnapshot {
    /// Build the snapshot from today's raw series and the full
    /// yesterday+today concatenation (ordered oldest first).
    pub fn build(device: Device, today: &[UsagePoint], combined: &[UsagePoint]) -> Self {
        Self {
            device,
            daily_total: daily_total(today),
            unit: UNIT_LITERS,
            last_sync_at: last_sync_at(combined),
        }
    }
}

/// Sum of today's non-null readings, or `None` when there are none yet.
pub fn daily_total(today: &[UsagePoint]) -> Option<f64> {
    let mut total = None;
    for point in today {
        if let Some(volume) = point.water {
            *total.get_or_insert(0.0) += volume;
        }
    }
    total
}

/// Timestamp of the most recent reading the cloud actually has, scanning
/// backward past the trailing null (future) hours.
pub fn last_sync_at(points: &[UsagePoint]) -> Option<OffsetDateTime> {
    points
        .iter()
        .rev()
        .find(|p| p.water.is_some())
        .map(|p| p.time)
}

/// The fixed set of display values derived from a snapshot. Replaces a
/// sensor-per-value class hierarchy: each projection is a pure function
/// from snapshot to value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    DailyTotal,
    LastSync,
    WifiSignal,
    OnlineState,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ProjectionValue {
    Number(f64),
    Text(String),
    Timestamp(#[serde(serialize_with = "time::serde::rfc3339::serialize")] OffsetDateTime),
    /// Serialized as `null`: the value is unknown, not zero.
    Unknown,
}

impl Projection {
    pub const ALL: [Projection; 4] = [
        Projection::DailyTotal,
        Projection::LastSync,
        Projection::WifiSignal,
        Projection::OnlineState,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Projection::DailyTotal => "daily_total",
            Projection::LastSync => "last_sync_at",
            Projection::WifiSignal => "wifi_signal",
            Projection::OnlineState => "online_state",
        }
    }

    pub fn value(&self, snapshot: &DeviceSnapshot) -> ProjectionValue {
        match self {
            Projection::DailyTotal => match snapshot.daily_total {
                Some(total) => ProjectionValue::Number(total),
                None => ProjectionValue::Unknown,
            },
            Projection::LastSync => match snapshot.last_sync_at {
                Some(at) => ProjectionValue::Timestamp(at),
                None => ProjectionValue::Unknown,
            },
            Projection::WifiSignal => {
                ProjectionValue::Number(snapshot.device.wifi_strength.unwrap_or(0.0))
            }
            Projection::OnlineState => ProjectionValue::Text(
                snapshot
                    .device
                    .online_state
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
            ),
        }
    }
}
