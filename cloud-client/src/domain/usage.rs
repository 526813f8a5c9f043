use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One raw reading from the cloud time series.
///
/// `water` is the volume in liters accumulated for the slot. `None` means the
/// cloud has no reading for that time yet (typically future hours of the
/// requested day) and is distinct from a confirmed zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePoint {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub water: Option<f64>,
}

/// The `{"values": [...]}` envelope returned for one calendar day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaySeries {
    #[serde(default)]
    pub values: Vec<UsagePoint>,
}

impl DaySeries {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn usage_point_parses_null_volume() {
        let json = r#"{"values": [
            {"time": "2024-05-10T08:00:00Z", "water": 12.5},
            {"time": "2024-05-10T09:00:00Z", "water": null}
        ]}"#;

        let series: DaySeries = serde_json::from_str(json).expect("valid payload");
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.values[0].time, datetime!(2024-05-10 08:00 UTC));
        assert_eq!(series.values[0].water, Some(12.5));
        assert!(series.values[1].water.is_none());
    }

    #[test]
    fn empty_envelope_deserializes() {
        let series: DaySeries = serde_json::from_str("{}").expect("valid payload");
        assert!(series.is_empty());
    }
}
