use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Trend;

/// One observed value of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// One forecast value, with optional confidence bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_high: Option<f64>,
}

/// Historical and forecast series for one metric at one location, as returned
/// by the analysis backend or computed locally from raw bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesResult {
    pub success: bool,
    pub metric: String,
    pub historical: Vec<DataPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub trend: Trend,
    pub stats: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// A [`TimeSeriesResult`] at rest in the cache.
///
/// `lat`/`lon` keep the caller's unrounded coordinates so fuzzy lookups can
/// measure real distance; the rounded form only lives in the storage key.
/// Entries are never mutated in place: a newer fetch supersedes this one
/// through version rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSeriesEntry {
    pub result: TimeSeriesResult,
    pub cached_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub metric: String,
}

impl CachedSeriesEntry {
    pub fn new(
        lat: f64,
        lon: f64,
        metric: impl Into<String>,
        result: TimeSeriesResult,
        cached_at: DateTime<Utc>,
    ) -> Self {
        Self { result, cached_at, lat, lon, metric: metric.into() }
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        Ok(serde_json::to_vec(self)?.into())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_entry() -> CachedSeriesEntry {
        let result = TimeSeriesResult {
            success: true,
            metric: "NDVI".to_string(),
            historical: vec![
                DataPoint {
                    date: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
                    value: 0.41,
                },
                DataPoint {
                    date: Utc.with_ymd_and_hms(2026, 7, 6, 0, 0, 0).unwrap(),
                    value: 0.47,
                },
            ],
            forecast: vec![ForecastPoint {
                date: Utc.with_ymd_and_hms(2026, 7, 11, 0, 0, 0).unwrap(),
                value: 0.52,
                confidence_low: Some(0.44),
                confidence_high: None,
            }],
            trend: Trend::Improving,
            stats: BTreeMap::from([("mean".to_string(), 0.44)]),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 6, 12, 30, 0).unwrap(),
        };
        CachedSeriesEntry::new(
            19.076_001,
            72.877_699,
            "NDVI",
            result,
            Utc.with_ymd_and_hms(2026, 7, 6, 12, 30, 5).unwrap(),
        )
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let entry = sample_entry();
        let bytes = entry.to_bytes().unwrap();
        let back = CachedSeriesEntry::from_slice(&bytes).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_missing_confidence_bounds_stay_absent() {
        let entry = sample_entry();
        let json: serde_json::Value =
            serde_json::from_slice(&entry.to_bytes().unwrap()).unwrap();
        let point = &json["result"]["forecast"][0];
        assert_eq!(point["confidence_low"], serde_json::json!(0.44));
        assert!(point.get("confidence_high").is_none());
    }

    #[test]
    fn test_trend_serializes_lowercase() {
        let json = serde_json::to_value(Trend::Declining).unwrap();
        assert_eq!(json, serde_json::json!("declining"));
    }
}
