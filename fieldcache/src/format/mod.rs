use core::fmt;

use serde::{Deserialize, Serialize};

pub mod heatmap;
pub mod series;

pub use heatmap::{CachedHeatmapEntry, HeatmapResult};
pub use series::{CachedSeriesEntry, DataPoint, ForecastPoint, TimeSeriesResult};

/// Number of decimal places coordinates are rounded to when forming cache
/// keys. Four decimals is roughly 11 m at the equator, comfortably inside a
/// single satellite pixel, so GPS jitter between sessions maps to the same
/// key.
pub const COORD_DECIMALS: u32 = 4;

const COORD_SCALE: f64 = 10_000.0;

/// Round a coordinate to [`COORD_DECIMALS`] decimal places.
pub fn round_coord(value: f64) -> f64 {
    (value * COORD_SCALE).round() / COORD_SCALE
}

/// Identity of a cached entry: rounded coordinates plus the metric name.
///
/// Rounding happens at construction so write and read paths can never
/// disagree on the key for the same physical location.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    latitude: f64,
    longitude: f64,
    metric: String,
}

impl CacheKey {
    pub fn new(latitude: f64, longitude: f64, metric: impl Into<String>) -> Self {
        Self {
            latitude: round_coord(latitude),
            longitude: round_coord(longitude),
            metric: metric.into(),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Storage key: `lat_lon_metric` with decimal points replaced by `_` so
    /// the key is safe as a file name on every platform.
    pub fn encoded(&self) -> String {
        format!(
            "{}_{}_{}",
            encode_coord(self.latitude),
            encode_coord(self.longitude),
            self.metric
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}

fn encode_coord(value: f64) -> String {
    format!("{value:.4}").replace('.', "_")
}

/// Direction of a metric over the recent past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Improving => f.write_str("improving"),
            Trend::Declining => f.write_str("declining"),
            Trend::Stable => f.write_str("stable"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_key_rounds_to_four_decimals() {
        let key = CacheKey::new(19.076_004_9, 72.877_695_1, "NDVI");
        assert_eq!(key.encoded(), "19_0760_72_8777_NDVI");
    }

    #[test]
    fn test_same_rounded_coordinates_same_key() {
        let a = CacheKey::new(19.07601, 72.87769, "NDVI");
        let b = CacheKey::new(19.076_014, 72.877_692, "NDVI");
        assert_eq!(a.encoded(), b.encoded());
    }

    #[test]
    fn test_negative_coordinates_encode() {
        let key = CacheKey::new(-33.8688, -151.2093, "VV");
        assert_eq!(key.encoded(), "-33_8688_-151_2093_VV");
    }

    proptest! {
        #[test]
        fn test_encoding_is_rounding_idempotent(
            lat in -90.0f64..90.0,
            lon in -180.0f64..180.0,
        ) {
            let direct = CacheKey::new(lat, lon, "NDVI");
            let rounded = CacheKey::new(round_coord(lat), round_coord(lon), "NDVI");
            prop_assert_eq!(direct.encoded(), rounded.encoded());
        }
    }
}
