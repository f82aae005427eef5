//! Vegetation and soil indices computed locally from raw satellite bands.
//!
//! Sentinel-2 band identifiers: B02 blue, B03 green, B04 red, B05 red edge,
//! B08 NIR, B11 SWIR-1, B12 SWIR-2. The band order declared per formula is
//! the order values are passed to its evaluation function; nothing else
//! enforces it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::format::{DataPoint, ForecastPoint, TimeSeriesResult, Trend};

pub const BAND_BLUE: &str = "B02";
pub const BAND_GREEN: &str = "B03";
pub const BAND_RED: &str = "B04";
pub const BAND_RED_EDGE: &str = "B05";
pub const BAND_NIR: &str = "B08";
pub const BAND_SWIR1: &str = "B11";
pub const BAND_SWIR2: &str = "B12";

/// Change, over the last five historical points, below which a series counts
/// as stable.
const TREND_EPSILON: f64 = 0.01;

/// A derived index: the raw bands it needs, in evaluation order, and the
/// arithmetic combining them.
#[derive(Clone, Copy)]
pub struct IndexFormula {
    pub name: &'static str,
    pub bands: &'static [&'static str],
    eval: fn(&[f64]) -> f64,
}

impl IndexFormula {
    /// Evaluate the formula for one timestamp. `values` must follow
    /// [`Self::bands`] order and length.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        debug_assert_eq!(values.len(), self.bands.len());
        (self.eval)(values)
    }
}

impl core::fmt::Debug for IndexFormula {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IndexFormula")
            .field("name", &self.name)
            .field("bands", &self.bands)
            .finish_non_exhaustive()
    }
}

static FORMULAS: &[IndexFormula] = &[
    IndexFormula { name: "NDVI", bands: &[BAND_NIR, BAND_RED], eval: ndvi },
    IndexFormula { name: "NDRE", bands: &[BAND_NIR, BAND_RED_EDGE], eval: ndre },
    IndexFormula { name: "PRI", bands: &[BAND_GREEN, BAND_RED], eval: pri },
    IndexFormula { name: "EVI", bands: &[BAND_NIR, BAND_RED, BAND_BLUE], eval: evi },
    IndexFormula { name: "SMI", bands: &[BAND_SWIR1, BAND_SWIR2], eval: smi },
    IndexFormula {
        name: "SOMI",
        bands: &[BAND_NIR, BAND_RED, BAND_SWIR1, BAND_SWIR2],
        eval: somi,
    },
    IndexFormula { name: "SASI", bands: &[BAND_SWIR1, BAND_RED], eval: sasi },
    IndexFormula {
        name: "SFI",
        bands: &[BAND_NIR, BAND_RED, BAND_SWIR1, BAND_SWIR2],
        eval: sfi,
    },
];

/// Look up the formula backing a derived index, `None` for raw metrics that
/// are fetched from the backend directly.
pub fn formula_for(metric: &str) -> Option<&'static IndexFormula> {
    FORMULAS.iter().find(|formula| formula.name == metric)
}

fn safe_divide(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        return 0.0;
    }
    let ratio = a / b;
    if ratio.is_finite() { ratio } else { 0.0 }
}

fn ndvi(v: &[f64]) -> f64 {
    let (nir, red) = (v[0], v[1]);
    safe_divide(nir - red, nir + red).clamp(-1.0, 1.0)
}

fn ndre(v: &[f64]) -> f64 {
    let (nir, red_edge) = (v[0], v[1]);
    safe_divide(nir - red_edge, nir + red_edge).clamp(-1.0, 1.0)
}

fn pri(v: &[f64]) -> f64 {
    let (green, red) = (v[0], v[1]);
    safe_divide(green - red, green + red).clamp(-1.0, 1.0)
}

fn evi(v: &[f64]) -> f64 {
    let (nir, red, blue) = (v[0], v[1], v[2]);
    (2.5 * safe_divide(nir - red, nir + 6.0 * red - 7.5 * blue + 1.0)).clamp(-1.0, 1.0)
}

fn smi(v: &[f64]) -> f64 {
    let (swir1, swir2) = (v[0], v[1]);
    safe_divide(swir1 - swir2, swir1 + swir2).clamp(-1.0, 1.0)
}

fn somi(v: &[f64]) -> f64 {
    let (nir, red, swir1, swir2) = (v[0], v[1], v[2], v[3]);
    safe_divide(nir + red, swir1 + swir2).clamp(0.0, 5.0)
}

fn sasi(v: &[f64]) -> f64 {
    let (swir1, red) = (v[0], v[1]);
    let product = swir1 * red;
    let value = if product > 0.0 { product.sqrt() } else { 0.0 };
    value.clamp(0.0, 1.0)
}

fn sfi(v: &[f64]) -> f64 {
    let ndvi_value = ndvi(&[v[0], v[1]]);
    let somi_value = somi(v);
    let sasi_value = sasi(&[v[2], v[1]]).max(0.001);
    (ndvi_value * somi_value / sasi_value).clamp(-10.0, 10.0)
}

/// Classify the trend of a historical series: compare the value five points
/// from the end against the final value.
pub fn classify_trend(values: &[f64]) -> Trend {
    let window = &values[values.len().saturating_sub(5)..];
    if window.len() < 2 {
        return Trend::Stable;
    }
    let delta = window[window.len() - 1] - window[0];
    if delta > TREND_EPSILON {
        Trend::Improving
    } else if delta < -TREND_EPSILON {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Combine raw band series into a derived index series.
///
/// `bands` must follow `formula.bands` order. Combination is positional:
/// position `i` is computed only when every band has a value there, and
/// skipped otherwise; dates come from the first band. Historical and
/// forecast series are combined independently.
pub fn compute_series(
    formula: &IndexFormula,
    bands: &[TimeSeriesResult],
    computed_at: DateTime<Utc>,
) -> TimeSeriesResult {
    let historical = combine_historical(formula, bands);
    let forecast = combine_forecast(formula, bands);
    let values: Vec<f64> = historical.iter().map(|p| p.value).collect();

    TimeSeriesResult {
        success: true,
        metric: formula.name.to_string(),
        trend: classify_trend(&values),
        stats: series_stats(&values),
        historical,
        forecast,
        timestamp: computed_at,
    }
}

fn combine_historical(
    formula: &IndexFormula,
    bands: &[TimeSeriesResult],
) -> Vec<DataPoint> {
    let len = bands.iter().map(|b| b.historical.len()).min().unwrap_or(0);
    (0..len)
        .map(|i| {
            let values: Vec<f64> = bands.iter().map(|b| b.historical[i].value).collect();
            DataPoint { date: bands[0].historical[i].date, value: formula.evaluate(&values) }
        })
        .collect()
}

fn combine_forecast(
    formula: &IndexFormula,
    bands: &[TimeSeriesResult],
) -> Vec<ForecastPoint> {
    let len = bands.iter().map(|b| b.forecast.len()).min().unwrap_or(0);
    (0..len)
        .map(|i| {
            let values: Vec<f64> = bands.iter().map(|b| b.forecast[i].value).collect();
            ForecastPoint {
                date: bands[0].forecast[i].date,
                value: formula.evaluate(&values),
                confidence_low: None,
                confidence_high: None,
            }
        })
        .collect()
}

fn series_stats(values: &[f64]) -> BTreeMap<String, f64> {
    if values.is_empty() {
        return BTreeMap::new();
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    BTreeMap::from([
        ("mean".to_string(), mean),
        ("min".to_string(), min),
        ("max".to_string(), max),
        ("std".to_string(), variance.sqrt()),
    ])
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn series(metric: &str, values: &[f64]) -> TimeSeriesResult {
        let historical = values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint {
                date: Utc.with_ymd_and_hms(2026, 7, 1 + i as u32, 0, 0, 0).unwrap(),
                value: *v,
            })
            .collect();
        TimeSeriesResult {
            success: true,
            metric: metric.to_string(),
            historical,
            forecast: vec![],
            trend: Trend::Stable,
            stats: BTreeMap::new(),
            timestamp: Utc.with_ymd_and_hms(2026, 7, 6, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_ndvi_from_cached_bands() {
        let formula = formula_for("NDVI").unwrap();
        let value = formula.evaluate(&[0.40, 0.10]);
        assert!((value - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominator_yields_zero() {
        let formula = formula_for("NDVI").unwrap();
        assert_eq!(formula.evaluate(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_sasi_negative_product_yields_zero() {
        let formula = formula_for("SASI").unwrap();
        assert_eq!(formula.evaluate(&[-0.2, 0.3]), 0.0);
    }

    #[test]
    fn test_sfi_survives_zero_salinity() {
        let formula = formula_for("SFI").unwrap();
        // SASI is 0 here, so the divisor is floored to 0.001
        let value = formula.evaluate(&[0.4, 0.0, 0.0, 0.1]);
        assert!(value.is_finite());
        assert!((-10.0..=10.0).contains(&value));
    }

    #[test]
    fn test_somi_clamped_to_range() {
        let formula = formula_for("SOMI").unwrap();
        assert_eq!(formula.evaluate(&[10.0, 10.0, 0.001, 0.001]), 5.0);
    }

    #[test]
    fn test_unknown_metric_has_no_formula() {
        assert!(formula_for("VV").is_none());
        assert!(formula_for("soil_moisture").is_none());
    }

    #[test]
    fn test_trend_window_uses_last_five_points() {
        // earlier points would suggest decline; the last-5 window rises
        assert_eq!(
            classify_trend(&[0.9, 0.8, 0.1, 0.1, 0.1, 0.1, 0.15]),
            Trend::Improving
        );
        assert_eq!(classify_trend(&[0.5, 0.5, 0.5, 0.5, 0.489]), Trend::Declining);
        assert_eq!(classify_trend(&[0.5, 0.505]), Trend::Stable);
        assert_eq!(classify_trend(&[0.5]), Trend::Stable);
    }

    #[test]
    fn test_combine_is_positional_and_truncates_to_shortest() {
        let formula = formula_for("NDVI").unwrap();
        let nir = series("B08", &[0.40, 0.50, 0.60]);
        let red = series("B04", &[0.10, 0.10]);

        let result = compute_series(
            formula,
            &[nir, red],
            Utc.with_ymd_and_hms(2026, 7, 6, 0, 0, 0).unwrap(),
        );

        assert_eq!(result.historical.len(), 2);
        assert!((result.historical[0].value - 0.6).abs() < 1e-9);
        assert!((result.historical[1].value - (0.4 / 0.6)).abs() < 1e-9);
        assert_eq!(result.metric, "NDVI");
        assert!(result.stats.contains_key("mean"));
    }
}
