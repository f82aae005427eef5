use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Heatmap analysis for one metric at one location, as returned by the
/// analysis backend. The rendered image arrives base64-encoded; the LLM
/// fields are only present for risk-type metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapResult {
    pub metric: String,
    pub mean_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub image_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
}

/// A [`HeatmapResult`] at rest in the cache. Single-version: each save fully
/// replaces the previous entry for the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedHeatmapEntry {
    pub lat: f64,
    pub lon: f64,
    pub metric: String,
    pub mean_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub image_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    pub cached_at: DateTime<Utc>,
}

impl CachedHeatmapEntry {
    pub fn new(lat: f64, lon: f64, result: HeatmapResult, cached_at: DateTime<Utc>) -> Self {
        Self {
            lat,
            lon,
            metric: result.metric,
            mean_value: result.mean_value,
            min_value: result.min_value,
            max_value: result.max_value,
            image_base64: result.image_base64,
            analysis: result.analysis,
            detailed_analysis: result.detailed_analysis,
            level: result.level,
            recommendations: result.recommendations,
            cached_at,
        }
    }

    /// Decode the stored image payload.
    pub fn image_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.image_base64)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
