use core::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::format::{HeatmapResult, TimeSeriesResult};

/// Analysis requests can take minutes: the backend may re-run a satellite
/// pipeline before answering.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analysis backend returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("cannot decode backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type RemoteResult<A> = Result<A, RemoteError>;

/// Body of a time-series request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesRequest {
    pub center_lat: f64,
    pub center_lon: f64,
    pub field_size_hectares: f64,
    pub metric: String,
    pub days_history: u32,
    pub days_forecast: u32,
}

/// Body of a heatmap request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapRequest {
    pub center_lat: f64,
    pub center_lon: f64,
    pub field_size_hectares: f64,
    pub metric: String,
}

/// The remote analysis services, treated as opaque, possibly-slow,
/// possibly-failing collaborators. Tests substitute a scripted
/// implementation.
#[async_trait]
pub trait AnalysisBackend: fmt::Debug + Send + Sync {
    async fn fetch_time_series(
        &self,
        request: &TimeSeriesRequest,
    ) -> RemoteResult<TimeSeriesResult>;

    async fn fetch_heatmap(&self, request: &HeatmapRequest)
    -> RemoteResult<HeatmapResult>;
}

/// JSON-over-HTTP implementation of [`AnalysisBackend`].
#[derive(Debug, Clone)]
pub struct HttpAnalysisBackend {
    client: reqwest::Client,
    time_series_url: String,
    heatmap_url: String,
}

impl HttpAnalysisBackend {
    pub fn new(
        time_series_url: impl Into<String>,
        heatmap_url: impl Into<String>,
    ) -> RemoteResult<Self> {
        let client =
            reqwest::Client::builder().timeout(DEFAULT_REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            time_series_url: time_series_url.into(),
            heatmap_url: heatmap_url.into(),
        })
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> RemoteResult<T> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message =
                summarize_response_body(&response.text().await.unwrap_or_default());
            return Err(RemoteError::Api { status: status.as_u16(), message });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn fetch_time_series(
        &self,
        request: &TimeSeriesRequest,
    ) -> RemoteResult<TimeSeriesResult> {
        self.post_json(&self.time_series_url, request).await
    }

    async fn fetch_heatmap(
        &self,
        request: &HeatmapRequest,
    ) -> RemoteResult<HeatmapResult> {
        self.post_json(&self.heatmap_url, request).await
    }
}

/// Keep error bodies loggable: single line, bounded length.
fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 800;
    let compact = raw.replace(['\n', '\r'], " ");
    match compact.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &compact[..cut]),
        None => compact,
    }
}
