pub mod heatmap;
pub mod series;

pub use heatmap::HeatmapCache;
pub use series::TimeSeriesCache;
