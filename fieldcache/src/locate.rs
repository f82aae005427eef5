use crate::format::{CachedHeatmapEntry, CachedSeriesEntry};

/// Maximum Manhattan distance, in degrees, for a fuzzy match. Roughly 11 m
/// of combined drift, matching the key-rounding precision.
pub const FUZZY_THRESHOLD: f64 = 0.0001;

/// A cached entry that knows where it was recorded.
pub trait Located {
    fn latitude(&self) -> f64;
    fn longitude(&self) -> f64;
    fn metric(&self) -> &str;
}

impl Located for CachedSeriesEntry {
    fn latitude(&self) -> f64 {
        self.lat
    }

    fn longitude(&self) -> f64 {
        self.lon
    }

    fn metric(&self) -> &str {
        &self.metric
    }
}

impl Located for CachedHeatmapEntry {
    fn latitude(&self) -> f64 {
        self.lat
    }

    fn longitude(&self) -> f64 {
        self.lon
    }

    fn metric(&self) -> &str {
        &self.metric
    }
}

pub fn manhattan_distance(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    (lat_a - lat_b).abs() + (lon_a - lon_b).abs()
}

/// Find the candidate closest to the target, strictly inside the threshold.
///
/// The metric check repeats the fine filter here so every caller gets it,
/// whether candidates came from file names or record keys: a coarse
/// substring pre-filter would happily pass "NDVI_raw" for "NDVI".
///
/// Both comparisons are strict `<`: a candidate exactly at the threshold is
/// rejected, and on an exact distance tie the first-seen candidate wins.
/// Candidate order follows storage listing order, which callers must not
/// rely on being stable.
pub fn find_closest<T: Located>(
    lat: f64,
    lon: f64,
    metric: &str,
    candidates: impl IntoIterator<Item = T>,
) -> Option<T> {
    let mut best: Option<(f64, T)> = None;
    for candidate in candidates {
        if candidate.metric() != metric {
            continue;
        }
        let distance =
            manhattan_distance(lat, lon, candidate.latitude(), candidate.longitude());
        if distance >= FUZZY_THRESHOLD {
            continue;
        }
        match &best {
            Some((min, _)) if distance >= *min => {}
            _ => best = Some((distance, candidate)),
        }
    }
    best.map(|(_, candidate)| candidate)
}
