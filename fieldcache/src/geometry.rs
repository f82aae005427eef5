//! Small geometry helpers shared by field-boundary consumers.

/// Order polygon vertices counter-clockwise around their centroid, so an
/// unordered point set draws as a non-self-intersecting polygon.
///
/// Points are `(lat, lon)` pairs, sorted by `atan2(lon - c_lon, lat - c_lat)`
/// ascending. Two or fewer points are returned unchanged; the ordering is
/// degenerate there.
pub fn order_vertices(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let n = points.len() as f64;
    let (lat_sum, lon_sum) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), point| (lat + point.0, lon + point.1));
    let (c_lat, c_lon) = (lat_sum / n, lon_sum / n);

    let mut ordered = points.to_vec();
    ordered.sort_by(|a, b| {
        let angle_a = (a.1 - c_lon).atan2(a.0 - c_lat);
        let angle_b = (b.1 - c_lon).atan2(b.0 - c_lat);
        angle_a.total_cmp(&angle_b)
    });
    ordered
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_two_points_returned_unchanged() {
        let points = vec![(1.0, 2.0), (0.0, 0.0)];
        assert_eq!(order_vertices(&points), points);
    }

    #[test]
    fn test_square_orders_around_centroid() {
        // a unit square given in a crossing order
        let scrambled = vec![(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0)];
        let ordered = order_vertices(&scrambled);

        // consecutive vertices must be adjacent corners, never diagonal
        for pair in ordered.windows(2) {
            let span = (pair[0].0 - pair[1].0).abs() + (pair[0].1 - pair[1].1).abs();
            assert_eq!(span, 1.0);
        }
    }

    #[test]
    fn test_ordering_is_rotation_of_the_hull() {
        let hull =
            vec![(0.0, 0.0), (0.0, 1.0), (1.0, 2.0), (2.0, 1.0), (2.0, 0.0), (1.0, -1.0)];
        let ordered = order_vertices(&hull);
        assert_eq!(ordered.len(), hull.len());
        for point in &hull {
            assert!(ordered.contains(point));
        }
    }
}
