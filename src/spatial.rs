use crate::EARTH_RADIUS_METERS;
use crate::models::ClusterPoint;
use geo_types::Coord;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

/// Smallest meters-per-degree anywhere on the ellipsoid (latitude direction,
/// near the equator). Used to over-approximate a metric radius in degrees.
const MIN_METERS_PER_DEGREE: f64 = 110_574.0;

/// Spatial-neighbor index boundary consumed by the clustering engine.
///
/// `query` returns the indices of all indexed points within `radius_meters`
/// of `center` (boundary inclusive, no guaranteed order). The index excludes
/// nothing: filtering out the query origin and ineligible points is the
/// engine's responsibility. Rebuilding via `initialize` must not overlap with
/// in-flight queries; taking `&mut self` here makes that exclusion
/// compiler-enforced once the index is shared behind an `Arc`.
pub trait NeighborIndex: Send + Sync {
    fn initialize(&mut self, points: &[ClusterPoint]);
    fn query(&self, center: Coord<f64>, radius_meters: f64) -> Vec<usize>;
}

#[derive(Debug, Clone)]
struct SpatialPoint {
    index: usize,
    /// [lon, lat]
    position: [f64; 2],
}

impl RTreeObject for SpatialPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for SpatialPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Default neighbor index: an R-tree over degree space with an exact
/// haversine post-filter. Queries are O(log n + k).
#[derive(Debug, Default)]
pub struct RtreeNeighborIndex {
    tree: RTree<SpatialPoint>,
}

impl RtreeNeighborIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Degree radius that is guaranteed to cover a metric radius at the
    /// given latitude. Longitude degrees shrink with cos(lat); the cosine is
    /// clamped so polar queries degrade to a wide scan instead of dividing
    /// by zero (exact pole behavior is out of scope).
    fn covering_degree_radius(lat: f64, radius_meters: f64) -> f64 {
        let meters_per_degree = MIN_METERS_PER_DEGREE * lat.to_radians().cos().max(0.05);
        radius_meters / meters_per_degree
    }
}

impl NeighborIndex for RtreeNeighborIndex {
    fn initialize(&mut self, points: &[ClusterPoint]) {
        let wrapped: Vec<SpatialPoint> = points
            .iter()
            .map(|p| SpatialPoint {
                index: p.index,
                position: [p.position.x, p.position.y],
            })
            .collect();
        self.tree = RTree::bulk_load(wrapped);
    }

    fn query(&self, center: Coord<f64>, radius_meters: f64) -> Vec<usize> {
        let degree_radius = Self::covering_degree_radius(center.y, radius_meters);
        self.tree
            .locate_within_distance([center.x, center.y], degree_radius * degree_radius)
            .filter(|p| {
                let candidate = Coord {
                    x: p.position[0],
                    y: p.position[1],
                };
                haversine_distance_meters(center, candidate) <= radius_meters
            })
            .map(|p| p.index)
            .collect()
    }
}

/// Distance in meters between two lon/lat coordinates.
pub fn haversine_distance_meters(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let d_lat = (b.y - a.y).to_radians();
    let d_lon = (b.x - a.x).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.y.to_radians().cos() * b.y.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(index: usize, lat: f64, lon: f64) -> ClusterPoint {
        ClusterPoint {
            index,
            id: format!("dev-{index}"),
            position: Coord { x: lon, y: lat },
            eligible: true,
        }
    }

    #[test]
    fn test_haversine_distance() {
        // LA to NYC
        let la = Coord {
            x: -118.2437,
            y: 34.0522,
        };
        let nyc = Coord {
            x: -74.0060,
            y: 40.7128,
        };
        let dist = haversine_distance_meters(la, nyc);
        assert!(dist > 3_930_000.0 && dist < 3_950_000.0);

        let origin = Coord { x: 0.0, y: 0.0 };
        assert_eq!(haversine_distance_meters(origin, origin), 0.0);
    }

    #[test]
    fn test_query_includes_origin_and_boundary() {
        let points = vec![
            point(0, 34.0000, -118.0000),
            point(1, 34.0009, -118.0000), // ~100m north
            point(2, 34.0900, -118.0000), // ~10km north
        ];
        let mut index = RtreeNeighborIndex::new();
        index.initialize(&points);

        let mut found = index.query(points[0].position, 500.0);
        found.sort_unstable();
        // The index excludes nothing, so the query origin itself is returned.
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn test_query_empty_index() {
        let index = RtreeNeighborIndex::new();
        assert!(index.is_empty());
        let center = Coord { x: 0.0, y: 0.0 };
        assert!(index.query(center, 1_000.0).is_empty());
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut index = RtreeNeighborIndex::new();
        index.initialize(&[point(0, 10.0, 10.0)]);
        assert_eq!(index.len(), 1);

        index.initialize(&[point(0, -10.0, -10.0), point(1, -10.001, -10.0)]);
        assert_eq!(index.len(), 2);
        let center = Coord { x: 10.0, y: 10.0 };
        assert!(index.query(center, 1_000.0).is_empty());
    }
}
