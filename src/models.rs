use geo_types::Coord;
use serde::{Deserialize, Serialize};

/// A geo-located device as handed to the pipeline by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub offline: bool,
    pub aggregatable: bool,
}

impl Device {
    pub fn has_valid_coordinates(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// A device participates in clustering only when it is offline,
    /// aggregatable, and carries a plausible coordinate pair.
    pub fn is_clustering_candidate(&self) -> bool {
        self.offline && self.aggregatable && self.has_valid_coordinates()
    }

    pub fn position(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// Prepared projection of a candidate device for one clustering run.
/// `index` is the stable position in the prepared slice; all per-run mutable
/// state lives in the engine's node arena, addressed by this index.
#[derive(Debug, Clone)]
pub struct ClusterPoint {
    pub index: usize,
    pub id: String,
    pub position: Coord<f64>,
    pub eligible: bool,
}

/// Outage region boundary produced for one cluster. The ring is a closed
/// polygon of at least 3 vertices; the first vertex is not repeated at the
/// end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutagePolygon {
    pub cluster_id: u32,
    pub ring: Vec<Coord<f64>>,
    pub confidence: f64,
    pub device_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Context from the map view requesting polygons. Bounds, when present,
/// restrict device preparation; zoom is passed through to the render layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ViewportContext {
    pub bounds: Option<BoundingBox>,
    pub zoom: Option<f32>,
}

/// Which generation path was taken for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Small,
    Medium,
    Large,
    Fallback,
}

/// Aggregate observability counters for one generation run. Advisory only:
/// nothing here feeds back into control flow beyond the single logged
/// performance-threshold warning.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineMetrics {
    pub strategy: Strategy,
    pub eligible_devices: usize,
    pub clusters: usize,
    pub noise_points: usize,
    pub core_points: usize,
    pub border_points: usize,
    pub polygons: usize,
    pub partitions: usize,
    pub fallback_used: bool,
    pub elapsed_ms: u64,
}

impl PipelineMetrics {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            eligible_devices: 0,
            clusters: 0,
            noise_points: 0,
            core_points: 0,
            border_points: 0,
            polygons: 0,
            partitions: 0,
            fallback_used: false,
            elapsed_ms: 0,
        }
    }
}

/// The caller-facing result of one generation run.
#[derive(Debug, Clone, Serialize)]
pub struct PolygonBatch {
    pub polygons: Vec<OutagePolygon>,
    pub metrics: PipelineMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(lat: f64, lon: f64, offline: bool, aggregatable: bool) -> Device {
        Device {
            id: "d".to_string(),
            lat,
            lon,
            offline,
            aggregatable,
        }
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(device(34.05, -118.24, true, true).has_valid_coordinates());
        assert!(!device(91.0, 0.0, true, true).has_valid_coordinates());
        assert!(!device(0.0, -181.0, true, true).has_valid_coordinates());
    }

    #[test]
    fn test_clustering_candidate() {
        assert!(device(34.0, -118.0, true, true).is_clustering_candidate());
        assert!(!device(34.0, -118.0, false, true).is_clustering_candidate());
        assert!(!device(34.0, -118.0, true, false).is_clustering_candidate());
        assert!(!device(99.0, -118.0, true, true).is_clustering_candidate());
    }

    #[test]
    fn test_bounding_box_contains() {
        let bbox = BoundingBox {
            min_lat: 33.0,
            max_lat: 35.0,
            min_lon: -119.0,
            max_lon: -117.0,
        };
        assert!(bbox.contains(34.0, -118.0));
        assert!(!bbox.contains(36.0, -118.0));
        assert!(!bbox.contains(34.0, -116.0));
    }
}
