//! Render-layer handoff and GeoJSON serialization of polygon batches.

use crate::models::{PolygonBatch, OutagePolygon, ViewportContext};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

/// External boundary: receives finished batches for display. Failures are
/// logged by the pipeline, never propagated to its caller.
pub trait RenderSink: Send + Sync {
    fn submit(&self, batch: &PolygonBatch, viewport: &ViewportContext) -> Result<()>;
}

fn polygon_to_feature(polygon: &OutagePolygon) -> Value {
    let mut coordinates: Vec<[f64; 2]> = polygon.ring.iter().map(|c| [c.x, c.y]).collect();
    // GeoJSON rings repeat the first position at the end.
    if let Some(&first) = coordinates.first() {
        coordinates.push(first);
    }
    json!({
        "type": "Feature",
        "properties": {
            "cluster_id": polygon.cluster_id,
            "confidence": polygon.confidence,
            "device_count": polygon.device_ids.len(),
        },
        "geometry": {
            "type": "Polygon",
            "coordinates": [coordinates],
        },
    })
}

/// Render a batch as a GeoJSON FeatureCollection, one feature per polygon.
pub fn polygon_batch_to_geojson(batch: &PolygonBatch) -> Value {
    let features: Vec<Value> = batch.polygons.iter().map(polygon_to_feature).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Render sink that writes each submitted batch to a GeoJSON file.
#[derive(Debug, Clone)]
pub struct GeoJsonFileSink {
    pub path: PathBuf,
}

impl RenderSink for GeoJsonFileSink {
    fn submit(&self, batch: &PolygonBatch, _viewport: &ViewportContext) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &polygon_batch_to_geojson(batch))
            .context("failed to write GeoJSON")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineMetrics, Strategy};
    use geo_types::Coord;

    fn batch() -> PolygonBatch {
        PolygonBatch {
            polygons: vec![OutagePolygon {
                cluster_id: 0,
                ring: vec![
                    Coord { x: 0.0, y: 0.0 },
                    Coord { x: 1.0, y: 0.0 },
                    Coord { x: 1.0, y: 1.0 },
                ],
                confidence: 0.9,
                device_ids: vec!["a".into(), "b".into(), "c".into()],
            }],
            metrics: PipelineMetrics::new(Strategy::Small),
        }
    }

    #[test]
    fn test_geojson_shape() {
        let value = polygon_batch_to_geojson(&batch());
        assert_eq!(value["type"], "FeatureCollection");
        let features = value["features"].as_array().expect("features");
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["device_count"], 3);

        let ring = features[0]["geometry"]["coordinates"][0]
            .as_array()
            .expect("ring");
        // Closed per GeoJSON: 3 vertices plus the repeated first.
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());
    }
}
