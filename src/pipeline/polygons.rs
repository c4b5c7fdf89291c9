//! Cluster-to-polygon conversion with bounded hull concurrency.

use crate::dbscan::Cluster;
use crate::geometry::{convex_hull, point_in_polygon};
use crate::models::{ClusterPoint, OutagePolygon};
use ahash::AHashSet;
use anyhow::{Result, anyhow};
use futures::future::join_all;
use geo_types::Coord;
use std::sync::Arc;

/// Size bonus saturates here: a 20-member cluster earns the full +0.2.
const SIZE_BONUS_CAP: f64 = 0.2;

/// Build one polygon from one cluster, or nothing when the cluster is too
/// small (or too collinear) to enclose area.
fn build_polygon(cluster: &Cluster, points: &[ClusterPoint]) -> Option<OutagePolygon> {
    if cluster.members.len() < 3 {
        return None;
    }
    let coords: Vec<Coord<f64>> = cluster
        .members
        .iter()
        .map(|&m| points[m].position)
        .collect();
    let ring = convex_hull(&coords);
    if ring.len() < 3 {
        return None;
    }

    // Confidence: how cleanly this polygon captures the offline devices it
    // covers. Prepared points inside the hull that belong to other clusters
    // or to noise dilute it; larger clusters earn a small bonus.
    let members: AHashSet<usize> = cluster.members.iter().copied().collect();
    let foreign = points
        .iter()
        .filter(|p| !members.contains(&p.index) && point_in_polygon(p.position, &ring))
        .count();
    let capture = cluster.members.len() as f64 / (cluster.members.len() + foreign) as f64;
    let bonus = (cluster.members.len() as f64 / 100.0).min(SIZE_BONUS_CAP);
    let confidence = (capture + bonus).clamp(0.0, 1.0);

    Some(OutagePolygon {
        cluster_id: cluster.index,
        ring,
        confidence,
        device_ids: cluster
            .members
            .iter()
            .map(|&m| points[m].id.clone())
            .collect(),
    })
}

/// Hull all clusters in batches of at most `max_concurrency` blocking tasks,
/// preserving cluster order in the output.
pub(crate) async fn build_polygons(
    clusters: Vec<Cluster>,
    points: Arc<Vec<ClusterPoint>>,
    max_concurrency: usize,
) -> Result<Vec<OutagePolygon>> {
    let batch_size = max_concurrency.max(1);
    let mut polygons = Vec::new();
    let mut pending = clusters.into_iter();

    loop {
        let batch: Vec<Cluster> = pending.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        let handles: Vec<_> = batch
            .into_iter()
            .map(|cluster| {
                let points = Arc::clone(&points);
                tokio::task::spawn_blocking(move || build_polygon(&cluster, &points))
            })
            .collect();
        for joined in join_all(handles).await {
            let maybe_polygon = joined.map_err(|e| anyhow!("hull worker failed: {e}"))?;
            if let Some(polygon) = maybe_polygon {
                polygons.push(polygon);
            }
        }
    }

    Ok(polygons)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points_at(coords: &[(f64, f64)]) -> Vec<ClusterPoint> {
        coords
            .iter()
            .enumerate()
            .map(|(index, &(lat, lon))| ClusterPoint {
                index,
                id: format!("dev-{index}"),
                position: Coord { x: lon, y: lat },
                eligible: true,
            })
            .collect()
    }

    #[test]
    fn test_small_cluster_produces_no_polygon() {
        let points = points_at(&[(34.0, -118.0), (34.001, -118.0)]);
        let cluster = Cluster {
            index: 0,
            members: vec![0, 1],
        };
        assert!(build_polygon(&cluster, &points).is_none());
    }

    #[test]
    fn test_collinear_cluster_produces_no_polygon() {
        let points = points_at(&[(34.0, -118.0), (34.001, -118.0), (34.002, -118.0)]);
        let cluster = Cluster {
            index: 0,
            members: vec![0, 1, 2],
        };
        assert!(build_polygon(&cluster, &points).is_none());
    }

    #[test]
    fn test_polygon_covers_members() {
        let points = points_at(&[
            (34.000, -118.000),
            (34.004, -118.000),
            (34.000, -118.005),
            (34.004, -118.005),
            (34.002, -118.002),
        ]);
        let cluster = Cluster {
            index: 7,
            members: vec![0, 1, 2, 3, 4],
        };
        let polygon = build_polygon(&cluster, &points).expect("polygon");
        assert_eq!(polygon.cluster_id, 7);
        assert_eq!(polygon.ring.len(), 4);
        assert_eq!(polygon.device_ids.len(), 5);
        assert!(polygon.confidence > 0.0 && polygon.confidence <= 1.0);
    }

    #[test]
    fn test_foreign_points_inside_hull_dilute_confidence() {
        // Same square, but two extra prepared points sit inside the hull
        // without belonging to the cluster.
        let points = points_at(&[
            (34.000, -118.000),
            (34.004, -118.000),
            (34.000, -118.005),
            (34.004, -118.005),
            (34.002, -118.002),
            (34.001, -118.001),
            (34.003, -118.003),
        ]);
        let all = Cluster {
            index: 0,
            members: vec![0, 1, 2, 3, 4, 5, 6],
        };
        let partial = Cluster {
            index: 0,
            members: vec![0, 1, 2, 3, 4],
        };
        let full = build_polygon(&all, &points).expect("polygon");
        let diluted = build_polygon(&partial, &points).expect("polygon");
        assert!(diluted.confidence < full.confidence);
    }

    #[tokio::test]
    async fn test_batched_hulls_preserve_cluster_order() {
        let points = Arc::new(points_at(&[
            (34.000, -118.000),
            (34.004, -118.000),
            (34.000, -118.005),
            (34.004, -118.005),
            (35.000, -117.000),
            (35.004, -117.000),
            (35.000, -117.005),
            (35.004, -117.005),
        ]));
        let clusters = vec![
            Cluster {
                index: 0,
                members: vec![0, 1, 2, 3],
            },
            Cluster {
                index: 1,
                members: vec![4, 5], // too small, dropped
            },
            Cluster {
                index: 2,
                members: vec![4, 5, 6, 7],
            },
        ];
        let polygons = build_polygons(clusters, points, 2).await.expect("polygons");
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].cluster_id, 0);
        assert_eq!(polygons[1].cluster_id, 2);
    }
}
