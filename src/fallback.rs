//! Legacy hull generator boundary and its default implementation.
//!
//! The fallback path transforms the raw device set into polygons without the
//! clustering engine: devices are bucketed into coarse grid cells, touching
//! cells are merged into regions, and each region gets one concave-hull
//! boundary. Degraded quality, bounded cost.

use crate::models::{Device, OutagePolygon};
use ahash::AHashMap;
use anyhow::Result;
use geo::algorithm::concave_hull::ConcaveHull;
use geo::{MultiPoint, Point};
use geo_types::Coord;
use itertools::Itertools;
use rayon::prelude::*;

/// External boundary: a drop-in substitute for the whole pipeline, accepting
/// the same device shape and producing the same polygon shape.
pub trait LegacyHullGenerator: Send + Sync {
    fn generate(&self, devices: &[Device]) -> Result<Vec<OutagePolygon>>;
}

/// Disjoint-set over grid cells, path compression + union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let px = self.find(x);
        let py = self.find(y);
        if px == py {
            return;
        }
        if self.rank[px] < self.rank[py] {
            self.parent[px] = py;
        } else if self.rank[px] > self.rank[py] {
            self.parent[py] = px;
        } else {
            self.parent[py] = px;
            self.rank[px] += 1;
        }
    }
}

/// Default legacy generator: grid bucketing plus one concave hull per
/// 8-connected cell region.
#[derive(Debug, Clone)]
pub struct GridConcaveFallback {
    /// Grid cell edge in degrees (~2km at the default).
    pub cell_size_degrees: f64,
    /// Concavity parameter handed to the hull algorithm.
    pub concavity: f64,
    /// Box half-width in degrees for regions too small to hull (~100m).
    pub tiny_region_buffer: f64,
}

impl Default for GridConcaveFallback {
    fn default() -> Self {
        Self {
            cell_size_degrees: 0.02,
            concavity: 0.1,
            tiny_region_buffer: 0.001,
        }
    }
}

impl GridConcaveFallback {
    fn cell_of(&self, device: &Device) -> (i64, i64) {
        (
            (device.lon / self.cell_size_degrees).floor() as i64,
            (device.lat / self.cell_size_degrees).floor() as i64,
        )
    }

    fn region_polygon(&self, region_id: u32, members: &[&Device]) -> OutagePolygon {
        let ring = if members.len() >= 3 {
            let geo_points: Vec<Point<f64>> =
                members.iter().map(|d| Point::new(d.lon, d.lat)).collect();
            let hull = MultiPoint(geo_points).concave_hull(self.concavity);
            let mut ring: Vec<Coord<f64>> = hull.exterior().coords().copied().collect();
            // The exterior repeats the first vertex; our rings do not.
            if ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
            ring
        } else {
            // 1-2 devices: a small buffered box around their extent.
            let (min_lat, max_lat, min_lon, max_lon) = members.iter().fold(
                (
                    f64::INFINITY,
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                    f64::NEG_INFINITY,
                ),
                |(min_lat, max_lat, min_lon, max_lon), d| {
                    (
                        min_lat.min(d.lat),
                        max_lat.max(d.lat),
                        min_lon.min(d.lon),
                        max_lon.max(d.lon),
                    )
                },
            );
            let b = self.tiny_region_buffer;
            vec![
                Coord {
                    x: min_lon - b,
                    y: min_lat - b,
                },
                Coord {
                    x: max_lon + b,
                    y: min_lat - b,
                },
                Coord {
                    x: max_lon + b,
                    y: max_lat + b,
                },
                Coord {
                    x: min_lon - b,
                    y: max_lat + b,
                },
            ]
        };

        // Degraded path: no density information, so confidence leans on
        // region size alone.
        let confidence = (0.5 + members.len() as f64 * 0.005).min(1.0);

        OutagePolygon {
            cluster_id: region_id,
            ring,
            confidence,
            device_ids: members.iter().map(|d| d.id.clone()).collect(),
        }
    }
}

impl LegacyHullGenerator for GridConcaveFallback {
    fn generate(&self, devices: &[Device]) -> Result<Vec<OutagePolygon>> {
        let candidates: Vec<&Device> = devices
            .iter()
            .filter(|d| d.is_clustering_candidate())
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut cells: AHashMap<(i64, i64), Vec<usize>> = AHashMap::new();
        for (i, device) in candidates.iter().enumerate() {
            cells.entry(self.cell_of(device)).or_default().push(i);
        }

        let cell_keys: Vec<(i64, i64)> = cells.keys().copied().collect();
        let cell_to_idx: AHashMap<(i64, i64), usize> = cell_keys
            .iter()
            .enumerate()
            .map(|(i, &key)| (key, i))
            .collect();

        let mut uf = UnionFind::new(cell_keys.len());
        for (i, &(x, y)) in cell_keys.iter().enumerate() {
            for dx in -1..=1 {
                for dy in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    if let Some(&j) = cell_to_idx.get(&(x + dx, y + dy)) {
                        uf.union(i, j);
                    }
                }
            }
        }

        let mut regions: AHashMap<usize, Vec<usize>> = AHashMap::new();
        for (cell_key, members) in cells {
            let root = uf.find(cell_to_idx[&cell_key]);
            regions.entry(root).or_default().extend(members);
        }

        // Deterministic region order: by smallest member index.
        let ordered: Vec<Vec<usize>> = regions
            .into_values()
            .map(|mut members| {
                members.sort_unstable();
                members
            })
            .sorted_by_key(|members| members[0])
            .collect();

        let polygons: Vec<OutagePolygon> = ordered
            .par_iter()
            .enumerate()
            .map(|(region_id, members)| {
                let member_devices: Vec<&Device> =
                    members.iter().map(|&i| candidates[i]).collect();
                self.region_polygon(region_id as u32, &member_devices)
            })
            .collect();

        Ok(polygons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, lat: f64, lon: f64) -> Device {
        Device {
            id: id.to_string(),
            lat,
            lon,
            offline: true,
            aggregatable: true,
        }
    }

    #[test]
    fn test_single_device_produces_buffered_box() {
        let fallback = GridConcaveFallback::default();
        let polygons = fallback
            .generate(&[device("a", 34.0, -118.0)])
            .expect("generate");
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].ring.len(), 4);
        assert_eq!(polygons[0].device_ids, vec!["a".to_string()]);
    }

    #[test]
    fn test_dense_group_produces_one_region() {
        let fallback = GridConcaveFallback::default();
        let devices: Vec<Device> = (0..8)
            .map(|i| {
                device(
                    &format!("d{i}"),
                    34.0 + (i % 4) as f64 * 0.002,
                    -118.0 + (i / 4) as f64 * 0.002,
                )
            })
            .collect();
        let polygons = fallback.generate(&devices).expect("generate");
        assert_eq!(polygons.len(), 1);
        assert!(polygons[0].ring.len() >= 3);
        assert_ne!(polygons[0].ring.first(), polygons[0].ring.last());
        assert_eq!(polygons[0].device_ids.len(), 8);
        assert!(polygons[0].confidence >= 0.5 && polygons[0].confidence <= 1.0);
    }

    #[test]
    fn test_separated_groups_produce_separate_regions() {
        let fallback = GridConcaveFallback::default();
        let mut devices: Vec<Device> = (0..4)
            .map(|i| {
                device(
                    &format!("a{i}"),
                    34.0 + (i % 2) as f64 * 0.001,
                    -118.0 + (i / 2) as f64 * 0.001,
                )
            })
            .collect();
        devices.extend((0..4).map(|i| {
            device(
                &format!("b{i}"),
                35.0 + (i % 2) as f64 * 0.001,
                -117.0 + (i / 2) as f64 * 0.001,
            )
        }));
        let polygons = fallback.generate(&devices).expect("generate");
        assert_eq!(polygons.len(), 2);
    }

    #[test]
    fn test_online_devices_are_ignored() {
        let fallback = GridConcaveFallback::default();
        let mut online = device("x", 34.0, -118.0);
        online.offline = false;
        assert!(fallback.generate(&[online]).expect("generate").is_empty());
    }
}
