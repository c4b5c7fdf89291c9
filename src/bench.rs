//! Batch benchmark utilities: synthetic datasets and a concurrent sweep of
//! pipeline runs across input sizes, joined by a barrier.

use crate::models::{Device, Strategy, ViewportContext};
use crate::pipeline::{OutagePipeline, PipelineConfig};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Generate `count` offline, aggregatable devices scattered around
/// `cluster_count` hotspots. Deterministic for a given seed.
pub fn synthetic_devices(
    count: usize,
    cluster_count: usize,
    spread_degrees: f64,
    seed: u64,
) -> Vec<Device> {
    let mut rng = StdRng::seed_from_u64(seed);
    let hotspots: Vec<(f64, f64)> = (0..cluster_count.max(1))
        .map(|_| {
            (
                rng.random_range(33.5..34.5),
                rng.random_range(-118.5..-117.5),
            )
        })
        .collect();

    (0..count)
        .map(|i| {
            let (lat, lon) = hotspots[i % hotspots.len()];
            Device {
                id: format!("dev-{i}"),
                lat: lat + rng.random_range(-spread_degrees..=spread_degrees),
                lon: lon + rng.random_range(-spread_degrees..=spread_degrees),
                offline: true,
                aggregatable: true,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub device_count: usize,
    pub strategy: Strategy,
    pub clusters: usize,
    pub polygons: usize,
    pub elapsed_ms: u64,
}

/// Run one pipeline per input size on independent tasks over disjoint
/// synthetic datasets, wait for all of them, and report in size order.
pub async fn benchmark_strategies(sizes: &[usize], config: PipelineConfig) -> Vec<BenchmarkResult> {
    let handles: Vec<_> = sizes
        .iter()
        .enumerate()
        .map(|(i, &device_count)| {
            let config = config.clone();
            tokio::spawn(async move {
                let devices = synthetic_devices(device_count, 8, 0.002, 42 + i as u64);
                let pipeline = OutagePipeline::new(config);
                let started = Instant::now();
                let batch = pipeline
                    .generate_polygons(&devices, &ViewportContext::default())
                    .await;
                match batch {
                    Ok(batch) => Some(BenchmarkResult {
                        device_count,
                        strategy: batch.metrics.strategy,
                        clusters: batch.metrics.clusters,
                        polygons: batch.metrics.polygons,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }),
                    Err(_) => None,
                }
            })
        })
        .collect();

    let mut results = Vec::with_capacity(sizes.len());
    for joined in join_all(handles).await {
        if let Ok(Some(result)) = joined {
            info!(
                devices = result.device_count,
                strategy = ?result.strategy,
                clusters = result.clusters,
                elapsed_ms = result.elapsed_ms,
                "benchmark run finished"
            );
            results.push(result);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_devices_are_deterministic() {
        let a = synthetic_devices(50, 4, 0.001, 7);
        let b = synthetic_devices(50, 4, 0.001, 7);
        assert_eq!(a.len(), 50);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.lat, y.lat);
            assert_eq!(x.lon, y.lon);
        }
        assert!(a.iter().all(|d| d.is_clustering_candidate()));
    }

    #[tokio::test]
    async fn test_benchmark_sweep_reports_every_size() {
        let results = benchmark_strategies(&[20, 40], PipelineConfig::default()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].device_count, 20);
        assert_eq!(results[1].device_count, 40);
        assert_eq!(results[0].strategy, Strategy::Small);
    }
}
