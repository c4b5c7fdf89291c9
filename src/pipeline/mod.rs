//! Orchestration: strategy selection, phase-by-phase execution, progress
//! reporting, and degradation to the legacy fallback path.

pub mod polygons;
pub mod progress;
pub mod strategy;

use crate::dbscan::{self, Cluster, ClusteringMetrics, DbscanConfig, validate_config};
use crate::error::PipelineError;
use crate::export::RenderSink;
use crate::fallback::{GridConcaveFallback, LegacyHullGenerator};
use crate::models::{
    ClusterPoint, Device, PipelineMetrics, PolygonBatch, Strategy, ViewportContext,
};
use crate::spatial::{NeighborIndex, RtreeNeighborIndex};
use anyhow::anyhow;
use futures::future::join_all;
use self::progress::{CancelFlag, Phase, ProgressReporter, ProgressUpdate};
use self::strategy::{StrategyBoundaries, StrategyPlan, StrategyTable, select_strategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Explicit configuration surface for the orchestrator. No hidden globals:
/// every boundary, fan-out limit, and override lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub boundaries: StrategyBoundaries,
    pub strategies: StrategyTable,
    /// When false, every run routes straight to the legacy generator.
    pub use_optimized_clustering: bool,
    /// Concurrent clustering partitions on the large path.
    pub large_partitions: usize,
    /// Maximum concurrent hull workers.
    pub max_hull_concurrency: usize,
    /// Replaces the strategy-selected clustering config when set. Validated
    /// before each run.
    pub config_override: Option<DbscanConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            boundaries: StrategyBoundaries::default(),
            strategies: StrategyTable::default(),
            use_optimized_clustering: true,
            large_partitions: 4,
            max_hull_concurrency: 4,
            config_override: None,
        }
    }
}

enum RunFailure {
    Cancelled,
    Failed(anyhow::Error),
}

/// Turns devices into outage polygons. One generation run at a time per
/// pipeline: the progress stream is single-consumer and runs share the
/// cancellation flag.
pub struct OutagePipeline {
    config: PipelineConfig,
    legacy: Box<dyn LegacyHullGenerator>,
    render: Option<Box<dyn RenderSink>>,
    progress: watch::Sender<ProgressUpdate>,
    cancel: CancelFlag,
}

impl OutagePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let (progress, _) = watch::channel(ProgressUpdate::idle());
        Self {
            config,
            legacy: Box::new(GridConcaveFallback::default()),
            render: None,
            progress,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_legacy_generator(mut self, legacy: Box<dyn LegacyHullGenerator>) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn with_render_sink(mut self, sink: Box<dyn RenderSink>) -> Self {
        self.render = Some(sink);
        self
    }

    /// Subscribe to phase/fraction updates for the next runs.
    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressUpdate> {
        self.progress.subscribe()
    }

    /// Handle for cancelling an in-flight run. The flag stays set until
    /// [`CancelFlag::clear`] is called.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Generate outage polygons for the given devices.
    ///
    /// The caller always receives a batch (possibly empty) unless the run
    /// was cancelled or a config override failed validation; any internal
    /// failure degrades to the legacy path, and a legacy failure degrades
    /// to an empty, logged batch.
    pub async fn generate_polygons(
        &self,
        devices: &[Device],
        viewport: &ViewportContext,
    ) -> Result<PolygonBatch, PipelineError> {
        let started = Instant::now();
        let mut progress = ProgressReporter::new(&self.progress);

        if let Some(override_config) = &self.config.config_override {
            validate_config(override_config)?;
        }

        let eligible = devices
            .iter()
            .filter(|d| Self::is_prepared(d, viewport))
            .count();
        let mut plan = select_strategy(
            eligible,
            &self.config.boundaries,
            &self.config.strategies,
            self.config.use_optimized_clustering,
            self.config.large_partitions,
        );
        if let Some(override_config) = &self.config.config_override {
            plan.config = override_config.clone();
        }
        if self.cancel.is_cancelled() {
            progress.reset();
            return Err(PipelineError::Cancelled);
        }
        progress.complete(Phase::PathSelection);
        debug!(eligible, strategy = ?plan.strategy, partitions = plan.partitions, "selected generation path");

        if plan.strategy == Strategy::Fallback {
            info!(eligible, "routing directly to the legacy fallback path");
            return self
                .run_fallback(devices, viewport, eligible, started, &mut progress)
                .await;
        }

        match self
            .run_optimized(devices, viewport, &plan, started, &mut progress)
            .await
        {
            Ok(batch) => Ok(batch),
            Err(RunFailure::Cancelled) => {
                progress.reset();
                Err(PipelineError::Cancelled)
            }
            Err(RunFailure::Failed(err)) => {
                warn!(error = %err, "optimized pipeline failed, degrading to the legacy hull generator");
                self.run_fallback(devices, viewport, eligible, started, &mut progress)
                    .await
            }
        }
    }

    fn is_prepared(device: &Device, viewport: &ViewportContext) -> bool {
        device.is_clustering_candidate()
            && viewport
                .bounds
                .is_none_or(|b| b.contains(device.lat, device.lon))
    }

    fn ensure_live(&self) -> Result<(), RunFailure> {
        if self.cancel.is_cancelled() {
            Err(RunFailure::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn run_optimized(
        &self,
        devices: &[Device],
        viewport: &ViewportContext,
        plan: &StrategyPlan,
        started: Instant,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<PolygonBatch, RunFailure> {
        let points: Vec<ClusterPoint> = devices
            .iter()
            .filter(|d| Self::is_prepared(d, viewport))
            .enumerate()
            .map(|(index, d)| ClusterPoint {
                index,
                id: d.id.clone(),
                position: d.position(),
                eligible: true,
            })
            .collect();
        self.ensure_live()?;
        progress.complete(Phase::DevicePreparation);

        let mut metrics = PipelineMetrics::new(plan.strategy);
        metrics.eligible_devices = points.len();

        if points.is_empty() {
            // Nothing to cluster; skip the index entirely.
            progress.complete(Phase::Finalize);
            metrics.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(PolygonBatch {
                polygons: Vec::new(),
                metrics,
            });
        }

        let points = Arc::new(points);
        let mut index = RtreeNeighborIndex::new();
        index.initialize(&points);
        let index = Arc::new(index);
        self.ensure_live()?;
        progress.complete(Phase::IndexBuild);

        let clustering_started = Instant::now();
        let (clustering_metrics, clusters) =
            if plan.partitions <= 1 || points.len() <= plan.partitions {
                metrics.partitions = 1;
                let run = dbscan::cluster(&points, 0..points.len(), &plan.config, &*index);
                (ClusteringMetrics::from_run(&run), run.clusters)
            } else {
                metrics.partitions = plan.partitions;
                self.cluster_partitioned(Arc::clone(&points), Arc::clone(&index), plan)
                    .await?
            };
        metrics.clusters = clustering_metrics.clusters;
        metrics.noise_points = clustering_metrics.noise_points;
        metrics.core_points = clustering_metrics.core_points;
        metrics.border_points = clustering_metrics.border_points;
        if plan.config.detailed_metrics {
            debug!(
                clusters = metrics.clusters,
                noise = metrics.noise_points,
                elapsed_ms = clustering_started.elapsed().as_millis() as u64,
                "clustering finished"
            );
        }
        self.ensure_live()?;
        progress.complete(Phase::Clustering);

        let polygons = polygons::build_polygons(
            clusters,
            Arc::clone(&points),
            self.config.max_hull_concurrency,
        )
        .await
        .map_err(RunFailure::Failed)?;
        metrics.polygons = polygons.len();
        self.ensure_live()?;
        progress.complete(Phase::HullGeneration);

        metrics.elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some(limit) = plan.config.max_run_ms {
            if metrics.elapsed_ms > limit {
                warn!(
                    elapsed_ms = metrics.elapsed_ms,
                    limit_ms = limit,
                    "polygon generation exceeded its performance threshold"
                );
            }
        }

        let batch = PolygonBatch { polygons, metrics };
        if let Some(sink) = &self.render {
            if let Err(err) = sink.submit(&batch, viewport) {
                warn!(error = %err, "render sink rejected the batch");
            }
        }
        progress.complete(Phase::RenderHandoff);
        progress.complete(Phase::Finalize);
        Ok(batch)
    }

    /// Large-scale path: disjoint contiguous chunks clustered concurrently
    /// against the shared read-only index, concatenated in partition order.
    /// Density-reachability is not evaluated across chunk boundaries, so a
    /// blob straddling a boundary may surface as two clusters — an accepted
    /// throughput/accuracy tradeoff.
    async fn cluster_partitioned(
        &self,
        points: Arc<Vec<ClusterPoint>>,
        index: Arc<RtreeNeighborIndex>,
        plan: &StrategyPlan,
    ) -> Result<(ClusteringMetrics, Vec<Cluster>), RunFailure> {
        let total = points.len();
        let partitions = plan.partitions.min(total).max(1);
        let chunk = total.div_ceil(partitions);

        let mut handles = Vec::with_capacity(partitions);
        for p in 0..partitions {
            let start = p * chunk;
            let end = ((p + 1) * chunk).min(total);
            if start >= end {
                break;
            }
            let points = Arc::clone(&points);
            let index = Arc::clone(&index);
            let config = plan.config.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                dbscan::cluster(&points, start..end, &config, &*index)
            }));
        }

        let mut clusters: Vec<Cluster> = Vec::new();
        let mut merged = ClusteringMetrics::default();
        let mut next_index: u32 = 0;
        for joined in join_all(handles).await {
            let run = joined.map_err(|e| RunFailure::Failed(anyhow!("partition worker failed: {e}")))?;
            merged = merged.merge(ClusteringMetrics::from_run(&run));
            for mut cluster in run.clusters {
                cluster.index = next_index;
                next_index += 1;
                clusters.push(cluster);
            }
        }
        Ok((merged, clusters))
    }

    async fn run_fallback(
        &self,
        devices: &[Device],
        viewport: &ViewportContext,
        eligible: usize,
        started: Instant,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<PolygonBatch, PipelineError> {
        if self.cancel.is_cancelled() {
            progress.reset();
            return Err(PipelineError::Cancelled);
        }

        let mut metrics = PipelineMetrics::new(Strategy::Fallback);
        metrics.eligible_devices = eligible;
        metrics.fallback_used = true;

        let polygons = match self.legacy.generate(devices) {
            Ok(polygons) => polygons,
            Err(err) => {
                // Observable but never fatal: the caller still gets a batch.
                error!(error = %err, "legacy hull generator failed; returning an empty polygon set");
                Vec::new()
            }
        };
        metrics.polygons = polygons.len();
        metrics.elapsed_ms = started.elapsed().as_millis() as u64;

        let batch = PolygonBatch { polygons, metrics };
        if let Some(sink) = &self.render {
            if let Err(err) = sink.submit(&batch, viewport) {
                warn!(error = %err, "render sink rejected the batch");
            }
        }
        progress.complete(Phase::Finalize);
        Ok(batch)
    }
}
