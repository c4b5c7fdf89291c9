//! lumen: run the outage-polygon pipeline over a JSON device list and write
//! the regions as GeoJSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;
use umbra::dbscan::DbscanConfig;
use umbra::export::{GeoJsonFileSink, RenderSink};
use umbra::models::{Device, ViewportContext};
use umbra::pipeline::{OutagePipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "lumen",
    about = "Cluster offline devices into outage polygons"
)]
struct Args {
    /// JSON file containing an array of devices.
    #[arg(long)]
    input: PathBuf,

    /// Output GeoJSON path.
    #[arg(long)]
    output: PathBuf,

    /// Override the strategy-selected neighbor radius in meters.
    #[arg(long)]
    eps: Option<f64>,

    /// Override the strategy-selected minimum neighborhood size.
    #[arg(long)]
    min_pts: Option<usize>,

    /// Skip the optimized paths and use the legacy generator directly.
    #[arg(long)]
    legacy: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let devices: Vec<Device> =
        serde_json::from_reader(BufReader::new(file)).context("failed to parse device list")?;
    info!(devices = devices.len(), "loaded device list");

    let mut config = PipelineConfig {
        use_optimized_clustering: !args.legacy,
        ..PipelineConfig::default()
    };
    if args.eps.is_some() || args.min_pts.is_some() {
        let base = DbscanConfig::default();
        config.config_override = Some(DbscanConfig {
            eps_meters: args.eps.unwrap_or(base.eps_meters),
            min_pts: args.min_pts.unwrap_or(base.min_pts),
            ..base
        });
    }

    let pipeline = OutagePipeline::new(config);
    let mut rx = pipeline.subscribe_progress();
    let monitor = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let update = *rx.borrow();
            info!(phase = ?update.phase, fraction = update.fraction, "progress");
        }
    });

    let batch = pipeline
        .generate_polygons(&devices, &ViewportContext::default())
        .await?;
    drop(pipeline);
    let _ = monitor.await;

    info!(
        strategy = ?batch.metrics.strategy,
        clusters = batch.metrics.clusters,
        noise = batch.metrics.noise_points,
        polygons = batch.metrics.polygons,
        elapsed_ms = batch.metrics.elapsed_ms,
        "generation finished"
    );

    let sink = GeoJsonFileSink {
        path: args.output.clone(),
    };
    sink.submit(&batch, &ViewportContext::default())?;
    info!(output = %args.output.display(), "wrote GeoJSON");
    Ok(())
}
