//! Density-based clustering (DBSCAN) over a shared neighbor index.
//!
//! Points are processed in input order; cluster growth uses an iterative
//! seed list rather than recursion so dense clusters cannot exhaust the
//! stack. All per-run mutable state lives in a node arena addressed by point
//! index, never on the points themselves.

use crate::error::ConfigError;
use crate::models::ClusterPoint;
use crate::spatial::NeighborIndex;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Per-run lifecycle of one point. Transitions are monotone:
/// Unvisited -> Visited -> {Core, Border, Noise}, with Noise -> Border when a
/// later expansion reaches the point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Unvisited,
    Visited,
    Noise,
    Core,
    Border,
}

/// Mutable node record for one point in one run. Discarded at run end.
#[derive(Debug, Clone, Copy)]
pub struct ClusterNode {
    pub state: NodeState,
    pub cluster: Option<u32>,
}

impl ClusterNode {
    fn new() -> Self {
        Self {
            state: NodeState::Unvisited,
            cluster: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbscanConfig {
    /// Maximum neighbor distance in meters. Must be positive.
    pub eps_meters: f64,
    /// Minimum eps-neighborhood size, counting the point itself, required to
    /// seed a cluster. Must be at least 1.
    pub min_pts: usize,
    /// Advisory wall-clock budget; exceeding it logs a single warning.
    pub max_run_ms: Option<u64>,
    /// Emit per-phase timing at debug level.
    pub detailed_metrics: bool,
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            eps_meters: 500.0,
            min_pts: 5,
            max_run_ms: Some(250),
            detailed_metrics: false,
        }
    }
}

/// Pure config validator. Callers must reject an invalid config before
/// running the engine; [`cluster`] assumes this has been checked.
pub fn validate_config(config: &DbscanConfig) -> Result<(), ConfigError> {
    if !(config.eps_meters > 0.0) {
        return Err(ConfigError::NonPositiveEps(config.eps_meters));
    }
    if config.min_pts < 1 {
        return Err(ConfigError::MinPtsTooSmall(config.min_pts));
    }
    Ok(())
}

/// One discovered cluster: the members are indices into the prepared point
/// slice. Non-empty by construction (always contains its seeding core
/// point).
#[derive(Debug, Clone)]
pub struct Cluster {
    pub index: u32,
    pub members: Vec<usize>,
}

/// Result of one engine run over a range: the clusters plus the node arena
/// for that range (used for metrics derivation; `nodes[i]` corresponds to
/// point `range.start + i`).
#[derive(Debug)]
pub struct ClusterRun {
    pub clusters: Vec<Cluster>,
    pub nodes: Vec<ClusterNode>,
}

/// State counters derived from a finished run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ClusteringMetrics {
    pub clusters: usize,
    pub noise_points: usize,
    pub core_points: usize,
    pub border_points: usize,
}

impl ClusteringMetrics {
    pub fn from_run(run: &ClusterRun) -> Self {
        let mut metrics = Self {
            clusters: run.clusters.len(),
            ..Self::default()
        };
        for node in &run.nodes {
            match node.state {
                NodeState::Noise => metrics.noise_points += 1,
                NodeState::Core => metrics.core_points += 1,
                NodeState::Border => metrics.border_points += 1,
                _ => {}
            }
        }
        metrics
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.clusters += other.clusters;
        self.noise_points += other.noise_points;
        self.core_points += other.core_points;
        self.border_points += other.border_points;
        self
    }
}

/// Run DBSCAN over the points whose indices fall in `range`.
///
/// The index may cover more points than the range; neighbors outside the
/// range are ignored, which is what keeps partitioned workers disjoint (a
/// worker owns exactly its slice of the arena). Density-reachability is
/// therefore never evaluated across a range boundary. The single-partition
/// path passes `0..points.len()`.
///
/// The neighborhood query never returns the origin point; the density test
/// counts the origin alongside its neighbors, so a group of five mutually
/// close points is dense under `min_pts = 5`.
///
/// Precondition: `config` has passed [`validate_config`].
pub fn cluster<I>(
    points: &[ClusterPoint],
    range: Range<usize>,
    config: &DbscanConfig,
    index: &I,
) -> ClusterRun
where
    I: NeighborIndex + ?Sized,
{
    let mut nodes = vec![ClusterNode::new(); range.len()];
    let mut clusters = Vec::new();
    if points.is_empty() || range.is_empty() {
        return ClusterRun { clusters, nodes };
    }

    let start = range.start;
    let mut next_cluster: u32 = 0;

    for i in range.clone() {
        if nodes[i - start].state != NodeState::Unvisited {
            continue;
        }
        nodes[i - start].state = NodeState::Visited;

        let neighbors = eligible_neighbors(points, i, &range, config.eps_meters, index);
        if neighbors.len() + 1 < config.min_pts {
            nodes[i - start].state = NodeState::Noise;
            continue;
        }

        let cluster_index = next_cluster;
        next_cluster += 1;
        nodes[i - start].state = NodeState::Core;
        nodes[i - start].cluster = Some(cluster_index);
        let mut members = vec![i];

        // Seed-list expansion: the list grows while being traversed, and
        // membership is tested by point identity so each point enters at
        // most once.
        let mut seeds = neighbors;
        let mut seeded: AHashSet<usize> = seeds.iter().copied().collect();
        seeded.insert(i);

        let mut cursor = 0;
        while cursor < seeds.len() {
            let j = seeds[cursor];
            cursor += 1;
            match nodes[j - start].state {
                NodeState::Noise => {
                    // Reclassified as a border point; its neighborhood was
                    // already found sparse, so it is not re-queried.
                    nodes[j - start].state = NodeState::Border;
                    nodes[j - start].cluster = Some(cluster_index);
                    members.push(j);
                }
                NodeState::Unvisited => {
                    nodes[j - start].state = NodeState::Visited;
                    nodes[j - start].cluster = Some(cluster_index);
                    members.push(j);

                    let expansion =
                        eligible_neighbors(points, j, &range, config.eps_meters, index);
                    if expansion.len() + 1 >= config.min_pts {
                        nodes[j - start].state = NodeState::Core;
                        for n in expansion {
                            if seeded.insert(n) {
                                seeds.push(n);
                            }
                        }
                    } else {
                        nodes[j - start].state = NodeState::Border;
                    }
                }
                _ => {}
            }
        }

        clusters.push(Cluster {
            index: cluster_index,
            members,
        });
    }

    ClusterRun { clusters, nodes }
}

/// Query the index around one point and apply the engine-side filters: drop
/// the origin, drop ineligible points, drop anything outside the owned
/// range. Sorted by index so membership order does not depend on index
/// enumeration order.
fn eligible_neighbors<I>(
    points: &[ClusterPoint],
    origin: usize,
    range: &Range<usize>,
    eps_meters: f64,
    index: &I,
) -> Vec<usize>
where
    I: NeighborIndex + ?Sized,
{
    let mut neighbors: Vec<usize> = index
        .query(points[origin].position, eps_meters)
        .into_iter()
        .filter(|&j| j != origin && range.contains(&j) && points[j].eligible)
        .collect();
    neighbors.sort_unstable();
    neighbors
}
