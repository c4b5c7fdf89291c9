//! Size-driven strategy selection.

use crate::dbscan::DbscanConfig;
use crate::models::Strategy;
use serde::{Deserialize, Serialize};

/// Cardinality boundaries between strategies, overridable per pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBoundaries {
    /// Eligible counts below this use the small path.
    pub small_max: usize,
    /// Eligible counts below this (and at or above `small_max`) use the
    /// medium path.
    pub medium_max: usize,
    /// Counts at or above this bypass the optimized paths entirely.
    pub max_optimized: usize,
}

impl Default for StrategyBoundaries {
    fn default() -> Self {
        Self {
            small_max: 100,
            medium_max: 10_000,
            max_optimized: 100_000,
        }
    }
}

/// Per-strategy clustering configs. Medium and large tighten eps/min_pts as
/// density feedback grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTable {
    pub small: DbscanConfig,
    pub medium: DbscanConfig,
    pub large: DbscanConfig,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            small: DbscanConfig {
                eps_meters: 500.0,
                min_pts: 5,
                ..DbscanConfig::default()
            },
            medium: DbscanConfig {
                eps_meters: 250.0,
                min_pts: 8,
                ..DbscanConfig::default()
            },
            large: DbscanConfig {
                eps_meters: 200.0,
                min_pts: 10,
                ..DbscanConfig::default()
            },
        }
    }
}

/// A selected path: which strategy, which config, how many concurrent
/// clustering partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPlan {
    pub strategy: Strategy,
    pub config: DbscanConfig,
    pub partitions: usize,
}

/// Deterministic strategy selection from the eligible device count.
pub fn select_strategy(
    eligible: usize,
    boundaries: &StrategyBoundaries,
    table: &StrategyTable,
    use_optimized_clustering: bool,
    large_partitions: usize,
) -> StrategyPlan {
    if !use_optimized_clustering || eligible >= boundaries.max_optimized {
        return StrategyPlan {
            strategy: Strategy::Fallback,
            config: table.large.clone(),
            partitions: 1,
        };
    }
    if eligible < boundaries.small_max {
        StrategyPlan {
            strategy: Strategy::Small,
            config: table.small.clone(),
            partitions: 1,
        }
    } else if eligible < boundaries.medium_max {
        StrategyPlan {
            strategy: Strategy::Medium,
            config: table.medium.clone(),
            partitions: 1,
        }
    } else {
        StrategyPlan {
            strategy: Strategy::Large,
            config: table.large.clone(),
            partitions: large_partitions.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(eligible: usize, use_optimized: bool) -> StrategyPlan {
        select_strategy(
            eligible,
            &StrategyBoundaries::default(),
            &StrategyTable::default(),
            use_optimized,
            4,
        )
    }

    #[test]
    fn test_selection_by_cardinality() {
        assert_eq!(select(0, true).strategy, Strategy::Small);
        assert_eq!(select(99, true).strategy, Strategy::Small);
        assert_eq!(select(100, true).strategy, Strategy::Medium);
        assert_eq!(select(9_999, true).strategy, Strategy::Medium);
        assert_eq!(select(10_000, true).strategy, Strategy::Large);
        assert_eq!(select(99_999, true).strategy, Strategy::Large);
        assert_eq!(select(100_000, true).strategy, Strategy::Fallback);
    }

    #[test]
    fn test_optimized_opt_out_forces_fallback() {
        assert_eq!(select(5, false).strategy, Strategy::Fallback);
    }

    #[test]
    fn test_large_path_fans_out() {
        let plan = select(50_000, true);
        assert_eq!(plan.partitions, 4);
        assert_eq!(plan.config.min_pts, 10);
    }

    #[test]
    fn test_partition_count_floor() {
        let plan = select_strategy(
            50_000,
            &StrategyBoundaries::default(),
            &StrategyTable::default(),
            true,
            0,
        );
        assert_eq!(plan.partitions, 1);
    }
}
