use thiserror::Error;

/// Rejections from the pure clustering-config validator. Callers must check
/// a config with [`crate::dbscan::validate_config`] before handing it to the
/// engine; the engine itself never re-validates.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("eps must be a positive distance, got {0}")]
    NonPositiveEps(f64),
    #[error("min_pts must be at least 1, got {0}")]
    MinPtsTooSmall(usize),
}

/// The only failures a pipeline caller can observe. Every unexpected error
/// inside the optimized paths is logged and degraded to the legacy fallback
/// instead of surfacing here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run was cancelled cooperatively; partial results were discarded.
    #[error("polygon generation cancelled")]
    Cancelled,
    /// A caller-supplied config override failed validation.
    #[error("invalid clustering config: {0}")]
    InvalidConfig(#[from] ConfigError),
}
