/// Early stopping for incremental modes.
pub mod convergence;
/// Optimization strategies.
pub mod orchestrator;
/// Serializable fit configuration.
pub mod opts;
