pub mod aggregator;
pub mod cache;
pub mod capability;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod engine;
pub mod errors;
pub mod invalidation;
pub mod logging;
pub mod models;
pub mod sources;
pub mod visibility;

pub use crate::aggregator::SnapshotAggregator;
pub use crate::cache::{CacheKey, Invalidation, MemoryMetricsCache, MetricsCache};
pub use crate::capability::{CapabilityDescriptor, CapabilityProbe, Relation};
pub use crate::dashboard::{growth_percent, DashboardAssembler};
pub use crate::db::Database;
pub use crate::engine::MetricsEngine;
pub use crate::errors::{AppError, AppResult};
pub use crate::invalidation::Mutation;
pub use crate::sources::{SourceResolver, SourceSpec};
pub use crate::visibility::VisibilityGate;

use std::path::Path;

/// Installs logging and opens the engine over `<data_dir>/metrics.db`.
pub fn bootstrap(data_dir: &Path) -> AppResult<MetricsEngine> {
    std::fs::create_dir_all(data_dir)?;
    if let Err(error) = logging::init_tracing(data_dir) {
        eprintln!("tracing disabled: {error:#}");
    }
    let engine = MetricsEngine::open(&data_dir.join("metrics.db"))?;
    let capabilities = engine.capabilities();
    tracing::info!(present = ?capabilities.present(), "startup capability probe");
    Ok(engine)
}
