use crate::errors::{AppError, AppResult};
use crate::models::Period;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Every key the engine caches under. Keys are only ever built here so the
/// invalidation prefixes in `invalidation.rs` stay in step with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    CustomerSnapshot { customer_id: String },
    CustomerKpi { customer_id: String, bucket: String },
    BookKpi { consultant_id: String, bucket: String },
    PlatformKpi { bucket: String },
}

impl CacheKey {
    pub fn customer_snapshot(customer_id: &str) -> Self {
        Self::CustomerSnapshot {
            customer_id: customer_id.to_string(),
        }
    }

    pub fn customer_kpi(customer_id: &str, period: &Period) -> Self {
        Self::CustomerKpi {
            customer_id: customer_id.to_string(),
            bucket: period.label(),
        }
    }

    pub fn book_kpi(consultant_id: &str, period: &Period) -> Self {
        Self::BookKpi {
            consultant_id: consultant_id.to_string(),
            bucket: period.label(),
        }
    }

    pub fn platform_kpi(period: &Period) -> Self {
        Self::PlatformKpi { bucket: period.label() }
    }

    pub fn to_storage_key(&self) -> String {
        match self {
            Self::CustomerSnapshot { customer_id } => format!("customer:{customer_id}:snapshot"),
            Self::CustomerKpi { customer_id, bucket } => format!("customer:{customer_id}:kpi:{bucket}"),
            Self::BookKpi { consultant_id, bucket } => format!("book:{consultant_id}:kpi:{bucket}"),
            Self::PlatformKpi { bucket } => format!("platform:kpi:{bucket}"),
        }
    }

    /// Covers the snapshot and every KPI bucket of one customer.
    pub fn customer_prefix(customer_id: &str) -> String {
        format!("customer:{customer_id}:")
    }

    pub fn book_prefix(consultant_id: &str) -> String {
        format!("book:{consultant_id}:")
    }

    pub fn platform_prefix() -> String {
        "platform:".to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(String),
    Prefix(String),
}

impl Invalidation {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Key(exact) => key == exact,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

/// Injected cache service. Errors are reported to the caller, which treats
/// them as a miss and computes directly.
pub trait MetricsCache: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<Value>>;
    fn set(&self, key: &str, payload: Value, ttl: Duration) -> AppResult<()>;
    /// Returns how many entries were removed; a missing key removes none.
    fn invalidate(&self, target: &Invalidation) -> AppResult<usize>;
    fn purge_expired(&self) -> AppResult<usize>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Debug, Default)]
pub struct MemoryMetricsCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryMetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live and not-yet-purged entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AppError {
    AppError::Internal("metrics cache lock poisoned".to_string())
}

impl MetricsCache for MemoryMetricsCache {
    fn get(&self, key: &str) -> AppResult<Option<Value>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.payload.clone()))
    }

    fn set(&self, key: &str, payload: Value, ttl: Duration) -> AppResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    fn invalidate(&self, target: &Invalidation) -> AppResult<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let removed = match target {
            Invalidation::Key(key) => usize::from(entries.remove(key).is_some()),
            Invalidation::Prefix(_) => {
                let before = entries.len();
                entries.retain(|key, _| !target.matches(key));
                before - entries.len()
            }
        };
        Ok(removed)
    }

    fn purge_expired(&self) -> AppResult<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}

/// Periodically drops expired entries. Reads already ignore them; this only
/// bounds memory.
pub fn spawn_sweeper(cache: Arc<dyn MetricsCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match cache.purge_expired() {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired cache entries purged"),
                Err(error) => tracing::warn!(error = %error, "cache sweep failed"),
            }
        }
    })
}
