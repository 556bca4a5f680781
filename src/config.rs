use crate::models::EngineSettings;
use std::time::Duration;

const MIN_CACHE_TTL_SECONDS: u64 = 5;
const MAX_CACHE_TTL_SECONDS: u64 = 300;
const MAX_CAPABILITY_TTL_SECONDS: u64 = 600;
const MIN_SWEEP_INTERVAL_SECONDS: u64 = 5;
const MAX_SWEEP_INTERVAL_SECONDS: u64 = 3_600;
// SQLite binds at most 999 variables per statement; leave room for predicates.
const MAX_BATCH_CHUNK_SIZE: usize = 900;

pub fn normalize_settings(mut settings: EngineSettings) -> EngineSettings {
    settings.snapshot_ttl_secs = clamp_cache_ttl(settings.snapshot_ttl_secs);
    settings.customer_kpi_ttl_secs = clamp_cache_ttl(settings.customer_kpi_ttl_secs);
    settings.book_kpi_ttl_secs = clamp_cache_ttl(settings.book_kpi_ttl_secs);
    settings.platform_kpi_ttl_secs = clamp_cache_ttl(settings.platform_kpi_ttl_secs);
    settings.capability_ttl_secs = settings.capability_ttl_secs.min(MAX_CAPABILITY_TTL_SECONDS);
    settings.sweep_interval_secs = settings
        .sweep_interval_secs
        .clamp(MIN_SWEEP_INTERVAL_SECONDS, MAX_SWEEP_INTERVAL_SECONDS);
    settings.batch_chunk_size = settings.batch_chunk_size.clamp(1, MAX_BATCH_CHUNK_SIZE);
    settings
}

fn clamp_cache_ttl(value: u64) -> u64 {
    value.clamp(MIN_CACHE_TTL_SECONDS, MAX_CACHE_TTL_SECONDS)
}

/// Cache lifetimes per scope, resolved from settings once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub snapshot: Duration,
    pub customer_kpi: Duration,
    pub book_kpi: Duration,
    pub platform_kpi: Duration,
}

impl CacheTtls {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            snapshot: Duration::from_secs(settings.snapshot_ttl_secs),
            customer_kpi: Duration::from_secs(settings.customer_kpi_ttl_secs),
            book_kpi: Duration::from_secs(settings.book_kpi_ttl_secs),
            platform_kpi: Duration::from_secs(settings.platform_kpi_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_settings, CacheTtls};
    use crate::models::EngineSettings;
    use std::time::Duration;

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = normalize_settings(EngineSettings {
            snapshot_ttl_secs: 0,
            book_kpi_ttl_secs: 86_400,
            capability_ttl_secs: 10_000,
            sweep_interval_secs: 1,
            batch_chunk_size: 0,
            ..EngineSettings::default()
        });
        assert_eq!(settings.snapshot_ttl_secs, 5);
        assert_eq!(settings.book_kpi_ttl_secs, 300);
        assert_eq!(settings.capability_ttl_secs, 600);
        assert_eq!(settings.sweep_interval_secs, 5);
        assert_eq!(settings.batch_chunk_size, 1);
    }

    #[test]
    fn defaults_survive_normalization() {
        let settings = normalize_settings(EngineSettings::default());
        let ttls = CacheTtls::from_settings(&settings);
        assert_eq!(ttls.platform_kpi, Duration::from_secs(120));
        assert_eq!(ttls.customer_kpi, Duration::from_secs(60));
        assert_eq!(settings.batch_chunk_size, 500);
    }
}
