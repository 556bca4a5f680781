use crate::aggregator::SnapshotAggregator;
use crate::cache::{CacheKey, MetricsCache};
use crate::capability::{CapabilityDescriptor, Relation};
use crate::config::CacheTtls;
use crate::db::{Database, OwnerFilter};
use crate::errors::AppResult;
use crate::models::{
    BookCounts, BreakdownEntry, KpiPayload, MetricGrowth, MonthlyAmount, MonthlyCount, Period, PlatformUsers,
    RevenueSummary, Scope, Snapshot,
};
use crate::sources::PAYMENTS;
use crate::visibility::VisibilityGate;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Percentage change rounded to one decimal. A zero baseline reads as 100%
/// growth when anything appeared and 0% otherwise.
pub fn growth_percent(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return if current > Decimal::ZERO {
            Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
    }
    ((current - previous) / previous * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

pub fn snapshot_growth(current: &Snapshot, previous: &Snapshot) -> MetricGrowth {
    MetricGrowth {
        cash: growth_percent(current.cash, previous.cash),
        investments: growth_percent(current.investments, previous.investments),
        debt: growth_percent(current.debt, previous.debt),
        net_worth: growth_percent(current.net_worth, previous.net_worth),
    }
}

/// Figures for one period: the snapshot at its close and the breakdown that
/// explains the investments figure.
struct PeriodFigures {
    snapshot: Snapshot,
    previous: Snapshot,
    breakdown: Vec<BreakdownEntry>,
}

pub struct DashboardAssembler<'a> {
    db: &'a Database,
    cache: &'a dyn MetricsCache,
    aggregator: SnapshotAggregator<'a>,
    ttls: CacheTtls,
}

impl<'a> DashboardAssembler<'a> {
    pub fn new(
        db: &'a Database,
        cache: &'a dyn MetricsCache,
        aggregator: SnapshotAggregator<'a>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            db,
            cache,
            aggregator,
            ttls,
        }
    }

    /// Live snapshot of one customer, through the cache.
    pub fn customer_snapshot(&self, capabilities: &CapabilityDescriptor, customer_id: &str) -> AppResult<Snapshot> {
        self.cached(&CacheKey::customer_snapshot(customer_id), self.ttls.snapshot, || {
            Ok(self.aggregator.snapshot(capabilities, customer_id))
        })
    }

    /// Callers gate cross-subject scopes before getting here; a
    /// consultant-client scope is served from the customer's own entry.
    pub fn assemble(&self, capabilities: &CapabilityDescriptor, scope: &Scope, period: &Period) -> AppResult<KpiPayload> {
        match scope {
            Scope::Customer { customer_id } => self.customer_kpi(capabilities, customer_id, period),
            Scope::ConsultantClient { customer_id, .. } => {
                let mut payload = self.customer_kpi(capabilities, customer_id, period)?;
                payload.scope = scope.label();
                Ok(payload)
            }
            Scope::ConsultantBook { consultant_id } => self.book_kpi(capabilities, consultant_id, period),
            Scope::Platform => self.platform_kpi(capabilities, period),
        }
    }

    fn customer_kpi(&self, capabilities: &CapabilityDescriptor, customer_id: &str, period: &Period) -> AppResult<KpiPayload> {
        let scope = Scope::Customer {
            customer_id: customer_id.to_string(),
        };
        self.cached(&CacheKey::customer_kpi(customer_id, period), self.ttls.customer_kpi, || {
            let cutoff = period_cutoff(period, Utc::now())?;
            let snapshot = match cutoff {
                None => self.customer_snapshot(capabilities, customer_id)?,
                Some(_) => self.aggregator.snapshot_as_of(capabilities, customer_id, cutoff),
            };
            let figures = PeriodFigures {
                snapshot,
                previous: self
                    .aggregator
                    .snapshot_as_of(capabilities, customer_id, Some(period.start()?)),
                breakdown: self
                    .aggregator
                    .investment_breakdown(capabilities, OwnerFilter::One(customer_id), cutoff),
            };
            Ok(payload(&scope, period, figures))
        })
    }

    fn book_kpi(&self, capabilities: &CapabilityDescriptor, consultant_id: &str, period: &Period) -> AppResult<KpiPayload> {
        let scope = Scope::ConsultantBook {
            consultant_id: consultant_id.to_string(),
        };
        self.cached(&CacheKey::book_kpi(consultant_id, period), self.ttls.book_kpi, || {
            let visible = VisibilityGate::new(self.db).visible_customers(consultant_id)?;
            let cutoff = period_cutoff(period, Utc::now())?;
            let figures = PeriodFigures {
                snapshot: self.book_snapshot(capabilities, &visible, cutoff),
                previous: self.book_snapshot(capabilities, &visible, Some(period.start()?)),
                breakdown: self
                    .aggregator
                    .investment_breakdown(capabilities, OwnerFilter::Many(&visible), cutoff),
            };

            let mut payload = payload(&scope, period, figures);
            payload.clients = Some(self.db.book_counts(consultant_id).unwrap_or_else(|error| {
                tracing::warn!(consultant_id, error = %error, "book counts unavailable");
                BookCounts::default()
            }));
            Ok(payload)
        })
    }

    fn book_snapshot(
        &self,
        capabilities: &CapabilityDescriptor,
        customers: &[String],
        as_of: Option<DateTime<Utc>>,
    ) -> Snapshot {
        self.aggregator
            .snapshot_batch_as_of(capabilities, customers, as_of)
            .values()
            .fold(Snapshot::default(), |book, client| book.combine(client))
    }

    fn platform_kpi(&self, capabilities: &CapabilityDescriptor, period: &Period) -> AppResult<KpiPayload> {
        self.cached(&CacheKey::platform_kpi(period), self.ttls.platform_kpi, || {
            let cutoff = period_cutoff(period, Utc::now())?;
            let figures = PeriodFigures {
                snapshot: self.aggregator.platform_snapshot(capabilities, cutoff),
                previous: self.aggregator.platform_snapshot(capabilities, Some(period.start()?)),
                breakdown: self
                    .aggregator
                    .investment_breakdown(capabilities, OwnerFilter::All, cutoff),
            };

            let mut payload = payload(&Scope::Platform, period, figures);
            payload.users = Some(self.platform_users(period));
            payload.revenue = Some(self.revenue(capabilities, period));
            Ok(payload)
        })
    }

    fn platform_users(&self, period: &Period) -> PlatformUsers {
        let compute = || -> AppResult<PlatformUsers> {
            let counts = self.db.role_counts()?;
            let previous = period.previous();
            let new_in_period = self.db.user_signups_between(period.start()?, period.end()?)?.len() as i64;
            let new_in_previous_period = self.db.user_signups_between(previous.start()?, previous.end()?)?.len() as i64;

            let year = period.enclosing_year();
            let mut monthly_signups = (1..=12).map(|month| MonthlyCount { month, count: 0 }).collect::<Vec<_>>();
            for signed_up in self.db.user_signups_between(year.start()?, year.end()?)? {
                monthly_signups[signed_up.month0() as usize].count += 1;
            }

            Ok(PlatformUsers {
                customers: counts.customers,
                consultants: counts.consultants,
                admins: counts.admins,
                blocked: counts.blocked,
                new_in_period,
                new_in_previous_period,
                new_users_growth: growth_percent(Decimal::from(new_in_period), Decimal::from(new_in_previous_period)),
                monthly_signups,
            })
        };
        compute().unwrap_or_else(|error| {
            tracing::warn!(error = %error, "platform user figures unavailable");
            PlatformUsers::default()
        })
    }

    /// Zero totals and an empty series when payments are not installed.
    fn revenue(&self, capabilities: &CapabilityDescriptor, period: &Period) -> RevenueSummary {
        if !capabilities.has(Relation::Payments) {
            tracing::debug!("payments relation absent; revenue reported as zero");
            return RevenueSummary::default();
        }

        let compute = || -> AppResult<RevenueSummary> {
            let total = sum_amounts(&self.db.amounts_between(&PAYMENTS, period.start()?, period.end()?)?);
            let previous = period.previous();
            let previous_total = sum_amounts(&self.db.amounts_between(&PAYMENTS, previous.start()?, previous.end()?)?);

            let year = period.enclosing_year();
            let mut monthly = (1..=12)
                .map(|month| MonthlyAmount {
                    month,
                    total: Decimal::ZERO,
                })
                .collect::<Vec<_>>();
            for (paid_at, amount) in self.db.amounts_between(&PAYMENTS, year.start()?, year.end()?)? {
                monthly[paid_at.month0() as usize].total += amount;
            }
            for entry in &mut monthly {
                entry.total = entry.total.round_dp(2);
            }

            Ok(RevenueSummary {
                total,
                previous_total,
                growth: growth_percent(total, previous_total),
                monthly,
            })
        };
        compute().unwrap_or_else(|error| {
            tracing::warn!(error = %error, "revenue figures unavailable");
            RevenueSummary::default()
        })
    }

    /// Cache failures and unreadable entries fall through to `compute`.
    fn cached<T, F>(&self, key: &CacheKey, ttl: Duration, compute: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> AppResult<T>,
    {
        let storage_key = key.to_storage_key();
        match self.cache.get(&storage_key) {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(hit) => return Ok(hit),
                Err(error) => tracing::warn!(key = %storage_key, error = %error, "cached payload unreadable; recomputing"),
            },
            Ok(None) => {}
            Err(error) => tracing::warn!(key = %storage_key, error = %error, "cache read failed; computing directly"),
        }

        let fresh = compute()?;
        match serde_json::to_value(&fresh) {
            Ok(value) => {
                if let Err(error) = self.cache.set(&storage_key, value, ttl) {
                    tracing::warn!(key = %storage_key, error = %error, "cache write failed");
                }
            }
            Err(error) => tracing::warn!(key = %storage_key, error = %error, "payload not cacheable"),
        }
        Ok(fresh)
    }
}

/// `None` while the period is still open so its figures match the live
/// snapshot; otherwise rows recorded before the period end.
fn period_cutoff(period: &Period, now: DateTime<Utc>) -> AppResult<Option<DateTime<Utc>>> {
    let end = period.end()?;
    if now >= period.start()? && now < end {
        Ok(None)
    } else {
        Ok(Some(end))
    }
}

fn sum_amounts(amounts: &[(DateTime<Utc>, Decimal)]) -> Decimal {
    amounts.iter().map(|(_, amount)| *amount).sum::<Decimal>().round_dp(2)
}

fn payload(scope: &Scope, period: &Period, figures: PeriodFigures) -> KpiPayload {
    KpiPayload {
        scope: scope.label(),
        period: period.label(),
        growth: snapshot_growth(&figures.snapshot, &figures.previous),
        snapshot: figures.snapshot,
        previous: figures.previous,
        breakdown: figures.breakdown,
        clients: None,
        users: None,
        revenue: None,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::{growth_percent, period_cutoff, DashboardAssembler};
    use crate::aggregator::SnapshotAggregator;
    use crate::cache::{Invalidation, MemoryMetricsCache, MetricsCache};
    use crate::capability::{CapabilityProbe, Relation};
    use crate::config::CacheTtls;
    use crate::db::Database;
    use crate::errors::{AppError, AppResult};
    use crate::models::{
        CashHolding, EngineSettings, Period, PrecedencePolicy, Scope, SourceGeneration, SubjectRole,
    };
    use crate::sources::SourceResolver;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::time::Duration;

    struct FailingCache;

    impl MetricsCache for FailingCache {
        fn get(&self, _key: &str) -> AppResult<Option<Value>> {
            Err(AppError::Internal("cache offline".to_string()))
        }
        fn set(&self, _key: &str, _payload: Value, _ttl: Duration) -> AppResult<()> {
            Err(AppError::Internal("cache offline".to_string()))
        }
        fn invalidate(&self, _target: &Invalidation) -> AppResult<usize> {
            Err(AppError::Internal("cache offline".to_string()))
        }
        fn purge_expired(&self) -> AppResult<usize> {
            Err(AppError::Internal("cache offline".to_string()))
        }
    }

    fn assembler<'a>(db: &'a Database, cache: &'a dyn MetricsCache) -> DashboardAssembler<'a> {
        DashboardAssembler::new(
            db,
            cache,
            SnapshotAggregator::new(db, SourceResolver::new(PrecedencePolicy::Capability), 100),
            CacheTtls::from_settings(&EngineSettings::default()),
        )
    }

    fn store(relations: &[Relation]) -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        for relation in relations {
            db.install_relation(*relation).expect("install");
        }
        (dir, db)
    }

    #[test]
    fn growth_handles_zero_baseline() {
        assert_eq!(growth_percent(Decimal::from(50), Decimal::ZERO), Decimal::ONE_HUNDRED);
        assert_eq!(growth_percent(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(growth_percent(Decimal::from(150), Decimal::from(100)), Decimal::from(50));
        assert_eq!(growth_percent(Decimal::from(1), Decimal::from(3)), Decimal::new(-667, 1));
        assert_eq!(growth_percent(Decimal::new(10_005, 4), Decimal::ONE), Decimal::new(1, 1));
    }

    #[test]
    fn growth_keeps_the_sign_of_a_negative_baseline() {
        assert_eq!(growth_percent(Decimal::from(-50), Decimal::from(-100)), Decimal::from(-50));
        assert_eq!(growth_percent(Decimal::from(-150), Decimal::from(-100)), Decimal::from(50));
        assert_eq!(growth_percent(Decimal::from(100), Decimal::from(-100)), Decimal::from(-200));
    }

    #[test]
    fn closed_periods_cut_off_at_period_end() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).single().expect("now");
        let open = Period::month(2026, 3).expect("period");
        let closed = Period::month(2026, 2).expect("period");
        assert_eq!(period_cutoff(&open, now).expect("cutoff"), None);
        assert_eq!(period_cutoff(&closed, now).expect("cutoff"), Some(open.start().expect("start")));
    }

    #[test]
    fn customer_kpi_compares_against_previous_period() {
        let (_dir, db) = store(&[Relation::ConnectedAccounts]);
        let period = Period::month(2025, 6).expect("period");
        let at = |month: u32, day: u32| Utc.with_ymd_and_hms(2025, month, day, 9, 0, 0).single().expect("timestamp");
        for (amount, recorded_at) in [(100, at(5, 20)), (50, at(6, 10)), (70, at(7, 2))] {
            db.insert_cash_holding(&CashHolding {
                owner_id: "c1".to_string(),
                generation: SourceGeneration::Aggregator,
                amount: Decimal::from(amount),
                recorded_at,
            })
            .expect("insert");
        }

        let cache = MemoryMetricsCache::new();
        let caps = CapabilityProbe::probe_uncached(&db);
        let payload = assembler(&db, &cache)
            .assemble(
                &caps,
                &Scope::Customer {
                    customer_id: "c1".to_string(),
                },
                &period,
            )
            .expect("payload");

        assert_eq!(payload.snapshot.cash, Decimal::from(150));
        assert_eq!(payload.previous.cash, Decimal::from(100));
        assert_eq!(payload.growth.cash, Decimal::from(50));
        assert!(cache.get("customer:c1:kpi:2025-06").expect("get").is_some());
        assert!(cache.get("customer:c1:snapshot").expect("get").is_none());
    }

    #[test]
    fn cache_outage_falls_back_to_direct_computation() {
        let (_dir, db) = store(&[Relation::LedgerAccounts]);
        db.insert_cash_holding(&CashHolding {
            owner_id: "c1".to_string(),
            generation: SourceGeneration::Legacy,
            amount: Decimal::from(500),
            recorded_at: Utc::now() - ChronoDuration::days(1),
        })
        .expect("insert");

        let caps = CapabilityProbe::probe_uncached(&db);
        let snapshot = assembler(&db, &FailingCache)
            .customer_snapshot(&caps, "c1")
            .expect("snapshot");
        assert_eq!(snapshot.cash, Decimal::from(500));
    }

    #[test]
    fn platform_without_payments_reports_empty_revenue() {
        let (_dir, db) = store(&[]);
        db.insert_user("a", "Ana", SubjectRole::Customer, Utc::now()).expect("user");
        db.insert_user("b", "Bea", SubjectRole::Consultant, Utc::now()).expect("user");

        let cache = MemoryMetricsCache::new();
        let caps = CapabilityProbe::probe_uncached(&db);
        let payload = assembler(&db, &cache)
            .assemble(&caps, &Scope::Platform, &Period::current_month(Utc::now()))
            .expect("payload");

        let revenue = payload.revenue.expect("revenue section");
        assert_eq!(revenue.total, Decimal::ZERO);
        assert!(revenue.monthly.is_empty());
        let users = payload.users.expect("users section");
        assert_eq!(users.customers, 1);
        assert_eq!(users.consultants, 1);
        assert_eq!(users.new_in_period, 2);
        assert_eq!(users.monthly_signups.len(), 12);
    }
}
