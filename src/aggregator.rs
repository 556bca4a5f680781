use crate::capability::CapabilityDescriptor;
use crate::db::{Database, OwnerFilter, TypeGroup};
use crate::errors::AppResult;
use crate::models::{BreakdownEntry, Snapshot};
use crate::sources::{Component, ResolvedSource, SourceResolver, SourceSpec};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

const OTHER_TYPE: &str = "other";

/// Computes snapshots from whichever source generation the capability
/// descriptor allows. Every component is summed on its own so one failing
/// relation only zeroes its own figure.
pub struct SnapshotAggregator<'a> {
    db: &'a Database,
    resolver: SourceResolver,
    chunk_size: usize,
}

impl<'a> SnapshotAggregator<'a> {
    pub fn new(db: &'a Database, resolver: SourceResolver, chunk_size: usize) -> Self {
        Self {
            db,
            resolver,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn snapshot(&self, capabilities: &CapabilityDescriptor, subject_id: &str) -> Snapshot {
        self.snapshot_as_of(capabilities, subject_id, None)
    }

    pub fn snapshot_as_of(
        &self,
        capabilities: &CapabilityDescriptor,
        subject_id: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Snapshot {
        self.aggregate(capabilities, OwnerFilter::One(subject_id), as_of)
    }

    pub fn snapshot_batch(
        &self,
        capabilities: &CapabilityDescriptor,
        subject_ids: &[String],
    ) -> BTreeMap<String, Snapshot> {
        self.snapshot_batch_as_of(capabilities, subject_ids, None)
    }

    /// One grouped statement per component per chunk of subjects. Subjects
    /// without rows still get an all-zero snapshot.
    pub fn snapshot_batch_as_of(
        &self,
        capabilities: &CapabilityDescriptor,
        subject_ids: &[String],
        as_of: Option<DateTime<Utc>>,
    ) -> BTreeMap<String, Snapshot> {
        if subject_ids.is_empty() {
            return BTreeMap::new();
        }

        let [cash, investments, debt] = Component::ALL.map(|component| {
            self.isolated(component, BTreeMap::new(), || {
                self.component_totals(capabilities, component, OwnerFilter::Many(subject_ids), as_of)
            })
        });

        subject_ids
            .iter()
            .map(|id| {
                let figure = |totals: &BTreeMap<String, Decimal>| totals.get(id).copied().unwrap_or(Decimal::ZERO);
                (
                    id.clone(),
                    Snapshot::from_components(figure(&cash), figure(&investments), figure(&debt)),
                )
            })
            .collect()
    }

    pub fn platform_snapshot(&self, capabilities: &CapabilityDescriptor, as_of: Option<DateTime<Utc>>) -> Snapshot {
        self.aggregate(capabilities, OwnerFilter::All, as_of)
    }

    /// Single snapshot summed over every owner the filter selects.
    pub fn aggregate(
        &self,
        capabilities: &CapabilityDescriptor,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
    ) -> Snapshot {
        let [cash, investments, debt] = Component::ALL.map(|component| {
            self.isolated(component, Decimal::ZERO, || {
                self.component_total(capabilities, component, filter, as_of)
            })
        });
        Snapshot::from_components(cash, investments, debt)
    }

    /// Investments grouped by asset type. Blank and `unknown` types fold into
    /// `other`; totals add up to the investments figure of the same filter.
    pub fn investment_breakdown(
        &self,
        capabilities: &CapabilityDescriptor,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
    ) -> Vec<BreakdownEntry> {
        let Some(resolved) = self.resolver.resolve_investment_source(capabilities) else {
            return Vec::new();
        };
        match self.breakdown_groups(&resolved, filter, as_of) {
            Ok(groups) => normalize_breakdown(groups),
            Err(error) => {
                tracing::warn!(
                    relation = resolved.primary.table(),
                    error = %error,
                    "investment breakdown failed; returning empty breakdown"
                );
                Vec::new()
            }
        }
    }

    fn isolated<T>(&self, component: Component, fallback: T, compute: impl FnOnce() -> AppResult<T>) -> T {
        match compute() {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    component = component.as_str(),
                    error = %error,
                    "component summation failed; defaulting to zero"
                );
                fallback
            }
        }
    }

    fn component_total(
        &self,
        capabilities: &CapabilityDescriptor,
        component: Component,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
    ) -> AppResult<Decimal> {
        // Owners are clamped one by one, as a book of clients is.
        Ok(self
            .component_totals(capabilities, component, filter, as_of)?
            .values()
            .map(|amount| (*amount).max(Decimal::ZERO))
            .sum())
    }

    fn component_totals(
        &self,
        capabilities: &CapabilityDescriptor,
        component: Component,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
    ) -> AppResult<BTreeMap<String, Decimal>> {
        let Some(resolved) = self.resolver.resolve(component, capabilities) else {
            tracing::debug!(component = component.as_str(), "no source generation present");
            return Ok(BTreeMap::new());
        };
        let mut totals = self.db.sum_by_owner(&resolved.primary, filter, as_of, self.chunk_size)?;
        if let Some(fallback) = resolved.fallback {
            let legacy = self.db.sum_by_owner(&fallback, filter, as_of, self.chunk_size)?;
            for (owner, amount) in legacy {
                let current = totals.entry(owner).or_insert(Decimal::ZERO);
                if current.is_zero() {
                    *current = amount;
                }
            }
        }
        Ok(totals)
    }

    fn breakdown_groups(
        &self,
        resolved: &ResolvedSource,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<TypeGroup>> {
        let Some(fallback) = resolved.fallback else {
            return self.type_groups(&resolved.primary, filter, as_of);
        };

        // Owners are split the same way component_totals splits them.
        let primary = self.db.sum_by_owner(&resolved.primary, filter, as_of, self.chunk_size)?;
        let legacy = self.db.sum_by_owner(&fallback, filter, as_of, self.chunk_size)?;
        let primary_owners = primary
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(owner, _)| owner.clone())
            .collect::<BTreeSet<_>>();
        let legacy_owners = legacy
            .keys()
            .filter(|owner| !primary_owners.contains(*owner))
            .cloned()
            .collect::<Vec<_>>();
        let primary_owners = primary_owners.into_iter().collect::<Vec<_>>();

        let mut groups = self.type_groups(&resolved.primary, OwnerFilter::Many(&primary_owners), as_of)?;
        groups.extend(self.type_groups(&fallback, OwnerFilter::Many(&legacy_owners), as_of)?);
        Ok(groups)
    }

    fn type_groups(
        &self,
        spec: &SourceSpec,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<TypeGroup>> {
        match filter {
            OwnerFilter::Many(owners) => {
                let mut groups = Vec::new();
                for chunk in owners.chunks(self.chunk_size) {
                    groups.extend(self.db.sum_by_type(spec, OwnerFilter::Many(chunk), as_of)?);
                }
                Ok(groups)
            }
            other => self.db.sum_by_type(spec, other, as_of),
        }
    }
}

pub fn normalize_breakdown(groups: Vec<TypeGroup>) -> Vec<BreakdownEntry> {
    let mut merged: BTreeMap<String, (i64, Decimal)> = BTreeMap::new();
    for group in groups {
        let entry = merged
            .entry(normalize_type_label(group.kind.as_deref()))
            .or_insert((0, Decimal::ZERO));
        entry.0 += group.count;
        entry.1 += group.total;
    }

    let mut entries = merged
        .into_iter()
        .map(|(kind, (count, total))| BreakdownEntry {
            kind,
            count,
            total: total.max(Decimal::ZERO).round_dp(2),
        })
        .collect::<Vec<_>>();
    entries.sort_by(|left, right| right.total.cmp(&left.total).then_with(|| left.kind.cmp(&right.kind)));
    entries
}

fn normalize_type_label(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => OTHER_TYPE.to_string(),
        Some(kind) if kind.eq_ignore_ascii_case("unknown") => OTHER_TYPE.to_string(),
        Some(kind) => kind.to_string(),
    }
}
