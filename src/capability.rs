use crate::db::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Optional relations. Any of them may be missing in a given deployment since
/// migrations run independently of releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    ConnectedAccounts,
    ConnectedInvestments,
    ConnectedCardBills,
    LedgerAccounts,
    LedgerInvestments,
    LedgerCardInvoices,
    Payments,
}

impl Relation {
    pub const ALL: [Relation; 7] = [
        Relation::ConnectedAccounts,
        Relation::ConnectedInvestments,
        Relation::ConnectedCardBills,
        Relation::LedgerAccounts,
        Relation::LedgerInvestments,
        Relation::LedgerCardInvoices,
        Relation::Payments,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            Self::ConnectedAccounts => "connected_accounts",
            Self::ConnectedInvestments => "connected_investments",
            Self::ConnectedCardBills => "connected_card_bills",
            Self::LedgerAccounts => "ledger_accounts",
            Self::LedgerInvestments => "ledger_investments",
            Self::LedgerCardInvoices => "ledger_card_invoices",
            Self::Payments => "payments",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub relations: BTreeMap<Relation, bool>,
    pub probed_at: DateTime<Utc>,
}

impl CapabilityDescriptor {
    pub fn none() -> Self {
        Self::from_present(&[])
    }

    pub fn from_present(present: &[Relation]) -> Self {
        let relations = Relation::ALL
            .iter()
            .map(|relation| (*relation, present.contains(relation)))
            .collect();
        Self {
            relations,
            probed_at: Utc::now(),
        }
    }

    pub fn has(&self, relation: Relation) -> bool {
        self.relations.get(&relation).copied().unwrap_or(false)
    }

    pub fn present(&self) -> Vec<Relation> {
        self.relations
            .iter()
            .filter(|(_, present)| **present)
            .map(|(relation, _)| *relation)
            .collect()
    }
}

/// Probes the store for optional relations and keeps the result for a short
/// window. A descriptor is an explicit value: callers probe once per request
/// and pass it down rather than re-checking per relation.
#[derive(Debug)]
pub struct CapabilityProbe {
    ttl: RwLock<Duration>,
    memo: RwLock<Option<(Instant, CapabilityDescriptor)>>,
}

impl CapabilityProbe {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: RwLock::new(ttl),
            memo: RwLock::new(None),
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        if let Ok(mut current) = self.ttl.write() {
            *current = ttl;
        }
    }

    pub fn probe(&self, db: &Database) -> CapabilityDescriptor {
        let ttl = self.ttl.read().map(|ttl| *ttl).unwrap_or(Duration::ZERO);
        if let Ok(memo) = self.memo.read() {
            if let Some((probed, descriptor)) = memo.as_ref() {
                if probed.elapsed() < ttl {
                    return descriptor.clone();
                }
            }
        }

        let descriptor = Self::probe_uncached(db);
        if let Ok(mut memo) = self.memo.write() {
            *memo = Some((Instant::now(), descriptor.clone()));
        }
        descriptor
    }

    /// Each relation gets one existence check. Any failure reads as absent.
    pub fn probe_uncached(db: &Database) -> CapabilityDescriptor {
        let present = Relation::ALL
            .iter()
            .copied()
            .filter(|relation| match db.relation_exists(relation.table_name()) {
                Ok(exists) => exists,
                Err(error) => {
                    tracing::debug!(relation = relation.table_name(), error = %error, "relation probe failed; treating as absent");
                    false
                }
            })
            .collect::<Vec<_>>();
        tracing::debug!(present = ?present, "capability probe complete");
        CapabilityDescriptor::from_present(&present)
    }

    /// Drops the memoised descriptor, e.g. after a migration.
    pub fn forget(&self) {
        if let Ok(mut memo) = self.memo.write() {
            *memo = None;
        }
    }
}
