use crate::aggregator::SnapshotAggregator;
use crate::cache::{spawn_sweeper, MemoryMetricsCache, MetricsCache};
use crate::capability::{CapabilityDescriptor, CapabilityProbe, Relation};
use crate::config::CacheTtls;
use crate::dashboard::DashboardAssembler;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::invalidation::{apply_invalidation, Mutation};
use crate::models::{
    CashHolding, ClientOverview, ConsultantCustomerLink, DebtFacility, EngineSettings, Gated, InvestmentHolding,
    KpiPayload, LinkStatus, NoteRecord, Period, ReportMeta, Scope, Snapshot, Subject, SubjectRole, VisibilityDecision,
};
use crate::sources::SourceResolver;
use crate::visibility::VisibilityGate;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Entry point handed to request handlers. Reads go through the cache; every
/// write that can move a figure fires its invalidation before returning.
pub struct MetricsEngine {
    db: Arc<Database>,
    probe: CapabilityProbe,
    cache: Arc<dyn MetricsCache>,
    settings: RwLock<EngineSettings>,
}

impl MetricsEngine {
    pub fn open(path: &Path) -> AppResult<Self> {
        let db = Arc::new(Database::new(path)?);
        Self::new(db, Arc::new(MemoryMetricsCache::new()))
    }

    pub fn new(db: Arc<Database>, cache: Arc<dyn MetricsCache>) -> AppResult<Self> {
        let settings = db.get_settings()?;
        tracing::info!(
            precedence = ?settings.precedence,
            capability_ttl_secs = settings.capability_ttl_secs,
            "metrics engine ready"
        );
        Ok(Self {
            probe: CapabilityProbe::new(Duration::from_secs(settings.capability_ttl_secs)),
            db,
            cache,
            settings: RwLock::new(settings),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> Arc<dyn MetricsCache> {
        self.cache.clone()
    }

    pub fn settings(&self) -> AppResult<EngineSettings> {
        self.settings
            .read()
            .map(|settings| settings.clone())
            .map_err(|_| AppError::Internal("engine settings lock poisoned".to_string()))
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<EngineSettings> {
        let settings = self.db.update_settings(update)?;
        self.probe.set_ttl(Duration::from_secs(settings.capability_ttl_secs));
        let mut current = self
            .settings
            .write()
            .map_err(|_| AppError::Internal("engine settings lock poisoned".to_string()))?;
        *current = settings.clone();
        drop(current);
        tracing::info!(precedence = ?settings.precedence, "engine settings updated");
        self.invalidate(Mutation::SettingsChanged);
        Ok(settings)
    }

    pub fn capabilities(&self) -> CapabilityDescriptor {
        self.probe.probe(&self.db)
    }

    /// Runs until the returned handle is aborted or the runtime shuts down.
    pub fn start_cache_sweeper(&self) -> AppResult<JoinHandle<()>> {
        let interval = Duration::from_secs(self.settings()?.sweep_interval_secs);
        Ok(spawn_sweeper(self.cache.clone(), interval))
    }

    pub fn snapshot(&self, subject_id: &str) -> AppResult<Snapshot> {
        let capabilities = self.capabilities();
        self.with_assembler(|assembler| assembler.customer_snapshot(&capabilities, subject_id))
    }

    /// Uncached; used for ad-hoc batches such as exports.
    pub fn snapshot_batch(&self, subject_ids: &[String]) -> AppResult<BTreeMap<String, Snapshot>> {
        let capabilities = self.capabilities();
        let settings = self.settings()?;
        Ok(self.aggregator(&settings).snapshot_batch(&capabilities, subject_ids))
    }

    pub fn authorize(&self, consultant_id: &str, customer_id: &str) -> AppResult<VisibilityDecision> {
        VisibilityGate::new(&self.db).authorize(consultant_id, customer_id)
    }

    pub fn client_snapshot(&self, consultant_id: &str, customer_id: &str) -> AppResult<Gated<Snapshot>> {
        let decision = self.authorize(consultant_id, customer_id)?;
        if !decision.allowed {
            return Ok(Gated::Denied { decision });
        }
        Ok(Gated::Allowed {
            data: self.snapshot(customer_id)?,
        })
    }

    pub fn client_overview(&self, consultant_id: &str, customer_id: &str) -> AppResult<Gated<ClientOverview>> {
        let decision = VisibilityGate::new(&self.db).authorize_metadata(consultant_id, customer_id)?;
        if !decision.allowed {
            return Ok(Gated::Denied { decision });
        }
        let link = self
            .db
            .get_link(consultant_id, customer_id)?
            .ok_or_else(|| AppError::NotFound(format!("link {consultant_id} -> {customer_id}")))?;

        Ok(Gated::Allowed {
            data: ClientOverview {
                link,
                notes: self.db.list_notes(consultant_id, customer_id)?,
                reports: self.db.list_reports(consultant_id, customer_id)?,
                snapshot: self.client_snapshot(consultant_id, customer_id)?,
            },
        })
    }

    /// Consultant-client scopes are gated; the remaining scopes rely on the
    /// caller's authentication.
    pub fn dashboard(&self, scope: &Scope, period: &Period) -> AppResult<Gated<KpiPayload>> {
        if let Scope::ConsultantClient {
            consultant_id,
            customer_id,
        } = scope
        {
            let decision = self.authorize(consultant_id, customer_id)?;
            if !decision.allowed {
                return Ok(Gated::Denied { decision });
            }
        }

        let capabilities = self.capabilities();
        let payload = self.with_assembler(|assembler| assembler.assemble(&capabilities, scope, period))?;
        Ok(Gated::Allowed { data: payload })
    }

    pub fn register_subject(&self, id: &str, name: &str, role: SubjectRole) -> AppResult<Subject> {
        let subject = self.db.insert_user(id, name, role, Utc::now())?;
        self.invalidate(Mutation::SubjectRegistered {
            subject_id: id.to_string(),
        });
        Ok(subject)
    }

    pub fn change_role(&self, subject_id: &str, role: SubjectRole) -> AppResult<()> {
        if !self.db.set_user_role(subject_id, role)? {
            return Err(AppError::NotFound(format!("subject {subject_id}")));
        }
        self.invalidate(Mutation::RoleChanged {
            subject_id: subject_id.to_string(),
        });
        Ok(())
    }

    pub fn set_blocked(&self, subject_id: &str, blocked: bool) -> AppResult<()> {
        if !self.db.set_user_blocked(subject_id, blocked)? {
            return Err(AppError::NotFound(format!("subject {subject_id}")));
        }
        self.invalidate(Mutation::BlockStatusChanged {
            subject_id: subject_id.to_string(),
        });
        Ok(())
    }

    pub fn add_note(&self, consultant_id: &str, customer_id: &str, body: &str) -> AppResult<Gated<NoteRecord>> {
        let decision = VisibilityGate::new(&self.db).authorize_metadata(consultant_id, customer_id)?;
        if !decision.allowed {
            return Ok(Gated::Denied { decision });
        }
        let note = self.db.insert_note(consultant_id, customer_id, body)?;
        self.invalidate(Mutation::NoteCreated {
            consultant_id: consultant_id.to_string(),
            customer_id: customer_id.to_string(),
        });
        Ok(Gated::Allowed { data: note })
    }

    pub fn add_report(
        &self,
        consultant_id: &str,
        customer_id: &str,
        title: &str,
        kind: &str,
    ) -> AppResult<Gated<ReportMeta>> {
        let decision = VisibilityGate::new(&self.db).authorize_metadata(consultant_id, customer_id)?;
        if !decision.allowed {
            return Ok(Gated::Denied { decision });
        }
        let report = self.db.insert_report(consultant_id, customer_id, title, kind)?;
        self.invalidate(Mutation::ReportWritten {
            consultant_id: consultant_id.to_string(),
            customer_id: customer_id.to_string(),
        });
        Ok(Gated::Allowed { data: report })
    }

    /// New links start pending; re-inviting resets an existing link.
    pub fn invite_client(
        &self,
        consultant_id: &str,
        customer_id: &str,
        can_view_all: bool,
    ) -> AppResult<ConsultantCustomerLink> {
        let link = self
            .db
            .upsert_link(consultant_id, customer_id, LinkStatus::Pending, can_view_all)?;
        self.relationship_changed(consultant_id, customer_id);
        Ok(link)
    }

    pub fn update_link_status(&self, consultant_id: &str, customer_id: &str, status: LinkStatus) -> AppResult<()> {
        if !self.db.update_link_status(consultant_id, customer_id, status)? {
            return Err(AppError::NotFound(format!("link {consultant_id} -> {customer_id}")));
        }
        self.relationship_changed(consultant_id, customer_id);
        Ok(())
    }

    pub fn set_link_visibility(&self, consultant_id: &str, customer_id: &str, can_view_all: bool) -> AppResult<()> {
        if !self.db.set_link_visibility(consultant_id, customer_id, can_view_all)? {
            return Err(AppError::NotFound(format!("link {consultant_id} -> {customer_id}")));
        }
        self.relationship_changed(consultant_id, customer_id);
        Ok(())
    }

    pub fn disconnect_client(&self, consultant_id: &str, customer_id: &str) -> AppResult<bool> {
        let removed = self.db.delete_link(consultant_id, customer_id)?;
        if removed {
            self.relationship_changed(consultant_id, customer_id);
        }
        Ok(removed)
    }

    pub fn record_cash_holding(&self, holding: &CashHolding) -> AppResult<String> {
        let id = self.db.insert_cash_holding(holding)?;
        self.connection_synced(&holding.owner_id);
        Ok(id)
    }

    pub fn record_investment_holding(&self, holding: &InvestmentHolding) -> AppResult<String> {
        let id = self.db.insert_investment_holding(holding)?;
        self.connection_synced(&holding.owner_id);
        Ok(id)
    }

    pub fn record_debt_facility(&self, facility: &DebtFacility) -> AppResult<String> {
        let id = self.db.insert_debt_facility(facility)?;
        self.connection_synced(&facility.owner_id);
        Ok(id)
    }

    pub fn record_payment(&self, subject_id: &str, amount: Decimal, paid_at: DateTime<Utc>) -> AppResult<String> {
        let id = self.db.insert_payment(subject_id, amount, paid_at)?;
        self.invalidate(Mutation::PaymentRecorded);
        Ok(id)
    }

    /// Migrations may add relations while the process runs; the memoised
    /// descriptor and every cached figure are dropped so the next read sees it.
    pub fn install_relation(&self, relation: Relation) -> AppResult<()> {
        self.db.install_relation(relation)?;
        self.probe.forget();
        self.invalidate(Mutation::RelationInstalled { relation });
        Ok(())
    }

    fn relationship_changed(&self, consultant_id: &str, customer_id: &str) {
        self.invalidate(Mutation::RelationshipChanged {
            consultant_id: consultant_id.to_string(),
            customer_id: customer_id.to_string(),
        });
    }

    fn connection_synced(&self, customer_id: &str) {
        self.invalidate(Mutation::ConnectionSynced {
            customer_id: customer_id.to_string(),
        });
    }

    fn invalidate(&self, mutation: Mutation) {
        apply_invalidation(&self.db, self.cache.as_ref(), &mutation);
    }

    fn aggregator(&self, settings: &EngineSettings) -> SnapshotAggregator<'_> {
        SnapshotAggregator::new(
            &self.db,
            SourceResolver::new(settings.precedence),
            settings.batch_chunk_size,
        )
    }

    fn with_assembler<T>(&self, run: impl FnOnce(&DashboardAssembler<'_>) -> AppResult<T>) -> AppResult<T> {
        let settings = self.settings()?;
        let assembler = DashboardAssembler::new(
            &self.db,
            self.cache.as_ref(),
            self.aggregator(&settings),
            CacheTtls::from_settings(&settings),
        );
        run(&assembler)
    }
}
