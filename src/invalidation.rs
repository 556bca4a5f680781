use crate::cache::{CacheKey, Invalidation, MetricsCache};
use crate::capability::Relation;
use crate::db::Database;

/// Every write that can change a cached figure. Adding a write path means
/// adding a variant here, so the set of invalidation call sites stays closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SubjectRegistered { subject_id: String },
    RoleChanged { subject_id: String },
    BlockStatusChanged { subject_id: String },
    NoteCreated { consultant_id: String, customer_id: String },
    ReportWritten { consultant_id: String, customer_id: String },
    RelationshipChanged { consultant_id: String, customer_id: String },
    ConnectionSynced { customer_id: String },
    PaymentRecorded,
    RelationInstalled { relation: Relation },
    SettingsChanged,
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubjectRegistered { .. } => "subject_registered",
            Self::RoleChanged { .. } => "role_changed",
            Self::BlockStatusChanged { .. } => "block_status_changed",
            Self::NoteCreated { .. } => "note_created",
            Self::ReportWritten { .. } => "report_written",
            Self::RelationshipChanged { .. } => "relationship_changed",
            Self::ConnectionSynced { .. } => "connection_synced",
            Self::PaymentRecorded => "payment_recorded",
            Self::RelationInstalled { .. } => "relation_installed",
            Self::SettingsChanged => "settings_changed",
        }
    }

    /// Customer whose linked consultants' books are also affected.
    fn affected_customer(&self) -> Option<&str> {
        match self {
            Self::RoleChanged { subject_id } | Self::BlockStatusChanged { subject_id } => Some(subject_id.as_str()),
            Self::ConnectionSynced { customer_id } => Some(customer_id.as_str()),
            _ => None,
        }
    }
}

/// Prefixes a mutation must clear. `linked_consultants` are the consultants
/// holding any link to the affected customer.
pub fn invalidation_targets(mutation: &Mutation, linked_consultants: &[String]) -> Vec<Invalidation> {
    let mut targets = Vec::new();
    match mutation {
        Mutation::SubjectRegistered { subject_id } => {
            targets.push(Invalidation::Prefix(CacheKey::customer_prefix(subject_id)));
            targets.push(Invalidation::Prefix(CacheKey::platform_prefix()));
        }
        Mutation::RoleChanged { subject_id } | Mutation::BlockStatusChanged { subject_id } => {
            targets.push(Invalidation::Prefix(CacheKey::customer_prefix(subject_id)));
            targets.push(Invalidation::Prefix(CacheKey::book_prefix(subject_id)));
            targets.push(Invalidation::Prefix(CacheKey::platform_prefix()));
        }
        Mutation::NoteCreated {
            consultant_id,
            customer_id,
        }
        | Mutation::ReportWritten {
            consultant_id,
            customer_id,
        } => {
            targets.push(Invalidation::Prefix(CacheKey::customer_prefix(customer_id)));
            targets.push(Invalidation::Prefix(CacheKey::book_prefix(consultant_id)));
        }
        Mutation::RelationshipChanged {
            consultant_id,
            customer_id,
        } => {
            targets.push(Invalidation::Prefix(CacheKey::customer_prefix(customer_id)));
            targets.push(Invalidation::Prefix(CacheKey::book_prefix(consultant_id)));
            targets.push(Invalidation::Prefix(CacheKey::platform_prefix()));
        }
        Mutation::ConnectionSynced { customer_id } => {
            targets.push(Invalidation::Prefix(CacheKey::customer_prefix(customer_id)));
            targets.push(Invalidation::Prefix(CacheKey::platform_prefix()));
        }
        Mutation::PaymentRecorded => {
            targets.push(Invalidation::Prefix(CacheKey::platform_prefix()));
        }
        Mutation::RelationInstalled { relation } => {
            tracing::info!(relation = relation.table_name(), "relation installed; clearing every cached figure");
            targets.extend(every_scope());
        }
        Mutation::SettingsChanged => {
            tracing::info!("settings changed; clearing every cached figure");
            targets.extend(every_scope());
        }
    }

    if mutation.affected_customer().is_some() {
        for consultant_id in linked_consultants {
            let target = Invalidation::Prefix(CacheKey::book_prefix(consultant_id));
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }
    targets
}

fn every_scope() -> [Invalidation; 3] {
    [
        Invalidation::Prefix("customer:".to_string()),
        Invalidation::Prefix("book:".to_string()),
        Invalidation::Prefix(CacheKey::platform_prefix()),
    ]
}

/// Best effort: a failed lookup or cache error is logged and the remaining
/// targets are still cleared. Returns the number of entries removed.
pub fn apply_invalidation(db: &Database, cache: &dyn MetricsCache, mutation: &Mutation) -> usize {
    let linked = match mutation.affected_customer() {
        Some(customer_id) => db.consultants_for_customer(customer_id).unwrap_or_else(|error| {
            tracing::warn!(
                mutation = mutation.kind(),
                customer_id,
                error = %error,
                "linked consultant lookup failed; book caches may stay stale until expiry"
            );
            Vec::new()
        }),
        None => Vec::new(),
    };

    let mut removed = 0;
    for target in invalidation_targets(mutation, &linked) {
        match cache.invalidate(&target) {
            Ok(count) => removed += count,
            Err(error) => tracing::warn!(mutation = mutation.kind(), target = ?target, error = %error, "cache invalidation failed"),
        }
    }
    tracing::debug!(mutation = mutation.kind(), removed, "cache invalidated");
    removed
}
