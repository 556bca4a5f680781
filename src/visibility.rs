use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{ConsultantCustomerLink, LinkStatus, VisibilityDecision};

pub const REASON_NO_LINK: &str = "no_link";
pub const REASON_LINK_PENDING: &str = "link_pending";
pub const REASON_LINK_PAUSED: &str = "link_paused";
pub const REASON_SHARING_DISABLED: &str = "sharing_disabled";

/// Enforces the per-relationship sharing flag. A denial is an answer, not an
/// error: store failures are the only `Err` this returns.
pub struct VisibilityGate<'a> {
    db: &'a Database,
}

impl<'a> VisibilityGate<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Financial figures need an active link with sharing enabled.
    pub fn authorize(&self, consultant_id: &str, customer_id: &str) -> AppResult<VisibilityDecision> {
        let link = self.db.get_link(consultant_id, customer_id)?;
        let decision = decide_financial(link.as_ref());
        if !decision.allowed {
            tracing::debug!(
                consultant_id,
                customer_id,
                reason = decision.reason.as_deref().unwrap_or_default(),
                "snapshot access denied"
            );
        }
        Ok(decision)
    }

    /// Notes and report metadata only need the link to be active.
    pub fn authorize_metadata(&self, consultant_id: &str, customer_id: &str) -> AppResult<VisibilityDecision> {
        let link = self.db.get_link(consultant_id, customer_id)?;
        Ok(decide_metadata(link.as_ref()))
    }

    /// Customers whose figures may enter the consultant's book aggregate.
    pub fn visible_customers(&self, consultant_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .db
            .list_links_for_consultant(consultant_id)?
            .into_iter()
            .filter(|link| decide_financial(Some(link)).allowed)
            .map(|link| link.customer_id)
            .collect())
    }
}

fn decide_metadata(link: Option<&ConsultantCustomerLink>) -> VisibilityDecision {
    match link.map(|link| link.status) {
        None => VisibilityDecision::denied(REASON_NO_LINK),
        Some(LinkStatus::Pending) => VisibilityDecision::denied(REASON_LINK_PENDING),
        Some(LinkStatus::Paused) => VisibilityDecision::denied(REASON_LINK_PAUSED),
        Some(LinkStatus::Active) => VisibilityDecision::allowed(),
    }
}

fn decide_financial(link: Option<&ConsultantCustomerLink>) -> VisibilityDecision {
    let decision = decide_metadata(link);
    match link {
        Some(link) if decision.allowed && !link.can_view_all => VisibilityDecision::denied(REASON_SHARING_DISABLED),
        _ => decision,
    }
}
