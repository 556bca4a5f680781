use crate::capability::{CapabilityDescriptor, Relation};
use crate::errors::{AppError, AppResult};
use crate::models::PrecedencePolicy;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

static SAFE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("valid identifier regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Component {
    Cash,
    Investments,
    Debt,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Cash, Component::Investments, Component::Debt];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Investments => "investments",
            Self::Debt => "debt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitScale {
    /// Values are already in decimal currency units.
    Decimal,
    /// Values are cents and are divided by 100 before use.
    MinorUnits,
}

impl UnitScale {
    pub fn apply(self, raw: Decimal) -> Decimal {
        match self {
            Self::Decimal => raw,
            Self::MinorUnits => raw / Decimal::ONE_HUNDRED,
        }
    }
}

/// Declarative description of where one figure lives. The store builds its
/// summation query from this and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpec {
    pub relation: Relation,
    pub owner_column: &'static str,
    pub value_column: &'static str,
    pub type_column: Option<&'static str>,
    pub recorded_column: &'static str,
    pub filter: Option<&'static str>,
    pub unit: UnitScale,
}

pub const CONNECTED_CASH: SourceSpec = SourceSpec {
    relation: Relation::ConnectedAccounts,
    owner_column: "user_id",
    value_column: "balance",
    type_column: None,
    recorded_column: "synced_at",
    filter: Some("account_type = 'BANK'"),
    unit: UnitScale::Decimal,
};

pub const CONNECTED_INVESTMENTS: SourceSpec = SourceSpec {
    relation: Relation::ConnectedInvestments,
    owner_column: "user_id",
    value_column: "current_value",
    type_column: Some("investment_type"),
    recorded_column: "synced_at",
    filter: None,
    unit: UnitScale::Decimal,
};

pub const CONNECTED_DEBT: SourceSpec = SourceSpec {
    relation: Relation::ConnectedCardBills,
    owner_column: "user_id",
    value_column: "total_amount",
    type_column: None,
    recorded_column: "synced_at",
    filter: Some("status <> 'PAID'"),
    unit: UnitScale::Decimal,
};

pub const LEDGER_CASH: SourceSpec = SourceSpec {
    relation: Relation::LedgerAccounts,
    owner_column: "user_id",
    value_column: "balance_cents",
    type_column: None,
    recorded_column: "created_at",
    filter: None,
    unit: UnitScale::MinorUnits,
};

pub const LEDGER_INVESTMENTS: SourceSpec = SourceSpec {
    relation: Relation::LedgerInvestments,
    owner_column: "user_id",
    value_column: "current_value_cents",
    type_column: Some("asset_type"),
    recorded_column: "created_at",
    filter: None,
    unit: UnitScale::MinorUnits,
};

pub const LEDGER_DEBT: SourceSpec = SourceSpec {
    relation: Relation::LedgerCardInvoices,
    owner_column: "user_id",
    value_column: "amount_cents",
    type_column: None,
    recorded_column: "created_at",
    filter: Some("status = 'open'"),
    unit: UnitScale::MinorUnits,
};

pub const PAYMENTS: SourceSpec = SourceSpec {
    relation: Relation::Payments,
    owner_column: "user_id",
    value_column: "amount_cents",
    type_column: None,
    recorded_column: "paid_at",
    filter: Some("status = 'paid'"),
    unit: UnitScale::MinorUnits,
};

impl SourceSpec {
    pub fn table(&self) -> &'static str {
        self.relation.table_name()
    }

    /// Identifiers are interpolated into SQL, so every one must be plain.
    pub fn validate(&self) -> AppResult<()> {
        let identifiers = [
            Some(self.table()),
            Some(self.owner_column),
            Some(self.value_column),
            self.type_column,
            Some(self.recorded_column),
        ];
        for identifier in identifiers.into_iter().flatten() {
            if !SAFE_IDENTIFIER.is_match(identifier) {
                return Err(AppError::InvalidInput(format!(
                    "unsafe identifier '{}' in source spec",
                    identifier
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSource {
    pub primary: SourceSpec,
    /// Only set under the zero-fallback policy when both generations exist.
    pub fallback: Option<SourceSpec>,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceResolver {
    policy: PrecedencePolicy,
}

impl SourceResolver {
    pub fn new(policy: PrecedencePolicy) -> Self {
        Self { policy }
    }

    /// Newest generation first.
    pub fn candidates(component: Component) -> [SourceSpec; 2] {
        match component {
            Component::Cash => [CONNECTED_CASH, LEDGER_CASH],
            Component::Investments => [CONNECTED_INVESTMENTS, LEDGER_INVESTMENTS],
            Component::Debt => [CONNECTED_DEBT, LEDGER_DEBT],
        }
    }

    pub fn resolve(&self, component: Component, capabilities: &CapabilityDescriptor) -> Option<ResolvedSource> {
        let [newest, legacy] = Self::candidates(component);
        let newest_present = capabilities.has(newest.relation);
        let legacy_present = capabilities.has(legacy.relation);

        match (newest_present, legacy_present) {
            (true, true) => Some(ResolvedSource {
                primary: newest,
                fallback: match self.policy {
                    PrecedencePolicy::ZeroFallback => Some(legacy),
                    PrecedencePolicy::Capability => None,
                },
            }),
            (true, false) => Some(ResolvedSource {
                primary: newest,
                fallback: None,
            }),
            (false, true) => Some(ResolvedSource {
                primary: legacy,
                fallback: None,
            }),
            (false, false) => None,
        }
    }

    pub fn resolve_cash_source(&self, capabilities: &CapabilityDescriptor) -> Option<ResolvedSource> {
        self.resolve(Component::Cash, capabilities)
    }

    pub fn resolve_investment_source(&self, capabilities: &CapabilityDescriptor) -> Option<ResolvedSource> {
        self.resolve(Component::Investments, capabilities)
    }

    pub fn resolve_debt_source(&self, capabilities: &CapabilityDescriptor) -> Option<ResolvedSource> {
        self.resolve(Component::Debt, capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Component, SourceResolver, SourceSpec, UnitScale, CONNECTED_CASH, LEDGER_CASH, LEDGER_DEBT, PAYMENTS,
    };
    use crate::capability::{CapabilityDescriptor, Relation};
    use crate::models::PrecedencePolicy;
    use rust_decimal::Decimal;

    #[test]
    fn aggregator_generation_wins_when_both_exist() {
        let resolver = SourceResolver::new(PrecedencePolicy::Capability);
        let caps = CapabilityDescriptor::from_present(&[Relation::ConnectedAccounts, Relation::LedgerAccounts]);

        let resolved = resolver.resolve_cash_source(&caps).expect("cash source");
        assert_eq!(resolved.primary, CONNECTED_CASH);
        assert!(resolved.fallback.is_none());
    }

    #[test]
    fn legacy_used_only_when_aggregator_absent() {
        let resolver = SourceResolver::new(PrecedencePolicy::Capability);
        let caps = CapabilityDescriptor::from_present(&[Relation::LedgerAccounts, Relation::ConnectedInvestments]);

        assert_eq!(resolver.resolve_cash_source(&caps).expect("cash").primary, LEDGER_CASH);
        assert_eq!(
            resolver
                .resolve_investment_source(&caps)
                .expect("investments")
                .primary
                .relation,
            Relation::ConnectedInvestments
        );
        assert!(resolver.resolve_debt_source(&caps).is_none());
    }

    #[test]
    fn zero_fallback_policy_exposes_legacy_as_fallback() {
        let resolver = SourceResolver::new(PrecedencePolicy::ZeroFallback);
        let caps = CapabilityDescriptor::from_present(&[Relation::ConnectedCardBills, Relation::LedgerCardInvoices]);

        let resolved = resolver.resolve(Component::Debt, &caps).expect("debt");
        assert_eq!(resolved.fallback, Some(LEDGER_DEBT));

        let legacy_only = CapabilityDescriptor::from_present(&[Relation::LedgerCardInvoices]);
        let resolved = resolver.resolve(Component::Debt, &legacy_only).expect("debt");
        assert_eq!(resolved.primary, LEDGER_DEBT);
        assert!(resolved.fallback.is_none());
    }

    #[test]
    fn minor_units_are_divided_by_one_hundred() {
        assert_eq!(UnitScale::MinorUnits.apply(Decimal::from(50_000)), Decimal::from(500));
        assert_eq!(UnitScale::Decimal.apply(Decimal::new(100_050, 2)), Decimal::new(100_050, 2));
    }

    #[test]
    fn every_bundled_spec_passes_identifier_validation() {
        for component in Component::ALL {
            for spec in SourceResolver::candidates(component) {
                spec.validate().expect("valid spec");
            }
        }
        PAYMENTS.validate().expect("valid payments spec");

        let hostile = SourceSpec {
            value_column: "balance); DROP TABLE users; --",
            ..CONNECTED_CASH
        };
        assert!(hostile.validate().is_err());
    }
}
