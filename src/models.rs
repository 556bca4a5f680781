use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectRole {
    Customer,
    Consultant,
    Admin,
}

impl SubjectRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Consultant => "consultant",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub role: SubjectRole,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceGeneration {
    Aggregator,
    Legacy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashHolding {
    pub owner_id: String,
    pub generation: SourceGeneration,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentHolding {
    pub owner_id: String,
    pub generation: SourceGeneration,
    pub asset_type: Option<String>,
    pub quantity: Decimal,
    pub current_value: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtFacility {
    pub owner_id: String,
    pub generation: SourceGeneration,
    pub open_balance: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkStatus {
    Pending,
    Active,
    Paused,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantCustomerLink {
    pub id: String,
    pub consultant_id: String,
    pub customer_id: String,
    pub status: LinkStatus,
    pub can_view_all: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub id: String,
    pub consultant_id: String,
    pub customer_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub id: String,
    pub consultant_id: String,
    pub customer_id: String,
    pub title: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cash: Decimal,
    pub investments: Decimal,
    pub debt: Decimal,
    pub net_worth: Decimal,
}

impl Snapshot {
    pub fn from_components(cash: Decimal, investments: Decimal, debt: Decimal) -> Self {
        let cash = cash.max(Decimal::ZERO).round_dp(2);
        let investments = investments.max(Decimal::ZERO).round_dp(2);
        let debt = debt.max(Decimal::ZERO).round_dp(2);
        Self {
            cash,
            investments,
            debt,
            net_worth: cash + investments - debt,
        }
    }

    pub fn combine(&self, other: &Snapshot) -> Snapshot {
        Snapshot::from_components(
            self.cash + other.cash,
            self.investments + other.investments,
            self.debt + other.debt,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VisibilityDecision {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Gated<T> {
    Allowed { data: T },
    Denied { decision: VisibilityDecision },
}

impl<T> Gated<T> {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    pub fn data(self) -> Option<T> {
        match self {
            Self::Allowed { data } => Some(data),
            Self::Denied { .. } => None,
        }
    }
}

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PeriodParts", into = "PeriodParts")]
pub struct Period {
    year: i32,
    month: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeriodParts {
    year: i32,
    #[serde(default)]
    month: Option<u32>,
}

impl TryFrom<PeriodParts> for Period {
    type Error = AppError;

    fn try_from(parts: PeriodParts) -> AppResult<Self> {
        match parts.month {
            Some(month) => Self::month(parts.year, month),
            None => Self::year(parts.year),
        }
    }
}

impl From<Period> for PeriodParts {
    fn from(period: Period) -> Self {
        Self {
            year: period.year,
            month: period.month,
        }
    }
}

fn check_year(year: i32) -> AppResult<()> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(AppError::InvalidInput(format!("year {year} is out of range")));
    }
    Ok(())
}

impl Period {
    pub fn year(year: i32) -> AppResult<Self> {
        check_year(year)?;
        Ok(Self { year, month: None })
    }

    pub fn month(year: i32, month: u32) -> AppResult<Self> {
        check_year(year)?;
        if !(1..=12).contains(&month) {
            return Err(AppError::InvalidInput(format!("month {month} is out of range")));
        }
        Ok(Self {
            year,
            month: Some(month),
        })
    }

    pub fn current_month(now: DateTime<Utc>) -> Self {
        Self {
            year: now.year(),
            month: Some(now.month()),
        }
    }

    pub fn enclosing_year(&self) -> Self {
        Self {
            year: self.year,
            month: None,
        }
    }

    pub fn previous(&self) -> Self {
        let year = self.year.saturating_sub(1);
        match self.month {
            None => Self { year, month: None },
            Some(month) if month <= 1 => Self { year, month: Some(12) },
            Some(month) => Self {
                year: self.year,
                month: Some(month - 1),
            },
        }
    }

    pub fn label(&self) -> String {
        match self.month {
            Some(month) => format!("{:04}-{:02}", self.year, month),
            None => format!("{:04}", self.year),
        }
    }

    pub fn start(&self) -> AppResult<DateTime<Utc>> {
        month_start(self.year, self.month.unwrap_or(1))
    }

    pub fn end(&self) -> AppResult<DateTime<Utc>> {
        match self.month {
            Some(12) | None => {
                let next = self
                    .year
                    .checked_add(1)
                    .ok_or_else(|| AppError::InvalidInput(format!("period {} has no end", self.label())))?;
                month_start(next, 1)
            }
            Some(month) => month_start(self.year, month + 1),
        }
    }
}

fn month_start(year: i32, month: u32) -> AppResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| AppError::InvalidInput(format!("period {year:04}-{month:02} is out of range")))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Scope {
    #[serde(rename_all = "camelCase")]
    Customer { customer_id: String },
    #[serde(rename_all = "camelCase")]
    ConsultantClient {
        consultant_id: String,
        customer_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ConsultantBook { consultant_id: String },
    Platform,
}

impl Scope {
    pub fn label(&self) -> String {
        match self {
            Self::Customer { customer_id } => format!("customer:{customer_id}"),
            Self::ConsultantClient {
                consultant_id,
                customer_id,
            } => format!("consultant:{consultant_id}:client:{customer_id}"),
            Self::ConsultantBook { consultant_id } => format!("book:{consultant_id}"),
            Self::Platform => "platform".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricGrowth {
    pub cash: Decimal,
    pub investments: Decimal,
    pub debt: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: i64,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookCounts {
    pub active: i64,
    pub pending: i64,
    pub paused: i64,
    pub visible: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCount {
    pub month: u32,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAmount {
    pub month: u32,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformUsers {
    pub customers: i64,
    pub consultants: i64,
    pub admins: i64,
    pub blocked: i64,
    pub new_in_period: i64,
    pub new_in_previous_period: i64,
    pub new_users_growth: Decimal,
    pub monthly_signups: Vec<MonthlyCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total: Decimal,
    pub previous_total: Decimal,
    pub growth: Decimal,
    pub monthly: Vec<MonthlyAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiPayload {
    pub scope: String,
    pub period: String,
    pub snapshot: Snapshot,
    pub previous: Snapshot,
    pub growth: MetricGrowth,
    pub breakdown: Vec<BreakdownEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<BookCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<PlatformUsers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<RevenueSummary>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOverview {
    pub link: ConsultantCustomerLink,
    pub notes: Vec<NoteRecord>,
    pub reports: Vec<ReportMeta>,
    pub snapshot: Gated<Snapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrecedencePolicy {
    Capability,
    ZeroFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub snapshot_ttl_secs: u64,
    pub customer_kpi_ttl_secs: u64,
    pub book_kpi_ttl_secs: u64,
    pub platform_kpi_ttl_secs: u64,
    pub capability_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub batch_chunk_size: usize,
    pub precedence: PrecedencePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: 60,
            customer_kpi_ttl_secs: 60,
            book_kpi_ttl_secs: 90,
            platform_kpi_ttl_secs: 120,
            capability_ttl_secs: 30,
            sweep_interval_secs: 30,
            batch_chunk_size: 500,
            precedence: PrecedencePolicy::Capability,
        }
    }
}
