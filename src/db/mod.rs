mod holdings;

pub use holdings::{OwnerFilter, TypeGroup};

use crate::capability::Relation;
use crate::config::normalize_settings;
use crate::errors::{AppError, AppResult};
use crate::models::{
    BookCounts, ConsultantCustomerLink, EngineSettings, LinkStatus, NoteRecord, ReportMeta, Subject, SubjectRole,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    summation_queries: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleCounts {
    pub customers: i64,
    pub consultants: i64,
    pub admins: i64,
    pub blocked: i64,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            summation_queries: AtomicU64::new(0),
        };
        db.ensure_default_settings()?;
        Ok(db)
    }

    fn connection(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    pub fn insert_user(&self, id: &str, name: &str, role: SubjectRole, created_at: DateTime<Utc>) -> AppResult<Subject> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO users (id, name, role, blocked, created_at) VALUES (?1, ?2, ?3, 0, ?4)",
            params![id, name, role.as_str(), format_time(created_at)],
        )?;
        Ok(Subject {
            id: id.to_string(),
            name: name.to_string(),
            role,
            blocked: false,
            created_at: parse_time(&format_time(created_at))?,
        })
    }

    pub fn get_user(&self, id: &str) -> AppResult<Option<Subject>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, name, role, blocked, created_at FROM users WHERE id = ?1",
            [id],
            parse_subject_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn set_user_role(&self, id: &str, role: SubjectRole) -> AppResult<bool> {
        let conn = self.connection()?;
        let changed = conn.execute("UPDATE users SET role = ?1 WHERE id = ?2", params![role.as_str(), id])?;
        Ok(changed > 0)
    }

    pub fn set_user_blocked(&self, id: &str, blocked: bool) -> AppResult<bool> {
        let conn = self.connection()?;
        let changed = conn.execute("UPDATE users SET blocked = ?1 WHERE id = ?2", params![blocked, id])?;
        Ok(changed > 0)
    }

    pub fn role_counts(&self) -> AppResult<RoleCounts> {
        let conn = self.connection()?;
        let mut counts = RoleCounts::default();
        let mut stmt = conn.prepare("SELECT role, COUNT(1) FROM users GROUP BY role")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let role: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            match role.as_str() {
                "customer" => counts.customers = count,
                "consultant" => counts.consultants = count,
                "admin" => counts.admins = count,
                _ => {}
            }
        }
        counts.blocked = conn.query_row("SELECT COUNT(1) FROM users WHERE blocked = 1", [], |row| row.get(0))?;
        Ok(counts)
    }

    pub fn user_signups_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<Vec<DateTime<Utc>>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT created_at FROM users WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![format_time(start), format_time(end)], |row| {
            parse_time(&row.get::<_, String>(0)?)
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn upsert_link(
        &self,
        consultant_id: &str,
        customer_id: &str,
        status: LinkStatus,
        can_view_all: bool,
    ) -> AppResult<ConsultantCustomerLink> {
        let now = format_time(Utc::now());
        {
            let conn = self.connection()?;
            conn.execute(
                "INSERT INTO consultant_customer_links (id, consultant_id, customer_id, status, can_view_all, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(consultant_id, customer_id) DO UPDATE SET
                   status = excluded.status,
                   can_view_all = excluded.can_view_all,
                   updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    consultant_id,
                    customer_id,
                    status.as_str(),
                    can_view_all,
                    now
                ],
            )?;
        }
        self.get_link(consultant_id, customer_id)?
            .ok_or_else(|| AppError::Internal("link missing after upsert".to_string()))
    }

    pub fn get_link(&self, consultant_id: &str, customer_id: &str) -> AppResult<Option<ConsultantCustomerLink>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, consultant_id, customer_id, status, can_view_all, created_at, updated_at
             FROM consultant_customer_links WHERE consultant_id = ?1 AND customer_id = ?2",
            params![consultant_id, customer_id],
            parse_link_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn update_link_status(&self, consultant_id: &str, customer_id: &str, status: LinkStatus) -> AppResult<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE consultant_customer_links SET status = ?1, updated_at = ?2
             WHERE consultant_id = ?3 AND customer_id = ?4",
            params![status.as_str(), format_time(Utc::now()), consultant_id, customer_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_link_visibility(&self, consultant_id: &str, customer_id: &str, can_view_all: bool) -> AppResult<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE consultant_customer_links SET can_view_all = ?1, updated_at = ?2
             WHERE consultant_id = ?3 AND customer_id = ?4",
            params![can_view_all, format_time(Utc::now()), consultant_id, customer_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_link(&self, consultant_id: &str, customer_id: &str) -> AppResult<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "DELETE FROM consultant_customer_links WHERE consultant_id = ?1 AND customer_id = ?2",
            params![consultant_id, customer_id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_links_for_consultant(&self, consultant_id: &str) -> AppResult<Vec<ConsultantCustomerLink>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, consultant_id, customer_id, status, can_view_all, created_at, updated_at
             FROM consultant_customer_links WHERE consultant_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([consultant_id], parse_link_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn consultants_for_customer(&self, customer_id: &str) -> AppResult<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT consultant_id FROM consultant_customer_links WHERE customer_id = ?1 ORDER BY consultant_id ASC",
        )?;
        let rows = stmt.query_map([customer_id], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn book_counts(&self, consultant_id: &str) -> AppResult<BookCounts> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'paused' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'active' AND can_view_all = 1 THEN 1 ELSE 0 END), 0)
             FROM consultant_customer_links WHERE consultant_id = ?1",
            [consultant_id],
            |row| {
                Ok(BookCounts {
                    active: row.get(0)?,
                    pending: row.get(1)?,
                    paused: row.get(2)?,
                    visible: row.get(3)?,
                })
            },
        )
        .map_err(AppError::from)
    }

    pub fn insert_note(&self, consultant_id: &str, customer_id: &str, body: &str) -> AppResult<NoteRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO customer_notes (id, consultant_id, customer_id, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, consultant_id, customer_id, body, format_time(now)],
        )?;
        Ok(NoteRecord {
            id,
            consultant_id: consultant_id.to_string(),
            customer_id: customer_id.to_string(),
            body: body.to_string(),
            created_at: parse_time(&format_time(now))?,
        })
    }

    pub fn list_notes(&self, consultant_id: &str, customer_id: &str) -> AppResult<Vec<NoteRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, consultant_id, customer_id, body, created_at
             FROM customer_notes WHERE consultant_id = ?1 AND customer_id = ?2
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![consultant_id, customer_id], |row| {
            Ok(NoteRecord {
                id: row.get(0)?,
                consultant_id: row.get(1)?,
                customer_id: row.get(2)?,
                body: row.get(3)?,
                created_at: parse_time(&row.get::<_, String>(4)?)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn insert_report(&self, consultant_id: &str, customer_id: &str, title: &str, kind: &str) -> AppResult<ReportMeta> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO customer_reports (id, consultant_id, customer_id, title, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, consultant_id, customer_id, title, kind, format_time(now)],
        )?;
        Ok(ReportMeta {
            id,
            consultant_id: consultant_id.to_string(),
            customer_id: customer_id.to_string(),
            title: title.to_string(),
            kind: kind.to_string(),
            created_at: parse_time(&format_time(now))?,
        })
    }

    pub fn list_reports(&self, consultant_id: &str, customer_id: &str) -> AppResult<Vec<ReportMeta>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, consultant_id, customer_id, title, kind, created_at
             FROM customer_reports WHERE consultant_id = ?1 AND customer_id = ?2
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![consultant_id, customer_id], |row| {
            Ok(ReportMeta {
                id: row.get(0)?,
                consultant_id: row.get(1)?,
                customer_id: row.get(2)?,
                title: row.get(3)?,
                kind: row.get(4)?,
                created_at: parse_time(&row.get::<_, String>(5)?)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_settings(&self) -> AppResult<EngineSettings> {
        let conn = self.connection()?;
        let raw: String = conn.query_row("SELECT settings_json FROM engine_settings WHERE id = 1", [], |row| {
            row.get(0)
        })?;
        let settings = serde_json::from_str::<EngineSettings>(&raw).unwrap_or_default();
        Ok(normalize_settings(settings))
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<EngineSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: EngineSettings = serde_json::from_value(merged)
            .map_err(|error| AppError::InvalidInput(format!("invalid settings: {error}")))?;
        let settings = normalize_settings(settings);

        let conn = self.connection()?;
        conn.execute(
            "UPDATE engine_settings SET settings_json = ?1 WHERE id = 1",
            [serde_json::to_string(&settings)?],
        )?;
        Ok(settings)
    }

    pub fn relation_exists(&self, table: &str) -> AppResult<bool> {
        let conn = self.connection()?;
        let listed: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        if !listed {
            return Ok(false);
        }
        let mut stmt = conn.prepare(&format!("SELECT 1 FROM {} LIMIT 0", table))?;
        let mut rows = stmt.query([])?;
        rows.next()?;
        Ok(true)
    }

    pub fn install_relation(&self, relation: Relation) -> AppResult<()> {
        let conn = self.connection()?;
        conn.execute_batch(relation_ddl(relation))?;
        tracing::info!(relation = relation.table_name(), "installed optional relation");
        Ok(())
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.connection()?;
        let existing: Option<String> = conn
            .query_row("SELECT settings_json FROM engine_settings WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        if existing.is_none() {
            conn.execute(
                "INSERT INTO engine_settings (id, settings_json) VALUES (1, ?1)",
                [serde_json::to_string(&EngineSettings::default())?],
            )?;
        }
        Ok(())
    }
}

fn relation_ddl(relation: Relation) -> &'static str {
    match relation {
        Relation::ConnectedAccounts => {
            "CREATE TABLE IF NOT EXISTS connected_accounts (
               id TEXT PRIMARY KEY,
               user_id TEXT NOT NULL,
               account_type TEXT NOT NULL DEFAULT 'BANK',
               balance REAL NOT NULL DEFAULT 0,
               synced_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_connected_accounts_user ON connected_accounts(user_id);"
        }
        Relation::ConnectedInvestments => {
            "CREATE TABLE IF NOT EXISTS connected_investments (
               id TEXT PRIMARY KEY,
               user_id TEXT NOT NULL,
               investment_type TEXT,
               quantity REAL NOT NULL DEFAULT 0,
               current_value REAL NOT NULL DEFAULT 0,
               synced_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_connected_investments_user ON connected_investments(user_id);"
        }
        Relation::ConnectedCardBills => {
            "CREATE TABLE IF NOT EXISTS connected_card_bills (
               id TEXT PRIMARY KEY,
               user_id TEXT NOT NULL,
               total_amount REAL NOT NULL DEFAULT 0,
               status TEXT NOT NULL DEFAULT 'OPEN',
               synced_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_connected_card_bills_user ON connected_card_bills(user_id);"
        }
        Relation::LedgerAccounts => {
            "CREATE TABLE IF NOT EXISTS ledger_accounts (
               id TEXT PRIMARY KEY,
               user_id TEXT NOT NULL,
               balance_cents INTEGER NOT NULL DEFAULT 0,
               created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_ledger_accounts_user ON ledger_accounts(user_id);"
        }
        Relation::LedgerInvestments => {
            "CREATE TABLE IF NOT EXISTS ledger_investments (
               id TEXT PRIMARY KEY,
               user_id TEXT NOT NULL,
               asset_type TEXT,
               quantity REAL NOT NULL DEFAULT 0,
               current_value_cents INTEGER NOT NULL DEFAULT 0,
               created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_ledger_investments_user ON ledger_investments(user_id);"
        }
        Relation::LedgerCardInvoices => {
            "CREATE TABLE IF NOT EXISTS ledger_card_invoices (
               id TEXT PRIMARY KEY,
               user_id TEXT NOT NULL,
               amount_cents INTEGER NOT NULL DEFAULT 0,
               status TEXT NOT NULL DEFAULT 'open',
               created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_ledger_card_invoices_user ON ledger_card_invoices(user_id);"
        }
        Relation::Payments => {
            "CREATE TABLE IF NOT EXISTS payments (
               id TEXT PRIMARY KEY,
               user_id TEXT NOT NULL,
               amount_cents INTEGER NOT NULL,
               status TEXT NOT NULL DEFAULT 'paid',
               paid_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_payments_paid ON payments(paid_at);"
        }
    }
}

fn parse_subject_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        role: parse_role(&row.get::<_, String>(2)?)?,
        blocked: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

fn parse_link_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConsultantCustomerLink> {
    Ok(ConsultantCustomerLink {
        id: row.get(0)?,
        consultant_id: row.get(1)?,
        customer_id: row.get(2)?,
        status: parse_link_status(&row.get::<_, String>(3)?)?,
        can_view_all: row.get(4)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
        updated_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

fn parse_role(raw: &str) -> rusqlite::Result<SubjectRole> {
    match raw {
        "customer" => Ok(SubjectRole::Customer),
        "consultant" => Ok(SubjectRole::Consultant),
        "admin" => Ok(SubjectRole::Admin),
        other => Err(invalid_data(format!("Unknown role '{}'", other))),
    }
}

fn parse_link_status(raw: &str) -> rusqlite::Result<LinkStatus> {
    match raw {
        "pending" => Ok(LinkStatus::Pending),
        "active" => Ok(LinkStatus::Active),
        "paused" => Ok(LinkStatus::Paused),
        other => Err(invalid_data(format!("Unknown link status '{}'", other))),
    }
}

fn invalid_data(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

pub(crate) fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| invalid_data(error.to_string()))
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::capability::Relation;
    use crate::models::{LinkStatus, PrecedencePolicy, SubjectRole};
    use chrono::{TimeZone, Utc};

    #[test]
    fn database_can_insert_and_read_user() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.insert_user("cust-1", "Ana", SubjectRole::Customer, Utc::now())
            .expect("insert user");
        db.set_user_blocked("cust-1", true).expect("block");

        let loaded = db.get_user("cust-1").expect("get user").expect("user exists");
        assert_eq!(loaded.role, SubjectRole::Customer);
        assert!(loaded.blocked);
        assert!(db.get_user("missing").expect("get user").is_none());

        let counts = db.role_counts().expect("counts");
        assert_eq!(counts.customers, 1);
        assert_eq!(counts.blocked, 1);
    }

    #[test]
    fn link_upsert_keeps_one_row_per_pair() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let first = db
            .upsert_link("cons-1", "cust-1", LinkStatus::Pending, false)
            .expect("invite");
        let second = db
            .upsert_link("cons-1", "cust-1", LinkStatus::Active, true)
            .expect("accept");
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, LinkStatus::Active);
        assert!(second.can_view_all);

        db.upsert_link("cons-1", "cust-2", LinkStatus::Paused, true)
            .expect("second link");
        let counts = db.book_counts("cons-1").expect("counts");
        assert_eq!(counts.active, 1);
        assert_eq!(counts.paused, 1);
        assert_eq!(counts.visible, 1);

        assert!(db.delete_link("cons-1", "cust-2").expect("delete"));
        assert!(!db.delete_link("cons-1", "cust-2").expect("delete again"));
        assert_eq!(db.consultants_for_customer("cust-1").expect("consultants"), vec!["cons-1"]);
    }

    #[test]
    fn settings_merge_and_clamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let defaults = db.get_settings().expect("settings");
        assert_eq!(defaults.snapshot_ttl_secs, 60);

        let updated = db
            .update_settings(serde_json::json!({
                "platformKpiTtlSecs": 100000,
                "precedence": "zero-fallback"
            }))
            .expect("update");
        assert_eq!(updated.platform_kpi_ttl_secs, 300);
        assert_eq!(updated.precedence, PrecedencePolicy::ZeroFallback);
        assert_eq!(db.get_settings().expect("reload").precedence, PrecedencePolicy::ZeroFallback);

        assert!(db
            .update_settings(serde_json::json!({ "precedence": "newest-wins" }))
            .is_err());
    }

    #[test]
    fn relation_exists_distinguishes_missing_and_broken() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        assert!(!db.relation_exists("payments").expect("probe"));
        db.install_relation(Relation::Payments).expect("install");
        assert!(db.relation_exists("payments").expect("probe"));

        {
            let conn = db.conn.lock().expect("db lock");
            conn.execute_batch("CREATE VIEW broken_view AS SELECT * FROM dropped_table")
                .expect("create view");
        }
        assert!(db.relation_exists("broken_view").is_err());
    }

    #[test]
    fn signups_are_filtered_by_half_open_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let jan = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        db.insert_user("a", "A", SubjectRole::Customer, jan).expect("insert");
        db.insert_user("b", "B", SubjectRole::Consultant, feb).expect("insert");

        let january = db.user_signups_between(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(), feb)
            .expect("signups");
        assert_eq!(january, vec![jan]);
    }
}
