use super::{format_time, parse_time, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{CashHolding, DebtFacility, InvestmentHolding, SourceGeneration};
use crate::sources::SourceSpec;
use chrono::{DateTime, Utc};
use rusqlite::params;
use rusqlite::types::Value;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeGroup {
    pub kind: Option<String>,
    pub count: i64,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub enum OwnerFilter<'a> {
    One(&'a str),
    Many(&'a [String]),
    All,
}

impl Database {
    pub fn insert_cash_holding(&self, holding: &CashHolding) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        match holding.generation {
            SourceGeneration::Aggregator => conn.execute(
                "INSERT INTO connected_accounts (id, user_id, account_type, balance, synced_at)
                 VALUES (?1, ?2, 'BANK', ?3, ?4)",
                params![id, holding.owner_id, to_real(holding.amount)?, format_time(holding.recorded_at)],
            )?,
            SourceGeneration::Legacy => conn.execute(
                "INSERT INTO ledger_accounts (id, user_id, balance_cents, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, holding.owner_id, to_cents(holding.amount)?, format_time(holding.recorded_at)],
            )?,
        };
        Ok(id)
    }

    pub fn insert_investment_holding(&self, holding: &InvestmentHolding) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        match holding.generation {
            SourceGeneration::Aggregator => conn.execute(
                "INSERT INTO connected_investments (id, user_id, investment_type, quantity, current_value, synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    holding.owner_id,
                    holding.asset_type,
                    to_real(holding.quantity)?,
                    to_real(holding.current_value)?,
                    format_time(holding.recorded_at)
                ],
            )?,
            SourceGeneration::Legacy => conn.execute(
                "INSERT INTO ledger_investments (id, user_id, asset_type, quantity, current_value_cents, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    holding.owner_id,
                    holding.asset_type,
                    to_real(holding.quantity)?,
                    to_cents(holding.current_value)?,
                    format_time(holding.recorded_at)
                ],
            )?,
        };
        Ok(id)
    }

    pub fn insert_debt_facility(&self, facility: &DebtFacility) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        match facility.generation {
            SourceGeneration::Aggregator => conn.execute(
                "INSERT INTO connected_card_bills (id, user_id, total_amount, status, synced_at)
                 VALUES (?1, ?2, ?3, 'OPEN', ?4)",
                params![id, facility.owner_id, to_real(facility.open_balance)?, format_time(facility.recorded_at)],
            )?,
            SourceGeneration::Legacy => conn.execute(
                "INSERT INTO ledger_card_invoices (id, user_id, amount_cents, status, created_at)
                 VALUES (?1, ?2, ?3, 'open', ?4)",
                params![id, facility.owner_id, to_cents(facility.open_balance)?, format_time(facility.recorded_at)],
            )?,
        };
        Ok(id)
    }

    pub fn insert_payment(&self, user_id: &str, amount: Decimal, paid_at: DateTime<Utc>) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO payments (id, user_id, amount_cents, status, paid_at) VALUES (?1, ?2, ?3, 'paid', ?4)",
            params![id, user_id, to_cents(amount)?, format_time(paid_at)],
        )?;
        Ok(id)
    }

    pub fn sum_by_owner(
        &self,
        spec: &SourceSpec,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
        chunk_size: usize,
    ) -> AppResult<BTreeMap<String, Decimal>> {
        spec.validate()?;
        let batches: Vec<OwnerFilter<'_>> = match filter {
            OwnerFilter::Many(owners) => owners.chunks(chunk_size.max(1)).map(OwnerFilter::Many).collect(),
            other => vec![other],
        };

        let mut totals = BTreeMap::new();
        let conn = self.connection()?;
        for batch in batches {
            let mut query = format!(
                "SELECT {owner}, COALESCE(SUM({value}), 0) FROM {table} WHERE 1 = 1",
                owner = spec.owner_column,
                value = spec.value_column,
                table = spec.table(),
            );
            let mut bound = Vec::new();
            push_owner_filter(&mut query, &mut bound, spec, batch);
            push_predicates(&mut query, &mut bound, spec, as_of);
            query.push_str(&format!(" GROUP BY {}", spec.owner_column));

            self.summation_queries.fetch_add(1, Ordering::Relaxed);
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter()))?;
            while let Some(row) = rows.next()? {
                let owner: String = row.get(0)?;
                let raw: Value = row.get(1)?;
                totals.insert(owner, spec.unit.apply(decimal_from_value(raw)));
            }
        }
        Ok(totals)
    }

    pub fn sum_by_type(
        &self,
        spec: &SourceSpec,
        filter: OwnerFilter<'_>,
        as_of: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<TypeGroup>> {
        spec.validate()?;
        let Some(type_column) = spec.type_column else {
            return Err(AppError::InvalidInput(format!(
                "relation {} has no type column",
                spec.table()
            )));
        };
        if let OwnerFilter::Many(owners) = filter {
            if owners.is_empty() {
                return Ok(Vec::new());
            }
        }

        let mut query = format!(
            "SELECT {kind}, COUNT(1), COALESCE(SUM({value}), 0) FROM {table} WHERE 1 = 1",
            kind = type_column,
            value = spec.value_column,
            table = spec.table(),
        );
        let mut bound = Vec::new();
        push_owner_filter(&mut query, &mut bound, spec, filter);
        push_predicates(&mut query, &mut bound, spec, as_of);
        query.push_str(&format!(" GROUP BY {kind} ORDER BY {kind} ASC", kind = type_column));

        let conn = self.connection()?;
        self.summation_queries.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
            Ok(TypeGroup {
                kind: row.get(0)?,
                count: row.get(1)?,
                total: spec.unit.apply(decimal_from_value(row.get(2)?)),
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn amounts_between(
        &self,
        spec: &SourceSpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<(DateTime<Utc>, Decimal)>> {
        spec.validate()?;
        let mut query = format!(
            "SELECT {recorded}, {value} FROM {table} WHERE {recorded} >= ?1 AND {recorded} < ?2",
            recorded = spec.recorded_column,
            value = spec.value_column,
            table = spec.table(),
        );
        if let Some(filter) = spec.filter {
            query.push_str(&format!(" AND ({filter})"));
        }
        query.push_str(&format!(" ORDER BY {} ASC", spec.recorded_column));

        let conn = self.connection()?;
        self.summation_queries.fetch_add(1, Ordering::Relaxed);
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![format_time(start), format_time(end)], |row| {
            Ok((
                parse_time(&row.get::<_, String>(0)?)?,
                spec.unit.apply(decimal_from_value(row.get(1)?)),
            ))
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn summation_queries(&self) -> u64 {
        self.summation_queries.load(Ordering::Relaxed)
    }
}

fn push_owner_filter(query: &mut String, bound: &mut Vec<String>, spec: &SourceSpec, filter: OwnerFilter<'_>) {
    match filter {
        OwnerFilter::One(owner) => {
            query.push_str(&format!(" AND {} = ?", spec.owner_column));
            bound.push(owner.to_string());
        }
        OwnerFilter::Many(owners) => {
            let placeholders = vec!["?"; owners.len()].join(", ");
            query.push_str(&format!(" AND {} IN ({})", spec.owner_column, placeholders));
            bound.extend(owners.iter().cloned());
        }
        OwnerFilter::All => {}
    }
}

fn push_predicates(query: &mut String, bound: &mut Vec<String>, spec: &SourceSpec, as_of: Option<DateTime<Utc>>) {
    if let Some(filter) = spec.filter {
        query.push_str(&format!(" AND ({filter})"));
    }
    if let Some(as_of) = as_of {
        query.push_str(&format!(" AND {} < ?", spec.recorded_column));
        bound.push(format_time(as_of));
    }
}

fn decimal_from_value(value: Value) -> Decimal {
    match value {
        Value::Integer(raw) => Decimal::from(raw),
        Value::Real(raw) => Decimal::from_f64(raw).unwrap_or_default(),
        Value::Text(raw) => raw.trim().parse::<Decimal>().unwrap_or_default(),
        Value::Null | Value::Blob(_) => Decimal::ZERO,
    }
}

fn to_cents(amount: Decimal) -> AppResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::InvalidInput(format!("amount {amount} does not fit in minor units")))
}

fn to_real(amount: Decimal) -> AppResult<f64> {
    amount
        .to_f64()
        .ok_or_else(|| AppError::InvalidInput(format!("amount {amount} is not representable")))
}
