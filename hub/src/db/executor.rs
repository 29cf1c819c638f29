use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::pool::DbPool;

// ── Types ────────────────────────────────────────────────────────────────

/// Failure reported by the backing store. Never retried.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        Self(format!("pool: {e}"))
    }
}

/// Bind value for one `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(s) => s.to_sql(),
            Self::Integer(i) => i.to_sql(),
        }
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Driver-neutral column value as produced by an executor.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
}

/// One result row: `(column name, value)` in SELECT order.
pub type StoreRow = Vec<(String, StoreValue)>;

/// The only collaborator that touches the store.
pub trait QueryExecutor: Send + Sync {
    fn fetch_all(&self, query: &BoundQuery) -> Result<Vec<StoreRow>, StoreError>;
}

// ── SQLite ───────────────────────────────────────────────────────────────

/// Executor backed by a read-only r2d2 SQLite pool.
///
/// SQLite has no native temporal or decimal storage, so the declared column
/// type decides how a stored value is interpreted.
pub struct SqliteExecutor {
    pool: DbPool,
    busy_timeout: Duration,
}

impl SqliteExecutor {
    pub fn new(pool: DbPool, busy_timeout: Duration) -> Self {
        Self { pool, busy_timeout }
    }
}

impl QueryExecutor for SqliteExecutor {
    fn fetch_all(&self, query: &BoundQuery) -> Result<Vec<StoreRow>, StoreError> {
        let conn = self.pool.get()?;
        conn.busy_timeout(self.busy_timeout)?;

        let mut stmt = conn.prepare(&query.sql)?;
        let columns: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
            .collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(query.params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut decoded = Vec::with_capacity(columns.len());
            for (idx, (name, decl)) in columns.iter().enumerate() {
                let value = decode_value(row.get_ref(idx)?, decl.as_deref());
                decoded.push((name.clone(), value));
            }
            out.push(decoded);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredKind {
    DateTime,
    Date,
    Decimal,
    Bool,
    Other,
}

fn declared_kind(decl: Option<&str>) -> DeclaredKind {
    let Some(decl) = decl else {
        return DeclaredKind::Other;
    };
    let decl = decl.to_ascii_uppercase();
    if decl.contains("DATETIME") || decl.contains("TIMESTAMP") {
        DeclaredKind::DateTime
    } else if decl.contains("DATE") {
        DeclaredKind::Date
    } else if decl.contains("DECIMAL") || decl.contains("NUMERIC") {
        DeclaredKind::Decimal
    } else if decl.contains("BOOL") {
        DeclaredKind::Bool
    } else {
        DeclaredKind::Other
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Interpret a raw SQLite value using its declared column type. Values that
/// do not fit the declared type are kept as stored.
fn decode_value(value: ValueRef<'_>, decl: Option<&str>) -> StoreValue {
    let kind = declared_kind(decl);
    match value {
        ValueRef::Null => StoreValue::Null,
        ValueRef::Integer(i) => match kind {
            DeclaredKind::Bool => StoreValue::Bool(i != 0),
            _ => StoreValue::Integer(i),
        },
        ValueRef::Real(f) => StoreValue::Real(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match kind {
                DeclaredKind::DateTime => parse_datetime(&text)
                    .map(StoreValue::DateTime)
                    .unwrap_or(StoreValue::Text(text)),
                DeclaredKind::Date => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                    .map(StoreValue::Date)
                    .unwrap_or(StoreValue::Text(text)),
                DeclaredKind::Decimal => Decimal::from_str(text.trim())
                    .map(StoreValue::Decimal)
                    .unwrap_or(StoreValue::Text(text)),
                DeclaredKind::Bool | DeclaredKind::Other => StoreValue::Text(text),
            }
        }
        ValueRef::Blob(bytes) => StoreValue::Bytes(bytes.to_vec()),
    }
}
