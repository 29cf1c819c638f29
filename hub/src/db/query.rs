use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::executor::{BoundQuery, QueryExecutor, SqlParam, StoreError, StoreRow, StoreValue};
use super::schema::{DatasetKind, DatasetMapping};

pub const DEFAULT_LIMIT: i64 = 200;
pub const MAX_LIMIT: i64 = 1000;

/// Request bound format, also used when echoing bounds back.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Types ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("validation_error: {0}")]
    Validation(String),
    #[error("store_error: {0}")]
    Store(#[from] StoreError),
}

/// Caller-supplied arguments, shared by the HTTP query string and MCP tool
/// arguments. Validation happens in [`execute`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryRequest {
    pub symbol: Option<String>,
    pub time_frame: Option<String>,
    pub exchange: Option<String>,
    pub limit: Option<i64>,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
}

/// Normalized row: output field name → transport-safe value.
pub type Record = Map<String, Value>;

/// Uniform response wrapper. `count` is derived from `records` on output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEnvelope {
    pub kind: DatasetKind,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    pub records: Vec<Record>,
}

impl ResultEnvelope {
    pub fn count(&self) -> usize {
        self.records.len()
    }
}

impl Serialize for ResultEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("start_timestamp", &self.start_timestamp)?;
        map.serialize_entry("end_timestamp", &self.end_timestamp)?;
        map.serialize_entry("count", &self.count())?;
        map.serialize_entry(self.kind.data_key(), &self.records)?;
        map.end()
    }
}

/// Outcome of decoding a JSON-shaped column.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonField {
    Structured(Value),
    Raw(String),
}

impl JsonField {
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(v) => Self::Structured(v),
            Err(_) => Self::Raw(text.to_string()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Structured(v) => v,
            Self::Raw(s) => Value::String(s),
        }
    }
}

// ── Query construction ───────────────────────────────────────────────────

/// Validated request with bounds parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidRequest {
    symbol: String,
    time_frame: String,
    exchange: Option<String>,
    limit: i64,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

/// Blank values are rejected; accepted values are bound exactly as given.
fn required(value: &Option<String>, field: &str) -> Result<String, QueryError> {
    match value.as_deref() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(QueryError::Validation(format!("{field} is required"))),
    }
}

fn parse_bound(value: &Option<String>, field: &str) -> Result<Option<NaiveDateTime>, QueryError> {
    let Some(raw) = value.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(Some)
        .map_err(|_| {
            QueryError::Validation(format!("{field} must use 'YYYY-MM-DD HH:MM:SS', got {raw:?}"))
        })
}

fn validate(request: &QueryRequest) -> Result<ValidRequest, QueryError> {
    let symbol = required(&request.symbol, "symbol")?;
    let time_frame = required(&request.time_frame, "time_frame")?;

    let limit = request.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(QueryError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }

    Ok(ValidRequest {
        symbol,
        time_frame,
        exchange: request
            .exchange
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        limit,
        start: parse_bound(&request.start_timestamp, "start_timestamp")?,
        end: parse_bound(&request.end_timestamp, "end_timestamp")?,
    })
}

/// Rewrite bare minute counts to the stored time-frame labels.
pub fn normalize_time_frame(value: &str) -> &str {
    match value {
        "1" => "1m",
        "5" => "5m",
        "15" => "15m",
        "30" => "30m",
        "45" => "45m",
        "60" => "1H",
        other => other,
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn select_as(source: &str, output: &str) -> String {
    if source == output {
        quote(source)
    } else {
        format!("{} AS {}", quote(source), quote(output))
    }
}

fn build(request: &ValidRequest, mapping: &DatasetMapping) -> BoundQuery {
    let mut columns: Vec<String> = Vec::new();
    if let Some(id) = &mapping.id_column {
        columns.push(quote(id));
    }
    if let Some(ex) = &mapping.exchange_column {
        columns.push(select_as(ex, "exchange"));
    }
    columns.push(select_as(&mapping.symbol_column, "symbol"));
    columns.push(select_as(&mapping.time_frame_column, "time_frame"));
    columns.push(select_as(&mapping.timestamp_column, "timestamp"));
    for c in &mapping.value_columns {
        columns.push(select_as(&c.source, &c.output));
    }

    let time_frame = if mapping.time_frame_aliases {
        normalize_time_frame(&request.time_frame)
    } else {
        request.time_frame.as_str()
    };

    let mut where_clauses = vec![
        format!("{} = ?", quote(&mapping.symbol_column)),
        format!("{} = ?", quote(&mapping.time_frame_column)),
    ];
    let mut params = vec![
        SqlParam::Text(request.symbol.clone()),
        SqlParam::Text(time_frame.to_string()),
    ];

    if let (Some(col), Some(ex)) = (&mapping.exchange_column, &request.exchange) {
        where_clauses.push(format!("{} = ?", quote(col)));
        params.push(SqlParam::Text(ex.clone()));
    }

    let ts = quote(&mapping.timestamp_column);
    if let Some(start) = request.start {
        where_clauses.push(format!("{ts} >= ?"));
        params.push(SqlParam::Text(start.format(TIMESTAMP_FORMAT).to_string()));
    }
    if let Some(end) = request.end {
        where_clauses.push(format!("{ts} <= ?"));
        params.push(SqlParam::Text(end.format(TIMESTAMP_FORMAT).to_string()));
    }
    params.push(SqlParam::Integer(request.limit));

    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {ts} ASC LIMIT ?",
        columns.join(", "),
        quote(&mapping.table),
        where_clauses.join(" AND "),
    );

    BoundQuery { sql, params }
}

// ── Execution ────────────────────────────────────────────────────────────

/// Run one bounded, ascending query and normalize its rows.
///
/// Validation failures return before the executor is touched; store
/// failures are surfaced without retry.
pub fn execute(
    request: &QueryRequest,
    mapping: &DatasetMapping,
    executor: &dyn QueryExecutor,
) -> Result<ResultEnvelope, QueryError> {
    let valid = validate(request)?;
    let query = build(&valid, mapping);

    let rows = executor.fetch_all(&query).map_err(|e| {
        tracing::warn!(dataset = %mapping.kind, "store query failed: {e}");
        QueryError::Store(e)
    })?;
    tracing::debug!(
        dataset = %mapping.kind,
        symbol = %valid.symbol,
        time_frame = %valid.time_frame,
        rows = rows.len(),
        "query executed"
    );

    let records = rows.into_iter().map(|row| normalize_row(row, mapping)).collect();

    Ok(ResultEnvelope {
        kind: mapping.kind,
        start_timestamp: valid.start.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        end_timestamp: valid.end.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        records,
    })
}

// ── Normalization ────────────────────────────────────────────────────────

/// ISO-8601 without timezone; fractional seconds only when present.
pub fn iso_datetime(value: &NaiveDateTime) -> String {
    if value.nanosecond() == 0 {
        value.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

fn iso_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn normalize_value(value: StoreValue) -> Value {
    match value {
        StoreValue::Null => Value::Null,
        StoreValue::Bool(b) => Value::Bool(b),
        StoreValue::Integer(i) => Value::from(i),
        StoreValue::Real(f) => float_value(f),
        StoreValue::Decimal(d) => d.to_f64().map(float_value).unwrap_or(Value::Null),
        StoreValue::Text(s) => Value::String(s),
        StoreValue::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
        StoreValue::DateTime(t) => Value::String(iso_datetime(&t)),
        StoreValue::Date(d) => Value::String(iso_date(&d)),
    }
}

fn normalize_json_column(name: &str, value: StoreValue) -> Value {
    let text = match value {
        StoreValue::Text(s) => s,
        StoreValue::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => s,
            Err(e) => return normalize_value(StoreValue::Bytes(e.into_bytes())),
        },
        other => return normalize_value(other),
    };
    let field = JsonField::decode(&text);
    if matches!(field, JsonField::Raw(_)) {
        tracing::debug!(column = name, "JSON column did not decode, passing raw value through");
    }
    field.into_value()
}

/// Convert one store row into a record; field order follows the row.
pub fn normalize_row(row: StoreRow, mapping: &DatasetMapping) -> Record {
    let mut record = Map::with_capacity(row.len());
    for (name, value) in row {
        let normalized = if mapping.is_json_column(&name) {
            normalize_json_column(&name, value)
        } else {
            normalize_value(value)
        };
        record.insert(name, normalized);
    }
    record
}
