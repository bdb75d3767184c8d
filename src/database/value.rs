//! Dynamically typed SQL values used for parameters and fetched rows
use crate::error::ConnectionError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Serialize;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgRow, PgTypeInfo};
use sqlx::query::Query;
use sqlx::{Column, Decode, Encode, Postgres, Row, Type, TypeInfo};
use std::fmt;

/// A single fetched row, one value per result column
pub type SqlRow = Vec<SqlValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Postgres column types the connector knows how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Money,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Json,
}

impl PgKind {
    /// Map a Postgres type name (as reported by the driver) to a kind
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "BOOL" => PgKind::Bool,
            "INT2" => PgKind::Int2,
            "INT4" => PgKind::Int4,
            "INT8" => PgKind::Int8,
            "FLOAT4" => PgKind::Float4,
            "FLOAT8" => PgKind::Float8,
            "NUMERIC" => PgKind::Numeric,
            "MONEY" => PgKind::Money,
            // the driver reports bpchar as CHAR
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "CITEXT" => PgKind::Text,
            "BYTEA" => PgKind::Bytes,
            "DATE" => PgKind::Date,
            "TIME" => PgKind::Time,
            "INTERVAL" => PgKind::Interval,
            "TIMESTAMP" => PgKind::Timestamp,
            "TIMESTAMPTZ" => PgKind::TimestampTz,
            "UUID" => PgKind::Uuid,
            "JSON" | "JSONB" => PgKind::Json,
            _ => return None,
        };
        Some(kind)
    }

    /// Resolve the kind of a result column, rejecting types the connector cannot decode
    pub fn of_column<C: Column>(column: &C) -> Result<Self, ConnectionError> {
        let type_name = column.type_info().name();
        PgKind::from_type_name(type_name).ok_or_else(|| ConnectionError::UnsupportedType {
            column: column.name().to_string(),
            type_name: type_name.to_string(),
        })
    }
}

/// A null parameter with no declared type, so the server infers it from the statement
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a value as the next positional parameter.
///
/// `Null` carries no type, so it fits whatever column or expression it lands in.
pub(crate) fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(UntypedNull),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
    }
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<Option<T>, ConnectionError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
        .map_err(|e| ConnectionError::database(format!("decoding column {}", index), e))
}

/// Decode one cell of `row` according to `kind`
pub(crate) fn decode_cell(
    row: &PgRow,
    index: usize,
    kind: PgKind,
) -> Result<SqlValue, ConnectionError> {
    let value = match kind {
        PgKind::Bool => get::<bool>(row, index)?.into(),
        PgKind::Int2 => get::<i16>(row, index)?.map(i64::from).into(),
        PgKind::Int4 => get::<i32>(row, index)?.map(i64::from).into(),
        PgKind::Int8 => get::<i64>(row, index)?.into(),
        PgKind::Float4 => get::<f32>(row, index)?.map(f64::from).into(),
        PgKind::Float8 => get::<f64>(row, index)?.into(),
        PgKind::Numeric => get::<Decimal>(row, index)?.and_then(|d| d.to_f64()).into(),
        PgKind::Money => get::<PgMoney>(row, index)?.map(|m| m.0 as f64 / 100.0).into(),
        PgKind::Text => get::<String>(row, index)?.into(),
        PgKind::Bytes => get::<Vec<u8>>(row, index)?.into(),
        PgKind::Date => get::<NaiveDate>(row, index)?.into(),
        PgKind::Time => get::<NaiveTime>(row, index)?.map(|t| t.to_string()).into(),
        PgKind::Interval => get::<PgInterval>(row, index)?.as_ref().map(format_interval).into(),
        PgKind::Timestamp => get::<NaiveDateTime>(row, index)?.into(),
        PgKind::TimestampTz => get::<DateTime<Utc>>(row, index)?.map(|ts| ts.naive_utc()).into(),
        PgKind::Uuid => get::<uuid::Uuid>(row, index)?.map(|id| id.to_string()).into(),
        PgKind::Json => get::<serde_json::Value>(row, index)?.map(|v| v.to_string()).into(),
    };
    Ok(value)
}

/// Render an interval the way `psql` shows it, e.g. `1 year 2 mons 3 days 04:05:06.5`
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    for (value, unit) in [(years, "year"), (months, "mon"), (interval.days, "day")] {
        if value != 0 {
            let plural = if value.abs() == 1 { "" } else { "s" };
            parts.push(format!("{} {}{}", value, unit, plural));
        }
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock =
            format!("{}{:02}:{:02}:{:02}", sign, secs / 3600, (secs / 60) % 60, secs % 60);
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

/// Decode every column of `row` into a tuple of values
pub(crate) fn decode_row(row: &PgRow) -> Result<SqlRow, ConnectionError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| decode_cell(row, index, PgKind::of_column(column)?))
        .collect()
}
