//! Conversion between query results and polars frames
use crate::database::value::{PgKind, SqlRow, SqlValue};
use crate::error::ConnectionError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use sqlx::postgres::Postgres;
use sqlx::query_builder::Separated;
use std::fmt;

/// What `to_sql` does when the destination table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Insert into the existing table, creating it when missing
    #[default]
    Append,
    /// Drop and recreate the table before inserting
    Replace,
    /// Refuse to write into an existing table
    Fail,
}

impl std::str::FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "replace" => Ok(WriteMode::Replace),
            "fail" => Ok(WriteMode::Fail),
            other => Err(format!("unknown write mode '{}'", other)),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Append => write!(f, "append"),
            WriteMode::Replace => write!(f, "replace"),
            WriteMode::Fail => write!(f, "fail"),
        }
    }
}

/// Build a column-oriented frame from decoded rows.
///
/// `columns` fixes names, order and types, so a result with no rows still yields
/// a frame with the right schema.
pub(crate) fn rows_to_frame(
    columns: &[(String, PgKind)],
    rows: &[SqlRow],
) -> Result<DataFrame, ConnectionError> {
    let series = columns
        .iter()
        .enumerate()
        .map(|(index, (name, kind))| column_series(name, *kind, rows.iter().map(|row| &row[index])))
        .collect::<Result<Vec<_>, _>>()?;

    DataFrame::new(series).map_err(|e| ConnectionError::frame("assembling the result frame", e))
}

fn column_series<'a>(
    name: &str,
    kind: PgKind,
    values: impl Iterator<Item = &'a SqlValue>,
) -> Result<Series, ConnectionError> {
    let series = match kind {
        PgKind::Bool => Series::new(
            name,
            values.map(|v| if let SqlValue::Bool(b) = v { Some(*b) } else { None }).collect::<Vec<_>>(),
        ),
        PgKind::Int2 | PgKind::Int4 => Series::new(
            name,
            values
                .map(|v| if let SqlValue::Int(i) = v { i32::try_from(*i).ok() } else { None })
                .collect::<Vec<_>>(),
        ),
        PgKind::Int8 => Series::new(
            name,
            values.map(|v| if let SqlValue::Int(i) = v { Some(*i) } else { None }).collect::<Vec<_>>(),
        ),
        PgKind::Float4 => Series::new(
            name,
            values
                .map(|v| if let SqlValue::Float(x) = v { Some(*x as f32) } else { None })
                .collect::<Vec<_>>(),
        ),
        PgKind::Float8 | PgKind::Numeric | PgKind::Money => Series::new(
            name,
            values.map(|v| if let SqlValue::Float(x) = v { Some(*x) } else { None }).collect::<Vec<_>>(),
        ),
        PgKind::Text | PgKind::Uuid | PgKind::Json | PgKind::Time | PgKind::Interval => Series::new(
            name,
            values
                .map(|v| if let SqlValue::Text(s) = v { Some(s.clone()) } else { None })
                .collect::<Vec<_>>(),
        ),
        PgKind::Bytes => Series::new(
            name,
            values
                .map(|v| if let SqlValue::Bytes(b) = v { Some(b.clone()) } else { None })
                .collect::<Vec<_>>(),
        ),
        PgKind::Date => {
            let epoch = unix_epoch_date();
            let days = values
                .map(|v| match v {
                    SqlValue::Date(d) => i32::try_from((*d - epoch).num_days()).ok(),
                    _ => None,
                })
                .collect::<Vec<_>>();
            Series::new(name, days)
                .cast(&DataType::Date)
                .map_err(|e| ConnectionError::frame(format!("building date column '{}'", name), e))?
        },
        PgKind::Timestamp | PgKind::TimestampTz => {
            let micros = values
                .map(|v| match v {
                    SqlValue::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<Vec<_>>();
            Series::new(name, micros)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                .map_err(|e| {
                    ConnectionError::frame(format!("building timestamp column '{}'", name), e)
                })?
        },
    };
    Ok(series)
}

fn unix_epoch_date() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

/// Value family of a frame column, used to type nulls when binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Date,
    Timestamp,
}

/// A frame column flattened into bindable values
#[derive(Debug)]
pub(crate) struct FrameColumn {
    pub name: String,
    pub sql_type: &'static str,
    pub kind: ValueKind,
    pub values: Vec<SqlValue>,
}

fn frame_err(column: String) -> impl Fn(PolarsError) -> ConnectionError {
    move |e| ConnectionError::frame(format!("reading column '{}'", column), e)
}

/// Flatten every column of `frame` into SQL values plus the DDL type to create it with
pub(crate) fn frame_columns(frame: &DataFrame) -> Result<Vec<FrameColumn>, ConnectionError> {
    frame.get_columns().iter().map(frame_column).collect()
}

fn frame_column(series: &Series) -> Result<FrameColumn, ConnectionError> {
    let name = series.name().to_string();
    let err = frame_err(name.clone());

    let (sql_type, kind, values): (&'static str, ValueKind, Vec<SqlValue>) = match series.dtype() {
        DataType::Boolean => (
            "BOOLEAN",
            ValueKind::Bool,
            series.bool().map_err(&err)?.into_iter().map(SqlValue::from).collect(),
        ),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::UInt8 | DataType::UInt16 => {
            ("INTEGER", ValueKind::Int, int_values(series, &err)?)
        },
        DataType::Int64 | DataType::UInt32 | DataType::UInt64 => {
            ("BIGINT", ValueKind::Int, int_values(series, &err)?)
        },
        DataType::Float32 => ("REAL", ValueKind::Float, float_values(series, &err)?),
        DataType::Float64 => ("DOUBLE PRECISION", ValueKind::Float, float_values(series, &err)?),
        DataType::String => (
            "TEXT",
            ValueKind::Text,
            series.str().map_err(&err)?.into_iter().map(SqlValue::from).collect(),
        ),
        DataType::Binary => (
            "BYTEA",
            ValueKind::Bytes,
            series
                .binary()
                .map_err(&err)?
                .into_iter()
                .map(|v| SqlValue::from(v.map(<[u8]>::to_vec)))
                .collect(),
        ),
        DataType::Date => {
            let epoch = unix_epoch_date();
            let days = series.cast(&DataType::Int32).map_err(&err)?;
            let values = days
                .i32()
                .map_err(&err)?
                .into_iter()
                .map(|d| SqlValue::from(d.map(|d| epoch + chrono::Duration::days(d.into()))))
                .collect();
            ("DATE", ValueKind::Date, values)
        },
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = series.cast(&DataType::Int64).map_err(&err)?;
            let values = raw
                .i64()
                .map_err(&err)?
                .into_iter()
                .map(|v| match v {
                    Some(v) => timestamp_from(v, unit).map(SqlValue::Timestamp).ok_or_else(|| {
                        ConnectionError::InvalidParams(format!(
                            "timestamp {} out of range in column '{}'",
                            v, name
                        ))
                    }),
                    None => Ok(SqlValue::Null),
                })
                .collect::<Result<Vec<_>, _>>()?;
            ("TIMESTAMP", ValueKind::Timestamp, values)
        },
        other => {
            return Err(ConnectionError::UnsupportedType {
                column: name.clone(),
                type_name: other.to_string(),
            });
        },
    };

    Ok(FrameColumn { name, sql_type, kind, values })
}

fn int_values(
    series: &Series,
    err: &impl Fn(PolarsError) -> ConnectionError,
) -> Result<Vec<SqlValue>, ConnectionError> {
    // strict so that u64 values beyond i64::MAX fail instead of turning into nulls
    let cast = series.strict_cast(&DataType::Int64).map_err(err)?;
    Ok(cast.i64().map_err(err)?.into_iter().map(SqlValue::from).collect())
}

fn float_values(
    series: &Series,
    err: &impl Fn(PolarsError) -> ConnectionError,
) -> Result<Vec<SqlValue>, ConnectionError> {
    let cast = series.cast(&DataType::Float64).map_err(err)?;
    Ok(cast.f64().map_err(err)?.into_iter().map(SqlValue::from).collect())
}

fn timestamp_from(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let per_second: i64 = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    };
    let secs = value.div_euclid(per_second);
    let nanos = value.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?).map(|ts| ts.naive_utc())
}

/// Bind one cell of an insert row, giving nulls the column's type
pub(crate) fn push_cell(
    separated: &mut Separated<'_, '_, Postgres, &'static str>,
    kind: ValueKind,
    value: &SqlValue,
) {
    match (value, kind) {
        (SqlValue::Null, ValueKind::Bool) => separated.push_bind(None::<bool>),
        (SqlValue::Null, ValueKind::Int) => separated.push_bind(None::<i64>),
        (SqlValue::Null, ValueKind::Float) => separated.push_bind(None::<f64>),
        (SqlValue::Null, ValueKind::Text) => separated.push_bind(None::<String>),
        (SqlValue::Null, ValueKind::Bytes) => separated.push_bind(None::<Vec<u8>>),
        (SqlValue::Null, ValueKind::Date) => separated.push_bind(None::<NaiveDate>),
        (SqlValue::Null, ValueKind::Timestamp) => separated.push_bind(None::<NaiveDateTime>),
        (SqlValue::Bool(v), _) => separated.push_bind(*v),
        (SqlValue::Int(v), _) => separated.push_bind(*v),
        (SqlValue::Float(v), _) => separated.push_bind(*v),
        (SqlValue::Text(v), _) => separated.push_bind(v.clone()),
        (SqlValue::Bytes(v), _) => separated.push_bind(v.clone()),
        (SqlValue::Date(v), _) => separated.push_bind(*v),
        (SqlValue::Timestamp(v), _) => separated.push_bind(*v),
    };
}

/// Quote an identifier for interpolation into SQL
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `schema.table` with both parts quoted, or just the table
pub(crate) fn qualified_name(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(table),
    }
}

pub(crate) fn create_table_sql(qualified: &str, columns: &[FrameColumn]) -> String {
    let defs = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", qualified, defs)
}

/// Rows per INSERT statement so a chunk stays under the Postgres bind limit
pub(crate) fn rows_per_chunk(column_count: usize) -> usize {
    const MAX_BIND_PARAMS: usize = 65_535;
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}
