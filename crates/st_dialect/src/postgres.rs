//! sqlx PostgreSQL adapter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo};
use tracing::debug;

use crate::adapter::{sql_head, SqlAdapter};
use crate::dialect::Dialect;
use crate::error::DialectError;
use crate::value::{SqlRow, SqlValue};

/// Adapter handle. Cheap to clone (pool is Arc internally).
#[derive(Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub async fn connect(url: &str) -> Result<Self, DialectError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SqlAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DialectError> {
        debug!(sql = sql_head(sql), params = params.len(), "postgres execute");
        let query = bind_all(sqlx::query(sql), params)?;
        let done = query.execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DialectError> {
        debug!(sql = sql_head(sql), params = params.len(), "postgres query");
        let query = bind_all(sqlx::query(sql), params)?;
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> Result<Query<'q, Postgres, PgArguments>, DialectError> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Int(v) => query.bind(*v),
            // PostgreSQL has no unsigned int type; BIGINT is the widest fit
            SqlValue::UInt(v) => {
                let v = i64::try_from(*v).map_err(|_| {
                    DialectError::Bind(format!("u64 value {v} exceeds BIGINT range"))
                })?;
                query.bind(v)
            }
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bytes(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
        };
    }
    Ok(query)
}

fn decode_row(row: &PgRow) -> Result<SqlRow, DialectError> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, idx)?);
    }
    Ok(SqlRow::new(columns, values))
}

/// Probe decodings per column; PostgreSQL int decoding is exact-width, so
/// INT4 (information_schema casts, SERIAL) needs its own probe next to INT8.
fn decode_value(row: &PgRow, idx: usize) -> Result<SqlValue, DialectError> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return Ok(v.map(SqlValue::Int).unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return Ok(v.map(|n| SqlValue::Int(n.into())).unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return Ok(v.map(|n| SqlValue::Int(n.into())).unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return Ok(v.map(SqlValue::Float).unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return Ok(v.map(SqlValue::Bool).unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
        return Ok(v.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return Ok(v
            .map(|naive| SqlValue::Timestamp(Utc.from_utc_datetime(&naive)))
            .unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return Ok(v.map(SqlValue::Text).unwrap_or(SqlValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return Ok(v.map(SqlValue::Bytes).unwrap_or(SqlValue::Null));
    }
    Err(DialectError::Decode(format!(
        "column {:?} has unsupported type {}",
        row.columns()[idx].name(),
        row.columns()[idx].type_info().name()
    )))
}
