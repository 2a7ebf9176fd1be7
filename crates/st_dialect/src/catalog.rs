//! information_schema lookups.
//!
//! Identifier-valued columns are cast to plain text in the PostgreSQL
//! statements; the catalog views expose them through the `sql_identifier`
//! domain, which drivers do not decode uniformly. Schema defaults to the
//! connected database on MySQL and `public` on PostgreSQL.

use crate::adapter::SqlAdapter;
use crate::dialect::Dialect;
use crate::error::DialectError;
use crate::ident::{like_escape, validate_identifier};
use crate::value::SqlValue;

/// One table column, in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub ordinal: i64,
}

/// Columns of `table`, ordered by ordinal position. Empty when the table
/// does not exist; callers decide whether that is an error.
pub async fn table_columns(
    adapter: &dyn SqlAdapter,
    schema: Option<&str>,
    table: &str,
) -> Result<Vec<ColumnInfo>, DialectError> {
    validate_identifier(table)?;
    if let Some(s) = schema {
        validate_identifier(s)?;
    }

    let sql = match adapter.dialect() {
        Dialect::MySql => {
            "SELECT COLUMN_NAME AS column_name, \
                    CAST(ORDINAL_POSITION AS SIGNED) AS ordinal_position \
             FROM information_schema.columns \
             WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ? \
             ORDER BY ORDINAL_POSITION"
        }
        Dialect::Postgres => {
            "SELECT CAST(column_name AS TEXT) AS column_name, \
                    CAST(ordinal_position AS INT) AS ordinal_position \
             FROM information_schema.columns \
             WHERE table_schema = COALESCE($1, 'public') AND table_name = $2 \
             ORDER BY ordinal_position"
        }
    };

    let params = [schema_param(schema), SqlValue::from(table)];
    let rows = adapter.query(sql, &params).await?;

    rows.iter()
        .map(|row| {
            let name = row
                .text("column_name")
                .ok_or_else(|| DialectError::Decode("column_name missing".into()))?
                .to_string();
            let ordinal = row
                .int("ordinal_position")
                .ok_or_else(|| DialectError::Decode("ordinal_position missing".into()))?;
            Ok(ColumnInfo { name, ordinal })
        })
        .collect()
}

pub async fn table_exists(
    adapter: &dyn SqlAdapter,
    schema: Option<&str>,
    table: &str,
) -> Result<bool, DialectError> {
    validate_identifier(table)?;
    if let Some(s) = schema {
        validate_identifier(s)?;
    }

    let sql = match adapter.dialect() {
        Dialect::MySql => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?"
        }
        Dialect::Postgres => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = COALESCE($1, 'public') AND table_name = $2"
        }
    };

    let params = [schema_param(schema), SqlValue::from(table)];
    let rows = adapter.query(sql, &params).await?;
    Ok(rows.first().and_then(|r| r.int("n")).unwrap_or(0) > 0)
}

/// Table names starting with `prefix`, sorted. The prefix is LIKE-escaped,
/// so `aud_` matches the literal underscore.
pub async fn tables_with_prefix(
    adapter: &dyn SqlAdapter,
    schema: Option<&str>,
    prefix: &str,
) -> Result<Vec<String>, DialectError> {
    if let Some(s) = schema {
        validate_identifier(s)?;
    }
    let pattern = format!("{}%", like_escape(prefix));

    let sql = match adapter.dialect() {
        Dialect::MySql => {
            "SELECT TABLE_NAME AS table_name FROM information_schema.tables \
             WHERE table_schema = COALESCE(?, DATABASE()) AND table_name LIKE ? \
             ORDER BY table_name"
        }
        Dialect::Postgres => {
            "SELECT CAST(table_name AS TEXT) AS table_name FROM information_schema.tables \
             WHERE table_schema = COALESCE($1, 'public') AND table_name LIKE $2 \
             ORDER BY table_name"
        }
    };

    let params = [schema_param(schema), SqlValue::Text(pattern)];
    let rows = adapter.query(sql, &params).await?;

    Ok(rows
        .iter()
        .filter_map(|r| r.text("table_name").map(str::to_string))
        .collect())
}

fn schema_param(schema: Option<&str>) -> SqlValue {
    schema
        .map(|s| SqlValue::Text(s.to_string()))
        .unwrap_or(SqlValue::Null)
}
