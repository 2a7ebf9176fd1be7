//! Execution seam between the audit engine and a concrete database.

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::DialectError;
use crate::value::{SqlRow, SqlValue};

/// One open database the engine can run statements against. Implementations
/// wrap a connection pool; tests substitute an in-memory fake.
#[async_trait]
pub trait SqlAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Run DDL or DML. Returns rows affected where the driver reports it
    /// (DDL reports 0).
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DialectError>;

    /// Run a query and decode every row.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DialectError>;
}

/// First line of a statement, shortened for log fields.
pub(crate) fn sql_head(sql: &str) -> &str {
    let line = sql.lines().next().unwrap_or("");
    match line.char_indices().nth(120) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}
