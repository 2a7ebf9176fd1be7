//! Encrypted-name mapping store.
//!
//! One row per shadow table in `sys_audit_metadata_enc`, created lazily on
//! first use. The original table name is stored twice: plaintext, so an
//! operator with database access can still tell what maps where, and
//! AEAD-sealed under the caller's key, so the reader can prove a mapping
//! belongs to the key it was set up with.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use st_crypto::{aead, CryptoError};
use st_dialect::{Dialect, SqlAdapter, SqlRow, SqlValue};

use crate::error::AuditError;
use crate::generator::qualified;

pub const METADATA_TABLE: &str = "sys_audit_metadata_enc";

// ── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub id: i64,
    pub encrypted_table_name: String,
    pub original_table_name: String,
    /// AEAD envelope of the original name, sealed under the setup key.
    pub encrypted_name_data: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MetadataRow {
    /// Decrypt the sealed original name. `Ok(None)` when the row predates
    /// sealing; `Err(BadKeyOrCorrupt)` when the key does not match.
    pub fn unseal_original(&self, key: &str) -> Result<Option<String>, CryptoError> {
        aead::decrypt_nullable(self.encrypted_name_data.as_deref(), key)
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MetadataStore {
    adapter: Arc<dyn SqlAdapter>,
    schema: Option<String>,
}

impl MetadataStore {
    pub fn new(adapter: Arc<dyn SqlAdapter>, schema: Option<String>) -> Self {
        Self { adapter, schema }
    }

    fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    fn table(&self) -> String {
        qualified(self.dialect(), self.schema.as_deref(), METADATA_TABLE)
    }

    /// Create the mapping table if this database has never seen one.
    pub async fn ensure_table(&self) -> Result<(), AuditError> {
        let table = self.table();
        let sql = match self.dialect() {
            Dialect::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n  \
                   `id` BIGINT NOT NULL AUTO_INCREMENT,\n  \
                   `encrypted_table_name` VARCHAR(64) NOT NULL,\n  \
                   `original_table_name` VARCHAR(128) NOT NULL,\n  \
                   `encrypted_name_data` TEXT NULL,\n  \
                   `created_at` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n  \
                   `updated_at` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,\n  \
                   PRIMARY KEY (`id`),\n  \
                   UNIQUE KEY `uq_encrypted_table_name` (`encrypted_table_name`)\n\
                 ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
            ),
            Dialect::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n  \
                   \"id\" BIGSERIAL PRIMARY KEY,\n  \
                   \"encrypted_table_name\" VARCHAR(64) NOT NULL UNIQUE,\n  \
                   \"original_table_name\" VARCHAR(128) NOT NULL,\n  \
                   \"encrypted_name_data\" TEXT NULL,\n  \
                   \"created_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n  \
                   \"updated_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
                 )"
            ),
        };
        self.adapter.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Insert or refresh the mapping for one shadow table.
    pub async fn upsert(&self, shadow: &str, original: &str, key: &str) -> Result<(), AuditError> {
        self.ensure_table().await?;
        let sealed = aead::encrypt(original, key)?;
        let table = self.table();
        let sql = match self.dialect() {
            Dialect::MySql => format!(
                "INSERT INTO {table} (encrypted_table_name, original_table_name, encrypted_name_data) \
                 VALUES (?, ?, ?) \
                 ON DUPLICATE KEY UPDATE \
                   original_table_name = VALUES(original_table_name), \
                   encrypted_name_data = VALUES(encrypted_name_data), \
                   updated_at = CURRENT_TIMESTAMP"
            ),
            Dialect::Postgres => format!(
                "INSERT INTO {table} (encrypted_table_name, original_table_name, encrypted_name_data) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (encrypted_table_name) DO UPDATE SET \
                   original_table_name = EXCLUDED.original_table_name, \
                   encrypted_name_data = EXCLUDED.encrypted_name_data, \
                   updated_at = CURRENT_TIMESTAMP"
            ),
        };
        let params = [
            SqlValue::from(shadow),
            SqlValue::from(original),
            SqlValue::Text(sealed),
        ];
        self.adapter.execute(&sql, &params).await?;
        debug!(shadow, original, "metadata mapping upserted");
        Ok(())
    }

    /// Mapping for one shadow table, if recorded.
    pub async fn resolve_original(&self, shadow: &str) -> Result<Option<MetadataRow>, AuditError> {
        self.ensure_table().await?;
        let sql = format!(
            "{} WHERE encrypted_table_name = {}",
            self.select_prefix(),
            self.dialect().placeholder(1)
        );
        let rows = self.adapter.query(&sql, &[SqlValue::from(shadow)]).await?;
        rows.first().map(row_to_metadata).transpose()
    }

    /// Latest mapping recorded for one original table. An original audited
    /// under two keys has two rows; the newest wins.
    pub async fn resolve_shadow(&self, original: &str) -> Result<Option<MetadataRow>, AuditError> {
        self.ensure_table().await?;
        let sql = format!(
            "{} WHERE original_table_name = {} ORDER BY updated_at DESC, id DESC LIMIT 1",
            self.select_prefix(),
            self.dialect().placeholder(1)
        );
        let rows = self.adapter.query(&sql, &[SqlValue::from(original)]).await?;
        rows.first().map(row_to_metadata).transpose()
    }

    pub async fn list(&self) -> Result<Vec<MetadataRow>, AuditError> {
        self.ensure_table().await?;
        let sql = format!("{} ORDER BY original_table_name, id", self.select_prefix());
        let rows = self.adapter.query(&sql, &[]).await?;
        rows.iter().map(row_to_metadata).collect()
    }

    /// Delete by shadow name; returns rows removed (0 is fine).
    pub async fn delete(&self, shadow: &str) -> Result<u64, AuditError> {
        self.ensure_table().await?;
        let sql = format!(
            "DELETE FROM {} WHERE encrypted_table_name = {}",
            self.table(),
            self.dialect().placeholder(1)
        );
        Ok(self.adapter.execute(&sql, &[SqlValue::from(shadow)]).await?)
    }

    /// Delete every mapping recorded for an original table.
    pub async fn delete_by_original(&self, original: &str) -> Result<u64, AuditError> {
        self.ensure_table().await?;
        let sql = format!(
            "DELETE FROM {} WHERE original_table_name = {}",
            self.table(),
            self.dialect().placeholder(1)
        );
        Ok(self
            .adapter
            .execute(&sql, &[SqlValue::from(original)])
            .await?)
    }

    fn select_prefix(&self) -> String {
        format!(
            "SELECT id, encrypted_table_name, original_table_name, encrypted_name_data, \
             created_at, updated_at FROM {}",
            self.table()
        )
    }
}

fn row_to_metadata(row: &SqlRow) -> Result<MetadataRow, AuditError> {
    let required = |column: &str| -> Result<String, AuditError> {
        row.text(column)
            .map(str::to_string)
            .ok_or_else(|| AuditError::Metadata(format!("{column} missing from metadata row")))
    };
    Ok(MetadataRow {
        id: row.int("id").unwrap_or_default(),
        encrypted_table_name: required("encrypted_table_name")?,
        original_table_name: required("original_table_name")?,
        encrypted_name_data: row.text("encrypted_name_data").map(str::to_string),
        created_at: row.get("created_at").and_then(SqlValue::as_timestamp),
        updated_at: row.get("updated_at").and_then(SqlValue::as_timestamp),
    })
}
