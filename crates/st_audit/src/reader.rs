//! Read side: listing, paging, decryption, key verification.
//!
//! Every key-taking entry point runs the same strength gate as setup before
//! deriving a single pseudonym. Decryption is per-field: pseudonyms are
//! recomputed from the key and the source table's current catalog on every
//! call, so a column added after setup shows up as missing instead of
//! poisoning the page, and a wrong key produces per-field errors rather
//! than one opaque failure.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use st_crypto::{naming, trigger, validate_key, CipherEnvelope, CryptoError};
use st_dialect::{catalog, SqlAdapter, SqlRow, SqlValue};

use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::events::{emit, emit_start};
use crate::generator;
use crate::metadata::MetadataStore;

// ── Page shapes ─────────────────────────────────────────────────────────────

/// One audit table as the catalog and the mapping table see it.
#[derive(Debug, Clone, Serialize)]
pub struct AuditTableInfo {
    pub audit_table: String,
    /// Original table per the recorded mapping; `None` once the mapping is
    /// gone (the trail itself never stores it).
    pub original_table: Option<String>,
    pub record_count: u64,
}

/// A page of raw shadow rows, exactly as stored.
#[derive(Debug, Clone)]
pub struct EncryptedPage {
    pub audit_table: String,
    /// Shadow table columns in physical order.
    pub columns: Vec<String>,
    pub rows: Vec<SqlRow>,
    pub total_records: u64,
}

/// What decrypting one field yielded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    /// Decrypted plaintext; `None` when the stored cell was NULL.
    Value(Option<String>),
    /// The expected pseudonym column does not exist in the shadow table
    /// (column added after setup, or renamed since).
    Missing,
    Error(String),
}

/// One shadow row mapped back to original column names.
#[derive(Debug, Clone, Serialize)]
pub struct DecryptedRecord {
    pub audit_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    /// `(original column or audit field, outcome)` in shadow column order.
    pub fields: Vec<(String, FieldOutcome)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecryptedPage {
    pub audit_table: String,
    pub original_table: String,
    pub records: Vec<DecryptedRecord>,
    pub total_records: u64,
}

/// Verdict of checking a key against stored ciphertext.
#[derive(Debug, Clone, Serialize)]
pub struct KeyCheck {
    pub valid: bool,
    pub message: String,
}

// ── Reader ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AuditReader {
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    metadata: MetadataStore,
}

impl AuditReader {
    pub fn new(adapter: Arc<dyn SqlAdapter>, config: AuditConfig) -> Self {
        let metadata = MetadataStore::new(adapter.clone(), config.schema.clone());
        Self {
            adapter,
            config,
            metadata,
        }
    }

    /// Every shadow table in the schema, with its mapping (when one
    /// survives) and row count. Needs no key: nothing here decrypts.
    pub async fn list_audit_tables(&self) -> Result<Vec<AuditTableInfo>, AuditError> {
        let schema = self.config.schema.as_deref();
        let names =
            catalog::tables_with_prefix(self.adapter.as_ref(), schema, naming::TABLE_PREFIX)
                .await?;

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let original = match self.metadata.resolve_original(&name).await {
                Ok(row) => row.map(|row| row.original_table_name),
                Err(error) => {
                    warn!(audit_table = %name, error = %error, "mapping lookup failed");
                    None
                }
            };
            let record_count = match self.count_rows(&name).await {
                Ok(n) => n,
                Err(error) => {
                    warn!(audit_table = %name, error = %error, "row count failed");
                    0
                }
            };
            out.push(AuditTableInfo {
                audit_table: name,
                original_table: original,
                record_count,
            });
        }
        Ok(out)
    }

    /// Raw page of shadow rows, oldest first.
    pub async fn get_encrypted(
        &self,
        audit_table: &str,
        limit: u32,
        offset: u32,
    ) -> Result<EncryptedPage, AuditError> {
        let schema = self.config.schema.as_deref();
        if !catalog::table_exists(self.adapter.as_ref(), schema, audit_table).await? {
            return Err(AuditError::TableNotFound(audit_table.to_string()));
        }
        let columns = catalog::table_columns(self.adapter.as_ref(), schema, audit_table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let total_records = self.count_rows(audit_table).await?;

        let dialect = self.adapter.dialect();
        let sql = format!(
            "SELECT * FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            generator::qualified(dialect, schema, audit_table),
            dialect.quote_ident("audit_id"),
            dialect.placeholder(1),
            dialect.placeholder(2),
        );
        let params = [SqlValue::Int(i64::from(limit)), SqlValue::Int(i64::from(offset))];
        let rows = self.adapter.query(&sql, &params).await?;

        Ok(EncryptedPage {
            audit_table: audit_table.to_string(),
            columns,
            rows,
            total_records,
        })
    }

    /// Decrypt a page back to original column names. The mapping supplies
    /// the original table; its current columns plus the three audit fields
    /// define what to look for.
    pub async fn get_decrypted(
        &self,
        audit_table: &str,
        key: &str,
        limit: u32,
        offset: u32,
    ) -> Result<DecryptedPage, AuditError> {
        let started = Instant::now();
        let actor = self.config.actor.as_deref();
        emit_start("audit_decrypt", audit_table, actor);

        let result = self.decrypt_page(audit_table, key, limit, offset).await;
        match &result {
            Ok(_) => emit("audit_decrypt", audit_table, actor, true, started, None),
            Err(error) => {
                let text = error.to_string();
                emit("audit_decrypt", audit_table, actor, false, started, Some(&text));
            }
        }
        result
    }

    async fn decrypt_page(
        &self,
        audit_table: &str,
        key: &str,
        limit: u32,
        offset: u32,
    ) -> Result<DecryptedPage, AuditError> {
        validate_key(key)?;
        let page = self.get_encrypted(audit_table, limit, offset).await?;

        let mapping = self
            .metadata
            .resolve_original(audit_table)
            .await?
            .ok_or_else(|| {
                AuditError::Metadata(format!(
                    "No mapping recorded for audit table {audit_table}"
                ))
            })?;
        let original_table = mapping.original_table_name;

        let schema = self.config.schema.as_deref();
        let source_columns =
            catalog::table_columns(self.adapter.as_ref(), schema, &original_table).await?;

        let triple = naming::audit_triple(key);
        let mut lookup: Vec<(String, String)> = source_columns
            .into_iter()
            .map(|c| {
                let pseudonym = naming::derive_column_name(&c.name, key);
                (c.name, pseudonym)
            })
            .collect();
        lookup.push((naming::AUDIT_ACTOR.to_string(), triple[0].clone()));
        lookup.push((naming::AUDIT_TIMESTAMP.to_string(), triple[1].clone()));
        lookup.push((naming::AUDIT_OPERATION.to_string(), triple[2].clone()));

        let records = page
            .rows
            .iter()
            .map(|row| decrypt_row(row, &lookup, key))
            .collect();

        Ok(DecryptedPage {
            audit_table: page.audit_table,
            original_table,
            records,
            total_records: page.total_records,
        })
    }

    /// Check a key against stored ciphertext without returning plaintext.
    /// Prefers the operation field (written on every row, never NULL);
    /// falls back to any non-NULL pseudonym cell. A key too weak to ever
    /// have been accepted reports invalid without touching the table.
    pub async fn validate_password(
        &self,
        audit_table: &str,
        key: &str,
    ) -> Result<KeyCheck, AuditError> {
        let started = Instant::now();
        let actor = self.config.actor.as_deref();
        emit_start("audit_key_check", audit_table, actor);

        let verdict = match validate_key(key) {
            Err(error) => KeyCheck {
                valid: false,
                message: error.to_string(),
            },
            Ok(()) => {
                let page = self.get_encrypted(audit_table, 1, 0).await?;
                match page.rows.first() {
                    None => KeyCheck {
                        valid: true,
                        message: "Audit table is empty; nothing to verify against".to_string(),
                    },
                    Some(row) => check_row(row, key),
                }
            }
        };

        emit(
            "audit_key_check",
            audit_table,
            actor,
            verdict.valid,
            started,
            (!verdict.valid).then_some(verdict.message.as_str()),
        );
        Ok(verdict)
    }

    async fn count_rows(&self, table: &str) -> Result<u64, AuditError> {
        let schema = self.config.schema.as_deref();
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {}",
            generator::qualified(self.adapter.dialect(), schema, table)
        );
        let rows = self.adapter.query(&sql, &[]).await?;
        let n = rows.first().and_then(|r| r.int("n")).unwrap_or(0);
        Ok(n.max(0) as u64)
    }
}

// ── Row helpers ─────────────────────────────────────────────────────────────

fn decrypt_row(row: &SqlRow, lookup: &[(String, String)], key: &str) -> DecryptedRecord {
    let audit_id = row.int("audit_id");
    let created_at = row.get("created_at").and_then(SqlValue::as_timestamp);

    let fields = lookup
        .iter()
        .map(|(logical, pseudonym)| {
            let outcome = match row.get(pseudonym) {
                None => FieldOutcome::Missing,
                Some(SqlValue::Null) => FieldOutcome::Value(None),
                Some(value) => match value.as_text() {
                    Some(text) => match trigger::decrypt(text, key) {
                        Ok(plain) => FieldOutcome::Value(Some(plain)),
                        Err(error) => FieldOutcome::Error(error.to_string()),
                    },
                    None => FieldOutcome::Error("stored cell is not text".to_string()),
                },
            };
            (logical.clone(), outcome)
        })
        .collect();

    DecryptedRecord {
        audit_id,
        created_at,
        fields,
    }
}

fn check_row(row: &SqlRow, key: &str) -> KeyCheck {
    let operation_column = naming::audit_triple(key)[2].clone();

    let candidate = row
        .text(&operation_column)
        .or_else(|| first_pseudonym_cell(row));

    let Some(text) = candidate else {
        // Pseudonyms are key-derived; finding none that match means the key
        // does not belong to this table.
        return KeyCheck {
            valid: false,
            message: "No encrypted field matches this key".to_string(),
        };
    };

    if !CipherEnvelope::looks_like_envelope(text) {
        return KeyCheck {
            valid: false,
            message: "Stored field is not in envelope format".to_string(),
        };
    }

    match trigger::decrypt(text, key) {
        Ok(_) => KeyCheck {
            valid: true,
            message: "Key verified against an existing record".to_string(),
        },
        Err(CryptoError::BadKeyOrCorrupt) => KeyCheck {
            valid: false,
            message: "Wrong key, or the record is corrupted".to_string(),
        },
        Err(error) => KeyCheck {
            valid: false,
            message: error.to_string(),
        },
    }
}

fn first_pseudonym_cell(row: &SqlRow) -> Option<&str> {
    row.columns()
        .iter()
        .zip(row.values())
        .find_map(|(column, value)| {
            if column.starts_with(naming::COLUMN_PREFIX) {
                value.as_text()
            } else {
                None
            }
        })
}
