//! Canonical column plan for one audited table.
//!
//! Everything that touches shadow columns renders from one [`AuditPlan`]:
//! the CREATE TABLE body, every trigger INSERT, and the removal statements.
//! The order is source columns by ordinal, then actor, timestamp, operation.
//! A mismatch between CREATE TABLE and trigger INSERT order would silently
//! write values under the wrong pseudonyms, so the plan is built once,
//! parity-checked, and never reordered downstream.

use std::collections::HashSet;

use st_crypto::naming;
use st_dialect::catalog::ColumnInfo;
use st_dialect::ident::validate_identifier;
use st_dialect::Dialect;

use crate::error::AuditError;

// ── Planned columns ─────────────────────────────────────────────────────────

/// Why a column is in the shadow schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Mirrors a source-table column.
    Source,
    /// Audit triple: who performed the operation.
    Actor,
    /// Audit triple: when the database executed it.
    Timestamp,
    /// Audit triple: INSERT / UPDATE / DELETE.
    Operation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedColumn {
    /// Original column name, or the logical audit-triple name.
    pub source: String,
    /// `enc_`-prefixed pseudonym used in the shadow schema.
    pub pseudonym: String,
    pub role: ColumnRole,
}

// ── AuditPlan ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuditPlan {
    pub dialect: Dialect,
    pub source_table: String,
    pub shadow_table: String,
    /// Source columns in ordinal order, then the audit triple.
    pub columns: Vec<PlannedColumn>,
    source_count: usize,
}

impl AuditPlan {
    /// Derive the full plan from the live catalog. Fails before any SQL is
    /// rendered: empty catalog, invalid identifiers, or parity violations
    /// all abort setup for this table.
    pub fn build(
        dialect: Dialect,
        source_table: &str,
        catalog: &[ColumnInfo],
        key: &str,
    ) -> Result<Self, AuditError> {
        validate_identifier(source_table)?;
        if catalog.is_empty() {
            return Err(AuditError::NoColumns(source_table.to_string()));
        }

        let mut ordered: Vec<&ColumnInfo> = catalog.iter().collect();
        ordered.sort_by_key(|c| c.ordinal);

        let mut columns = Vec::with_capacity(ordered.len() + 3);
        for info in &ordered {
            validate_identifier(&info.name)?;
            columns.push(PlannedColumn {
                source: info.name.clone(),
                pseudonym: naming::derive_column_name(&info.name, key),
                role: ColumnRole::Source,
            });
        }
        for (logical, role) in [
            (naming::AUDIT_ACTOR, ColumnRole::Actor),
            (naming::AUDIT_TIMESTAMP, ColumnRole::Timestamp),
            (naming::AUDIT_OPERATION, ColumnRole::Operation),
        ] {
            columns.push(PlannedColumn {
                source: logical.to_string(),
                pseudonym: naming::derive_column_name(logical, key),
                role,
            });
        }

        let plan = Self {
            dialect,
            source_table: source_table.to_string(),
            shadow_table: naming::derive_table_name(source_table, key),
            columns,
            source_count: ordered.len(),
        };
        verify_column_parity(source_table, plan.source_count, &plan.columns)?;
        Ok(plan)
    }

    pub fn source_count(&self) -> usize {
        self.source_count
    }

    /// Pseudonyms in canonical order.
    pub fn pseudonyms(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.pseudonym.as_str())
    }
}

// ── Parity gate ─────────────────────────────────────────────────────────────

/// The planned list must be the source list plus exactly the audit triple,
/// in that order, with every pseudonym well-formed and distinct. Runs before
/// any DDL is rendered; a violation aborts the table's setup.
pub fn verify_column_parity(
    table: &str,
    source_count: usize,
    planned: &[PlannedColumn],
) -> Result<(), AuditError> {
    let violation = |detail: String| AuditError::IntegrityViolation {
        table: table.to_string(),
        detail,
    };

    if planned.len() != source_count + 3 {
        return Err(violation(format!(
            "planned {} columns for {} source columns",
            planned.len(),
            source_count
        )));
    }
    if planned[..source_count]
        .iter()
        .any(|c| c.role != ColumnRole::Source)
    {
        return Err(violation("audit column before end of source list".into()));
    }
    let tail: Vec<ColumnRole> = planned[source_count..].iter().map(|c| c.role).collect();
    if tail != [ColumnRole::Actor, ColumnRole::Timestamp, ColumnRole::Operation] {
        return Err(violation("audit triple out of order".into()));
    }

    let mut seen = HashSet::new();
    for col in planned {
        if !col.pseudonym.starts_with(naming::COLUMN_PREFIX) {
            return Err(violation(format!(
                "malformed pseudonym {:?} for {:?}",
                col.pseudonym, col.source
            )));
        }
        if !seen.insert(col.pseudonym.as_str()) {
            return Err(violation(format!(
                "pseudonym collision on {:?}",
                col.pseudonym
            )));
        }
    }
    Ok(())
}
