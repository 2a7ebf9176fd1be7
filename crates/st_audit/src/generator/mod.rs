//! Per-dialect DDL and trigger text.
//!
//! Both dialect branches render from the same [`AuditPlan`], so the column
//! order in the shadow table's CREATE TABLE and in every trigger INSERT is
//! the plan's order by construction. Trigger and routine names derive from
//! the original table name (readable in the catalog); only the shadow table
//! and its columns carry pseudonyms.

pub mod mysql;
pub mod postgres;

use st_crypto::naming;
use st_dialect::Dialect;

use crate::plan::AuditPlan;

// ── Statements ──────────────────────────────────────────────────────────────

/// One executable statement plus the catalog object it touches, for
/// step-level logging and error attribution.
#[derive(Debug, Clone)]
pub struct NamedStatement {
    pub object: String,
    pub sql: String,
}

impl NamedStatement {
    pub(crate) fn new(object: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            sql: sql.into(),
        }
    }
}

/// Everything setup executes for one table, in execution order.
#[derive(Debug, Clone)]
pub struct DdlBundle {
    /// CREATE TABLE IF NOT EXISTS for the shadow table. Existing rows are
    /// kept on re-setup; the trail is append-only.
    pub create_shadow_table: NamedStatement,
    /// DROP ... IF EXISTS run before the creates so re-setup is idempotent.
    pub drop_before_create: Vec<NamedStatement>,
    /// Cipher routine (and, on PostgreSQL, the trigger function).
    pub routines: Vec<NamedStatement>,
    /// The three row triggers.
    pub triggers: Vec<NamedStatement>,
}

/// Render the full bundle for the plan's dialect.
pub fn generate(plan: &AuditPlan, schema: Option<&str>, key: &str) -> DdlBundle {
    match plan.dialect {
        Dialect::MySql => mysql::bundle(plan, schema, key),
        Dialect::Postgres => postgres::bundle(plan, schema, key),
    }
}

/// Statements that tear one audited table down, most dependent object
/// first. Every statement is IF EXISTS; running the list against partial or
/// already-removed state is safe.
pub fn removal_statements(
    dialect: Dialect,
    schema: Option<&str>,
    source_table: &str,
    shadow_table: &str,
) -> Vec<NamedStatement> {
    match dialect {
        Dialect::MySql => mysql::removal(schema, source_table, shadow_table),
        Dialect::Postgres => postgres::removal(schema, source_table, shadow_table),
    }
}

// ── Derived object names ────────────────────────────────────────────────────

/// Scalar cipher function installed next to the audited table.
pub(crate) fn cipher_fn_name(table: &str) -> String {
    format!("enc_audit_{}", naming::table_stub(table))
}

/// PostgreSQL trigger function (MySQL triggers inline their bodies).
pub(crate) fn trigger_fn_name(table: &str) -> String {
    format!("fn_audit_{}", naming::table_stub(table))
}

/// Current trigger names with the SQL event each one fires on.
pub(crate) fn trigger_names(table: &str) -> [(String, &'static str); 3] {
    let stub = naming::table_stub(table);
    [
        (format!("trg_aud_{stub}_ins"), "INSERT"),
        (format!("trg_aud_{stub}_upd"), "UPDATE"),
        (format!("trg_aud_{stub}_del"), "DELETE"),
    ]
}

/// Names used by earlier releases; removal drops these too so a legacy or
/// partially-upgraded setup still cleans up.
pub(crate) fn legacy_trigger_names(table: &str) -> [String; 3] {
    let stub = naming::table_stub(table);
    [
        format!("aud_{stub}_insert"),
        format!("aud_{stub}_update"),
        format!("aud_{stub}_delete"),
    ]
}

/// `schema.name` with per-dialect quoting, or bare `name`.
pub(crate) fn qualified(dialect: Dialect, schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", dialect.quote_ident(s), dialect.quote_ident(name)),
        None => dialect.quote_ident(name),
    }
}
