//! PostgreSQL DDL branch.
//!
//! The cipher routine leans on pgcrypto (gen_random_bytes, digest,
//! encrypt_iv with 'aes-cbc/pad:pkcs'); the bundle creates the extension
//! IF NOT EXISTS first. Unlike MySQL, trigger bodies cannot be inlined, so
//! one trigger function dispatches on TG_OP and the three row triggers all
//! point at it.

use st_crypto::trigger;
use st_dialect::Dialect;

use crate::plan::{AuditPlan, ColumnRole};

use super::{
    cipher_fn_name, legacy_trigger_names, qualified, trigger_fn_name, trigger_names, DdlBundle,
    NamedStatement,
};

const D: Dialect = Dialect::Postgres;

pub(super) fn bundle(plan: &AuditPlan, schema: Option<&str>, key: &str) -> DdlBundle {
    let shadow = qualified(D, schema, &plan.shadow_table);
    let source = qualified(D, schema, &plan.source_table);
    let cipher_name = cipher_fn_name(&plan.source_table);
    let cipher = qualified(D, schema, &cipher_name);
    let trigger_fn = trigger_fn_name(&plan.source_table);
    let trigger_fn_q = qualified(D, schema, &trigger_fn);

    DdlBundle {
        create_shadow_table: NamedStatement::new(
            plan.shadow_table.clone(),
            create_shadow_table(plan, &shadow),
        ),
        drop_before_create: drop_statements(schema, &plan.source_table),
        routines: vec![
            NamedStatement::new("pgcrypto", "CREATE EXTENSION IF NOT EXISTS pgcrypto"),
            NamedStatement::new(cipher_name, cipher_function(&cipher, key)),
            NamedStatement::new(
                trigger_fn,
                trigger_function(plan, &trigger_fn_q, &shadow, &cipher),
            ),
        ],
        triggers: build_triggers(plan, &source, &trigger_fn_q),
    }
}

pub(super) fn removal(
    schema: Option<&str>,
    source_table: &str,
    shadow_table: &str,
) -> Vec<NamedStatement> {
    let mut statements = drop_statements(schema, source_table);
    statements.push(NamedStatement::new(
        shadow_table.to_string(),
        format!(
            "DROP TABLE IF EXISTS {}",
            qualified(D, schema, shadow_table)
        ),
    ));
    statements
}

// ── Statement builders ──────────────────────────────────────────────────────

fn create_shadow_table(plan: &AuditPlan, shadow: &str) -> String {
    let mut items = vec![
        "\"audit_id\" BIGSERIAL PRIMARY KEY".to_string(),
        "\"created_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string(),
    ];
    for column in &plan.columns {
        items.push(format!("{} TEXT NULL", D.quote_ident(&column.pseudonym)));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {shadow} (\n  {}\n)",
        items.join(",\n  ")
    )
}

/// The in-engine half of the trigger cipher scheme. Only the folded secret
/// is embedded; the caller's key never appears in routine source.
fn cipher_function(cipher: &str, key: &str) -> String {
    let secret_hex = trigger::table_secret_hex(key);
    format!(
        r#"CREATE OR REPLACE FUNCTION {cipher}(p_plain TEXT) RETURNS TEXT AS $shadowtrail$
DECLARE
  v_secret BYTEA := decode('{secret_hex}', 'hex');
  v_salt BYTEA;
  v_iv BYTEA;
  v_key BYTEA;
  v_ct BYTEA;
  v_tag BYTEA;
BEGIN
  IF p_plain IS NULL THEN
    RETURN NULL;
  END IF;
  v_salt := gen_random_bytes(32);
  v_iv := gen_random_bytes(16);
  v_key := digest(v_secret || v_salt, 'sha256');
  v_ct := encrypt_iv(convert_to(p_plain, 'UTF8'), v_key, v_iv, 'aes-cbc/pad:pkcs');
  v_tag := substring(digest(v_key || v_iv || v_ct, 'sha256') from 1 for 16);
  RETURN encode(v_salt, 'hex') || ':' || encode(v_iv, 'hex') || ':' || encode(v_tag, 'hex') || ':' || encode(v_ct, 'hex');
END;
$shadowtrail$ LANGUAGE plpgsql VOLATILE"#
    )
}

fn trigger_function(plan: &AuditPlan, trigger_fn: &str, shadow: &str, cipher: &str) -> String {
    let column_list = plan
        .columns
        .iter()
        .map(|c| D.quote_ident(&c.pseudonym))
        .collect::<Vec<_>>()
        .join(", ");

    let values = plan
        .columns
        .iter()
        .map(|c| {
            let expr = match c.role {
                ColumnRole::Source => {
                    format!("{cipher}(v_row.{}::text)", D.quote_ident(&c.source))
                }
                ColumnRole::Actor => format!("{cipher}(session_user::text)"),
                ColumnRole::Timestamp => format!("{cipher}(now()::text)"),
                ColumnRole::Operation => format!("{cipher}(TG_OP)"),
            };
            format!("    {expr}")
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"CREATE OR REPLACE FUNCTION {trigger_fn}() RETURNS TRIGGER AS $shadowtrail$
DECLARE
  v_row RECORD;
BEGIN
  IF TG_OP = 'DELETE' THEN
    v_row := OLD;
  ELSE
    v_row := NEW;
  END IF;
  INSERT INTO {shadow} ({column_list})
  VALUES (
{values}
  );
  IF TG_OP = 'DELETE' THEN
    RETURN OLD;
  END IF;
  RETURN NEW;
END;
$shadowtrail$ LANGUAGE plpgsql"#
    )
}

fn build_triggers(plan: &AuditPlan, source: &str, trigger_fn: &str) -> Vec<NamedStatement> {
    trigger_names(&plan.source_table)
        .into_iter()
        .map(|(name, op)| {
            let sql = format!(
                "CREATE TRIGGER {trg} AFTER {op} ON {source} FOR EACH ROW EXECUTE FUNCTION {trigger_fn}()",
                trg = D.quote_ident(&name),
            );
            NamedStatement::new(name, sql)
        })
        .collect()
}

/// Drops run both before re-setup and during removal. PostgreSQL scopes
/// triggers to their table, so each drop names the source table.
fn drop_statements(schema: Option<&str>, source_table: &str) -> Vec<NamedStatement> {
    let source = qualified(D, schema, source_table);
    let mut statements = Vec::new();
    for (name, _) in trigger_names(source_table) {
        statements.push(drop_trigger(&source, name));
    }
    for name in legacy_trigger_names(source_table) {
        statements.push(drop_trigger(&source, name));
    }
    let trigger_fn = trigger_fn_name(source_table);
    statements.push(NamedStatement::new(
        trigger_fn.clone(),
        format!(
            "DROP FUNCTION IF EXISTS {}()",
            qualified(D, schema, &trigger_fn)
        ),
    ));
    let cipher_fn = cipher_fn_name(source_table);
    statements.push(NamedStatement::new(
        cipher_fn.clone(),
        format!(
            "DROP FUNCTION IF EXISTS {}(TEXT)",
            qualified(D, schema, &cipher_fn)
        ),
    ));
    statements
}

fn drop_trigger(source: &str, name: String) -> NamedStatement {
    let sql = format!(
        "DROP TRIGGER IF EXISTS {} ON {source}",
        D.quote_ident(&name)
    );
    NamedStatement::new(name, sql)
}
