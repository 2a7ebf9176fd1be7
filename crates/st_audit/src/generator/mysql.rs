//! MySQL DDL branch.
//!
//! The cipher routine is a stored function using RANDOM_BYTES, SHA2 and
//! AES_ENCRYPT under `block_encryption_mode = 'aes-256-cbc'` (saved and
//! restored around the call). Its output is the standard envelope,
//! decryptable by the application's trigger-scheme twin. Requires MySQL
//! 5.7+ for RANDOM_BYTES; with binary logging enabled the server must allow
//! non-deterministic stored functions (`log_bin_trust_function_creators`).

use st_crypto::trigger;
use st_dialect::Dialect;

use crate::plan::{AuditPlan, ColumnRole};

use super::{
    cipher_fn_name, legacy_trigger_names, qualified, trigger_fn_name, trigger_names, DdlBundle,
    NamedStatement,
};

const D: Dialect = Dialect::MySql;

pub(super) fn bundle(plan: &AuditPlan, schema: Option<&str>, key: &str) -> DdlBundle {
    let shadow = qualified(D, schema, &plan.shadow_table);
    let source = qualified(D, schema, &plan.source_table);
    let cipher_name = cipher_fn_name(&plan.source_table);
    let cipher = qualified(D, schema, &cipher_name);

    DdlBundle {
        create_shadow_table: NamedStatement::new(
            plan.shadow_table.clone(),
            create_shadow_table(plan, &shadow),
        ),
        drop_before_create: drop_statements(schema, &plan.source_table),
        routines: vec![NamedStatement::new(
            cipher_name,
            cipher_function(&cipher, key),
        )],
        triggers: build_triggers(plan, schema, &source, &shadow, &cipher),
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
        "`audit_id` BIGINT NOT NULL AUTO_INCREMENT".to_string(),
        "`created_at` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string(),
    ];
    for column in &plan.columns {
        items.push(format!("{} TEXT NULL", D.quote_ident(&column.pseudonym)));
    }
    items.push("PRIMARY KEY (`audit_id`)".to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS {shadow} (\n  {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        items.join(",\n  ")
    )
}

/// The in-engine half of the trigger cipher scheme. Only the folded secret
/// is embedded; the caller's key never appears in routine source.
fn cipher_function(cipher: &str, key: &str) -> String {
    let secret_hex = trigger::table_secret_hex(key);
    format!(
        r#"CREATE FUNCTION {cipher}(p_plain LONGTEXT) RETURNS LONGTEXT
NOT DETERMINISTIC
NO SQL
BEGIN
  DECLARE v_secret VARBINARY(32);
  DECLARE v_salt VARBINARY(32);
  DECLARE v_iv VARBINARY(16);
  DECLARE v_key VARBINARY(32);
  DECLARE v_ct LONGBLOB;
  DECLARE v_tag VARBINARY(16);
  DECLARE v_mode VARCHAR(64);
  IF p_plain IS NULL THEN
    RETURN NULL;
  END IF;
  SET v_secret = UNHEX('{secret_hex}');
  SET v_salt = RANDOM_BYTES(32);
  SET v_iv = RANDOM_BYTES(16);
  SET v_key = UNHEX(SHA2(CONCAT(v_secret, v_salt), 256));
  SET v_mode = @@SESSION.block_encryption_mode;
  SET SESSION block_encryption_mode = 'aes-256-cbc';
  SET v_ct = AES_ENCRYPT(CONVERT(p_plain USING utf8mb4), v_key, v_iv);
  SET SESSION block_encryption_mode = v_mode;
  SET v_tag = UNHEX(LEFT(SHA2(CONCAT(v_key, v_iv, v_ct), 256), 32));
  RETURN CONCAT(LOWER(HEX(v_salt)), ':', LOWER(HEX(v_iv)), ':', LOWER(HEX(v_tag)), ':', LOWER(HEX(v_ct)));
END"#
    )
}

fn build_triggers(
    plan: &AuditPlan,
    schema: Option<&str>,
    source: &str,
    shadow: &str,
    cipher: &str,
) -> Vec<NamedStatement> {
    let column_list = plan
        .columns
        .iter()
        .map(|c| D.quote_ident(&c.pseudonym))
        .collect::<Vec<_>>()
        .join(", ");

    trigger_names(&plan.source_table)
        .into_iter()
        .map(|(name, op)| {
            let row = if op == "DELETE" { "OLD" } else { "NEW" };
            let values = plan
                .columns
                .iter()
                .map(|c| {
                    let expr = match c.role {
                        ColumnRole::Source => format!(
                            "{cipher}(CAST({row}.{} AS CHAR))",
                            D.quote_ident(&c.source)
                        ),
                        ColumnRole::Actor => format!("{cipher}(CURRENT_USER())"),
                        ColumnRole::Timestamp => format!("{cipher}(CAST(NOW(6) AS CHAR))"),
                        ColumnRole::Operation => format!("{cipher}('{op}')"),
                    };
                    format!("    {expr}")
                })
                .collect::<Vec<_>>()
                .join(",\n");

            let sql = format!(
                r#"CREATE TRIGGER {trg} AFTER {op} ON {source} FOR EACH ROW
BEGIN
  INSERT INTO {shadow} ({column_list})
  VALUES (
{values}
  );
END"#,
                trg = qualified(D, schema, &name),
            );
            NamedStatement::new(name, sql)
        })
        .collect()
}

/// Drops run both before re-setup and during removal: current triggers,
/// legacy trigger names, and both routine name generations.
fn drop_statements(schema: Option<&str>, source_table: &str) -> Vec<NamedStatement> {
    let mut statements = Vec::new();
    for (name, _) in trigger_names(source_table) {
        statements.push(drop_trigger(schema, name));
    }
    for name in legacy_trigger_names(source_table) {
        statements.push(drop_trigger(schema, name));
    }
    for name in [
        cipher_fn_name(source_table),
        trigger_fn_name(source_table),
    ] {
        statements.push(NamedStatement::new(
            name.clone(),
            format!("DROP FUNCTION IF EXISTS {}", qualified(D, schema, &name)),
        ));
    }
    statements
}

fn drop_trigger(schema: Option<&str>, name: String) -> NamedStatement {
    let sql = format!("DROP TRIGGER IF EXISTS {}", qualified(D, schema, &name));
    NamedStatement::new(name, sql)
}
