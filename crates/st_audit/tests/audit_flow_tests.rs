//! End-to-end flows against an in-memory SQL fake.
//!
//! The fake keeps tables, triggers and the mapping store in memory and
//! understands exactly the statements the engine emits for MySQL. Trigger
//! firing is simulated by replaying a row event through the recorded
//! trigger body, encrypting with the engine-side twin of the in-database
//! cipher, so the read path is exercised against rows shaped like the real
//! triggers would write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use st_audit::{
    AuditConfig, AuditOrchestrator, AuditReader, DecryptedRecord, FieldOutcome, SetupStatus,
    SetupStep,
};
use st_crypto::{naming, trigger};
use st_dialect::{Dialect, DialectError, SqlAdapter, SqlRow, SqlValue};

const KEY: &str = "Sup3r$ecret99";
const WRONG_KEY: &str = "Tr0ub4dor&3!";

// ── In-memory database ──────────────────────────────────────────────────────

#[derive(Default)]
struct FakeDb {
    state: Mutex<DbState>,
}

#[derive(Default)]
struct DbState {
    tables: BTreeMap<String, Table>,
    triggers: Vec<TriggerDef>,
    functions: Vec<String>,
    mappings: Vec<Mapping>,
    next_mapping_id: i64,
    /// When set, every mapping SELECT errors; writes keep working.
    fail_mapping_reads: bool,
}

#[derive(Clone)]
struct Table {
    columns: Vec<String>,
    rows: Vec<SqlRow>,
    next_row_id: i64,
}

struct TriggerDef {
    name: String,
    op: String,
    source: String,
    shadow: String,
    body: String,
}

#[derive(Clone)]
struct Mapping {
    id: i64,
    shadow: String,
    original: String,
    sealed: Option<String>,
}

impl FakeDb {
    fn with_sources(tables: &[(&str, &[&str])]) -> Arc<Self> {
        let db = FakeDb::default();
        {
            let mut state = db.state.lock().unwrap();
            for (name, cols) in tables {
                state.tables.insert(
                    (*name).to_string(),
                    Table {
                        columns: cols.iter().map(|c| (*c).to_string()).collect(),
                        rows: Vec::new(),
                        next_row_id: 0,
                    },
                );
            }
        }
        Arc::new(db)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DialectError> {
        let mut state = self.state.lock().unwrap();
        let sql = sql.trim();

        if sql.starts_with("CREATE TABLE IF NOT EXISTS `sys_audit_metadata_enc`") {
            return Ok(0);
        }
        if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            let idents = backtick_idents(sql);
            let table = idents[0].clone();
            // last ident repeats audit_id inside PRIMARY KEY
            let columns = idents[1..idents.len() - 1].to_vec();
            state.tables.entry(table).or_insert(Table {
                columns,
                rows: Vec::new(),
                next_row_id: 0,
            });
            return Ok(0);
        }
        if sql.starts_with("CREATE FUNCTION") {
            let name = backtick_idents(sql)[0].clone();
            state.functions.push(name);
            return Ok(0);
        }
        if sql.starts_with("CREATE TRIGGER") {
            let idents = backtick_idents(sql);
            let op = ["INSERT", "UPDATE", "DELETE"]
                .into_iter()
                .find(|op| sql.contains(&format!("AFTER {op} ON")))
                .expect("trigger event");
            state.triggers.push(TriggerDef {
                name: idents[0].clone(),
                op: op.to_string(),
                source: idents[1].clone(),
                shadow: idents[2].clone(),
                body: sql.to_string(),
            });
            return Ok(0);
        }
        if sql.starts_with("DROP TRIGGER IF EXISTS") {
            let name = backtick_idents(sql)[0].clone();
            state.triggers.retain(|t| t.name != name);
            return Ok(0);
        }
        if sql.starts_with("DROP FUNCTION IF EXISTS") {
            let name = backtick_idents(sql)[0].clone();
            state.functions.retain(|f| f != &name);
            return Ok(0);
        }
        if sql.starts_with("DROP TABLE IF EXISTS") {
            let name = backtick_idents(sql)[0].clone();
            state.tables.remove(&name);
            return Ok(0);
        }
        if sql.starts_with("INSERT INTO `sys_audit_metadata_enc`") {
            let shadow = text_param(params, 0);
            let original = text_param(params, 1);
            let sealed = match &params[2] {
                SqlValue::Text(s) => Some(s.clone()),
                _ => None,
            };
            if let Some(existing) = state.mappings.iter_mut().find(|m| m.shadow == shadow) {
                existing.original = original;
                existing.sealed = sealed;
            } else {
                state.next_mapping_id += 1;
                let id = state.next_mapping_id;
                state.mappings.push(Mapping {
                    id,
                    shadow,
                    original,
                    sealed,
                });
            }
            return Ok(1);
        }
        if sql.starts_with("DELETE FROM `sys_audit_metadata_enc` WHERE encrypted_table_name") {
            let shadow = text_param(params, 0);
            let before = state.mappings.len();
            state.mappings.retain(|m| m.shadow != shadow);
            return Ok((before - state.mappings.len()) as u64);
        }
        if sql.starts_with("DELETE FROM `sys_audit_metadata_enc` WHERE original_table_name") {
            let original = text_param(params, 0);
            let before = state.mappings.len();
            state.mappings.retain(|m| m.original != original);
            return Ok((before - state.mappings.len()) as u64);
        }
        panic!("fake adapter: unhandled statement: {sql}");
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DialectError> {
        let state = self.state.lock().unwrap();
        let sql = sql.trim();

        if sql.contains("information_schema.columns") {
            let table = text_param(params, 1);
            let columns = state
                .tables
                .get(&table)
                .map(|t| t.columns.clone())
                .unwrap_or_default();
            return Ok(columns
                .into_iter()
                .enumerate()
                .map(|(i, name)| {
                    SqlRow::new(
                        vec!["column_name".into(), "ordinal_position".into()],
                        vec![SqlValue::Text(name), SqlValue::Int(i as i64 + 1)],
                    )
                })
                .collect());
        }
        if sql.contains("information_schema.tables") && sql.contains("LIKE") {
            let pattern = text_param(params, 1);
            let prefix = pattern.trim_end_matches('%').replace('\\', "");
            return Ok(state
                .tables
                .keys()
                .filter(|name| name.starts_with(&prefix))
                .map(|name| {
                    SqlRow::new(vec!["table_name".into()], vec![SqlValue::Text(name.clone())])
                })
                .collect());
        }
        if sql.contains("information_schema.tables") {
            let table = text_param(params, 1);
            let n = i64::from(state.tables.contains_key(&table));
            return Ok(vec![SqlRow::new(vec!["n".into()], vec![SqlValue::Int(n)])]);
        }
        if sql.starts_with("SELECT COUNT(*) AS n FROM") {
            let table = backtick_idents(sql)[0].clone();
            let n = state.tables.get(&table).map(|t| t.rows.len()).unwrap_or(0);
            return Ok(vec![SqlRow::new(
                vec!["n".into()],
                vec![SqlValue::Int(n as i64)],
            )]);
        }
        if sql.starts_with("SELECT id, encrypted_table_name") {
            if state.fail_mapping_reads {
                return Err(DialectError::Decode("mapping store offline".into()));
            }
            let hits: Vec<Mapping> = if sql.contains("WHERE encrypted_table_name") {
                let shadow = text_param(params, 0);
                state
                    .mappings
                    .iter()
                    .filter(|m| m.shadow == shadow)
                    .cloned()
                    .collect()
            } else if sql.contains("WHERE original_table_name") {
                let original = text_param(params, 0);
                let mut rows: Vec<Mapping> = state
                    .mappings
                    .iter()
                    .filter(|m| m.original == original)
                    .cloned()
                    .collect();
                rows.sort_by_key(|m| std::cmp::Reverse(m.id));
                rows.truncate(1);
                rows
            } else {
                let mut rows: Vec<Mapping> = state.mappings.clone();
                rows.sort_by(|a, b| (&a.original, a.id).cmp(&(&b.original, b.id)));
                rows
            };
            return Ok(hits.iter().map(mapping_row).collect());
        }
        if sql.starts_with("SELECT * FROM") {
            let table = backtick_idents(sql)[0].clone();
            let limit = int_param(params, 0) as usize;
            let offset = int_param(params, 1) as usize;
            let rows = state
                .tables
                .get(&table)
                .map(|t| t.rows.iter().skip(offset).take(limit).cloned().collect())
                .unwrap_or_default();
            return Ok(rows);
        }
        panic!("fake adapter: unhandled query: {sql}");
    }
}

#[derive(Clone)]
struct FakeAdapter {
    db: Arc<FakeDb>,
}

#[async_trait]
impl SqlAdapter for FakeAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DialectError> {
        self.db.execute(sql, params)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DialectError> {
        self.db.query(sql, params)
    }
}

fn backtick_idents(sql: &str) -> Vec<String> {
    sql.split('`')
        .enumerate()
        .filter_map(|(i, part)| (i % 2 == 1).then(|| part.to_string()))
        .collect()
}

fn text_param(params: &[SqlValue], index: usize) -> String {
    match &params[index] {
        SqlValue::Text(s) => s.clone(),
        other => panic!("expected text param at {index}, got {other:?}"),
    }
}

fn int_param(params: &[SqlValue], index: usize) -> i64 {
    match &params[index] {
        SqlValue::Int(v) => *v,
        other => panic!("expected int param at {index}, got {other:?}"),
    }
}

fn mapping_row(m: &Mapping) -> SqlRow {
    let now = SqlValue::Timestamp(Utc::now());
    SqlRow::new(
        vec![
            "id".into(),
            "encrypted_table_name".into(),
            "original_table_name".into(),
            "encrypted_name_data".into(),
            "created_at".into(),
            "updated_at".into(),
        ],
        vec![
            SqlValue::Int(m.id),
            SqlValue::Text(m.shadow.clone()),
            SqlValue::Text(m.original.clone()),
            m.sealed
                .clone()
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null),
            now.clone(),
            now,
        ],
    )
}

// ── Trigger replay ──────────────────────────────────────────────────────────

/// Replay one row event through the recorded trigger body: resolve each
/// VALUES expression, encrypt like the in-database cipher would, append the
/// row to the shadow table.
fn fire_trigger(db: &FakeDb, op: &str, source: &str, row: &[(&str, Option<&str>)], key: &str) {
    let mut state = db.state.lock().unwrap();
    let def = state
        .triggers
        .iter()
        .find(|t| t.source == source && t.op == op)
        .unwrap_or_else(|| panic!("no {op} trigger installed on {source}"));
    let body = def.body.clone();
    let shadow = def.shadow.clone();

    let (pseudonyms, exprs) = parse_trigger_insert(&body);
    let cells: Vec<SqlValue> = exprs
        .iter()
        .map(|expr| {
            let plain = if expr.contains("CURRENT_USER()") {
                Some("auditor@localhost".to_string())
            } else if expr.contains("NOW(6)") {
                Some(Utc::now().to_rfc3339())
            } else if expr.contains('\'') {
                Some(expr.split('\'').nth(1).expect("operation literal").to_string())
            } else {
                // `cipher`(CAST(NEW.`col` AS CHAR)): second ident is the column
                let col = expr.split('`').nth(3).expect("source column").to_string();
                row.iter()
                    .find(|(name, _)| *name == col)
                    .and_then(|(_, value)| value.map(str::to_string))
            };
            match plain {
                Some(text) => SqlValue::Text(trigger::encrypt(&text, key).unwrap()),
                None => SqlValue::Null,
            }
        })
        .collect();

    let table = state.tables.get_mut(&shadow).expect("shadow table present");
    table.next_row_id += 1;
    let mut columns = vec!["audit_id".to_string(), "created_at".to_string()];
    let mut values = vec![
        SqlValue::Int(table.next_row_id),
        SqlValue::Timestamp(Utc::now()),
    ];
    columns.extend(pseudonyms);
    values.extend(cells);
    table.rows.push(SqlRow::new(columns, values));
}

fn parse_trigger_insert(body: &str) -> (Vec<String>, Vec<String>) {
    let insert_at = body.find("INSERT INTO").expect("trigger inserts");
    let rest = &body[insert_at..];

    let open = rest.find('(').unwrap();
    let close = rest.find(')').unwrap();
    let pseudonyms = rest[open + 1..close]
        .split(',')
        .map(|s| s.trim().trim_matches('`').to_string())
        .collect();

    let values_at = rest.find("VALUES (").unwrap();
    let block = &rest[values_at + "VALUES (".len()..];
    let end = block.find("\n  );").unwrap();
    let exprs = block[..end]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.trim_end_matches(',').to_string())
        .collect();

    (pseudonyms, exprs)
}

// ── Harness ─────────────────────────────────────────────────────────────────

fn engine(db: &Arc<FakeDb>) -> (AuditOrchestrator, AuditReader) {
    let adapter: Arc<dyn SqlAdapter> = Arc::new(FakeAdapter { db: db.clone() });
    let config = AuditConfig::default();
    (
        AuditOrchestrator::new(adapter.clone(), config.clone()),
        AuditReader::new(adapter, config),
    )
}

fn field(record: &DecryptedRecord, name: &str) -> FieldOutcome {
    record
        .fields
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, outcome)| outcome.clone())
        .unwrap_or(FieldOutcome::Missing)
}

// ── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_on_audited_table_lands_encrypted_and_decrypts_back() -> anyhow::Result<()> {
    // 1) audit `customers`
    let db = FakeDb::with_sources(&[("customers", &["id", "email"])]);
    let (orchestrator, reader) = engine(&db);

    let result = orchestrator.setup_one("customers", KEY).await;
    let SetupStatus::Created { audit_table } = result.status else {
        panic!("setup failed: {:?}", result.status);
    };
    assert_eq!(audit_table, naming::derive_table_name("customers", KEY));

    // 2) the application writes a row; the trigger mirrors it
    fire_trigger(
        &db,
        "INSERT",
        "customers",
        &[("id", Some("1")), ("email", Some("a@b.com"))],
        KEY,
    );

    let listed = reader.list_audit_tables().await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].original_table.as_deref(), Some("customers"));
    assert_eq!(listed[0].record_count, 1);

    // 3) nothing stored is plaintext
    let raw = reader.get_encrypted(&audit_table, 10, 0).await?;
    assert_eq!(raw.rows.len(), 1);
    for value in raw.rows[0].values() {
        if let Some(text) = value.as_text() {
            assert!(!text.contains("a@b.com"));
            assert!(!text.contains("INSERT"));
        }
    }

    // 4) decryption restores original names and values
    let page = reader.get_decrypted(&audit_table, KEY, 10, 0).await?;
    assert_eq!(page.original_table, "customers");
    assert_eq!(page.total_records, 1);
    let record = &page.records[0];
    assert_eq!(record.audit_id, Some(1));
    assert_eq!(field(record, "id"), FieldOutcome::Value(Some("1".into())));
    assert_eq!(
        field(record, "email"),
        FieldOutcome::Value(Some("a@b.com".into()))
    );
    assert_eq!(
        field(record, naming::AUDIT_OPERATION),
        FieldOutcome::Value(Some("INSERT".into()))
    );
    assert!(matches!(
        field(record, naming::AUDIT_ACTOR),
        FieldOutcome::Value(Some(_))
    ));

    // 5) updates and deletes arrive tagged with their operation
    fire_trigger(
        &db,
        "UPDATE",
        "customers",
        &[("id", Some("1")), ("email", Some("b@c.org"))],
        KEY,
    );
    fire_trigger(
        &db,
        "DELETE",
        "customers",
        &[("id", Some("1")), ("email", Some("b@c.org"))],
        KEY,
    );
    let page = reader.get_decrypted(&audit_table, KEY, 10, 0).await?;
    let ops: Vec<FieldOutcome> = page
        .records
        .iter()
        .map(|r| field(r, naming::AUDIT_OPERATION))
        .collect();
    assert_eq!(
        ops,
        [
            FieldOutcome::Value(Some("INSERT".into())),
            FieldOutcome::Value(Some("UPDATE".into())),
            FieldOutcome::Value(Some("DELETE".into())),
        ]
    );

    // 6) paging slices the trail without losing the total
    let middle = reader.get_decrypted(&audit_table, KEY, 1, 1).await?;
    assert_eq!(middle.records.len(), 1);
    assert_eq!(middle.total_records, 3);
    assert_eq!(
        field(&middle.records[0], naming::AUDIT_OPERATION),
        FieldOutcome::Value(Some("UPDATE".into()))
    );
    Ok(())
}

#[tokio::test]
async fn key_check_accepts_the_right_key_and_rejects_the_wrong_one() -> anyhow::Result<()> {
    let db = FakeDb::with_sources(&[("customers", &["id", "email"])]);
    let (orchestrator, reader) = engine(&db);
    let result = orchestrator.setup_one("customers", KEY).await;
    let audit_table = result.status.audit_table().unwrap().to_string();

    // empty trail: nothing to contradict the key
    let empty = reader.validate_password(&audit_table, KEY).await?;
    assert!(empty.valid);

    fire_trigger(
        &db,
        "INSERT",
        "customers",
        &[("id", Some("9")), ("email", Some("x@y.io"))],
        KEY,
    );

    let good = reader.validate_password(&audit_table, KEY).await?;
    assert!(good.valid);

    let bad = reader.validate_password(&audit_table, WRONG_KEY).await?;
    assert!(!bad.valid);

    // a wrong key cannot even line the pseudonym columns up
    let page = reader.get_decrypted(&audit_table, WRONG_KEY, 10, 0).await?;
    assert!(page.records[0]
        .fields
        .iter()
        .all(|(_, outcome)| *outcome == FieldOutcome::Missing));
    Ok(())
}

#[tokio::test]
async fn weak_keys_never_reach_the_database() {
    let db = FakeDb::with_sources(&[("customers", &["id", "email"])]);
    let (orchestrator, _) = engine(&db);

    for weak in ["short", "password123", "aaaaaaaaaaaa"] {
        let result = orchestrator.setup_one("customers", weak).await;
        let SetupStatus::Failed { step, .. } = result.status else {
            panic!("weak key {weak} accepted");
        };
        assert_eq!(step, SetupStep::Validating);
    }

    let state = db.state.lock().unwrap();
    assert_eq!(state.tables.len(), 1);
    assert!(state.triggers.is_empty());
    assert!(state.mappings.is_empty());
}

#[tokio::test]
async fn weak_keys_are_rejected_on_reads_too() -> anyhow::Result<()> {
    let db = FakeDb::with_sources(&[("customers", &["id", "email"])]);
    let (orchestrator, reader) = engine(&db);
    let result = orchestrator.setup_one("customers", KEY).await;
    let audit_table = result.status.audit_table().unwrap().to_string();
    fire_trigger(
        &db,
        "INSERT",
        "customers",
        &[("id", Some("1")), ("email", Some("a@b.com"))],
        KEY,
    );

    // decryption refuses the key outright, not a page of misses
    let err = reader
        .get_decrypted(&audit_table, "password123", 10, 0)
        .await
        .unwrap_err();
    assert!(err.is_bad_key());

    // the key check folds the same gate into its report
    let verdict = reader.validate_password(&audit_table, "password123").await?;
    assert!(!verdict.valid);
    assert!(verdict.message.contains("at least 12"));

    // raw reads take no key and stay open
    assert_eq!(reader.get_encrypted(&audit_table, 10, 0).await?.rows.len(), 1);
    Ok(())
}

#[tokio::test]
async fn re_running_setup_keeps_existing_audit_rows() -> anyhow::Result<()> {
    let db = FakeDb::with_sources(&[("customers", &["id", "email"])]);
    let (orchestrator, reader) = engine(&db);

    let first = orchestrator.setup_one("customers", KEY).await;
    let audit_table = first.status.audit_table().unwrap().to_string();
    fire_trigger(&db, "INSERT", "customers", &[("id", Some("1")), ("email", None)], KEY);

    let second = orchestrator.setup_one("customers", KEY).await;
    assert!(matches!(second.status, SetupStatus::Created { .. }));

    // triggers were replaced, not duplicated, and the trail survived
    assert_eq!(db.state.lock().unwrap().triggers.len(), 3);
    let page = reader.get_decrypted(&audit_table, KEY, 10, 0).await?;
    assert_eq!(page.total_records, 1);
    assert_eq!(field(&page.records[0], "email"), FieldOutcome::Value(None));
    Ok(())
}

#[tokio::test]
async fn batch_setup_skips_repeats_and_isolates_missing_tables() {
    let db = FakeDb::with_sources(&[("customers", &["id"]), ("orders", &["id", "total"])]);
    let (orchestrator, _) = engine(&db);

    let tables = ["customers", "orders", "customers", "missing"].map(String::from);
    let results = orchestrator.setup_many(&tables, KEY, None).await;

    assert_eq!(results.len(), 4);
    assert!(matches!(results[0].status, SetupStatus::Created { .. }));
    assert!(matches!(results[1].status, SetupStatus::Created { .. }));
    assert!(matches!(results[2].status, SetupStatus::Skipped { .. }));
    let SetupStatus::Failed { step, ref error } = results[3].status else {
        panic!("missing table should fail, got {:?}", results[3].status);
    };
    assert_eq!(step, SetupStep::Validating);
    assert!(error.contains("missing"));
}

#[tokio::test]
async fn batch_setup_reports_already_audited_tables_as_skipped() {
    let db = FakeDb::with_sources(&[("customers", &["id"]), ("orders", &["id"])]);
    let (orchestrator, _) = engine(&db);

    let first = orchestrator.setup_one("customers", KEY).await;
    assert!(matches!(first.status, SetupStatus::Created { .. }));

    let tables = ["customers", "orders"].map(String::from);
    let results = orchestrator.setup_many(&tables, KEY, None).await;
    assert!(matches!(results[0].status, SetupStatus::Skipped { .. }));
    assert!(matches!(results[1].status, SetupStatus::Created { .. }));
}

#[tokio::test]
async fn batch_setup_honors_cancellation_before_starting() {
    let db = FakeDb::with_sources(&[("customers", &["id"])]);
    let (orchestrator, _) = engine(&db);

    let (_tx, rx) = tokio::sync::watch::channel(true);
    let tables = ["customers"].map(String::from);
    let results = orchestrator.setup_many(&tables, KEY, Some(rx)).await;

    assert!(results.is_empty());
    assert!(db.state.lock().unwrap().triggers.is_empty());
}

#[tokio::test]
async fn removal_tears_down_and_is_idempotent() -> anyhow::Result<()> {
    let db = FakeDb::with_sources(&[("customers", &["id", "email"])]);
    let (orchestrator, reader) = engine(&db);

    let result = orchestrator.setup_one("customers", KEY).await;
    let audit_table = result.status.audit_table().unwrap().to_string();
    fire_trigger(&db, "INSERT", "customers", &[("id", Some("7")), ("email", None)], KEY);

    let outcome = orchestrator.remove_one("customers", KEY).await?;
    assert_eq!(outcome.audit_table, audit_table);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.mappings_deleted, 1);

    {
        let state = db.state.lock().unwrap();
        assert!(!state.tables.contains_key(&audit_table));
        assert!(state.triggers.is_empty());
        assert!(state.functions.is_empty());
        assert!(state.mappings.is_empty());
    }
    assert!(reader.list_audit_tables().await?.is_empty());

    // removing again is a no-op, not an error
    let again = orchestrator.remove_one("customers", KEY).await?;
    assert_eq!(again.mappings_deleted, 0);
    Ok(())
}

#[tokio::test]
async fn remove_all_sweeps_mapped_and_orphaned_shadow_tables() -> anyhow::Result<()> {
    let db = FakeDb::with_sources(&[("customers", &["id"]), ("orders", &["id"])]);
    let (orchestrator, _) = engine(&db);
    orchestrator.setup_one("customers", KEY).await;
    orchestrator.setup_one("orders", KEY).await;

    // strip the orders mapping so its shadow table becomes an orphan
    let orders_shadow = naming::derive_table_name("orders", KEY);
    db.state
        .lock()
        .unwrap()
        .mappings
        .retain(|m| m.shadow != orders_shadow);

    let outcomes = orchestrator.remove_all(KEY).await?;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .any(|o| o.table.as_deref() == Some("customers")));
    assert!(outcomes
        .iter()
        .any(|o| o.table.is_none() && o.audit_table == orders_shadow));

    let state = db.state.lock().unwrap();
    assert!(state.tables.keys().all(|t| !t.starts_with("aud_")));
    assert!(state.mappings.is_empty());
    Ok(())
}

#[tokio::test]
async fn listing_and_removal_survive_a_failing_mapping_lookup() -> anyhow::Result<()> {
    let db = FakeDb::with_sources(&[("customers", &["id", "email"])]);
    let (orchestrator, reader) = engine(&db);
    let result = orchestrator.setup_one("customers", KEY).await;
    let audit_table = result.status.audit_table().unwrap().to_string();

    db.state.lock().unwrap().fail_mapping_reads = true;

    // listing degrades to "mapping unknown" instead of erroring out
    let listed = reader.list_audit_tables().await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].audit_table, audit_table);
    assert_eq!(listed[0].original_table, None);

    // removal falls back to the derived shadow name and still tears down
    let outcome = orchestrator.remove_one("customers", KEY).await?;
    assert_eq!(outcome.audit_table, audit_table);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.mappings_deleted, 1);
    assert!(db
        .state
        .lock()
        .unwrap()
        .tables
        .keys()
        .all(|t| !t.starts_with("aud_")));
    Ok(())
}
