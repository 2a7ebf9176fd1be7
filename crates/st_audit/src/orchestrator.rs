//! Setup and removal pipeline.
//!
//! Per table the pipeline is a strict sequence: validate, create the shadow
//! table, create routines and triggers, persist the mapping. There is no
//! transaction spanning the steps (DDL autocommits on both engines), so a
//! failure reports the step it died in and leaves earlier objects behind;
//! removal is built to clean up exactly such partial state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use st_crypto::{naming, validate_key};
use st_dialect::{catalog, SqlAdapter};

use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::events::{emit, emit_start, SetupStatus, SetupStep};
use crate::generator::{self, NamedStatement};
use crate::metadata::MetadataStore;
use crate::plan::AuditPlan;

// ── Outcomes ────────────────────────────────────────────────────────────────

/// Terminal report for one table in a setup call.
#[derive(Debug, Clone)]
pub struct SetupResult {
    pub table: String,
    pub status: SetupStatus,
}

/// Report for one removal. Removal never fails part-way: every sub-step is
/// best-effort, and the counts say how it went.
#[derive(Debug, Clone)]
pub struct RemoveOutcome {
    /// Original table, when known. Orphaned shadow tables have no mapping
    /// left to resolve one from.
    pub table: Option<String>,
    pub audit_table: String,
    pub dropped: usize,
    pub failed: usize,
    pub mappings_deleted: u64,
}

// ── Orchestrator ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AuditOrchestrator {
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    metadata: MetadataStore,
}

impl AuditOrchestrator {
    pub fn new(adapter: Arc<dyn SqlAdapter>, config: AuditConfig) -> Self {
        let metadata = MetadataStore::new(adapter.clone(), config.schema.clone());
        Self {
            adapter,
            config,
            metadata,
        }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    // ── Single-table setup ──────────────────────────────────────────────────

    /// Run the full pipeline for one table. Re-running against an already
    /// audited table is idempotent: triggers and routines are dropped and
    /// recreated, the mapping is refreshed, and existing shadow rows are
    /// kept (the trail is append-only).
    pub async fn setup_one(&self, table: &str, key: &str) -> SetupResult {
        let started = Instant::now();
        let actor = self.config.actor.as_deref();
        emit_start("audit_setup", table, actor);

        let status = match self.run_setup(table, key).await {
            Ok(audit_table) => SetupStatus::Created { audit_table },
            Err(error) => SetupStatus::Failed {
                step: step_of(&error),
                error: error.to_string(),
            },
        };

        let error_text = match &status {
            SetupStatus::Failed { error, .. } => Some(error.as_str()),
            _ => None,
        };
        emit(
            "audit_setup",
            table,
            actor,
            status.success(),
            started,
            error_text,
        );
        SetupResult {
            table: table.to_string(),
            status,
        }
    }

    async fn run_setup(&self, table: &str, key: &str) -> Result<String, AuditError> {
        validate_key(key)?;
        let schema = self.config.schema.as_deref();

        if !catalog::table_exists(self.adapter.as_ref(), schema, table).await? {
            return Err(AuditError::TableNotFound(table.to_string()));
        }
        let columns = catalog::table_columns(self.adapter.as_ref(), schema, table).await?;
        if columns.is_empty() {
            return Err(AuditError::NoColumns(table.to_string()));
        }

        let plan = AuditPlan::build(self.adapter.dialect(), table, &columns, key)?;
        let bundle = generator::generate(&plan, schema, key);

        self.execute_step(
            SetupStep::CreatingShadowTable,
            std::slice::from_ref(&bundle.create_shadow_table),
        )
        .await?;

        self.execute_step(SetupStep::CreatingTriggers, &bundle.drop_before_create)
            .await?;
        self.execute_step(SetupStep::CreatingTriggers, &bundle.routines)
            .await?;
        self.execute_step(SetupStep::CreatingTriggers, &bundle.triggers)
            .await?;

        self.metadata
            .upsert(&plan.shadow_table, table, key)
            .await
            .map_err(|e| AuditError::Metadata(e.to_string()))?;

        Ok(plan.shadow_table)
    }

    async fn execute_step(
        &self,
        step: SetupStep,
        statements: &[NamedStatement],
    ) -> Result<(), AuditError> {
        for statement in statements {
            debug!(object = %statement.object, step = %step, "executing DDL");
            self.adapter
                .execute(&statement.sql, &[])
                .await
                .map_err(|source| AuditError::DdlExecution { step, source })?;
        }
        Ok(())
    }

    // ── Batch setup ─────────────────────────────────────────────────────────

    /// Set up many tables: a few at a time concurrently, a pause between
    /// slices, per-table isolation (one failure never stops the batch).
    /// Already-audited tables and repeated entries in the same call are
    /// reported as skipped. `cancel` is checked between slices; flipping it
    /// to `true` stops before the next slice.
    pub async fn setup_many(
        &self,
        tables: &[String],
        key: &str,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Vec<SetupResult> {
        if let Err(error) = validate_key(key) {
            // A weak key fails every table the same way; skip the database
            // entirely.
            let error = error.to_string();
            return tables
                .iter()
                .map(|table| SetupResult {
                    table: table.clone(),
                    status: SetupStatus::Failed {
                        step: SetupStep::Validating,
                        error: error.clone(),
                    },
                })
                .collect();
        }

        // Duplicates are set up once; deduping here also keeps one table
        // from racing itself inside a concurrent slice.
        let mut seen = HashSet::new();
        let unique: Vec<String> = tables
            .iter()
            .filter(|t| seen.insert(t.as_str().to_string()))
            .cloned()
            .collect();

        let unique_results = self.run_batches(&unique, key, cancel).await;
        merge_batch_results(tables, key, unique_results)
    }

    async fn run_batches(
        &self,
        tables: &[String],
        key: &str,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Vec<SetupResult> {
        let batch_size = self.config.batch.effective_batch_size();
        let mut results = Vec::with_capacity(tables.len());

        for (index, batch) in tables.chunks(batch_size).enumerate() {
            if let Some(rx) = &cancel {
                if *rx.borrow() {
                    info!(
                        completed = results.len(),
                        remaining = tables.len() - results.len(),
                        "batch setup cancelled"
                    );
                    break;
                }
            }
            if index > 0 {
                tokio::time::sleep(self.config.batch.delay()).await;
            }

            let mut handles: Vec<(String, JoinHandle<SetupResult>)> =
                Vec::with_capacity(batch.len());
            for table in batch {
                let this = self.clone();
                let table_owned = table.clone();
                let key = key.to_string();
                let handle = tokio::spawn(async move {
                    match this.audited_shadow(&table_owned, &key).await {
                        Ok(Some(audit_table)) => {
                            info!(table = %table_owned, audit_table = %audit_table, "already audited, skipping");
                            SetupResult {
                                table: table_owned,
                                status: SetupStatus::Skipped { audit_table },
                            }
                        }
                        Ok(None) => this.setup_one(&table_owned, &key).await,
                        Err(error) => SetupResult {
                            table: table_owned,
                            status: SetupStatus::Failed {
                                step: SetupStep::Validating,
                                error: error.to_string(),
                            },
                        },
                    }
                });
                handles.push((table.clone(), handle));
            }

            for (table, handle) in handles {
                let result = handle.await.unwrap_or_else(|join_error| SetupResult {
                    table,
                    status: SetupStatus::Failed {
                        step: SetupStep::Validating,
                        error: format!("setup task aborted: {join_error}"),
                    },
                });
                results.push(result);
            }
        }

        let succeeded = results.iter().filter(|r| r.status.success()).count();
        info!(
            requested = tables.len(),
            completed = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "batch setup finished"
        );
        results
    }

    /// Shadow table name if `table` is already audited: the recorded
    /// mapping wins, else the name this key would derive (covers a mapping
    /// write that failed after trigger creation).
    async fn audited_shadow(&self, table: &str, key: &str) -> Result<Option<String>, AuditError> {
        if let Some(row) = self.metadata.resolve_shadow(table).await? {
            return Ok(Some(row.encrypted_table_name));
        }
        let derived = naming::derive_table_name(table, key);
        let schema = self.config.schema.as_deref();
        if catalog::table_exists(self.adapter.as_ref(), schema, &derived).await? {
            return Ok(Some(derived));
        }
        Ok(None)
    }

    pub async fn is_audited(&self, table: &str, key: &str) -> Result<bool, AuditError> {
        Ok(self.audited_shadow(table, key).await?.is_some())
    }

    // ── Removal ─────────────────────────────────────────────────────────────

    /// Tear down auditing for one table: triggers (current and legacy
    /// names), routines, shadow table, mapping rows. Every sub-step is
    /// IF EXISTS or logged-and-continued, so partial state from a failed
    /// setup cleans up, and running this twice is harmless.
    pub async fn remove_one(&self, table: &str, key: &str) -> Result<RemoveOutcome, AuditError> {
        let started = Instant::now();
        let actor = self.config.actor.as_deref();
        emit_start("audit_remove", table, actor);
        validate_key(key)?;

        let mapped = match self.metadata.resolve_shadow(table).await {
            Ok(row) => row,
            Err(error) => {
                warn!(table = %table, error = %error, "mapping lookup failed, deriving shadow name");
                None
            }
        };
        let shadow = mapped
            .map(|row| row.encrypted_table_name)
            .unwrap_or_else(|| naming::derive_table_name(table, key));

        let outcome = self.drop_objects(Some(table.to_string()), table, &shadow).await;
        emit(
            "audit_remove",
            table,
            actor,
            outcome.failed == 0,
            started,
            None,
        );
        Ok(outcome)
    }

    /// Remove every audited table recorded in metadata, then sweep shadow
    /// tables left with no mapping at all.
    pub async fn remove_all(&self, key: &str) -> Result<Vec<RemoveOutcome>, AuditError> {
        validate_key(key)?;
        let schema = self.config.schema.as_deref();
        let mut outcomes = Vec::new();
        let mut handled: HashSet<String> = HashSet::new();

        for row in self.metadata.list().await? {
            handled.insert(row.encrypted_table_name.clone());
            let outcome = self
                .drop_objects(
                    Some(row.original_table_name.clone()),
                    &row.original_table_name,
                    &row.encrypted_table_name,
                )
                .await;
            outcomes.push(outcome);
        }

        // Shadow tables whose mapping is already gone: no original name, so
        // only the table itself can be dropped.
        let leftovers =
            catalog::tables_with_prefix(self.adapter.as_ref(), schema, naming::TABLE_PREFIX)
                .await?;
        for orphan in leftovers {
            if handled.contains(&orphan) {
                continue;
            }
            let sql = format!(
                "DROP TABLE IF EXISTS {}",
                generator::qualified(self.adapter.dialect(), schema, &orphan)
            );
            let (dropped, failed) = match self.adapter.execute(&sql, &[]).await {
                Ok(_) => (1, 0),
                Err(error) => {
                    warn!(audit_table = %orphan, error = %error, "orphan shadow table drop failed");
                    (0, 1)
                }
            };
            outcomes.push(RemoveOutcome {
                table: None,
                audit_table: orphan,
                dropped,
                failed,
                mappings_deleted: 0,
            });
        }

        info!(removed = outcomes.len(), "audit removal sweep finished");
        Ok(outcomes)
    }

    async fn drop_objects(
        &self,
        original: Option<String>,
        table: &str,
        shadow: &str,
    ) -> RemoveOutcome {
        let schema = self.config.schema.as_deref();
        let statements =
            generator::removal_statements(self.adapter.dialect(), schema, table, shadow);

        let mut dropped = 0;
        let mut failed = 0;
        for statement in &statements {
            match self.adapter.execute(&statement.sql, &[]).await {
                Ok(_) => dropped += 1,
                Err(error) => {
                    failed += 1;
                    warn!(object = %statement.object, error = %error, "drop failed, continuing removal");
                }
            }
        }

        let mut mappings_deleted = 0;
        match self.metadata.delete(shadow).await {
            Ok(n) => mappings_deleted += n,
            Err(error) => warn!(error = %error, "mapping delete by shadow name failed"),
        }
        match self.metadata.delete_by_original(table).await {
            Ok(n) => mappings_deleted += n,
            Err(error) => warn!(error = %error, "mapping delete by original name failed"),
        }

        RemoveOutcome {
            table: original,
            audit_table: shadow.to_string(),
            dropped,
            failed,
            mappings_deleted,
        }
    }
}

/// Attribute an error to the pipeline step it belongs to.
fn step_of(error: &AuditError) -> SetupStep {
    match error {
        AuditError::DdlExecution { step, .. } => *step,
        AuditError::Metadata(_) => SetupStep::PersistingMapping,
        _ => SetupStep::Validating,
    }
}

/// Reassemble per-entry results in input order: the first occurrence of a
/// table carries its computed result, repeats are reported skipped, and
/// entries never reached (cancellation) are dropped.
fn merge_batch_results(
    tables: &[String],
    key: &str,
    unique_results: Vec<SetupResult>,
) -> Vec<SetupResult> {
    let by_table: HashMap<String, SetupResult> = unique_results
        .into_iter()
        .map(|result| (result.table.clone(), result))
        .collect();

    let mut merged = Vec::with_capacity(tables.len());
    let mut first_seen = HashSet::new();
    for table in tables {
        let first = first_seen.insert(table.as_str().to_string());
        match by_table.get(table.as_str()) {
            None => continue,
            Some(result) if first => merged.push(result.clone()),
            Some(result) => {
                let audit_table = result
                    .status
                    .audit_table()
                    .map(str::to_string)
                    .unwrap_or_else(|| naming::derive_table_name(table, key));
                merged.push(SetupResult {
                    table: table.clone(),
                    status: SetupStatus::Skipped { audit_table },
                });
            }
        }
    }
    merged
}
