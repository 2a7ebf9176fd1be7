use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;

use st_audit::{AuditConfig, AuditOrchestrator, AuditReader, FieldOutcome, SetupStatus};
use st_dialect::mysql::MySqlAdapter;
use st_dialect::postgres::PostgresAdapter;
use st_dialect::{Dialect, SqlAdapter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Shadowtrail encrypted audit trails", long_about = None)]
struct Cli {
    /// Connection URL (mysql://... or postgres://...); falls back to
    /// SHADOWTRAIL_DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Schema holding the audited tables (connected database on MySQL,
    /// `public` on PostgreSQL when omitted)
    #[arg(long)]
    schema: Option<String>,

    /// Actor recorded in operational events
    #[arg(long)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start auditing a table
    Setup { table: String },

    /// Start auditing several tables, a few at a time
    SetupBatch {
        #[arg(required = true)]
        tables: Vec<String>,
    },

    /// List audit tables with their row counts
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show records from an audit table
    Show {
        audit_table: String,

        /// Maximum number of records to print
        #[arg(short, long, default_value = "100")]
        limit: u32,

        #[arg(short, long, default_value = "0")]
        offset: u32,

        /// Print raw encrypted rows instead of decrypting
        #[arg(long)]
        raw: bool,

        /// Print as JSON
        #[arg(long, conflicts_with = "raw")]
        json: bool,
    },

    /// Verify the key against an audit table without printing data
    CheckKey { audit_table: String },

    /// Stop auditing a table and drop its audit objects
    Remove { table: String },

    /// Remove every audit table, trigger and mapping
    RemoveAll {
        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let url = match &cli.database_url {
        Some(url) => url.clone(),
        None => std::env::var("SHADOWTRAIL_DATABASE_URL")
            .map_err(|_| anyhow!("set --database-url or SHADOWTRAIL_DATABASE_URL"))?,
    };
    let adapter = connect(&url).await?;
    let config = AuditConfig {
        schema: cli.schema.clone(),
        actor: cli.actor.clone(),
        ..AuditConfig::default()
    };

    match cli.command {
        Commands::Setup { table } => setup_command(adapter, config, &table).await,
        Commands::SetupBatch { tables } => setup_batch_command(adapter, config, &tables).await,
        Commands::List { json } => list_command(adapter, config, json).await,
        Commands::Show {
            audit_table,
            limit,
            offset,
            raw,
            json,
        } => show_command(adapter, config, &audit_table, limit, offset, raw, json).await,
        Commands::CheckKey { audit_table } => {
            check_key_command(adapter, config, &audit_table).await
        }
        Commands::Remove { table } => remove_command(adapter, config, &table).await,
        Commands::RemoveAll { yes } => remove_all_command(adapter, config, yes).await,
    }
}

async fn connect(url: &str) -> Result<Arc<dyn SqlAdapter>> {
    let (scheme, _) = url
        .split_once("://")
        .ok_or_else(|| anyhow!("database URL must start with mysql:// or postgres://"))?;
    let dialect: Dialect = scheme.parse()?;
    let adapter: Arc<dyn SqlAdapter> = match dialect {
        Dialect::MySql => Arc::new(MySqlAdapter::connect(url).await?),
        Dialect::Postgres => Arc::new(PostgresAdapter::connect(url).await?),
    };
    Ok(adapter)
}

fn prompt_key(prompt: &str) -> Result<String> {
    if let Ok(key) = std::env::var("SHADOWTRAIL_KEY") {
        if !key.is_empty() {
            return Ok(key);
        }
    }
    rpassword::prompt_password(prompt).map_err(|e| anyhow!("key prompt: {e}"))
}

async fn setup_command(
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    table: &str,
) -> Result<()> {
    let key = prompt_key("Encryption key: ")?;
    let orchestrator = AuditOrchestrator::new(adapter, config);
    let result = orchestrator.setup_one(table, &key).await;
    match result.status {
        SetupStatus::Created { audit_table } => {
            println!("Auditing {table} -> {audit_table}");
            Ok(())
        }
        SetupStatus::Skipped { audit_table } => {
            println!("{table} already audited ({audit_table})");
            Ok(())
        }
        SetupStatus::Failed { step, error } => bail!("setup failed while {step}: {error}"),
    }
}

async fn setup_batch_command(
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    tables: &[String],
) -> Result<()> {
    let key = prompt_key("Encryption key: ")?;
    let orchestrator = AuditOrchestrator::new(adapter, config);
    let results = orchestrator.setup_many(tables, &key, None).await;

    let mut failures = 0;
    for result in &results {
        match &result.status {
            SetupStatus::Created { audit_table } => {
                println!("created  {} -> {}", result.table, audit_table);
            }
            SetupStatus::Skipped { .. } => {
                println!("skipped  {} (already audited)", result.table);
            }
            SetupStatus::Failed { step, error } => {
                failures += 1;
                eprintln!("failed   {} while {step}: {error}", result.table);
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} tables failed", results.len());
    }
    Ok(())
}

async fn list_command(adapter: Arc<dyn SqlAdapter>, config: AuditConfig, json: bool) -> Result<()> {
    let reader = AuditReader::new(adapter, config);
    let tables = reader.list_audit_tables().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }
    if tables.is_empty() {
        println!("No audit tables.");
        return Ok(());
    }
    println!("{:<40} {:<24} {:>8}", "AUDIT TABLE", "ORIGINAL", "RECORDS");
    for info in tables {
        println!(
            "{:<40} {:<24} {:>8}",
            info.audit_table,
            info.original_table.as_deref().unwrap_or("-"),
            info.record_count
        );
    }
    Ok(())
}

async fn show_command(
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    audit_table: &str,
    limit: u32,
    offset: u32,
    raw: bool,
    json: bool,
) -> Result<()> {
    let reader = AuditReader::new(adapter, config);

    if raw {
        let page = reader.get_encrypted(audit_table, limit, offset).await?;
        println!(
            "{}: showing {} of {} records",
            page.audit_table,
            page.rows.len(),
            page.total_records
        );
        for row in &page.rows {
            let cells: Vec<String> = row
                .columns()
                .iter()
                .zip(row.values())
                .map(|(column, value)| {
                    format!(
                        "{column}={}",
                        value.to_display().unwrap_or_else(|| "NULL".to_string())
                    )
                })
                .collect();
            println!("{}", cells.join(" "));
        }
        return Ok(());
    }

    let key = prompt_key("Encryption key: ")?;
    let page = reader.get_decrypted(audit_table, &key, limit, offset).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    println!(
        "{} (audit of {}, {} records total)",
        page.audit_table, page.original_table, page.total_records
    );
    for record in &page.records {
        let id = record
            .audit_id
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let fields: Vec<String> = record
            .fields
            .iter()
            .map(|(name, outcome)| {
                let rendered = match outcome {
                    FieldOutcome::Value(Some(v)) => v.clone(),
                    FieldOutcome::Value(None) => "NULL".to_string(),
                    FieldOutcome::Missing => "<missing>".to_string(),
                    FieldOutcome::Error(e) => format!("<error: {e}>"),
                };
                format!("{name}={rendered}")
            })
            .collect();
        println!("#{id} {}", fields.join(" "));
    }
    Ok(())
}

async fn check_key_command(
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    audit_table: &str,
) -> Result<()> {
    let key = prompt_key("Encryption key: ")?;
    let reader = AuditReader::new(adapter, config);
    let verdict = reader.validate_password(audit_table, &key).await?;
    println!("{}", verdict.message);
    if !verdict.valid {
        bail!("key check failed for {audit_table}");
    }
    Ok(())
}

async fn remove_command(
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    table: &str,
) -> Result<()> {
    let key = prompt_key("Encryption key: ")?;
    let orchestrator = AuditOrchestrator::new(adapter, config);
    let outcome = orchestrator.remove_one(table, &key).await?;
    println!(
        "Removed {} ({} objects dropped, {} mappings deleted)",
        outcome.audit_table, outcome.dropped, outcome.mappings_deleted
    );
    if outcome.failed > 0 {
        println!("{} drop statements failed; see log output", outcome.failed);
    }
    Ok(())
}

async fn remove_all_command(
    adapter: Arc<dyn SqlAdapter>,
    config: AuditConfig,
    yes: bool,
) -> Result<()> {
    if !yes {
        print!("Remove ALL audit tables and triggers? Type 'yes' to continue: ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if answer.trim() != "yes" {
            println!("Aborted.");
            return Ok(());
        }
    }

    let key = prompt_key("Encryption key: ")?;
    let orchestrator = AuditOrchestrator::new(adapter, config);
    let outcomes = orchestrator.remove_all(&key).await?;
    for outcome in &outcomes {
        println!(
            "removed {:<40} (was auditing {})",
            outcome.audit_table,
            outcome.table.as_deref().unwrap_or("-")
        );
    }
    println!("{} audit tables removed", outcomes.len());
    Ok(())
}
