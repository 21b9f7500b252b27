//! sqlscope - Main entry point.
//!
//! Opens one database with operation logging, pings it through an execution
//! context and optionally runs a single statement.

use clap::Parser;
use sqlscope::config::Config;
use sqlscope::context::ExecutionContext;
use sqlscope::db::{Database, DbPool, TxOptions};
use sqlscope::error::DbResult;
use sqlscope::models::Value;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

/// Statements whose first keyword returns rows.
fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        keyword.as_str(),
        "SELECT" | "WITH" | "PRAGMA" | "SHOW" | "EXPLAIN" | "DESCRIBE" | "DESC"
    )
}

async fn run_statement(
    ctx: &mut ExecutionContext<DbPool>,
    sql: &str,
    args: &[Value],
) -> DbResult<serde_json::Value> {
    if returns_rows(sql) {
        let rows = ctx.query(sql, args).await?;
        let rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| serde_json::Value::Object(row.to_json_map()))
            .collect();
        Ok(serde_json::json!({ "rows": rows }))
    } else {
        let result = ctx.exec(sql, args).await?;
        Ok(serde_json::to_value(result).unwrap_or_default())
    }
}

/// Ping, then run the configured statement if any.
async fn execute(
    config: &Config,
    ctx: &mut ExecutionContext<DbPool>,
    args: &[Value],
) -> DbResult<Option<serde_json::Value>> {
    ctx.ping().await?;
    let Some(sql) = config.sql.as_deref() else {
        info!(database = %ctx.database().name(), "Database is reachable");
        return Ok(None);
    };

    if !config.dry_run {
        return run_statement(ctx, sql, args).await.map(Some);
    }

    ctx.enter(&TxOptions::default()).await?;
    let result = run_statement(ctx, sql, args).await;
    let closed = ctx.leave(false).await;
    let output = result?;
    closed?;
    Ok(Some(output))
}

async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db_config = config.parse_database()?;
    let args = config.parse_params()?;

    info!(
        database = %db_config.name,
        backend = %db_config.backend,
        "Starting sqlscope v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = Database::open(&db_config).await?;
    let mut ctx = ExecutionContext::with_info(db.clone(), config.request_info());

    let outcome = execute(config, &mut ctx, &args).await;

    drop(ctx);
    db.close().await;

    if let Some(output) = outcome? {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    if let Err(e) = run(&config).await {
        error!(error = %e, "sqlscope failed");
        return Err(e);
    }

    info!("sqlscope finished");
    Ok(())
}
