use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use configuration::Config;
use core_types::TraderId;
use database::{DbLogSink, DbRepository};
use engine::TraderExecutor;
use events::{BroadcastSink, FanoutSink, TracingSink};
use futures::future::join_all;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Runs user-authored strategy scripts against their exchange accounts.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => configuration::load_config_from(path)?,
        None => configuration::load_config()?,
    };
    let _log_guard = configuration::init_logging(&config.logging)?;

    let pool = database::connect(
        &config.database.url,
        config.database.max_connections,
        Duration::from_secs(config.database.acquire_timeout_secs),
    )
    .await
    .context("Failed to connect to the database")?;

    match cli.command {
        Commands::Migrate => {
            database::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied.");
        }
        Commands::Run(args) => handle_run(args, &config, pool).await?,
    }
    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the configuration file (defaults to `config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the database migrations.
    Migrate,
    /// Start traders and keep them running until Ctrl-C.
    Run(RunArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Ids of the traders to start.
    #[arg(required = true)]
    traders: Vec<TraderId>,

    /// Print every trader event to stdout as a JSON line.
    #[arg(long)]
    follow: bool,
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

async fn handle_run(args: RunArgs, config: &Config, pool: PgPool) -> anyhow::Result<()> {
    let repo = DbRepository::new(pool);

    let mut sink = FanoutSink::new().with(Arc::new(TracingSink));
    if config.events.persist {
        sink = sink.with(Arc::new(DbLogSink::new(
            repo.clone(),
            tokio::runtime::Handle::current(),
        )));
    }
    if args.follow {
        let broadcast = BroadcastSink::new(config.events.channel_capacity);
        follow_events(&broadcast);
        sink = sink.with(Arc::new(broadcast));
    }

    let executor = TraderExecutor::new(
        Arc::new(repo),
        Arc::new(sink),
        config.sandbox.clone(),
        config.exchanges.clone(),
    );

    let results = join_all(args.traders.iter().map(|id| executor.start(*id))).await;
    let mut started = Vec::new();
    for (id, result) in args.traders.iter().zip(results) {
        match result {
            Ok(()) => started.push(*id),
            Err(e) => tracing::error!(trader_id = id, error = %e, "Failed to start trader."),
        }
    }
    if started.is_empty() {
        anyhow::bail!("None of the requested traders could be started");
    }
    print_summary(&executor).await;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Ctrl-C received, stopping traders.");
            executor.shutdown().await;
        }
        _ = wait_all(&executor, &started) => {
            tracing::info!("Every trader has finished.");
        }
    }

    print_summary(&executor).await;
    Ok(())
}

/// Waits for the current run of every given trader to end.
async fn wait_all(executor: &TraderExecutor, ids: &[TraderId]) {
    for id in ids {
        if let Some(instance) = executor.registry().get(*id).await {
            instance.wait().await;
        }
    }
}

/// Streams events from the broadcast sink to stdout.
fn follow_events(broadcast: &BroadcastSink) {
    let mut rx = broadcast.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize trader event."),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event follower fell behind.");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn print_summary(executor: &TraderExecutor) {
    let mut instances = executor.registry().instances().await;
    instances.sort_by_key(|instance| instance.id());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Trader", "Name", "User", "Exchanges", "Status", "Last run"]);
    for instance in instances {
        let record = instance.snapshot();
        let exchanges: Vec<String> = instance
            .exchanges()
            .iter()
            .map(|binding| format!("{}:{}", binding.index(), binding.kind()))
            .collect();
        table.add_row(vec![
            record.id.to_string(),
            record.name,
            record.user_id.to_string(),
            exchanges.join(", "),
            format!("{:?}", record.status),
            record
                .last_run_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{table}");
}
