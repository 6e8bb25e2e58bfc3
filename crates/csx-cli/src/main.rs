//! ChannelSync operational CLI.
//!
//! This binary is the cron entry point: an external scheduler invokes
//! `csx sync pass` and `csx outbox claim` repeatedly, possibly from
//! several workers at once. All concurrency safety lives in the database
//! layer (busy-flag exclusions, claim locking, coalescing enqueue) — the
//! CLI itself is stateless.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use csx_candidates::{CandidateQueryEngine, PassConfig};
use csx_schemas::Channel;

#[derive(Parser)]
#[command(name = "csx")]
#[command(about = "ChannelSync CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Listing synchronization passes
    Sync {
        #[command(subcommand)]
        cmd: SyncCmd,
    },

    /// Fulfillment-change outbox utilities
    Outbox {
        #[command(subcommand)]
        cmd: OutboxCmd,
    },

    /// Order inspection
    Orders {
        #[command(subcommand)]
        cmd: OrdersCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while unprocessed
    /// fulfillment changes exist unless --yes is provided.
    Migrate {
        /// Acknowledge migrating a DB that still has queued channel work.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SyncCmd {
    /// Run one evaluation pass for a channel and print the action rows.
    Pass {
        /// Channel (amazon | ebay | walmart)
        #[arg(long)]
        channel: String,

        /// Blocking-error retry cooldown in seconds
        #[arg(long, default_value_t = 300)]
        cooldown_secs: i64,
    },
}

#[derive(Subcommand)]
enum OutboxCmd {
    /// Claim up to N unprocessed changes for dispatch and print them.
    Claim {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Return a claimed change to the unprocessed pool.
    Release {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
enum OrdersCmd {
    /// Print one order row as JSON.
    Show {
        #[arg(long)]
        order_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Db { cmd } => run_db(cmd).await,
        Commands::Sync { cmd } => run_sync(cmd).await,
        Commands::Outbox { cmd } => run_outbox(cmd).await,
        Commands::Orders { cmd } => run_orders(cmd).await,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn run_db(cmd: DbCmd) -> Result<()> {
    let pool = csx_db::connect_from_env().await?;
    match cmd {
        DbCmd::Status => {
            let status = csx_db::status(&pool).await?;
            println!("ok={} has_schema={}", status.ok, status.has_schema);
        }
        DbCmd::Migrate { yes } => {
            let status = csx_db::status(&pool).await?;
            if status.has_schema {
                let pending = csx_db::outbox_count_unprocessed(&pool).await?;
                if pending > 0 && !yes {
                    bail!(
                        "refusing to migrate: {pending} unprocessed fulfillment change(s) \
                         queued. Re-run with --yes to acknowledge."
                    );
                }
            }
            csx_db::migrate(&pool).await?;
            println!("migrations applied");
        }
    }
    Ok(())
}

async fn run_sync(cmd: SyncCmd) -> Result<()> {
    let SyncCmd::Pass {
        channel,
        cooldown_secs,
    } = cmd;

    let channel = Channel::parse(&channel)
        .with_context(|| format!("unknown channel '{channel}' (amazon | ebay | walmart)"))?;

    let pool = csx_db::connect_from_env().await?;
    let pass = csx_db::MaterializedPass::load(&pool, channel).await?;

    let engine = CandidateQueryEngine::new(
        &pass,
        &pass,
        &pass,
        &pass,
        &pass,
        PassConfig {
            error_retry_cooldown_secs: cooldown_secs,
        },
    );
    let report = engine.run_pass(channel, Utc::now());

    // One JSON line per action row; the dispatcher consumes these.
    for action in &report.actions {
        println!("{}", serde_json::to_string(action)?);
    }
    tracing::info!(
        evaluated = report.evaluated,
        actions = report.actions.len(),
        skipped = report.skipped.len(),
        "pass complete"
    );
    Ok(())
}

async fn run_outbox(cmd: OutboxCmd) -> Result<()> {
    let pool = csx_db::connect_from_env().await?;
    match cmd {
        OutboxCmd::Claim { limit } => {
            let claimed = csx_db::outbox_claim_batch(&pool, limit).await?;
            for change in &claimed {
                println!("{}", serde_json::to_string(change)?);
            }
            tracing::info!(claimed = claimed.len(), "outbox claim complete");
        }
        OutboxCmd::Release { id } => {
            if csx_db::outbox_release_claim(&pool, id).await? {
                println!("released {id}");
            } else {
                bail!("change {id} is not claimed");
            }
        }
    }
    Ok(())
}

async fn run_orders(cmd: OrdersCmd) -> Result<()> {
    let OrdersCmd::Show { order_id } = cmd;
    let pool = csx_db::connect_from_env().await?;
    let order = csx_db::load_order(&pool, order_id)
        .await?
        .with_context(|| format!("order {order_id} not found"))?;
    println!("{}", serde_json::to_string_pretty(&order)?);
    Ok(())
}
