use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use campaign_ingest::ingest::process_csv_data;
use campaign_ingest::store::postgres::Db;
use campaign_ingest::store::CampaignStore;
use campaign_ingest::util::env as env_util;

#[derive(Parser)]
#[command(
    name = "campaign-ingest",
    about = "Load campaign CSV exports into the relational store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a campaign CSV file, then print a verification summary.
    Ingest {
        /// Path to the CSV file to load.
        #[arg(long, default_value = "data.csv")]
        file: PathBuf,
    },
    /// Print store row counts and referential-integrity checks.
    Counts,
}

#[tokio::main]
async fn main() -> Result<()> {
    campaign_ingest::tracing::init_tracing("campaign_ingest=info")?;
    env_util::init_env();
    let cli = Cli::parse();

    let db_url = env_util::db_url()
        .context("database URL not configured; set DATABASE_URL / DB_URL or DB_* parts")?;
    let max_connections = env_util::env_parse("DB_MAX_CONNECTIONS", 5);
    let db = Db::connect(&db_url, max_connections).await?;
    db.ensure_schema().await?;

    match cli.command {
        Command::Ingest { file } => {
            let csv_text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            info!(file = %file.display(), "starting ingestion");

            let result = process_csv_data(&db, &csv_text).await;
            if !result.success {
                eprintln!(
                    "ingestion failed: {}",
                    result.error.as_deref().unwrap_or(&result.message)
                );
                std::process::exit(1);
            }

            println!("Ingestion summary:");
            println!("  clients processed:   {}", result.clients_count);
            println!("  campaigns processed: {}", result.campaigns_count);
            println!("  {}", result.message);
            print_verification(&db).await?;
        }
        Command::Counts => print_verification(&db).await?,
    }
    Ok(())
}

/// Post-ingest sanity check: row counts plus a referential-integrity probe
/// flagging campaigns whose client reference does not resolve.
async fn print_verification(store: &dyn CampaignStore) -> Result<()> {
    let total_clients = store.count_clients().await?;
    let total_campaigns = store.count_campaigns().await?;
    let with_client = store.count_campaigns_with_client().await?;

    use std::fmt::Write as _;
    let mut out = String::new();
    writeln!(out, "Data verification:").ok();
    writeln!(out, "  clients in store:   {total_clients}").ok();
    writeln!(out, "  campaigns in store: {total_campaigns}").ok();
    writeln!(out, "  campaigns with valid client relations: {with_client}").ok();
    if with_client == total_campaigns {
        writeln!(out, "  all campaigns have valid client relations").ok();
    } else {
        writeln!(out, "  WARNING: some campaigns are missing client relations").ok();
    }
    print!("{out}");
    Ok(())
}
