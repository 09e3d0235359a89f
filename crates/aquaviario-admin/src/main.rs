use std::path::PathBuf;

use anyhow::{Context, Result};
use aquaviario_core::config::PipelineConfig;
use aquaviario_core::tiers::{TableAddress, Tier, TierStore};
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aquaviario tier store administration", long_about = None)]
struct Cli {
    /// Pipeline config file (falls back to AQUAVIARIO_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the columns and row count of a table
    Describe(TableArgs),
    /// Remove a table from a tier if it exists
    DropTable(TableArgs),
    /// Row counts of every table in a tier
    Counts(TierArgs),
}

#[derive(Args, Debug)]
struct TableArgs {
    tier: Tier,
    name: String,
}

#[derive(Args, Debug)]
struct TierArgs {
    tier: Tier,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::resolve(cli.config.as_deref())
        .context("failed to load pipeline configuration")?;
    let store = TierStore::filesystem(&config.store_root);

    match cli.command {
        Command::Describe(args) => handle_describe(&store, args),
        Command::DropTable(args) => handle_drop_table(&store, args),
        Command::Counts(args) => handle_counts(&store, args.tier),
    }
}

fn handle_describe(store: &TierStore, args: TableArgs) -> Result<()> {
    let address = TableAddress::new(args.tier, args.name);
    let description = store.describe(&address)?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["column", "type"]);
    for (name, dtype) in &description.columns {
        table.add_row(vec![name.as_str(), dtype.as_str()]);
    }
    println!("{address} ({} rows)", description.rows);
    println!("{table}");
    Ok(())
}

fn handle_drop_table(store: &TierStore, args: TableArgs) -> Result<()> {
    let address = TableAddress::new(args.tier, args.name);
    if store.drop_table(&address)? {
        info!(table = %address, "table dropped");
        println!("Dropped {address}.");
    } else {
        println!("{address} does not exist; nothing to drop.");
    }
    Ok(())
}

fn handle_counts(store: &TierStore, tier: Tier) -> Result<()> {
    let names = store.list(tier)?;
    if names.is_empty() {
        println!("No tables in the {tier} tier.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["table", "rows", "columns"]);
    for name in names {
        let address = TableAddress::new(tier, &name);
        match store.describe(&address) {
            Ok(description) => {
                table.add_row(vec![
                    name,
                    description.rows.to_string(),
                    description.columns.len().to_string(),
                ]);
            }
            Err(err) => {
                warn!(table = %address, error = %err, "failed to describe table");
                table.add_row(vec![name, "unreadable".to_string(), String::new()]);
            }
        }
    }
    println!("{table}");
    Ok(())
}
