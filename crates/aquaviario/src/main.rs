use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aquaviario_core::config::PipelineConfig;
use aquaviario_core::pipeline;
use aquaviario_core::queries::{AnalyticalQuery, DEFAULT_NAVIGATION, DEFAULT_OCCUPANCY_YEAR};
use aquaviario_core::tiers::{Tier, TierStore};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser, Debug)]
#[command(author, version, about = "Waterway statistics consolidation pipeline", long_about = None)]
struct Cli {
    /// Pipeline config file (falls back to AQUAVIARIO_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest the exports and refresh the raw, cleaned and curated tiers
    Run(RunArgs),
    /// Run an analytical query against the curated tier
    Query(QueryArgs),
    /// List the tables stored in a tier
    Tables(TablesArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Write the full run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Query name, or `all`
    name: String,
    /// Navigation type for merchandise-weight-by-navigation
    #[arg(long, default_value = DEFAULT_NAVIGATION)]
    navigation: String,
    /// Year for berth-occupancy-for-year
    #[arg(long, default_value_t = DEFAULT_OCCUPANCY_YEAR)]
    year: u16,
}

#[derive(Args, Debug)]
struct TablesArgs {
    /// raw, cleaned or curated (bronze, prata and ouro also accepted)
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
        Command::Run(args) => handle_run(&config, &store, args.report.as_deref()),
        Command::Query(args) => handle_query(&store, &config, args),
        Command::Tables(args) => handle_tables(&store, args.tier),
    }
}

fn handle_run(config: &PipelineConfig, store: &TierStore, report_path: Option<&Path>) -> Result<()> {
    info!(
        discovery_root = %config.discovery_root.display(),
        store_root = %config.store_root.display(),
        "starting pipeline run"
    );
    let report = pipeline::run(config, store)?;

    println!("{}", render::run_summary(&report));
    println!("{}", render::quality(&report));
    if let Some(table) = render::issues(&report) {
        warn!(issues = report.issues().len(), "run finished with excluded tables or files");
        println!("{table}");
    }

    if let Some(path) = report_path {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }
    Ok(())
}

fn handle_query(store: &TierStore, config: &PipelineConfig, args: QueryArgs) -> Result<()> {
    let queries = if args.name == "all" {
        AnalyticalQuery::all()
    } else {
        vec![args.name.parse::<AnalyticalQuery>().map_err(anyhow::Error::msg)?]
    };

    for query in queries {
        let query = match query {
            AnalyticalQuery::MerchandiseWeightByNavigation { .. } => {
                AnalyticalQuery::MerchandiseWeightByNavigation {
                    navigation: args.navigation.clone(),
                }
            }
            AnalyticalQuery::BerthOccupancyForYear { .. } => {
                AnalyticalQuery::BerthOccupancyForYear { year: args.year }
            }
            other => other.with_year_column(&config.year_column),
        };

        let result = query
            .run(store)
            .with_context(|| format!("query {query} failed"))?;
        println!("{}", query.description());
        println!("{}", render::frame(&result)?);
    }
    Ok(())
}

fn handle_tables(store: &TierStore, tier: Tier) -> Result<()> {
    let names = store.list(tier)?;
    if names.is_empty() {
        println!("No tables in the {tier} tier.");
        return Ok(());
    }
    for name in names {
        println!("{tier}.{name}");
    }
    Ok(())
}
