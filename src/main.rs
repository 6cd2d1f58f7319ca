use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};

use biblio_search::config::AppConfig;
use biblio_search::core::graph::NetworkKind;
use biblio_search::core::search::{Pagination, SearchFilters, SearchQuery};
use biblio_search::core::service::BiblioService;

#[derive(Parser)]
#[command(name = "biblio-search")]
#[command(about = "Search bibliographic works and explore citation networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to ~/.config/biblio-search/config.toml)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one search and print the response as JSON
    Search {
        /// Query text; boolean operators and "quoted phrases" are supported
        #[arg(default_value = "")]
        text: String,

        /// Filter as KEY=VALUE (year, yearFrom, yearTo, type, language, readingType, peerReviewed)
        #[arg(short = 'f', long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Facet counts for a query
    Facets {
        #[arg(default_value = "")]
        text: String,
    },

    /// Citation or collaboration network around a seed
    Network {
        #[arg(value_enum)]
        kind: KindArg,

        seed: i64,

        #[arg(short, long, default_value = "2")]
        depth: u32,
    },

    /// Corpus counts
    Stats,

    /// Engine and cache health
    Status,

    /// Print the effective configuration
    PrintConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Citation,
    Collaboration,
}

impl From<KindArg> for NetworkKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Citation => NetworkKind::Citation,
            KindArg::Collaboration => NetworkKind::Collaboration,
        }
    }
}

fn parse_filters(raw: &[String]) -> anyhow::Result<HashMap<String, String>> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| anyhow!("filter '{}' is not KEY=VALUE", pair))
        })
        .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("loading configuration")?;

    let _log_guard = biblio_search::core::logging::init(&config.logging);
    tracing::info!("{} v{} starting", biblio_search::NAME, biblio_search::VERSION);

    match cli.command {
        Commands::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        command => run(command, &config).await,
    }
}

async fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    let service = BiblioService::connect(config)
        .await
        .context("starting search service")?;

    match command {
        Commands::Search {
            text,
            filters,
            limit,
            offset,
        } => {
            let filters = SearchFilters::from_params(&parse_filters(&filters)?)?;
            let query = SearchQuery::new(text, filters, Pagination::new(limit, offset)?);
            print_json(&service.search(&query).await?)
        }
        Commands::Facets { text } => print_json(&service.facets(&text).await?),
        Commands::Network { kind, seed, depth } => {
            print_json(&service.network(kind.into(), seed, depth).await?)
        }
        Commands::Stats => print_json(&service.statistics().await?),
        Commands::Status => print_json(&service.status().await),
        Commands::PrintConfig => print_json(&config.redacted()),
    }
}
