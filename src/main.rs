use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use trendfeed::config::Config;
use trendfeed::service::{FeedService, IdToName, TrendInput};
use trendfeed::storage::FeedStore;
use trendfeed::tools::{respond, RssTools};

/// Default config path (~/.config/trendfeed/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("trendfeed")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "trendfeed", about = "Per-keyword RSS feeds from trend aggregation results")]
struct Args {
    /// Config file (defaults to ~/.config/trendfeed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the output directory from the config file
    #[arg(long, value_name = "DIR", global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build feeds from aggregation results and write them out
    Generate {
        /// JSON results from the aggregation pipeline
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// JSON map of source id to display name
        #[arg(long, value_name = "FILE")]
        names: Option<PathBuf>,

        /// Input is raw crawl data; only all.xml is written
        #[arg(long)]
        raw: bool,
    },
    /// List available keyword feeds
    List,
    /// Print the RSS content for a keyword
    Show { keyword: String },
    /// Summary of stored feeds
    Stats,
    /// File history for a keyword
    History { keyword: String },
    /// Delete feed files older than the retention window
    Cleanup {
        /// Retention window in days (defaults to retention_days from config)
        #[arg(long)]
        days: Option<u64>,
    },
    /// Check that a file is well-formed XML
    Validate { file: PathBuf },
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let output_dir = args.output_dir.unwrap_or(config.output_dir);

    let store = FeedStore::open(&output_dir).context("Failed to open feed store")?;
    let service = FeedService::new(store, config.base_url).with_max_items(config.max_items);
    let tools = RssTools::new(service);

    let response = match args.command {
        Command::Generate { input, names, raw } => {
            let input = TrendInput::from_json(&read_file(&input)?, raw)
                .with_context(|| format!("Invalid aggregation data in {}", input.display()))?;
            let id_to_name: IdToName = match names {
                Some(path) => serde_json::from_str(&read_file(&path)?)
                    .with_context(|| format!("Invalid id-to-name map in {}", path.display()))?,
                None => IdToName::new(),
            };
            respond(tools.generate(&input, &id_to_name))
        }
        Command::List => respond(tools.subscriptions()),
        Command::Show { keyword } => respond(tools.content(&keyword)),
        Command::Stats => respond(tools.statistics()),
        Command::History { keyword } => respond(tools.history(&keyword)),
        Command::Cleanup { days } => respond(tools.cleanup(days.unwrap_or(config.retention_days))),
        Command::Validate { file } => respond(tools.validate(&read_file(&file)?)),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    if response["success"] != serde_json::Value::Bool(true) {
        std::process::exit(1);
    }
    Ok(())
}
