use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use screen_scrape_lib::notify::{LogDispatcher, MemorySubscriberStore, NotificationGate, Subscriber};
use screen_scrape_lib::{
    find_matches, list_sources, load_config, logging, scrape_context, Aggregator, Preference,
    Reporter, Theater, TracingReporter,
};

#[derive(Debug, Parser)]
#[command(name = "screen-scrape")]
#[command(about = "Repertory cinema listings, scraped into one feed")]
struct Cli {
    /// JSON config file; environment variables override it.
    #[arg(long, global = true, env = "SCREEN_SCRAPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List supported venues.
    Venues,
    /// Scrape and print the sorted feed as JSON.
    Scrape {
        /// Only these venues (repeatable).
        #[arg(long = "venue")]
        venues: Vec<Theater>,
        #[arg(long)]
        pretty: bool,
    },
    /// Scrape, then print the events matching the given preferences.
    Match {
        /// `film:VALUE`, `director:VALUE` or `actor:VALUE` (repeatable).
        #[arg(long = "pref", required = true)]
        preferences: Vec<Preference>,
        #[arg(long)]
        pretty: bool,
    },
    /// Dry-run the notification gate for subscribers read from a JSON file.
    Notify {
        #[arg(long)]
        subscribers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("loading configuration")?;
    logging::init_logging(&config.log_level);

    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter);

    match cli.command {
        Commands::Venues => {
            for source in list_sources() {
                println!("{:<12} {:<24} {}", source.id, source.name, source.url);
            }
        }
        Commands::Scrape { venues, pretty } => {
            if !venues.is_empty() {
                config.sources = venues;
            }
            let ctx = scrape_context(&config, reporter)?;
            let report = Aggregator::from_config(&config, ctx)
                .aggregate_with_report()
                .await;
            for source in report.failed_sources() {
                tracing::warn!(theater = %source.theater, status = ?source.status, "source incomplete");
            }
            print_json(&report.events, pretty)?;
        }
        Commands::Match {
            preferences,
            pretty,
        } => {
            let ctx = scrape_context(&config, reporter)?;
            let events = Aggregator::from_config(&config, ctx).aggregate().await;
            let matches = find_matches(&events, &preferences);
            tracing::info!(events = events.len(), matches = matches.len(), "matching finished");
            print_json(&matches, pretty)?;
        }
        Commands::Notify { subscribers } => {
            let raw = std::fs::read_to_string(&subscribers)
                .with_context(|| format!("reading {}", subscribers.display()))?;
            let subscribers: Vec<Subscriber> =
                serde_json::from_str(&raw).context("parsing subscribers")?;

            let ctx = scrape_context(&config, reporter.clone())?;
            let events = Aggregator::from_config(&config, ctx).aggregate().await;
            let gate = NotificationGate::new(
                Arc::new(MemorySubscriberStore::new(subscribers)),
                Arc::new(LogDispatcher),
                reporter,
            );
            let report = gate.run(&events).await;
            print_json(&report, true)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
