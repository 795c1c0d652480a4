pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod report;
pub mod scraping;

use std::sync::Arc;

pub use aggregate::{sort_events, AggregateReport, Aggregator, SourceReport, SourceStatus};
pub use config::{load_config, AppConfig};
pub use error::{ConfigError, FetchError, NotifyError, ScrapeError};
pub use fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
pub use matching::{find_matches, match_event};
pub use models::{Event, MatchedEvent, Preference, PreferenceKind, ShowTime, Theater};
pub use report::{Diagnostic, MemoryReporter, Reporter, Severity, TracingReporter};
pub use scraping::{fetch_events, list_sources, ScrapeContext, SourceAdapter, SourceInfo};

/// A context wired to the real network, configured from `config`.
pub fn scrape_context(
    config: &AppConfig,
    reporter: Arc<dyn Reporter>,
) -> Result<ScrapeContext, FetchError> {
    let fetcher = HttpFetcher::new(&config.user_agent)?;
    Ok(ScrapeContext::new(Arc::new(fetcher), reporter)
        .with_request_timeout(config.request_timeout())
        .with_detail_concurrency(config.detail_concurrency))
}

