pub mod anthology_html;
pub mod base;
pub mod film_forum_html;
pub mod ifc_center_html;
pub mod metrograph_html;
pub mod quad_cinema_html;
pub mod strategy;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::FutureExt;

use crate::error::ScrapeError;
use crate::fetch::Fetcher;
use crate::models::{Event, Theater};
use crate::report::{Diagnostic, Reporter, Severity};

/// Everything an adapter is handed for one run. Cheap to clone.
#[derive(Clone)]
pub struct ScrapeContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub reporter: Arc<dyn Reporter>,
    pub today: NaiveDate,
    pub request_timeout: Duration,
    pub detail_concurrency: usize,
}

impl ScrapeContext {
    pub fn new(fetcher: Arc<dyn Fetcher>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            fetcher,
            reporter,
            today: local_today(),
            request_timeout: Duration::from_secs(20),
            detail_concurrency: 4,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = concurrency.max(1);
        self
    }

    #[cfg(test)]
    pub(crate) fn for_tests(today: NaiveDate, reporter: Arc<dyn Reporter>) -> Self {
        Self::new(Arc::new(tests::OfflineFetcher), reporter).with_today(today)
    }
}

/// Today's date where the venues are.
pub fn local_today() -> NaiveDate {
    Utc::now()
        .with_timezone(&Theater::FilmForum.timezone())
        .date_naive()
}

/// One theater's fetch-and-normalize pipeline.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn theater(&self) -> Theater;

    fn source_url(&self) -> &str;

    /// May fail; callers go through [`fetch_events`], which never does.
    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError>;
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Runs one adapter. Errors and panics become an empty list plus a
/// diagnostic.
pub async fn fetch_events(adapter: &dyn SourceAdapter, ctx: &ScrapeContext) -> Vec<Event> {
    try_fetch_events(adapter, ctx).await.unwrap_or_default()
}

/// Same as [`fetch_events`], but `None` tells the caller the source failed
/// (already reported) rather than listing nothing.
pub async fn try_fetch_events(
    adapter: &dyn SourceAdapter,
    ctx: &ScrapeContext,
) -> Option<Vec<Event>> {
    let theater = adapter.theater();
    match AssertUnwindSafe(adapter.scrape(ctx)).catch_unwind().await {
        Ok(Ok(events)) => {
            ctx.reporter.report(
                Diagnostic::new(
                    Severity::Info,
                    "scrape",
                    format!("collected {} events", events.len()),
                )
                .theater(theater),
            );
            Some(events)
        }
        Ok(Err(err)) => {
            ctx.reporter.report(
                Diagnostic::new(Severity::Warn, "scrape", "source failed; contributing no events")
                    .theater(theater)
                    .error(err),
            );
            None
        }
        Err(_) => {
            ctx.reporter.report(
                Diagnostic::new(Severity::Error, "scrape", "adapter panicked; contributing no events")
                    .theater(theater),
            );
            None
        }
    }
}

pub fn active_adapters() -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(film_forum_html::FilmForum::default()),
        Arc::new(ifc_center_html::IfcCenter::default()),
        Arc::new(metrograph_html::Metrograph::default()),
        Arc::new(anthology_html::Anthology::default()),
        Arc::new(quad_cinema_html::QuadCinema::default()),
    ]
}

/// Adapters for the given theaters only; an empty filter means all.
pub fn adapters_for(theaters: &[Theater]) -> Vec<Arc<dyn SourceAdapter>> {
    active_adapters()
        .into_iter()
        .filter(|adapter| theaters.is_empty() || theaters.contains(&adapter.theater()))
        .collect()
}

pub fn list_sources() -> Vec<SourceInfo> {
    active_adapters()
        .into_iter()
        .map(|adapter| SourceInfo {
            id: adapter.theater().id().to_string(),
            name: adapter.theater().name().to_string(),
            url: adapter.source_url().to_string(),
        })
        .collect()
}

pub fn find_adapter(theater: Theater) -> Option<Arc<dyn SourceAdapter>> {
    active_adapters()
        .into_iter()
        .find(|adapter| adapter.theater() == theater)
}
