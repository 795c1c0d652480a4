//! Fan-out over every adapter, fan-in into one ordered feed.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout, timeout_at, Instant};

use crate::config::AppConfig;
use crate::models::{Event, Theater};
use crate::report::{Diagnostic, Severity};
use crate::scraping::{self, ScrapeContext, SourceAdapter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceStatus {
    Ok,
    Failed,
    TimedOut,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub theater: Theater,
    pub status: SourceStatus,
    pub events: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct AggregateReport {
    pub events: Vec<Event>,
    pub sources: Vec<SourceReport>,
}

impl AggregateReport {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources
            .iter()
            .filter(|source| source.status != SourceStatus::Ok)
    }
}

pub struct Aggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    ctx: ScrapeContext,
    source_timeout: Duration,
    overall_timeout: Duration,
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, ctx: ScrapeContext) -> Self {
        Self {
            adapters,
            ctx,
            source_timeout: Duration::from_secs(45),
            overall_timeout: Duration::from_secs(90),
        }
    }

    /// Adapters selected by `config.sources`, with its timeouts.
    pub fn from_config(config: &AppConfig, ctx: ScrapeContext) -> Self {
        Self::new(scraping::adapters_for(&config.sources), ctx)
            .with_source_timeout(config.source_timeout())
            .with_overall_timeout(config.aggregate_timeout())
    }

    pub fn with_source_timeout(mut self, limit: Duration) -> Self {
        self.source_timeout = limit;
        self
    }

    pub fn with_overall_timeout(mut self, limit: Duration) -> Self {
        self.overall_timeout = limit;
        self
    }

    /// The merged, sorted feed. Never fails; failed sources simply
    /// contribute nothing.
    pub async fn aggregate(&self) -> Vec<Event> {
        self.aggregate_with_report().await.events
    }

    pub async fn aggregate_with_report(&self) -> AggregateReport {
        let deadline = Instant::now() + self.overall_timeout;

        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let ctx = self.ctx.clone();
                let limit = self.source_timeout;
                tokio::spawn(async move {
                    timeout(limit, scraping::try_fetch_events(adapter.as_ref(), &ctx)).await
                })
            })
            .collect();

        let mut events = Vec::new();
        let mut sources = Vec::with_capacity(handles.len());
        for (adapter, handle) in self.adapters.iter().zip(handles) {
            let theater = adapter.theater();
            let abort = handle.abort_handle();
            let status = match timeout_at(deadline, handle).await {
                Ok(Ok(Ok(Some(found)))) => {
                    sources.push(SourceReport {
                        theater,
                        status: SourceStatus::Ok,
                        events: found.len(),
                    });
                    events.extend(found);
                    continue;
                }
                Ok(Ok(Ok(None))) => SourceStatus::Failed,
                Ok(Ok(Err(_))) => {
                    self.report(
                        theater,
                        format!(
                            "source exceeded {:?}; contributing no events",
                            self.source_timeout
                        ),
                    );
                    SourceStatus::TimedOut
                }
                Ok(Err(join_error)) => {
                    self.ctx.reporter.report(
                        Diagnostic::new(Severity::Error, "aggregate", "source task did not finish")
                            .theater(theater)
                            .error(join_error),
                    );
                    SourceStatus::Failed
                }
                Err(_) => {
                    abort.abort();
                    self.report(
                        theater,
                        format!(
                            "aggregation deadline of {:?} reached; source aborted",
                            self.overall_timeout
                        ),
                    );
                    SourceStatus::TimedOut
                }
            };
            sources.push(SourceReport {
                theater,
                status,
                events: 0,
            });
        }

        sort_events(&mut events);
        AggregateReport { events, sources }
    }

    fn report(&self, theater: Theater, message: String) {
        self.ctx.reporter.report(
            Diagnostic::new(Severity::Warn, "aggregate", message).theater(theater),
        );
    }
}

/// Stable sort by date, then minutes since midnight. Undisclosed times count
/// as midnight, so they lead their day.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_key(|event| (event.date(), event.time().minutes()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::models::ShowTime;
    use crate::report::MemoryReporter;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};

    struct Fixed {
        theater: Theater,
        events: Vec<Event>,
    }

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn theater(&self) -> Theater {
            self.theater
        }

        fn source_url(&self) -> &str {
            "https://example.com/fixed"
        }

        async fn scrape(&self, _ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError> {
            Ok(self.events.clone())
        }
    }

    struct Broken(Theater);

    #[async_trait]
    impl SourceAdapter for Broken {
        fn theater(&self) -> Theater {
            self.0
        }

        fn source_url(&self) -> &str {
            "https://example.com/broken"
        }

        async fn scrape(&self, _ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError> {
            Err(ScrapeError::Status {
                status: 500,
                url: "https://example.com/broken".to_string(),
            })
        }
    }

    struct Hung(Theater);

    #[async_trait]
    impl SourceAdapter for Hung {
        fn theater(&self) -> Theater {
            self.0
        }

        fn source_url(&self) -> &str {
            "https://example.com/hung"
        }

        async fn scrape(&self, _ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Vec::new())
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).expect("valid date")
    }

    fn event(theater: Theater, film: &str, day: u32, time: Option<(u32, u32)>) -> Event {
        let time = match time {
            Some((h, m)) => ShowTime::At(NaiveTime::from_hms_opt(h, m, 0).expect("valid time")),
            None => ShowTime::Undisclosed,
        };
        Event::new(theater, film, date(day), time, "https://example.com/t")
    }

    fn ctx(reporter: Arc<MemoryReporter>) -> ScrapeContext {
        ScrapeContext::for_tests(date(16), reporter)
    }

    #[test]
    fn sort_uses_24_hour_order_and_puts_undisclosed_first() {
        let mut events = vec![
            event(Theater::FilmForum, "Late", 17, Some((23, 0))),
            event(Theater::FilmForum, "Early", 17, Some((1, 0))),
            event(Theater::Metrograph, "Run", 17, None),
            event(Theater::IfcCenter, "Yesterday", 16, Some((21, 0))),
        ];
        sort_events(&mut events);
        let films: Vec<&str> = events.iter().map(Event::film).collect();
        assert_eq!(films, ["Yesterday", "Run", "Early", "Late"]);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut events = vec![
            event(Theater::Anthology, "B", 18, Some((19, 0))),
            event(Theater::QuadCinema, "A", 18, Some((19, 0))),
        ];
        sort_events(&mut events);
        assert_eq!(events[0].film(), "B");
    }

    #[tokio::test]
    async fn failed_sources_do_not_affect_the_others() {
        let reporter = Arc::new(MemoryReporter::new());
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(Fixed {
                theater: Theater::FilmForum,
                events: vec![
                    event(Theater::FilmForum, "Taxi Driver", 18, Some((19, 30))),
                    event(Theater::FilmForum, "Stalker", 17, Some((13, 0))),
                ],
            }),
            Arc::new(Broken(Theater::IfcCenter)),
            Arc::new(Fixed {
                theater: Theater::Metrograph,
                events: vec![event(Theater::Metrograph, "Perfect Days", 17, None)],
            }),
        ];

        let report = Aggregator::new(adapters, ctx(reporter.clone()))
            .aggregate_with_report()
            .await;

        let films: Vec<&str> = report.events.iter().map(Event::film).collect();
        assert_eq!(films, ["Perfect Days", "Stalker", "Taxi Driver"]);
        assert_eq!(report.sources[1].status, SourceStatus::Failed);
        assert_eq!(report.failed_sources().count(), 1);
        assert!(reporter
            .at_least(Severity::Warn)
            .iter()
            .any(|d| d.theater == Some(Theater::IfcCenter)));
    }

    #[tokio::test]
    async fn hung_source_times_out_without_delaying_the_rest() {
        let reporter = Arc::new(MemoryReporter::new());
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(Hung(Theater::Anthology)),
            Arc::new(Fixed {
                theater: Theater::QuadCinema,
                events: vec![event(Theater::QuadCinema, "The Conversation", 17, Some((14, 10)))],
            }),
        ];

        let report = Aggregator::new(adapters, ctx(reporter.clone()))
            .with_source_timeout(Duration::from_millis(50))
            .aggregate_with_report()
            .await;

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.sources[0].status, SourceStatus::TimedOut);
        assert_eq!(report.sources[1].status, SourceStatus::Ok);
        let warnings = reporter.at_least(Severity::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("exceeded 50ms"), "{}", warnings[0].message);
    }

    #[tokio::test]
    async fn overall_deadline_aborts_stragglers() {
        let reporter = Arc::new(MemoryReporter::new());
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(Hung(Theater::Anthology))];

        let events = Aggregator::new(adapters, ctx(reporter.clone()))
            .with_overall_timeout(Duration::from_millis(50))
            .aggregate()
            .await;

        assert!(events.is_empty());
        let warnings = reporter.at_least(Severity::Warn);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("deadline of 50ms"), "{}", warnings[0].message);
    }
}
