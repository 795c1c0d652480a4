//! Dedup/notification gate between match results and the outside world.
//!
//! The subscriber store and the delivery channel are collaborators behind
//! traits; this module only decides who gets told about what, once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::matching::find_matches;
use crate::models::{Event, MatchedEvent, Preference};
use crate::report::{Diagnostic, Reporter, Severity};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub preferences: Vec<Preference>,
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, NotifyError>;

    async fn was_notified(&self, subscriber_id: &str, event_id: &str)
        -> Result<bool, NotifyError>;

    async fn record_notifications(
        &self,
        subscriber_id: &str,
        event_ids: &[String],
    ) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, address: &str, matches: &[MatchedEvent]) -> Result<(), NotifyError>;
}

/// Outcome of one gate run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyReport {
    pub subscribers: usize,
    pub notified: usize,
    pub events_sent: usize,
    pub already_notified: usize,
    pub failed: Vec<String>,
}

pub struct NotificationGate {
    store: Arc<dyn SubscriberStore>,
    dispatcher: Arc<dyn Dispatcher>,
    reporter: Arc<dyn Reporter>,
}

impl NotificationGate {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        dispatcher: Arc<dyn Dispatcher>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            reporter,
        }
    }

    /// Matches `events` against every active subscriber, drops pairs that
    /// were already sent, dispatches the rest and records them. One
    /// subscriber failing does not stop the others.
    pub async fn run(&self, events: &[Event]) -> NotifyReport {
        let mut report = NotifyReport::default();
        let subscribers = match self.store.active_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(err) => {
                self.reporter.report(
                    Diagnostic::new(Severity::Error, "notify", "could not list subscribers")
                        .error(err),
                );
                return report;
            }
        };
        report.subscribers = subscribers.len();

        for subscriber in &subscribers {
            match self.notify_one(subscriber, events).await {
                Ok((sent, skipped)) => {
                    report.already_notified += skipped;
                    if sent > 0 {
                        report.notified += 1;
                        report.events_sent += sent;
                    }
                }
                Err(err) => {
                    self.reporter.report(
                        Diagnostic::new(
                            Severity::Warn,
                            "notify",
                            format!("subscriber {} not notified", subscriber.id),
                        )
                        .error(err),
                    );
                    report.failed.push(subscriber.id.clone());
                }
            }
        }
        report
    }

    async fn notify_one(
        &self,
        subscriber: &Subscriber,
        events: &[Event],
    ) -> Result<(usize, usize), NotifyError> {
        let matches = find_matches(events, &subscriber.preferences);
        let mut fresh = Vec::with_capacity(matches.len());
        let mut skipped = 0;
        for matched in matches {
            if self
                .store
                .was_notified(&subscriber.id, matched.event.id())
                .await?
            {
                skipped += 1;
            } else {
                fresh.push(matched);
            }
        }
        if fresh.is_empty() {
            return Ok((0, skipped));
        }

        self.dispatcher.send(&subscriber.address, &fresh).await?;
        let ids: Vec<String> = fresh
            .iter()
            .map(|matched| matched.event.id().to_string())
            .collect();
        self.store
            .record_notifications(&subscriber.id, &ids)
            .await?;
        Ok((fresh.len(), skipped))
    }
}

/// Writes matches to the log instead of delivering them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn send(&self, address: &str, matches: &[MatchedEvent]) -> Result<(), NotifyError> {
        for matched in matches {
            let preferences: Vec<&str> = matched
                .matched
                .iter()
                .map(|preference| preference.value.as_str())
                .collect();
            tracing::info!(
                address,
                event_id = matched.event.id(),
                film = matched.event.film(),
                theater = matched.event.theater().id(),
                date = %matched.event.date(),
                time = %matched.event.time(),
                matched = ?preferences,
                "would notify"
            );
        }
        Ok(())
    }
}

/// Subscribers and notification history held in memory for one process.
#[derive(Debug, Default)]
pub struct MemorySubscriberStore {
    subscribers: Vec<Subscriber>,
    sent: Mutex<HashSet<(String, String)>>,
}

impl MemorySubscriberStore {
    pub fn new(subscribers: Vec<Subscriber>) -> Self {
        Self {
            subscribers,
            sent: Mutex::new(HashSet::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        match self.sent.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, NotifyError> {
        Ok(self.subscribers.clone())
    }

    async fn was_notified(
        &self,
        subscriber_id: &str,
        event_id: &str,
    ) -> Result<bool, NotifyError> {
        let sent = self
            .sent
            .lock()
            .map_err(|_| NotifyError::Store("notification log poisoned".to_string()))?;
        Ok(sent.contains(&(subscriber_id.to_string(), event_id.to_string())))
    }

    async fn record_notifications(
        &self,
        subscriber_id: &str,
        event_ids: &[String],
    ) -> Result<(), NotifyError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotifyError::Store("notification log poisoned".to_string()))?;
        for event_id in event_ids {
            sent.insert((subscriber_id.to_string(), event_id.clone()));
        }
        Ok(())
    }
}
