//! Diagnostics sink handed to adapters and the aggregator.
//!
//! Adapters never raise; everything they would otherwise throw ends up here.

use std::sync::Mutex;

use crate::models::Theater;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub theater: Option<Theater>,
    pub stage: &'static str,
    pub message: String,
    pub error: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            theater: None,
            stage,
            message: message.into(),
            error: None,
        }
    }

    pub fn theater(mut self, theater: Theater) -> Self {
        self.theater = Some(theater);
        self
    }

    pub fn error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

pub trait Reporter: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, diagnostic: Diagnostic) {
        let theater = diagnostic.theater.map(|t| t.id()).unwrap_or("-");
        let error = diagnostic.error.as_deref().unwrap_or("");
        match diagnostic.severity {
            Severity::Debug => tracing::debug!(
                theater,
                stage = diagnostic.stage,
                error,
                "{}",
                diagnostic.message
            ),
            Severity::Info => tracing::info!(
                theater,
                stage = diagnostic.stage,
                error,
                "{}",
                diagnostic.message
            ),
            Severity::Warn => tracing::warn!(
                theater,
                stage = diagnostic.stage,
                error,
                "{}",
                diagnostic.message
            ),
            Severity::Error => tracing::error!(
                theater,
                stage = diagnostic.stage,
                error,
                "{}",
                diagnostic.message
            ),
        }
    }
}

/// Keeps every diagnostic in memory. Used by tests and by callers that want
/// to show source health next to the feed.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn at_least(&self, severity: Severity) -> Vec<Diagnostic> {
        self.records()
            .into_iter()
            .filter(|record| record.severity >= severity)
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, diagnostic: Diagnostic) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
