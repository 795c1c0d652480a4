//! Ordered extraction fallbacks.
//!
//! Each adapter declares its strategies from most to least specific. The
//! first one that yields anything wins; later ones never run.

use chrono::NaiveDate;
use scraper::Html;

/// What a strategy may look at besides the document itself.
#[derive(Clone, Copy, Debug)]
pub struct ParseEnv<'a> {
    pub today: NaiveDate,
    pub base_url: &'a str,
}

pub struct Strategy<T> {
    pub name: &'static str,
    pub extract: fn(&Html, &ParseEnv<'_>) -> Vec<T>,
}

impl<T> Strategy<T> {
    pub const fn new(name: &'static str, extract: fn(&Html, &ParseEnv<'_>) -> Vec<T>) -> Self {
        Self { name, extract }
    }
}

#[derive(Debug)]
pub struct ChainOutcome<T> {
    pub strategy: &'static str,
    pub items: Vec<T>,
}

/// Runs `strategies` in order and returns the first non-empty result.
pub fn run_chain<T>(
    strategies: &[Strategy<T>],
    document: &Html,
    env: &ParseEnv<'_>,
) -> Option<ChainOutcome<T>> {
    strategies.iter().find_map(|strategy| {
        let items = (strategy.extract)(document, env);
        if items.is_empty() {
            None
        } else {
            Some(ChainOutcome {
                strategy: strategy.name,
                items,
            })
        }
    })
}
