use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::base::{self, FilmInfo, Showing};
use super::strategy::{ParseEnv, Strategy};
use super::{ScrapeContext, SourceAdapter};
use crate::error::ScrapeError;
use crate::models::{Event, Theater};
use crate::normalize::{parse_date, parse_date_spec};

const THEATER: Theater = Theater::Anthology;

static RUN_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.film-run").expect("anthology run selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.film-title").expect("anthology title selector"));
static TITLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.film-title a").expect("anthology title link selector"));
static NOTE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".run-note").expect("anthology run note selector"));
static SHOWTIMES_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".showtimes").expect("anthology showtimes selector"));
static BLURB_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".film-blurb").expect("anthology blurb selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("anthology image selector"));

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("anthology row selector"));
static ROW_DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.date").expect("anthology row date selector"));
static ROW_TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.time").expect("anthology row time selector"));
static ROW_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.title").expect("anthology row title selector"));
static ROW_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td.title a").expect("anthology row link selector"));

static STRATEGIES: [Strategy<Showing>; 2] = [
    Strategy::new("film-runs", film_runs),
    Strategy::new("calendar-table", calendar_table),
];

pub struct Anthology {
    url: String,
}

impl Default for Anthology {
    fn default() -> Self {
        Self {
            url: THEATER.url().to_string(),
        }
    }
}

impl Anthology {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SourceAdapter for Anthology {
    fn theater(&self) -> Theater {
        THEATER
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError> {
        let html = base::fetch_html(ctx, &self.url).await?;
        let showings = base::extract_listings(ctx, THEATER, &STRATEGIES, &html, &self.url)?;
        Ok(base::build_events(ctx, THEATER, showings))
    }
}

/// Theatrical runs. The note says how long the run lasts (`MUST END
/// THURSDAY`, `Feb 13 – 19`, `Friday, February 20`) and the listed times
/// repeat every day of it.
fn film_runs(document: &Html, env: &ParseEnv<'_>) -> Vec<Showing> {
    let mut showings = Vec::new();
    for run in document.select(&RUN_SELECTOR) {
        let Some(title) = base::first_text(&run, &TITLE_SELECTOR) else {
            continue;
        };
        let Some(dates) = base::first_text(&run, &NOTE_SELECTOR)
            .and_then(|note| parse_date_spec(&note, env.today))
        else {
            continue;
        };
        let page_url = base::absolute_url(
            env.base_url,
            base::first_attr(&run, &TITLE_LINK_SELECTOR, "href"),
        );
        let purchase_url = page_url
            .clone()
            .unwrap_or_else(|| env.base_url.to_string());
        let film = FilmInfo {
            title,
            page_url,
            poster_url: base::absolute_url(
                env.base_url,
                base::first_attr(&run, &IMG_SELECTOR, "src"),
            ),
            synopsis: base::first_text(&run, &BLURB_SELECTOR),
            popularity: None,
        };
        let times = base::show_times(&run, &SHOWTIMES_SELECTOR);
        showings.extend(Showing::cross(&film, &dates.dates(), &times, &purchase_url));
    }
    showings
}

/// Calendar grid: one row per screening. A row without a date cell belongs
/// to the date above it.
fn calendar_table(document: &Html, env: &ParseEnv<'_>) -> Vec<Showing> {
    let mut showings = Vec::new();
    let mut current: Option<NaiveDate> = None;
    for row in document.select(&ROW_SELECTOR) {
        if let Some(text) = base::first_text(&row, &ROW_DATE_SELECTOR) {
            current = parse_date(&text, env.today);
        }
        let Some(date) = current else {
            continue;
        };
        let Some(title) = base::first_text(&row, &ROW_TITLE_SELECTOR) else {
            continue;
        };
        let times = base::show_times(&row, &ROW_TIME_SELECTOR);
        if times.is_empty() {
            continue;
        }
        let page_url = base::absolute_url(
            env.base_url,
            base::first_attr(&row, &ROW_LINK_SELECTOR, "href"),
        );
        let purchase_url = page_url
            .clone()
            .unwrap_or_else(|| env.base_url.to_string());
        let film = FilmInfo {
            title,
            page_url,
            ..FilmInfo::default()
        };
        showings.extend(Showing::cross(&film, &[date], &times, &purchase_url));
    }
    showings
}
