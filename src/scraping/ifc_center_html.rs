use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, FilmInfo, Showing};
use super::strategy::{ParseEnv, Strategy};
use super::{ScrapeContext, SourceAdapter};
use crate::error::ScrapeError;
use crate::models::{Event, ShowTime, Theater};
use crate::normalize::{find_times, parse_date};

const THEATER: Theater = Theater::IfcCenter;

static DAY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.daily-schedule").expect("ifc day selector"));
static DATA_DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-date]").expect("ifc data-date selector"));
static DETAILS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.details").expect("ifc details selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3").expect("ifc title selector"));
static TITLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3 a").expect("ifc title link selector"));
static TIME_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.times li a").expect("ifc time link selector"));
static TIME_TEXT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.times li").expect("ifc time text selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("ifc image selector"));
static FLAT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, div.details").expect("ifc flat scan selector"));

static STRATEGIES: [Strategy<Showing>; 3] = [
    Strategy::new("daily-schedule", daily_schedule),
    Strategy::new("data-date", data_date_blocks),
    Strategy::new("flat-scan", flat_scan),
];

pub struct IfcCenter {
    url: String,
}

impl Default for IfcCenter {
    fn default() -> Self {
        Self {
            url: THEATER.url().to_string(),
        }
    }
}

impl IfcCenter {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SourceAdapter for IfcCenter {
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

/// `div.daily-schedule` blocks headed by `Tue Feb 17`.
fn daily_schedule(document: &Html, env: &ParseEnv<'_>) -> Vec<Showing> {
    let mut showings = Vec::new();
    for day in document.select(&DAY_SELECTOR) {
        let Some(date) = day_heading(day).and_then(|text| parse_date(&text, env.today))
        else {
            continue;
        };
        for details in day.select(&DETAILS_SELECTOR) {
            showings.extend(parse_details(details, date, env));
        }
    }
    showings
}

/// Any element carrying a `data-date` attribute.
fn data_date_blocks(document: &Html, env: &ParseEnv<'_>) -> Vec<Showing> {
    let mut showings = Vec::new();
    for block in document.select(&DATA_DATE_SELECTOR) {
        let Some(date) = block
            .value()
            .attr("data-date")
            .and_then(|raw| parse_date(raw, env.today))
        else {
            continue;
        };
        for details in block.select(&DETAILS_SELECTOR) {
            showings.extend(parse_details(details, date, env));
        }
    }
    showings
}

/// Date headings and film blocks in document order.
fn flat_scan(document: &Html, env: &ParseEnv<'_>) -> Vec<Showing> {
    let mut showings = Vec::new();
    let mut current: Option<NaiveDate> = None;
    for node in document.select(&FLAT_SELECTOR) {
        if node.value().name() == "div" {
            if let Some(date) = current {
                showings.extend(parse_details(node, date, env));
            }
            continue;
        }
        if inside_details(node) {
            continue;
        }
        if let Some(date) = parse_date(&base::inner_text(node), env.today) {
            current = Some(date);
        }
    }
    showings
}

fn day_heading(day: ElementRef<'_>) -> Option<String> {
    day.children()
        .filter_map(ElementRef::wrap)
        .find(|child| child.value().name() == "h3")
        .map(base::inner_text)
}

fn inside_details(node: ElementRef<'_>) -> bool {
    node.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().classes().any(|class| class == "details"))
}

/// One film block: a title plus one ticket link per time.
fn parse_details(details: ElementRef<'_>, date: NaiveDate, env: &ParseEnv<'_>) -> Vec<Showing> {
    let Some(title) = base::first_text(&details, &TITLE_SELECTOR) else {
        return Vec::new();
    };
    let page_url = base::absolute_url(
        env.base_url,
        base::first_attr(&details, &TITLE_LINK_SELECTOR, "href"),
    );
    let poster_url = details
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|card| base::first_attr(&card, &IMG_SELECTOR, "src"))
        .and_then(|src| base::absolute_url(env.base_url, Some(src)));
    let film = FilmInfo {
        title,
        page_url: page_url.clone(),
        poster_url,
        ..FilmInfo::default()
    };
    let fallback_url = page_url.unwrap_or_else(|| env.base_url.to_string());

    let mut showings = Vec::new();
    for link in details.select(&TIME_LINK_SELECTOR) {
        let ticket_url = base::absolute_url(
            env.base_url,
            link.value().attr("href").map(str::to_string),
        )
        .unwrap_or_else(|| fallback_url.clone());
        for time in find_times(&base::inner_text(link)) {
            showings.push(Showing {
                film: film.clone(),
                date,
                time: ShowTime::At(time),
                purchase_url: ticket_url.clone(),
            });
        }
    }

    // Sold-out times are sometimes listed without a link.
    if showings.is_empty() {
        let times = base::show_times(&details, &TIME_TEXT_SELECTOR);
        if !times.is_empty() {
            showings = Showing::cross(&film, &[date], &times, &fallback_url);
        }
    }
    showings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use crate::scraping::tests::{static_context, StaticFetcher};
    use chrono::NaiveTime;
    use std::sync::Arc;

    const BASE: &str = "https://www.ifccenter.com/";

    const DAILY_FIXTURE: &str = r#"
        <div class="daily-schedule">
          <h3>Tue Feb 17</h3>
          <ul>
            <li>
              <a href="/films/perfect-days/"><img src="/wp-content/perfect-days.jpg"></a>
              <div class="details">
                <h3><a href="/films/perfect-days/">Perfect Days</a></h3>
                <ul class="times">
                  <li><a href="https://tickets.ifccenter.com/1">11:00 am</a></li>
                  <li><a href="https://tickets.ifccenter.com/2">9:35 pm</a></li>
                </ul>
              </div>
            </li>
          </ul>
        </div>
        <div class="daily-schedule">
          <h3>Wed Feb 18</h3>
          <ul>
            <li>
              <div class="details">
                <h3><a href="/films/tar/">Tár</a></h3>
                <ul class="times"><li><a href="https://tickets.ifccenter.com/3">7:00 pm</a></li></ul>
              </div>
            </li>
          </ul>
        </div>
    "#;

    const DATA_DATE_FIXTURE: &str = r#"
        <section data-date="2026-02-19">
          <div class="details">
            <h3>Paris, Texas</h3>
            <ul class="times"><li>1:15 pm</li><li>6:50 pm</li></ul>
          </div>
        </section>
    "#;

    const FLAT_FIXTURE: &str = r#"
        <h2>Friday, February 20</h2>
        <div class="details">
          <h3><a href="/films/today/">Today</a></h3>
          <ul class="times"><li><a href="/tix/9">4:10 pm</a></li></ul>
        </div>
    "#;

    fn env() -> ParseEnv<'static> {
        ParseEnv {
            today: date(2026, 2, 16),
            base_url: BASE,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(h: u32, m: u32) -> ShowTime {
        ShowTime::At(NaiveTime::from_hms_opt(h, m, 0).expect("valid time"))
    }

    #[test]
    fn daily_schedule_uses_per_time_ticket_links() {
        let document = Html::parse_document(DAILY_FIXTURE);
        let showings = daily_schedule(&document, &env());

        assert_eq!(showings.len(), 3);
        assert_eq!(showings[0].film.title, "Perfect Days");
        assert_eq!(showings[0].date, date(2026, 2, 17));
        assert_eq!(showings[0].time, at(11, 0));
        assert_eq!(showings[0].purchase_url, "https://tickets.ifccenter.com/1");
        assert_eq!(showings[1].purchase_url, "https://tickets.ifccenter.com/2");
        assert_eq!(
            showings[0].film.poster_url.as_deref(),
            Some("https://www.ifccenter.com/wp-content/perfect-days.jpg")
        );
        assert_eq!(showings[2].film.title, "Tár");
        assert_eq!(showings[2].date, date(2026, 2, 18));
    }

    #[test]
    fn data_date_blocks_fall_back_to_text_times() {
        let document = Html::parse_document(DATA_DATE_FIXTURE);
        assert!(daily_schedule(&document, &env()).is_empty());

        let showings = data_date_blocks(&document, &env());
        assert_eq!(showings.len(), 2);
        assert_eq!(showings[0].date, date(2026, 2, 19));
        assert_eq!(showings[1].time, at(18, 50));
        assert_eq!(showings[0].purchase_url, BASE);
    }

    #[test]
    fn flat_scan_ignores_titles_that_look_like_dates() {
        let document = Html::parse_document(FLAT_FIXTURE);
        let showings = flat_scan(&document, &env());

        assert_eq!(showings.len(), 1);
        assert_eq!(showings[0].film.title, "Today");
        assert_eq!(showings[0].date, date(2026, 2, 20));
        assert_eq!(showings[0].purchase_url, "https://www.ifccenter.com/tix/9");
    }

    #[tokio::test]
    async fn scrape_is_idempotent_over_unchanged_content() {
        let reporter = Arc::new(MemoryReporter::new());
        let ctx = static_context(
            StaticFetcher::default().page(BASE, 200, DAILY_FIXTURE),
            date(2026, 2, 16),
            reporter,
        );
        let adapter = IfcCenter::with_url(BASE);

        let first = adapter.scrape(&ctx).await.expect("first scrape");
        let second = adapter.scrape(&ctx).await.expect("second scrape");

        let ids = |events: &[Event]| events.iter().map(|e| e.id().to_string()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].all_times(), Some(&[at(11, 0), at(21, 35)][..]));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let ctx = static_context(
            StaticFetcher::default().page(BASE, 503, "busy"),
            date(2026, 2, 16),
            Arc::new(MemoryReporter::new()),
        );
        let err = IfcCenter::with_url(BASE)
            .scrape(&ctx)
            .await
            .expect_err("503 should fail");
        assert!(matches!(err, ScrapeError::Status { status: 503, .. }));
    }
}
