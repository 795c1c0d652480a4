use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, FilmInfo, Showing};
use super::strategy::{ParseEnv, Strategy};
use super::{ScrapeContext, SourceAdapter};
use crate::error::ScrapeError;
use crate::models::{Event, ShowTime, Theater};
use crate::normalize::parse_date;

const THEATER: Theater = Theater::FilmForum;

static TAB_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul li a[href^='#tabs-']").expect("film forum tab link selector"));
static TAB_PANEL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[id^='tabs-']").expect("film forum tab panel selector"));
static ITEM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("film forum item selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong").expect("film forum title selector"));
static TITLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong a").expect("film forum title link selector"));
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span").expect("film forum time selector"));
static FLAT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, h4, p").expect("film forum flat scan selector"));
static COPY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".copy p").expect("film forum copy selector"));
static META_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[name='description']").expect("film forum description selector")
});
static OG_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[property='og:description']").expect("film forum og description")
});
static OG_IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[property='og:image']").expect("film forum og image"));

static STRATEGIES: [Strategy<Listing>; 2] = [
    Strategy::new("weekly-tabs", weekly_tabs),
    Strategy::new("flat-scan", flat_scan),
];

/// One film on one schedule day, with the times listed for it.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Listing {
    film: FilmInfo,
    date: NaiveDate,
    times: Vec<ShowTime>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Detail {
    synopsis: Option<String>,
    poster_url: Option<String>,
}

pub struct FilmForum {
    url: String,
}

impl Default for FilmForum {
    fn default() -> Self {
        Self {
            url: THEATER.url().to_string(),
        }
    }
}

impl FilmForum {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SourceAdapter for FilmForum {
    fn theater(&self) -> Theater {
        THEATER
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError> {
        let html = base::fetch_html(ctx, &self.url).await?;
        let mut listings = base::extract_listings(ctx, THEATER, &STRATEGIES, &html, &self.url)?;

        let pages: Vec<String> = listings
            .iter()
            .filter_map(|listing| listing.film.page_url.clone())
            .collect();
        let details = base::fetch_details(ctx, THEATER, pages, parse_detail).await;
        attach_details(&mut listings, &details);

        let showings = listings
            .iter()
            .flat_map(|listing| {
                let purchase_url = listing.film.page_url.as_deref().unwrap_or(&self.url);
                Showing::cross(&listing.film, &[listing.date], &listing.times, purchase_url)
            })
            .collect();
        Ok(base::build_events(ctx, THEATER, showings))
    }
}

fn attach_details(listings: &mut [Listing], details: &HashMap<String, Detail>) {
    for listing in listings {
        let Some(detail) = listing
            .film
            .page_url
            .as_ref()
            .and_then(|url| details.get(url))
        else {
            continue;
        };
        if listing.film.synopsis.is_none() {
            listing.film.synopsis = detail.synopsis.clone();
        }
        if listing.film.poster_url.is_none() {
            listing.film.poster_url = detail.poster_url.clone();
        }
    }
}

/// Schedule split into `TUE 17` style tabs, each pointing at a panel.
fn weekly_tabs(document: &Html, env: &ParseEnv<'_>) -> Vec<Listing> {
    let mut tab_dates: HashMap<String, NaiveDate> = HashMap::new();
    for link in document.select(&TAB_LINK_SELECTOR) {
        let Some(panel_id) = link.value().attr("href").map(|href| href.trim_start_matches('#'))
        else {
            continue;
        };
        if let Some(date) = parse_date(&base::inner_text(link), env.today) {
            tab_dates.insert(panel_id.to_string(), date);
        }
    }

    let mut listings = Vec::new();
    for panel in document.select(&TAB_PANEL_SELECTOR) {
        let Some(date) = panel.value().id().and_then(|id| tab_dates.get(id)) else {
            continue;
        };
        for item in panel.select(&ITEM_SELECTOR) {
            if let Some(listing) = parse_item(item, *date, env) {
                listings.push(listing);
            }
        }
    }
    listings
}

/// Day headings followed by film paragraphs, read in document order.
fn flat_scan(document: &Html, env: &ParseEnv<'_>) -> Vec<Listing> {
    let mut listings = Vec::new();
    let mut current: Option<NaiveDate> = None;
    for node in document.select(&FLAT_SELECTOR) {
        if node.value().name() == "p" {
            if let Some(date) = current {
                listings.extend(parse_item(node, date, env));
            }
        } else if let Some(date) = parse_date(&base::inner_text(node), env.today) {
            current = Some(date);
        }
    }
    listings
}

fn parse_item(item: ElementRef<'_>, date: NaiveDate, env: &ParseEnv<'_>) -> Option<Listing> {
    let title = base::first_text(&item, &TITLE_SELECTOR)?;
    let times = base::show_times(&item, &TIME_SELECTOR);
    if times.is_empty() {
        return None;
    }
    let page_url = base::absolute_url(
        env.base_url,
        base::first_attr(&item, &TITLE_LINK_SELECTOR, "href"),
    );
    Some(Listing {
        film: FilmInfo {
            title,
            page_url,
            ..FilmInfo::default()
        },
        date,
        times,
    })
}

fn parse_detail(html: &str) -> Option<Detail> {
    let document = Html::parse_document(html);
    let synopsis = base::paragraph_text(&document, &COPY_SELECTOR, 40)
        .or_else(|| base::meta_content(&document, &META_DESCRIPTION_SELECTOR))
        .or_else(|| base::meta_content(&document, &OG_DESCRIPTION_SELECTOR));
    let poster_url = base::meta_content(&document, &OG_IMAGE_SELECTOR);
    if synopsis.is_none() && poster_url.is_none() {
        return None;
    }
    Some(Detail {
        synopsis,
        poster_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use crate::scraping::tests::{static_context, StaticFetcher};
    use chrono::NaiveTime;
    use std::sync::Arc;

    const BASE: &str = "https://filmforum.org/now_playing";

    const TABS_FIXTURE: &str = r##"
        <div id="tabs">
          <ul>
            <li><a href="#tabs-0">MON 16</a></li>
            <li><a href="#tabs-1">TUE 17</a></li>
          </ul>
          <div id="tabs-0">
            <p><strong><a href="/film/taxi-driver">TAXI DRIVER</a></strong><br>
               <span>12:15</span> <span>7:30</span></p>
            <p>Q&amp;A with the editor after the 7:30 show.</p>
          </div>
          <div id="tabs-1">
            <p><strong><a href="/film/stalker">STALKER</a></strong><br>
               <span>11:00</span> <span>3:40</span></p>
          </div>
        </div>
    "##;

    const FLAT_FIXTURE: &str = r#"
        <h3>Wednesday, February 18</h3>
        <p><strong><a href="/film/la-jetee">LA JETÉE</a></strong> <span>1:00</span></p>
        <h3>Thursday, February 19</h3>
        <p><strong>SANS SOLEIL</strong> <span>8:45</span></p>
    "#;

    const DETAIL_FIXTURE: &str = r#"
        <html><head>
          <meta property="og:image" content="https://filmforum.org/img/taxi.jpg">
        </head><body>
          <div class="copy">
            <p>Buy Tickets</p>
            <p>Martin Scorsese's nightmare vision of New York, with Robert De Niro as Travis Bickle.</p>
          </div>
        </body></html>
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
    fn weekly_tabs_resolve_weekday_day_labels_and_bare_times() {
        let document = Html::parse_document(TABS_FIXTURE);
        let listings = weekly_tabs(&document, &env());

        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].film.title, "TAXI DRIVER");
        assert_eq!(listings[0].date, date(2026, 2, 16));
        assert_eq!(listings[0].times, vec![at(12, 15), at(19, 30)]);
        assert_eq!(
            listings[0].film.page_url.as_deref(),
            Some("https://filmforum.org/film/taxi-driver")
        );
        assert_eq!(listings[1].date, date(2026, 2, 17));
        assert_eq!(listings[1].times, vec![at(11, 0), at(15, 40)]);
    }

    #[test]
    fn flat_scan_assigns_items_to_preceding_heading() {
        let document = Html::parse_document(FLAT_FIXTURE);
        assert!(weekly_tabs(&document, &env()).is_empty());

        let listings = flat_scan(&document, &env());
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].film.title, "LA JETÉE");
        assert_eq!(listings[0].date, date(2026, 2, 18));
        assert_eq!(listings[0].times, vec![at(13, 0)]);
        assert_eq!(listings[1].date, date(2026, 2, 19));
        assert_eq!(listings[1].film.page_url, None);
    }

    #[test]
    fn detail_page_skips_boilerplate_paragraphs() {
        let detail = parse_detail(DETAIL_FIXTURE).expect("detail parsed");
        assert!(detail
            .synopsis
            .as_deref()
            .is_some_and(|s| s.starts_with("Martin Scorsese's")));
        assert_eq!(
            detail.poster_url.as_deref(),
            Some("https://filmforum.org/img/taxi.jpg")
        );
        assert_eq!(parse_detail("<html><body><p>hi</p></body></html>"), None);
    }

    #[tokio::test]
    async fn scrape_merges_details_and_tolerates_missing_ones() {
        let fetcher = StaticFetcher::default()
            .page(BASE, 200, TABS_FIXTURE)
            .page("https://filmforum.org/film/taxi-driver", 200, DETAIL_FIXTURE);
        let reporter = Arc::new(MemoryReporter::new());
        let ctx = static_context(fetcher, date(2026, 2, 16), reporter.clone());

        let events = FilmForum::with_url(BASE)
            .scrape(&ctx)
            .await
            .expect("listing page parsed");

        assert_eq!(events.len(), 4);
        let taxi: Vec<&Event> = events.iter().filter(|e| e.film() == "TAXI DRIVER").collect();
        assert_eq!(taxi.len(), 2);
        assert!(taxi.iter().all(|e| e.synopsis().is_some()));
        assert_eq!(taxi[0].all_times(), Some(&[at(12, 15), at(19, 30)][..]));
        assert_eq!(taxi[0].purchase_url(), "https://filmforum.org/film/taxi-driver");

        // The Stalker detail page is not served; its showings still appear.
        let stalker: Vec<&Event> = events.iter().filter(|e| e.film() == "STALKER").collect();
        assert_eq!(stalker.len(), 2);
        assert!(stalker.iter().all(|e| e.synopsis().is_none()));
        assert_eq!(
            reporter
                .at_least(crate::report::Severity::Warn)
                .iter()
                .filter(|d| d.stage == "detail")
                .count(),
            1
        );
    }
}
