use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, FilmInfo, Showing};
use super::strategy::{ParseEnv, Strategy};
use super::{ScrapeContext, SourceAdapter};
use crate::error::ScrapeError;
use crate::models::{Event, ShowTime, Theater};
use crate::normalize::{parse_date_spec, DateSpec};

const THEATER: Theater = Theater::Metrograph;

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".homepage-in-theater-movie").expect("metrograph card selector")
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.movie-title").expect("metrograph title selector"));
static TITLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.movie-title a").expect("metrograph title link selector"));
static RUN_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".film-run").expect("metrograph run selector"));
static METADATA_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".film-metadata").expect("metrograph metadata selector"));
static DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".film-description").expect("metrograph description selector"));
static SHOWTIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".showtimes a").expect("metrograph showtime selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("metrograph image selector"));

static ARTICLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article.film").expect("metrograph article selector"));
static ARTICLE_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3").expect("metrograph article title selector"));
static ARTICLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("metrograph article link selector"));
static ARTICLE_TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("metrograph article time selector"));
static ARTICLE_DATES_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".dates, .date").expect("metrograph article dates selector"));
static ARTICLE_TIMES_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".times").expect("metrograph article times selector"));
static ARTICLE_SUMMARY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("metrograph article summary selector"));

static STRATEGIES: [Strategy<Listing>; 2] = [
    Strategy::new("in-theater-cards", in_theater_cards),
    Strategy::new("article-cards", article_cards),
];

/// A film with the run it was advertised for.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Listing {
    film: FilmInfo,
    dates: DateSpec,
    times: Vec<ShowTime>,
}

impl Listing {
    /// Times only make sense against a single date; a run range is published
    /// without them.
    fn into_showings(self, fallback_url: &str) -> Vec<Showing> {
        let purchase_url = self
            .film
            .page_url
            .clone()
            .unwrap_or_else(|| fallback_url.to_string());
        match &self.dates {
            DateSpec::Single(date) => Showing::cross(&self.film, &[*date], &self.times, &purchase_url),
            DateSpec::Range(dates) => Showing::cross(&self.film, dates, &[], &purchase_url),
        }
    }
}

pub struct Metrograph {
    url: String,
}

impl Default for Metrograph {
    fn default() -> Self {
        Self {
            url: THEATER.url().to_string(),
        }
    }
}

impl Metrograph {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SourceAdapter for Metrograph {
    fn theater(&self) -> Theater {
        THEATER
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError> {
        let html = base::fetch_html(ctx, &self.url).await?;
        let listings = base::extract_listings(ctx, THEATER, &STRATEGIES, &html, &self.url)?;
        let showings = listings
            .into_iter()
            .flat_map(|listing| listing.into_showings(&self.url))
            .collect();
        Ok(base::build_events(ctx, THEATER, showings))
    }
}

fn in_theater_cards(document: &Html, env: &ParseEnv<'_>) -> Vec<Listing> {
    document
        .select(&CARD_SELECTOR)
        .filter_map(|card| parse_card(card, env))
        .collect()
}

fn parse_card(card: ElementRef<'_>, env: &ParseEnv<'_>) -> Option<Listing> {
    let title = base::first_text(&card, &TITLE_SELECTOR)?;
    let dates = base::first_text(&card, &RUN_SELECTOR)
        .and_then(|run| parse_date_spec(&run, env.today))?;

    let synopsis = [
        base::first_text(&card, &METADATA_SELECTOR),
        base::first_text(&card, &DESCRIPTION_SELECTOR),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    Some(Listing {
        film: FilmInfo {
            title,
            page_url: base::absolute_url(
                env.base_url,
                base::first_attr(&card, &TITLE_LINK_SELECTOR, "href"),
            ),
            poster_url: poster(&card, env),
            synopsis: (!synopsis.is_empty()).then(|| synopsis.join("\n\n")),
            popularity: base::parse_popularity(
                card.value().attr("data-popularity").map(str::to_string),
            ),
        },
        dates,
        times: base::show_times(&card, &SHOWTIME_SELECTOR),
    })
}

fn poster(card: &ElementRef<'_>, env: &ParseEnv<'_>) -> Option<String> {
    let src = base::first_attr(card, &IMG_SELECTOR, "data-src")
        .or_else(|| base::first_attr(card, &IMG_SELECTOR, "src"));
    base::absolute_url(env.base_url, src)
}

/// Older generic markup: one `article.film` per title.
fn article_cards(document: &Html, env: &ParseEnv<'_>) -> Vec<Listing> {
    let mut listings = Vec::new();
    for article in document.select(&ARTICLE_SELECTOR) {
        let Some(title) = base::first_text(&article, &ARTICLE_TITLE_SELECTOR) else {
            continue;
        };
        let date_text = base::first_attr(&article, &ARTICLE_TIME_SELECTOR, "datetime")
            .or_else(|| base::first_text(&article, &ARTICLE_DATES_SELECTOR));
        let Some(dates) = date_text.and_then(|text| parse_date_spec(&text, env.today)) else {
            continue;
        };
        listings.push(Listing {
            film: FilmInfo {
                title,
                page_url: base::absolute_url(
                    env.base_url,
                    base::first_attr(&article, &ARTICLE_LINK_SELECTOR, "href"),
                ),
                poster_url: poster(&article, env),
                synopsis: base::first_text(&article, &ARTICLE_SUMMARY_SELECTOR),
                popularity: None,
            },
            dates,
            times: base::show_times(&article, &ARTICLE_TIMES_SELECTOR),
        });
    }
    listings
}
