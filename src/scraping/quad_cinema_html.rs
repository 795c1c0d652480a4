use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::base::{self, FilmInfo, Showing};
use super::strategy::{run_chain, ParseEnv, Strategy};
use super::{ScrapeContext, SourceAdapter};
use crate::error::ScrapeError;
use crate::models::{Event, ShowTime, Theater};
use crate::normalize::{find_times, parse_date, parse_date_spec};
use crate::report::{Diagnostic, Severity};

const THEATER: Theater = Theater::QuadCinema;

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.film-card").expect("quad card selector"));
static CARD_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.film-link").expect("quad card link selector"));
static CARD_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h4").expect("quad card title selector"));
static CARD_DATES_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".film-dates").expect("quad card dates selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("quad image selector"));
static FILM_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*='/film/']").expect("quad film link selector"));

static DAY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.screening-dates > li").expect("quad day selector"));
static DAY_HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3").expect("quad day heading selector"));
static TIME_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.times a").expect("quad time link selector"));
static FLAT_DETAIL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, h4, a").expect("quad flat detail selector"));
static SYNOPSIS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".film-synopsis p").expect("quad synopsis selector"));
static CREDITS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".film-credits").expect("quad credits selector"));
static OG_DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[property='og:description']").expect("quad og description selector")
});

static INDEX_STRATEGIES: [Strategy<IndexFilm>; 2] = [
    Strategy::new("film-cards", film_cards),
    Strategy::new("film-links", film_links),
];

static SCHEDULE_STRATEGIES: [Strategy<Screening>; 2] = [
    Strategy::new("screening-dates", screening_dates),
    Strategy::new("flat-schedule", flat_schedule),
];

/// A film as the index page presents it; `run` may be empty.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct IndexFilm {
    film: FilmInfo,
    run: Vec<NaiveDate>,
}

/// One dated, timed screening from a film's own page.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Screening {
    date: NaiveDate,
    time: ShowTime,
    ticket_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct FilmPage {
    synopsis: Option<String>,
    schedule: Vec<Screening>,
}

pub struct QuadCinema {
    url: String,
}

impl Default for QuadCinema {
    fn default() -> Self {
        Self {
            url: THEATER.url().to_string(),
        }
    }
}

impl QuadCinema {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SourceAdapter for QuadCinema {
    fn theater(&self) -> Theater {
        THEATER
    }

    fn source_url(&self) -> &str {
        &self.url
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<Event>, ScrapeError> {
        let html = base::fetch_html(ctx, &self.url).await?;
        let films = base::extract_listings(ctx, THEATER, &INDEX_STRATEGIES, &html, &self.url)?;

        let env = ParseEnv {
            today: ctx.today,
            base_url: &self.url,
        };
        let pages: Vec<String> = films
            .iter()
            .filter_map(|entry| entry.film.page_url.clone())
            .collect();
        let details =
            base::fetch_details(ctx, THEATER, pages, move |body: &str| parse_film_page(body, &env))
                .await;

        let showings = films
            .into_iter()
            .flat_map(|entry| self.showings_for(ctx, entry, &details))
            .collect();
        Ok(base::build_events(ctx, THEATER, showings))
    }
}

impl QuadCinema {
    /// The film page schedule when there is one, otherwise the index run
    /// with undisclosed times. A film with neither is dropped.
    fn showings_for(
        &self,
        ctx: &ScrapeContext,
        entry: IndexFilm,
        details: &HashMap<String, FilmPage>,
    ) -> Vec<Showing> {
        let IndexFilm { mut film, run } = entry;
        let page = film.page_url.as_ref().and_then(|url| details.get(url));
        if let Some(page) = page {
            film.synopsis = page.synopsis.clone();
        }
        let fallback_url = film.page_url.clone().unwrap_or_else(|| self.url.clone());

        match page {
            Some(page) if !page.schedule.is_empty() => page
                .schedule
                .iter()
                .map(|screening| Showing {
                    film: film.clone(),
                    date: screening.date,
                    time: screening.time,
                    purchase_url: screening
                        .ticket_url
                        .clone()
                        .unwrap_or_else(|| fallback_url.clone()),
                })
                .collect(),
            _ if !run.is_empty() => {
                ctx.reporter.report(
                    Diagnostic::new(
                        Severity::Debug,
                        "detail",
                        format!("no schedule for {}; using the index run", film.title),
                    )
                    .theater(THEATER),
                );
                Showing::cross(&film, &run, &[], &fallback_url)
            }
            _ => {
                ctx.reporter.report(
                    Diagnostic::new(
                        Severity::Debug,
                        "detail",
                        format!("no dates at all for {}; skipped", film.title),
                    )
                    .theater(THEATER),
                );
                Vec::new()
            }
        }
    }
}

fn film_cards(document: &Html, env: &ParseEnv<'_>) -> Vec<IndexFilm> {
    let mut films = Vec::new();
    for card in document.select(&CARD_SELECTOR) {
        let Some(title) = base::first_text(&card, &CARD_TITLE_SELECTOR) else {
            continue;
        };
        let run = base::first_text(&card, &CARD_DATES_SELECTOR)
            .and_then(|text| parse_date_spec(&text, env.today))
            .map(|spec| spec.dates())
            .unwrap_or_default();
        films.push(IndexFilm {
            film: FilmInfo {
                title,
                page_url: base::absolute_url(
                    env.base_url,
                    base::first_attr(&card, &CARD_LINK_SELECTOR, "href"),
                ),
                poster_url: base::absolute_url(
                    env.base_url,
                    base::first_attr(&card, &IMG_SELECTOR, "src"),
                ),
                ..FilmInfo::default()
            },
            run,
        });
    }
    films
}

/// Every distinct link into `/film/`, titled by its text.
fn film_links(document: &Html, env: &ParseEnv<'_>) -> Vec<IndexFilm> {
    let mut seen = HashSet::new();
    let mut films = Vec::new();
    for link in document.select(&FILM_LINK_SELECTOR) {
        let title = base::inner_text(link);
        let Some(page_url) =
            base::absolute_url(env.base_url, link.value().attr("href").map(str::to_string))
        else {
            continue;
        };
        if title.is_empty() || !seen.insert(page_url.clone()) {
            continue;
        }
        films.push(IndexFilm {
            film: FilmInfo {
                title,
                page_url: Some(page_url),
                ..FilmInfo::default()
            },
            run: Vec::new(),
        });
    }
    films
}

fn parse_film_page(html: &str, env: &ParseEnv<'_>) -> Option<FilmPage> {
    let document = Html::parse_document(html);
    let schedule = run_chain(&SCHEDULE_STRATEGIES, &document, env)
        .map(|outcome| outcome.items)
        .unwrap_or_default();

    let synopsis = [
        base::paragraph_text(&document, &SYNOPSIS_SELECTOR, 20),
        base::document_text(&document, &CREDITS_SELECTOR),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();
    let synopsis = if synopsis.is_empty() {
        base::meta_content(&document, &OG_DESCRIPTION_SELECTOR)
    } else {
        Some(synopsis.join("\n\n"))
    };

    if synopsis.is_none() && schedule.is_empty() {
        return None;
    }
    Some(FilmPage { synopsis, schedule })
}

/// `ul.screening-dates > li`, each headed by `Tuesday, February 17`.
fn screening_dates(document: &Html, env: &ParseEnv<'_>) -> Vec<Screening> {
    let mut screenings = Vec::new();
    for day in document.select(&DAY_SELECTOR) {
        let Some(date) = base::first_text(&day, &DAY_HEADING_SELECTOR)
            .and_then(|text| parse_date(&text, env.today))
        else {
            continue;
        };
        for link in day.select(&TIME_LINK_SELECTOR) {
            screenings.extend(timed_link(link, date, env));
        }
    }
    screenings
}

/// Headings set the date; any link whose text is a time books that date.
fn flat_schedule(document: &Html, env: &ParseEnv<'_>) -> Vec<Screening> {
    let mut screenings = Vec::new();
    let mut current: Option<NaiveDate> = None;
    for node in document.select(&FLAT_DETAIL_SELECTOR) {
        if node.value().name() == "a" {
            if let Some(date) = current {
                screenings.extend(timed_link(node, date, env));
            }
        } else if let Some(date) = parse_date(&base::inner_text(node), env.today) {
            current = Some(date);
        }
    }
    screenings
}

fn timed_link(link: ElementRef<'_>, date: NaiveDate, env: &ParseEnv<'_>) -> Vec<Screening> {
    let ticket_url =
        base::absolute_url(env.base_url, link.value().attr("href").map(str::to_string));
    find_times(&base::inner_text(link))
        .into_iter()
        .map(|time| Screening {
            date,
            time: ShowTime::At(time),
            ticket_url: ticket_url.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use crate::scraping::tests::{static_context, StaticFetcher};
    use chrono::NaiveTime;
    use std::sync::Arc;

    const BASE: &str = "https://quadcinema.com/all/";

    const INDEX_FIXTURE: &str = r#"
        <ul class="films">
          <li class="film-card">
            <a class="film-link" href="/film/the-conversation/">
              <img src="/posters/conversation.jpg"><h4>The Conversation</h4></a>
            <span class="film-dates">Feb 16 - Feb 26</span>
          </li>
          <li class="film-card">
            <a class="film-link" href="/film/mikey-and-nicky/"><h4>Mikey and Nicky</h4></a>
            <span class="film-dates">Feb 17 - Feb 18</span>
          </li>
          <li class="film-card">
            <a class="film-link" href="/film/secret-screening/"><h4>Secret Screening</h4></a>
          </li>
        </ul>
    "#;

    const DETAIL_FIXTURE: &str = r#"
        <html><body>
          <h1>The Conversation</h1>
          <div class="film-synopsis"><p>A surveillance expert becomes obsessed with a recording.</p></div>
          <div class="film-credits">Directed by Francis Ford Coppola. Starring Gene Hackman.</div>
          <ul class="screening-dates">
            <li><h3>Tuesday, February 17</h3>
              <ul class="times"><li><a href="/tickets/101">2:10 PM</a></li><li><a href="/tickets/102">9:00 PM</a></li></ul></li>
            <li><h3>Wednesday, February 18</h3>
              <ul class="times"><li><a href="/tickets/103">4:30 PM</a></li></ul></li>
          </ul>
        </body></html>
    "#;

    const FLAT_DETAIL_FIXTURE: &str = r#"
        <h2>Thu Feb 19</h2>
        <a href="/tickets/7">7:00pm</a>
        <a href="/about">About us</a>
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
    fn index_cards_carry_clipped_runs() {
        let document = Html::parse_document(INDEX_FIXTURE);
        let films = film_cards(&document, &env());

        assert_eq!(films.len(), 3);
        assert_eq!(films[0].run.len(), 11);
        assert_eq!(
            films[0].film.page_url.as_deref(),
            Some("https://quadcinema.com/film/the-conversation/")
        );
        assert_eq!(films[1].run, vec![date(2026, 2, 17), date(2026, 2, 18)]);
        assert!(films[2].run.is_empty());
    }

    #[test]
    fn film_links_dedupe_by_url() {
        let document = Html::parse_document(
            r#"<a href="/film/x/">X</a><a href="/film/x/">X</a><a href="/film/y/"></a>"#,
        );
        let films = film_links(&document, &env());
        assert_eq!(films.len(), 1);
        assert_eq!(films[0].film.title, "X");
    }

    #[test]
    fn film_page_schedule_and_synopsis() {
        let page = parse_film_page(DETAIL_FIXTURE, &env()).expect("page parsed");
        assert_eq!(page.schedule.len(), 3);
        assert_eq!(page.schedule[0].date, date(2026, 2, 17));
        assert_eq!(page.schedule[0].time, at(14, 10));
        assert_eq!(
            page.schedule[0].ticket_url.as_deref(),
            Some("https://quadcinema.com/tickets/101")
        );
        let synopsis = page.synopsis.expect("synopsis");
        assert!(synopsis.contains("surveillance"));
        assert!(synopsis.contains("Coppola"));
    }

    #[test]
    fn flat_schedule_reads_time_links_after_headings() {
        let page = parse_film_page(FLAT_DETAIL_FIXTURE, &env()).expect("page parsed");
        assert_eq!(page.schedule.len(), 1);
        assert_eq!(page.schedule[0].date, date(2026, 2, 19));
        assert_eq!(page.schedule[0].time, at(19, 0));
    }

    #[tokio::test]
    async fn failed_detail_pages_fall_back_to_index_runs() {
        let fetcher = StaticFetcher::default()
            .page(BASE, 200, INDEX_FIXTURE)
            .page("https://quadcinema.com/film/the-conversation/", 200, DETAIL_FIXTURE)
            .page("https://quadcinema.com/film/mikey-and-nicky/", 404, "gone");
        let reporter = Arc::new(MemoryReporter::new());
        let ctx = static_context(fetcher, date(2026, 2, 16), reporter.clone());

        let events = QuadCinema::with_url(BASE)
            .scrape(&ctx)
            .await
            .expect("index parsed");

        let conversation: Vec<&Event> = events
            .iter()
            .filter(|e| e.film() == "The Conversation")
            .collect();
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[0].purchase_url(), "https://quadcinema.com/tickets/101");
        assert!(conversation[0].synopsis().is_some_and(|s| s.contains("Hackman")));

        let mikey: Vec<&Event> = events
            .iter()
            .filter(|e| e.film() == "Mikey and Nicky")
            .collect();
        assert_eq!(mikey.len(), 2);
        assert!(mikey.iter().all(|e| e.time() == ShowTime::Undisclosed));

        assert!(events.iter().all(|e| e.film() != "Secret Screening"));
        assert_eq!(reporter.at_least(Severity::Warn).len(), 2);
    }
}
