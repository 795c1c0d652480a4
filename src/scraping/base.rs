use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html, Selector};

use super::strategy::{run_chain, ParseEnv, Strategy};
use super::ScrapeContext;
use crate::error::ScrapeError;
use crate::fetch::FetchRequest;
use crate::models::{Event, ShowTime, Theater};
use crate::normalize::{find_times, within_horizon};
use crate::report::{Diagnostic, Severity};

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .map(inner_text)
        .find(|text| !text.is_empty())
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .find_map(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn document_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(inner_text)
        .find(|text| !text.is_empty())
}

pub fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .find_map(|el| el.value().attr("content"))
        .map(clean_text)
        .filter(|value| !value.is_empty())
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Paragraphs under `selector` joined into one synopsis, skipping boilerplate
/// lines shorter than `min_len`.
pub fn paragraph_text(document: &Html, selector: &Selector, min_len: usize) -> Option<String> {
    let parts: Vec<String> = document
        .select(selector)
        .map(inner_text)
        .filter(|text| text.len() >= min_len)
        .filter(|text| !text.eq_ignore_ascii_case("buy tickets"))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Times found in the text of every node matched by `selector`.
pub fn show_times(element: &ElementRef<'_>, selector: &Selector) -> Vec<ShowTime> {
    let mut times = Vec::new();
    for node in element.select(selector) {
        for time in find_times(&inner_text(node)) {
            let time = ShowTime::At(time);
            if !times.contains(&time) {
                times.push(time);
            }
        }
    }
    times
}

pub fn parse_popularity(raw: Option<String>) -> Option<u8> {
    let value: f64 = raw?.trim().trim_end_matches('%').parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    // Clamped to 0..=100 before the cast.
    Some(value.round().min(100.0) as u8)
}

/// Film-level data an adapter collected before it knows the showings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilmInfo {
    pub title: String,
    pub page_url: Option<String>,
    pub poster_url: Option<String>,
    pub synopsis: Option<String>,
    pub popularity: Option<u8>,
}

/// One dated showing, not yet an [`Event`].
#[derive(Clone, Debug, PartialEq)]
pub struct Showing {
    pub film: FilmInfo,
    pub date: NaiveDate,
    pub time: ShowTime,
    pub purchase_url: String,
}

impl Showing {
    /// Every (date, time) pair. With no times, each date gets one showing with
    /// the undisclosed sentinel.
    pub fn cross(
        film: &FilmInfo,
        dates: &[NaiveDate],
        times: &[ShowTime],
        purchase_url: &str,
    ) -> Vec<Showing> {
        let times: &[ShowTime] = if times.is_empty() {
            &[ShowTime::Undisclosed]
        } else {
            times
        };
        dates
            .iter()
            .flat_map(|date| {
                times.iter().map(move |time| Showing {
                    film: film.clone(),
                    date: *date,
                    time: *time,
                    purchase_url: purchase_url.to_string(),
                })
            })
            .collect()
    }
}

/// Turns showings into events.
///
/// Dates outside the horizon are dropped, showings of the same film on the
/// same day share an `all_times` list, and repeated identifiers keep the
/// first occurrence.
pub fn build_events(
    ctx: &ScrapeContext,
    theater: Theater,
    showings: Vec<Showing>,
) -> Vec<Event> {
    let total = showings.len();
    let showings: Vec<Showing> = showings
        .into_iter()
        .filter(|showing| within_horizon(showing.date, ctx.today))
        .collect();
    if showings.len() < total {
        ctx.reporter.report(
            Diagnostic::new(
                Severity::Debug,
                "normalize",
                format!(
                    "dropped {} showings outside the {}-day horizon",
                    total - showings.len(),
                    crate::normalize::HORIZON_DAYS
                ),
            )
            .theater(theater),
        );
    }

    let mut grouped: HashMap<(String, NaiveDate), Vec<ShowTime>> = HashMap::new();
    for showing in &showings {
        let times = grouped
            .entry((showing.film.title.to_lowercase(), showing.date))
            .or_default();
        if !showing.time.is_undisclosed() && !times.contains(&showing.time) {
            times.push(showing.time);
        }
    }
    for times in grouped.values_mut() {
        times.sort_by_key(ShowTime::minutes);
    }

    let mut seen = HashSet::new();
    let mut events = Vec::with_capacity(showings.len());
    for showing in showings {
        let all_times = grouped
            .get(&(showing.film.title.to_lowercase(), showing.date))
            .filter(|times| times.len() > 1)
            .cloned();
        let event = Event::new(
            theater,
            showing.film.title,
            showing.date,
            showing.time,
            showing.purchase_url,
        )
        .with_poster(showing.film.poster_url)
        .with_synopsis(showing.film.synopsis)
        .with_all_times(all_times)
        .with_popularity(showing.film.popularity);

        if seen.insert(event.id().to_string()) {
            events.push(event);
        }
    }
    events
}

/// Parses `html` and runs the strategy chain over it, reporting which
/// strategy matched. No match at all is an error for the caller to absorb.
pub fn extract_listings<T>(
    ctx: &ScrapeContext,
    theater: Theater,
    strategies: &[Strategy<T>],
    html: &str,
    base_url: &str,
) -> Result<Vec<T>, ScrapeError> {
    let document = Html::parse_document(html);
    let env = ParseEnv {
        today: ctx.today,
        base_url,
    };
    match run_chain(strategies, &document, &env) {
        Some(outcome) => {
            ctx.reporter.report(
                Diagnostic::new(
                    Severity::Debug,
                    "extract",
                    format!(
                        "strategy {} matched {} listings",
                        outcome.strategy,
                        outcome.items.len()
                    ),
                )
                .theater(theater),
            );
            Ok(outcome.items)
        }
        None => Err(ScrapeError::NoListings {
            url: base_url.to_string(),
        }),
    }
}

/// GETs `url` and returns the body, treating non-2xx as an error.
pub async fn fetch_html(ctx: &ScrapeContext, url: &str) -> Result<String, ScrapeError> {
    let request = FetchRequest::get(url, ctx.request_timeout);
    let response = ctx.fetcher.get(&request).await?;
    if !response.is_success() {
        return Err(ScrapeError::Status {
            status: response.status,
            url: url.to_string(),
        });
    }
    Ok(response.body)
}

/// Fetches detail pages concurrently (bounded by the context) and parses
/// each one with `parse`. Failed or unparseable pages are reported and left
/// out of the map.
pub async fn fetch_details<T, F>(
    ctx: &ScrapeContext,
    theater: Theater,
    urls: Vec<String>,
    parse: F,
) -> HashMap<String, T>
where
    F: Fn(&str) -> Option<T>,
{
    let unique: Vec<String> = urls
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let bodies: Vec<(String, Result<String, ScrapeError>)> = stream::iter(unique)
        .map(|url| async move {
            let body = fetch_html(ctx, &url).await;
            (url, body)
        })
        .buffer_unordered(ctx.detail_concurrency.max(1))
        .collect()
        .await;

    let mut details = HashMap::new();
    for (url, body) in bodies {
        match body {
            Ok(body) => match parse(&body) {
                Some(detail) => {
                    details.insert(url, detail);
                }
                None => ctx.reporter.report(
                    Diagnostic::new(
                        Severity::Debug,
                        "detail",
                        format!("nothing recognised on detail page {url}"),
                    )
                    .theater(theater),
                ),
            },
            Err(err) => ctx.reporter.report(
                Diagnostic::new(
                    Severity::Warn,
                    "detail",
                    format!("detail page fetch failed for {url}"),
                )
                .theater(theater)
                .error(err),
            ),
        }
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use chrono::NaiveTime;
    use std::sync::Arc;

    fn at(h: u32, m: u32) -> ShowTime {
        ShowTime::At(NaiveTime::from_hms_opt(h, m, 0).expect("valid time"))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn film(title: &str) -> FilmInfo {
        FilmInfo {
            title: title.to_string(),
            ..FilmInfo::default()
        }
    }

    #[test]
    fn absolute_url_resolves_relative_links() {
        assert_eq!(
            absolute_url("https://filmforum.org/now_playing", Some("/film/taxi-driver".into()))
                .as_deref(),
            Some("https://filmforum.org/film/taxi-driver")
        );
        assert_eq!(absolute_url("https://filmforum.org/", Some("#tabs-0".into())), None);
        assert_eq!(absolute_url("https://filmforum.org/", None), None);
    }

    #[test]
    fn popularity_is_clamped() {
        assert_eq!(parse_popularity(Some("87".into())), Some(87));
        assert_eq!(parse_popularity(Some("140".into())), Some(100));
        assert_eq!(parse_popularity(Some("64.6%".into())), Some(65));
        assert_eq!(parse_popularity(Some("-3".into())), None);
        assert_eq!(parse_popularity(Some("hot".into())), None);
    }

    #[test]
    fn build_events_groups_times_and_clips_horizon() {
        let reporter = Arc::new(MemoryReporter::new());
        let ctx = ScrapeContext::for_tests(date(2026, 2, 16), reporter.clone());
        let taxi = film("Taxi Driver");
        let mut showings = Showing::cross(
            &taxi,
            &[date(2026, 2, 17), date(2026, 3, 20)],
            &[at(21, 0), at(13, 0)],
            "https://example.com/taxi",
        );
        // Same showing again, as a second listing on the page would produce.
        showings.push(showings[0].clone());

        let events = build_events(&ctx, Theater::FilmForum, showings);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.date() == date(2026, 2, 17)));
        assert_eq!(events[0].all_times(), Some(&[at(13, 0), at(21, 0)][..]));
        assert_eq!(reporter.records().len(), 1);
    }

    #[test]
    fn single_showing_has_no_all_times_and_undisclosed_is_not_listed() {
        let ctx = ScrapeContext::for_tests(date(2026, 2, 16), Arc::new(MemoryReporter::new()));
        let showings = Showing::cross(&film("Stalker"), &[date(2026, 2, 18)], &[], "https://x/");
        let events = build_events(&ctx, Theater::Metrograph, showings);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time(), ShowTime::Undisclosed);
        assert_eq!(events[0].all_times(), None);
    }
}
