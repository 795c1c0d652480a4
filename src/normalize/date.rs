use chrono::{Datelike, Duration, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

/// Number of calendar days, starting today, that the feed covers.
pub const HORIZON_DAYS: i64 = 14;

/// How far in the past a year-less date may fall before it is read as next
/// year's date instead.
const YEAR_LOOKBACK_DAYS: i64 = 30;

const MONTH_PATTERN: &str =
    r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const WEEKDAY_PATTERN: &str =
    r"mon(?:day)?|tue(?:s(?:day)?)?|wed(?:nesday)?|thu(?:r(?:s(?:day)?)?)?|fri(?:day)?|sat(?:urday)?|sun(?:day)?";

static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid iso date regex"));
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("valid numeric date regex")
});
static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTH_PATTERN})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}}))?"
    ))
    .expect("valid month-day regex")
});
static DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTH_PATTERN})\b\.?(?:,?\s+(\d{{4}}))?"
    ))
    .expect("valid day-month regex")
});
static WEEKDAY_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({WEEKDAY_PATTERN})\b\.?,?\s*(\d{{1,2}})?(?:st|nd|rd|th)?\b"
    ))
    .expect("valid weekday regex")
});
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTH_PATTERN})\.?\s+(\d{{1,2}})(?:,?\s*(\d{{4}}))?\s*(?:-|–|—|to|through|thru)\s*(?:({MONTH_PATTERN})\.?\s+)?(\d{{1,2}})\b(?:,?\s*(\d{{4}}))?"
    ))
    .expect("valid range regex")
});
/// Text right after a range's end day that makes the number an hour instead.
static TIME_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?::\d|\.\d{2}|\s*[ap]\.?m\b)").expect("valid time suffix regex"));
static OPEN_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:through|thru|until|till|now\s*(?:-|–|—))\s*").expect("valid open range regex")
});
static CLOSING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:must\s+end|ends?|closes?|last\s+day)\s+(?:this\s+|on\s+)?({WEEKDAY_PATTERN})\b"
    ))
    .expect("valid closing phrase regex")
});

/// What a piece of date text resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DateSpec {
    Single(NaiveDate),
    /// Inclusive, already clipped to the horizon. May be empty when the
    /// range lies entirely outside it.
    Range(Vec<NaiveDate>),
}

impl DateSpec {
    pub fn dates(&self) -> Vec<NaiveDate> {
        match self {
            DateSpec::Single(date) => vec![*date],
            DateSpec::Range(dates) => dates.clone(),
        }
    }
}

/// Last day inside the horizon.
pub fn horizon_end(today: NaiveDate) -> NaiveDate {
    today + Duration::days(HORIZON_DAYS - 1)
}

pub fn within_horizon(date: NaiveDate, today: NaiveDate) -> bool {
    date >= today && date <= horizon_end(today)
}

pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().trim_end_matches('.').to_lowercase();
    let prefix: String = lower.chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    let lower = name.trim().trim_end_matches('.').to_lowercase();
    let prefix: String = lower.chars().take(3).collect();
    let weekday = match prefix.as_str() {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

/// Picks the year for a month/day printed without one.
///
/// The current year is assumed unless that date is more than 30 days in the
/// past, in which case it belongs to next year. The previous year wins when
/// its date is still within those 30 days, so "Dec 15" read on Jan 10 is last
/// December.
pub fn infer_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let earliest = today - Duration::days(YEAR_LOOKBACK_DAYS);
    [today.year() - 1, today.year(), today.year() + 1]
        .into_iter()
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .find(|candidate| *candidate >= earliest)
}

/// Resolves a weekday tab that also carries a day-of-month ("Tue 17").
///
/// Looks from six days back to seven days ahead for a date matching both.
/// When nothing matches, falls back to [`resolve_weekday`].
pub fn resolve_weekday_day(weekday: Weekday, day: u32, today: NaiveDate) -> NaiveDate {
    (-6..=7)
        .map(|offset| today + Duration::days(offset))
        .find(|candidate| candidate.weekday() == weekday && candidate.day() == day)
        .unwrap_or_else(|| resolve_weekday(weekday, today))
}

/// The occurrence of `weekday` in "this week": up to three days back, or
/// ahead otherwise. Days further than three in the past roll to next week.
pub fn resolve_weekday(weekday: Weekday, today: NaiveDate) -> NaiveDate {
    let mut delta = i64::from(weekday.num_days_from_monday())
        - i64::from(today.weekday().num_days_from_monday());
    if delta < -3 {
        delta += 7;
    }
    today + Duration::days(delta)
}

/// The next `weekday`, counting today.
pub fn next_weekday(weekday: Weekday, today: NaiveDate) -> NaiveDate {
    let ahead = (i64::from(weekday.num_days_from_monday())
        - i64::from(today.weekday().num_days_from_monday()))
    .rem_euclid(7);
    today + Duration::days(ahead)
}

/// Every day from `start` to `end` inclusive, never before today and never
/// past the horizon.
pub fn expand_range(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let first = start.max(today);
    let last = end.min(horizon_end(today));
    let mut dates = Vec::new();
    let mut current = first;
    while current <= last {
        dates.push(current);
        current += Duration::days(1);
    }
    dates
}

fn year_from(text: Option<&str>) -> Option<i32> {
    let raw = text?;
    let year: i32 = raw.parse().ok()?;
    if raw.len() == 2 {
        Some(2000 + year)
    } else {
        Some(year)
    }
}

fn month_day(month: u32, day: u32, year: Option<i32>, today: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => infer_year(month, day, today),
    }
}

/// A single calendar date from free text.
///
/// Understands ISO dates, `2/17[/2026]`, `Feb 17[, 2026]`, `17 February`,
/// `Tue Feb 17`, weekday tabs such as `Tue 17` or `Tuesday`, and the words
/// `today` and `tomorrow`.
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_RE.captures(text) {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = MONTH_DAY_RE.captures(text) {
        let month = month_from_name(caps.get(1)?.as_str())?;
        let day = caps.get(2)?.as_str().parse().ok()?;
        let year = year_from(caps.get(3).map(|m| m.as_str()));
        return month_day(month, day, year, today);
    }

    if let Some(caps) = DAY_MONTH_RE.captures(text) {
        let day = caps.get(1)?.as_str().parse().ok()?;
        let month = month_from_name(caps.get(2)?.as_str())?;
        let year = year_from(caps.get(3).map(|m| m.as_str()));
        return month_day(month, day, year, today);
    }

    if let Some(caps) = NUMERIC_RE.captures(text) {
        let month = caps.get(1)?.as_str().parse().ok()?;
        let day = caps.get(2)?.as_str().parse().ok()?;
        let year = year_from(caps.get(3).map(|m| m.as_str()));
        return month_day(month, day, year, today);
    }

    let lower = text.to_lowercase();
    if lower.contains("tomorrow") {
        return Some(today + Duration::days(1));
    }
    if lower.contains("today") || lower.contains("tonight") {
        return Some(today);
    }

    let caps = WEEKDAY_DAY_RE.captures(text)?;
    let weekday = weekday_from_name(caps.get(1)?.as_str())?;
    match caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) {
        Some(day) if (1..=31).contains(&day) => Some(resolve_weekday_day(weekday, day, today)),
        _ => Some(resolve_weekday(weekday, today)),
    }
}

/// A date range such as `Feb 6—Feb 19, 2026`, `Feb 27 - Mar 5` or
/// `Feb 6 – 19`, expanded day by day and clipped to the horizon.
///
/// A bare end day is rejected when it is really an hour (`Feb 20 - 7:30 PM`)
/// or falls before the start day in the same month (`Feb 20 – 7`).
pub fn parse_date_range(text: &str, today: NaiveDate) -> Option<Vec<NaiveDate>> {
    RANGE_RE
        .captures_iter(text)
        .find_map(|caps| range_from_captures(&caps, text, today))
}

fn range_from_captures(
    caps: &regex::Captures<'_>,
    text: &str,
    today: NaiveDate,
) -> Option<Vec<NaiveDate>> {
    let end_day_match = caps.get(5)?;
    if TIME_SUFFIX_RE.is_match(&text[end_day_match.end()..]) {
        return None;
    }
    let start_month = month_from_name(caps.get(1)?.as_str())?;
    let start_day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let start_year = year_from(caps.get(3).map(|m| m.as_str()));
    let end_month = match caps.get(4) {
        Some(m) => month_from_name(m.as_str())?,
        None => start_month,
    };
    let end_day: u32 = end_day_match.as_str().parse().ok()?;
    let end_year = year_from(caps.get(6).map(|m| m.as_str()));

    let (start, end) = match (start_year, end_year) {
        (Some(sy), Some(ey)) => (
            NaiveDate::from_ymd_opt(sy, start_month, start_day)?,
            NaiveDate::from_ymd_opt(ey, end_month, end_day)?,
        ),
        (start_year, Some(ey)) => {
            let sy = start_year.unwrap_or(if start_month > end_month { ey - 1 } else { ey });
            (
                NaiveDate::from_ymd_opt(sy, start_month, start_day)?,
                NaiveDate::from_ymd_opt(ey, end_month, end_day)?,
            )
        }
        (start_year, None) => {
            let start = month_day(start_month, start_day, start_year, today)?;
            let mut end = NaiveDate::from_ymd_opt(start.year(), end_month, end_day)?;
            if end < start {
                // Only an explicit end month can carry the run into next year.
                if caps.get(4).is_none() {
                    return None;
                }
                end = NaiveDate::from_ymd_opt(start.year() + 1, end_month, end_day)?;
            }
            (start, end)
        }
    };

    if end < start {
        return None;
    }
    Some(expand_range(start, end, today))
}

/// `Through Feb 19`, `until March 2`, `Now – Feb 19`: runs from today.
pub fn parse_open_range(text: &str, today: NaiveDate) -> Option<Vec<NaiveDate>> {
    let found = OPEN_END_RE.find(text)?;
    let end = parse_date(&text[found.end()..], today)?;
    if end < today {
        return None;
    }
    Some(expand_range(today, end, today))
}

/// Closing phrases like `MUST END THURSDAY` or `ends Friday`: the run covers
/// today through the next occurrence of that weekday (today included).
pub fn parse_closing_day(text: &str, today: NaiveDate) -> Option<Vec<NaiveDate>> {
    let caps = CLOSING_RE.captures(text)?;
    let weekday = weekday_from_name(caps.get(1)?.as_str())?;
    let last = next_weekday(weekday, today);
    Some(expand_range(today, last, today))
}

/// Resolves any supported date text: closing phrases first, then ranges,
/// then single dates.
pub fn parse_date_spec(text: &str, today: NaiveDate) -> Option<DateSpec> {
    if let Some(dates) = parse_closing_day(text, today) {
        return Some(DateSpec::Range(dates));
    }
    if let Some(dates) = parse_date_range(text, today) {
        return Some(DateSpec::Range(dates));
    }
    if let Some(dates) = parse_open_range(text, today) {
        return Some(DateSpec::Range(dates));
    }
    parse_date(text, today).map(DateSpec::Single)
}
