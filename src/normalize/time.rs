use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ShowTime;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(a\.?\s?m\.?|p\.?\s?m\.?|a|p)?")
        .expect("valid time regex")
});
static NOON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(noon|midnight)\b").expect("valid noon regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

/// Hour for a time printed without AM/PM.
///
/// Cinemas rarely start before 9 in the morning, so 9-11 stay morning while
/// 12 and 1-8 are afternoon or evening shows. 0 and 13-23 are read as 24-hour
/// values. A real 1-8 AM screening cannot be told apart from this text.
pub fn bare_hour_to_24(hour: u32) -> Option<u32> {
    match hour {
        0 => Some(0),
        1..=8 => Some(hour + 12),
        9..=12 => Some(hour),
        13..=23 => Some(hour),
        _ => None,
    }
}

fn meridiem_hour(hour: u32, meridiem: Meridiem) -> Option<u32> {
    match (hour, meridiem) {
        (1..=11, Meridiem::Am) => Some(hour),
        (12, Meridiem::Am) => Some(0),
        (1..=11, Meridiem::Pm) => Some(hour + 12),
        (12, Meridiem::Pm) => Some(12),
        _ => None,
    }
}

/// Every time of day mentioned in `text`, in order, without repeats.
///
/// A number only counts as a time when it has minutes (`7:30`) or a marker
/// (`7pm`), so day numbers and years in the same string are ignored.
pub fn find_times(text: &str) -> Vec<NaiveTime> {
    let mut found: Vec<(usize, NaiveTime)> = Vec::new();

    for caps in TIME_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(hour) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let minute = match caps.get(2) {
            Some(m) => match m.as_str().parse::<u32>() {
                Ok(value) => Some(value),
                Err(_) => continue,
            },
            None => None,
        };

        // "7:00 and" must not read the "a" of "and" as a marker.
        let followed_by_letter = text[whole.end()..]
            .chars()
            .next()
            .is_some_and(|ch| ch.is_alphabetic());
        let meridiem = caps
            .get(3)
            .filter(|_| !followed_by_letter)
            .map(|m| {
                if m.as_str().to_lowercase().starts_with('a') {
                    Meridiem::Am
                } else {
                    Meridiem::Pm
                }
            });

        if minute.is_none() && meridiem.is_none() {
            continue;
        }
        let minute = minute.unwrap_or(0);
        if minute > 59 {
            continue;
        }

        let hour = match meridiem {
            Some(meridiem) => meridiem_hour(hour, meridiem),
            None => bare_hour_to_24(hour),
        };
        if let Some(time) = hour.and_then(|h| NaiveTime::from_hms_opt(h, minute, 0)) {
            found.push((whole.start(), time));
        }
    }

    for caps in NOON_RE.captures_iter(text) {
        let Some(word) = caps.get(1) else { continue };
        let hour = if word.as_str().eq_ignore_ascii_case("noon") { 12 } else { 0 };
        if let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) {
            found.push((word.start(), time));
        }
    }

    found.sort_by_key(|(position, _)| *position);
    let mut times = Vec::with_capacity(found.len());
    for (_, time) in found {
        if !times.contains(&time) {
            times.push(time);
        }
    }
    times
}

/// First time of day in `text`.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    find_times(text).into_iter().next()
}

/// Canonical 12-hour display string, e.g. `"3:00 PM"`.
pub fn normalize_time(text: &str) -> Option<String> {
    parse_time(text).map(|time| ShowTime::At(time).to_string())
}

/// Minutes since midnight for a display string produced by this module, or
/// for the undisclosed sentinel (which sorts first).
pub fn display_minutes(display: &str) -> Option<u32> {
    if display == crate::models::UNDISCLOSED_TIME {
        return Some(0);
    }
    parse_time(display).map(|time| ShowTime::At(time).minutes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
    }

    #[test]
    fn parses_explicit_meridiem() {
        assert_eq!(parse_time("3:00pm"), Some(hm(15, 0)));
        assert_eq!(parse_time("Show: 7 PM"), Some(hm(19, 0)));
        assert_eq!(parse_time("11:45 a.m."), Some(hm(11, 45)));
        assert_eq!(parse_time("12:00am"), Some(hm(0, 0)));
        assert_eq!(parse_time("12:30pm"), Some(hm(12, 30)));
        assert_eq!(parse_time("9:15p"), Some(hm(21, 15)));
    }

    #[test]
    fn parses_twenty_four_hour_values() {
        assert_eq!(parse_time("13:15"), Some(hm(13, 15)));
        assert_eq!(parse_time("0:30"), Some(hm(0, 30)));
        assert_eq!(parse_time("24:10"), None);
        assert_eq!(parse_time("13:15pm"), None);
    }

    #[test]
    fn bare_times_follow_cinema_hours() {
        assert_eq!(parse_time("12:15"), Some(hm(12, 15)));
        assert_eq!(parse_time("9:30"), Some(hm(9, 30)));
        assert_eq!(parse_time("11:00"), Some(hm(11, 0)));
        assert_eq!(parse_time("1:00"), Some(hm(13, 0)));
        assert_eq!(parse_time("8:45"), Some(hm(20, 45)));
        assert_eq!(bare_hour_to_24(24), None);
        assert_eq!(bare_hour_to_24(99), None);
    }

    #[test]
    fn finds_every_time_in_a_block() {
        let times = find_times("12:30  2:45  5:00  7:30  9:45");
        assert_eq!(
            times,
            vec![hm(12, 30), hm(14, 45), hm(17, 0), hm(19, 30), hm(9, 45)]
        );
    }

    #[test]
    fn ignores_day_numbers_years_and_words() {
        assert!(find_times("Feb 19, 2026").is_empty());
        assert_eq!(find_times("Tue 17 at 7:00 and 9:30"), vec![hm(19, 0), hm(9, 30)]);
        assert_eq!(find_times("Matinee at noon"), vec![hm(12, 0)]);
    }

    #[test]
    fn normalizes_to_display_string() {
        assert_eq!(normalize_time("3:00pm").as_deref(), Some("3:00 PM"));
        assert_eq!(normalize_time("13:15").as_deref(), Some("1:15 PM"));
        assert_eq!(normalize_time("no time here"), None);
        assert_eq!(display_minutes("11:00 PM"), Some(23 * 60));
        assert_eq!(display_minutes("1:00 AM"), Some(60));
        assert_eq!(display_minutes(crate::models::UNDISCLOSED_TIME), Some(0));
    }
}
