use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Event, MatchedEvent, Preference, PreferenceKind};

/// A director credit (`dir. X`, `directed by X`, `Director: X`) up to the
/// next sentence, clause or line break.
static DIRECTOR_CREDIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:dir\.|directed\s+by\b|director\b:?)[^.,;()\n]*")
        .expect("valid director credit regex")
});

/// The preferences `event` satisfies, in the order given.
///
/// Plain case-insensitive substring tests: `film` looks at the title,
/// `director` at title and synopsis, `actor` at the synopsis with director
/// credits cut out. An event without a synopsis can only match on its title.
/// Blank values never match.
pub fn match_event(event: &Event, preferences: &[Preference]) -> Vec<Preference> {
    let title = event.film().to_lowercase();
    let synopsis = event.synopsis().map(str::to_lowercase);
    let cast_text = synopsis.as_deref().map(without_director_credits);

    preferences
        .iter()
        .filter(|preference| {
            let needle = preference.value.trim().to_lowercase();
            if needle.is_empty() {
                return false;
            }
            match preference.kind {
                PreferenceKind::Film => title.contains(&needle),
                PreferenceKind::Director => {
                    title.contains(&needle)
                        || synopsis.as_deref().is_some_and(|text| text.contains(&needle))
                }
                PreferenceKind::Actor => {
                    cast_text.as_deref().is_some_and(|text| text.contains(&needle))
                }
            }
        })
        .cloned()
        .collect()
}

fn without_director_credits(synopsis: &str) -> String {
    DIRECTOR_CREDIT_RE.replace_all(synopsis, " ").into_owned()
}

/// Every event that satisfied at least one preference, in feed order.
pub fn find_matches(events: &[Event], preferences: &[Preference]) -> Vec<MatchedEvent> {
    events
        .iter()
        .filter_map(|event| {
            let matched = match_event(event, preferences);
            (!matched.is_empty()).then(|| MatchedEvent {
                event: event.clone(),
                matched,
            })
        })
        .collect()
}
