use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ModelParseError;

/// Display value used when a source publishes a screening without a time.
pub const UNDISCLOSED_TIME: &str = "See website";

/// The venues this crate knows how to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theater {
    FilmForum,
    IfcCenter,
    Metrograph,
    Anthology,
    QuadCinema,
}

impl Theater {
    pub const ALL: [Theater; 5] = [
        Theater::FilmForum,
        Theater::IfcCenter,
        Theater::Metrograph,
        Theater::Anthology,
        Theater::QuadCinema,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Theater::FilmForum => "film-forum",
            Theater::IfcCenter => "ifc-center",
            Theater::Metrograph => "metrograph",
            Theater::Anthology => "anthology",
            Theater::QuadCinema => "quad-cinema",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Theater::FilmForum => "Film Forum",
            Theater::IfcCenter => "IFC Center",
            Theater::Metrograph => "Metrograph",
            Theater::Anthology => "Anthology Film Archives",
            Theater::QuadCinema => "Quad Cinema",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            Theater::FilmForum => "https://filmforum.org/now_playing",
            Theater::IfcCenter => "https://www.ifccenter.com/",
            Theater::Metrograph => "https://metrograph.com/nyc/",
            Theater::Anthology => "https://anthologyfilmarchives.org/film_screenings/calendar",
            Theater::QuadCinema => "https://quadcinema.com/all/",
        }
    }

    pub fn timezone(&self) -> Tz {
        chrono_tz::America::New_York
    }
}

impl fmt::Display for Theater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Theater {
    type Err = ModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Theater::ALL
            .into_iter()
            .find(|theater| theater.id() == wanted)
            .ok_or_else(|| ModelParseError::UnknownTheater(s.to_string()))
    }
}

/// When a screening starts, as far as the source tells us.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShowTime {
    At(NaiveTime),
    Undisclosed,
}

impl ShowTime {
    /// Minutes since midnight, used for ordering. Undisclosed times sort at
    /// the start of the day.
    pub fn minutes(&self) -> u32 {
        match self {
            ShowTime::At(time) => time.hour() * 60 + time.minute(),
            ShowTime::Undisclosed => 0,
        }
    }

    pub fn is_undisclosed(&self) -> bool {
        matches!(self, ShowTime::Undisclosed)
    }
}

impl fmt::Display for ShowTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShowTime::At(time) => write!(f, "{}", time.format("%-I:%M %p")),
            ShowTime::Undisclosed => f.write_str(UNDISCLOSED_TIME),
        }
    }
}

impl Serialize for ShowTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One screening of one film at one theater.
///
/// Built once by an adapter and never modified afterwards; the `with_*`
/// methods consume the value and return a new one.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    id: String,
    film: String,
    theater: Theater,
    theater_name: &'static str,
    date: NaiveDate,
    time: ShowTime,
    purchase_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    poster_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    synopsis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    all_times: Option<Vec<ShowTime>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    popularity: Option<u8>,
}

impl Event {
    pub fn new(
        theater: Theater,
        film: impl Into<String>,
        date: NaiveDate,
        time: ShowTime,
        purchase_url: impl Into<String>,
    ) -> Self {
        let film = film.into();
        Self {
            id: event_id(theater, &film, date, time),
            film,
            theater,
            theater_name: theater.name(),
            date,
            time,
            purchase_url: purchase_url.into(),
            poster_url: None,
            synopsis: None,
            all_times: None,
            popularity: None,
        }
    }

    pub fn with_poster(self, poster_url: Option<String>) -> Self {
        Self { poster_url, ..self }
    }

    pub fn with_synopsis(self, synopsis: Option<String>) -> Self {
        Self { synopsis, ..self }
    }

    pub fn with_all_times(self, all_times: Option<Vec<ShowTime>>) -> Self {
        Self { all_times, ..self }
    }

    pub fn with_popularity(self, popularity: Option<u8>) -> Self {
        Self {
            popularity: popularity.map(|value| value.min(100)),
            ..self
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn film(&self) -> &str {
        &self.film
    }

    pub fn theater(&self) -> Theater {
        self.theater
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> ShowTime {
        self.time
    }

    pub fn purchase_url(&self) -> &str {
        &self.purchase_url
    }

    pub fn poster_url(&self) -> Option<&str> {
        self.poster_url.as_deref()
    }

    pub fn synopsis(&self) -> Option<&str> {
        self.synopsis.as_deref()
    }

    pub fn all_times(&self) -> Option<&[ShowTime]> {
        self.all_times.as_deref()
    }

    pub fn popularity(&self) -> Option<u8> {
        self.popularity
    }
}

/// Stable identifier: theater, film, date and time, each lower-cased and
/// stripped to alphanumerics, joined with `-`.
pub fn event_id(theater: Theater, film: &str, date: NaiveDate, time: ShowTime) -> String {
    [
        id_component(theater.id()),
        id_component(film),
        date.format("%Y%m%d").to_string(),
        id_component(&time.to_string()),
    ]
    .join("-")
}

fn id_component(input: &str) -> String {
    input
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceKind {
    Film,
    Director,
    Actor,
}

/// A subscriber's interest, e.g. `director:scorsese`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Preference {
    pub kind: PreferenceKind,
    pub value: String,
}

impl Preference {
    pub fn new(kind: PreferenceKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl FromStr for Preference {
    type Err = ModelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| ModelParseError::Preference(s.to_string()))?;
        let kind = match kind.trim().to_lowercase().as_str() {
            "film" => PreferenceKind::Film,
            "director" => PreferenceKind::Director,
            "actor" => PreferenceKind::Actor,
            _ => return Err(ModelParseError::Preference(s.to_string())),
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(ModelParseError::Preference(s.to_string()));
        }
        Ok(Preference::new(kind, value))
    }
}

/// An event together with the preferences it satisfied in one matching run.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedEvent {
    pub event: Event,
    pub matched: Vec<Preference>,
}
