//! Date and time text normalization shared by every adapter.
//!
//! Everything here is pure: the caller supplies "today", so the heuristics
//! can be exercised against any calendar position.

pub mod date;
pub mod time;

pub use date::{
    expand_range, horizon_end, infer_year, parse_closing_day, parse_date, parse_date_range,
    parse_date_spec, resolve_weekday, resolve_weekday_day, within_horizon, DateSpec, HORIZON_DAYS,
};
pub use time::{find_times, normalize_time, parse_time};
