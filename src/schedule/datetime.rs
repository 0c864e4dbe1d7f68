//! PU date-time resolution.
//!
//! A line is read as `<date and clock> <TZ>`. The trailing abbreviation is
//! looked up first; the rest is tried against each [`Grammar`] in order and
//! the first match wins.
//!
//! Accepted shapes (weekday always optional and never checked):
//!
//! - `Thu, 5 Sep, 15:40 PDT`
//! - `Sep 5, 15:40 PDT`
//! - `5 Sep 15:40 PDT`
//! - `02:30 PM, 09-26-25, CDT`
//! - `Fri Sep 26 02:30 CDT`

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use thiserror::Error;

use super::tz::TimezoneTable;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no timezone abbreviation at the end of the line")]
    MissingTimezone,

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("date and time not recognised")]
    NoGrammar,

    #[error("no such calendar date")]
    CalendarOverflow,

    #[error("invalid clock time")]
    InvalidClock,

    #[error("that local time does not exist in {0}")]
    NonexistentLocalTime(String),
}

impl ResolveError {
    /// The line had a recognised shape but named an impossible moment.
    pub fn shape_matched(&self) -> bool {
        matches!(
            self,
            ResolveError::CalendarOverflow
                | ResolveError::InvalidClock
                | ResolveError::NonexistentLocalTime(_)
        )
    }
}

/// Supported date-time layouts, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `[Weekday,] Day Month, HH:MM`
    DayMonthComma,
    /// `[Weekday,] Month Day, HH:MM`
    MonthDayComma,
    /// `[Weekday,] Day Month HH:MM`
    DayMonthBare,
    /// `HH:MM AM|PM, MM-DD-YY`
    Clock12Numeric,
    /// `[Weekday] Month Day HH:MM`
    MonthDayBare,
}

pub const GRAMMARS: [Grammar; 5] = [
    Grammar::DayMonthComma,
    Grammar::MonthDayComma,
    Grammar::DayMonthBare,
    Grammar::Clock12Numeric,
    Grammar::MonthDayBare,
];

const WEEKDAY: &str = r"(?:(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+)?";
const DAY: &str = r"(?P<day>\d{1,2})(?:st|nd|rd|th)?";
const MONTH: &str = r"(?P<mon>[a-z]{3,9})\.?";
const YEAR: &str = r"(?:,?\s+(?P<year>\d{4}))?";
const CLOCK24: &str = r"(?P<hour>\d{1,2}):(?P<minute>\d{2})";

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// Calendar fields pulled out of a line, before zone and year are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParts {
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

fn compile(pattern: String) -> Regex {
    Regex::new(&format!("(?i)^{}$", pattern)).expect("date grammar is valid")
}

impl Grammar {
    fn regex(&self) -> &'static Regex {
        static DAY_MONTH_COMMA: OnceLock<Regex> = OnceLock::new();
        static MONTH_DAY_COMMA: OnceLock<Regex> = OnceLock::new();
        static DAY_MONTH_BARE: OnceLock<Regex> = OnceLock::new();
        static CLOCK12_NUMERIC: OnceLock<Regex> = OnceLock::new();
        static MONTH_DAY_BARE: OnceLock<Regex> = OnceLock::new();

        match self {
            Grammar::DayMonthComma => DAY_MONTH_COMMA.get_or_init(|| {
                compile(format!(r"{WEEKDAY}{DAY}\s+{MONTH}{YEAR}\s*,\s*{CLOCK24}"))
            }),
            Grammar::MonthDayComma => MONTH_DAY_COMMA.get_or_init(|| {
                compile(format!(r"{WEEKDAY}{MONTH}\s+{DAY}{YEAR}\s*,\s*{CLOCK24}"))
            }),
            Grammar::DayMonthBare => DAY_MONTH_BARE.get_or_init(|| {
                compile(format!(r"{WEEKDAY}{DAY}\s+{MONTH}{YEAR}\s+{CLOCK24}"))
            }),
            Grammar::Clock12Numeric => CLOCK12_NUMERIC.get_or_init(|| {
                compile(
                    r"(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<meridiem>[ap])\.?m\.?\s*,\s*(?P<month>\d{1,2})-(?P<day>\d{1,2})-(?P<year>\d{4}|\d{2})"
                        .to_string(),
                )
            }),
            Grammar::MonthDayBare => MONTH_DAY_BARE.get_or_init(|| {
                compile(format!(r"{WEEKDAY}{MONTH}\s+{DAY}{YEAR}\s+{CLOCK24}"))
            }),
        }
    }

    /// `None` when the layout does not fit; `Some(Err)` when it fits but the
    /// clock is impossible.
    pub fn parse(&self, body: &str) -> Option<Result<DateParts, ResolveError>> {
        let caps = self.regex().captures(body)?;
        match self {
            Grammar::Clock12Numeric => Some(parts_12h(&caps)),
            _ => {
                let month = month_number(caps.name("mon")?.as_str())?;
                Some(Ok(DateParts {
                    year: number(&caps, "year").map(|y| y as i32),
                    month,
                    day: number(&caps, "day")?,
                    hour: number(&caps, "hour")?,
                    minute: number(&caps, "minute")?,
                }))
            }
        }
    }
}

fn number(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name)?.as_str().parse().ok()
}

fn parts_12h(caps: &Captures<'_>) -> Result<DateParts, ResolveError> {
    let field = |name: &str| number(caps, name).ok_or(ResolveError::NoGrammar);

    let hour = field("hour")?;
    if !(1..=12).contains(&hour) {
        return Err(ResolveError::InvalidClock);
    }
    let pm = caps
        .name("meridiem")
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("p"));
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };

    let year = field("year")?;
    let year = if year < 100 { year + 2000 } else { year };

    Ok(DateParts {
        year: Some(year as i32),
        month: field("month")?,
        day: field("day")?,
        hour,
        minute: field("minute")?,
    })
}

/// `Sep`, `sept` and `September` all give 9.
fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|full| full.starts_with(&name))
        .map(|i| i as u32 + 1)
}

fn tz_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^A-Za-z])([A-Za-z]{2,4})\s*$").expect("tz token regex is valid"))
}

fn pu_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*PU\s*[:\-]\s*").expect("PU prefix regex is valid"))
}

/// Split a `PU:` label off a line. Returns whether it was present.
pub fn strip_pu_prefix(line: &str) -> (bool, &str) {
    match pu_prefix_regex().find(line) {
        Some(m) => (true, line[m.end()..].trim()),
        None => (false, line.trim()),
    }
}

/// Turns a PU line into a zoned instant.
#[derive(Debug, Clone, Default)]
pub struct DateTimeResolver {
    table: TimezoneTable,
}

impl DateTimeResolver {
    pub fn new(table: TimezoneTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TimezoneTable {
        &self.table
    }

    /// Resolve one line. A missing year means the zone's current year at `now`.
    pub fn resolve(&self, line: &str, now: DateTime<Utc>) -> Result<DateTime<Tz>, ResolveError> {
        let line = line.trim();

        let token = tz_token_regex()
            .captures(line)
            .and_then(|caps| caps.get(1))
            .ok_or(ResolveError::MissingTimezone)?;
        let tz = self
            .table
            .resolve(token.as_str())
            .ok_or_else(|| ResolveError::UnknownTimezone(token.as_str().to_uppercase()))?;

        let body = line[..token.start()]
            .trim_end()
            .trim_end_matches(',')
            .trim_end();

        let (grammar, parts) = GRAMMARS
            .iter()
            .find_map(|g| g.parse(body).map(|parts| (*g, parts)))
            .ok_or(ResolveError::NoGrammar)?;
        let parts = parts?;

        let year = parts.year.unwrap_or_else(|| now.with_timezone(&tz).year());
        let date = NaiveDate::from_ymd_opt(year, parts.month, parts.day)
            .ok_or(ResolveError::CalendarOverflow)?;
        let time =
            NaiveTime::from_hms_opt(parts.hour, parts.minute, 0).ok_or(ResolveError::InvalidClock)?;

        let resolved = match tz.from_local_datetime(&date.and_time(time)) {
            LocalResult::Single(dt) => dt,
            // Repeated hour at the end of DST: take the first occurrence.
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => return Err(ResolveError::NonexistentLocalTime(tz.name().to_string())),
        };

        tracing::debug!(?grammar, line, resolved = %resolved, "Resolved PU time");
        Ok(resolved)
    }
}
