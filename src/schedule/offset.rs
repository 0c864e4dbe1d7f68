//! Lead-time ("offset") parsing: `1h`, `1h 5m`, `45m`, `2h5m`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// How long before pickup a notice should go out. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeadTime {
    hours: u32,
    minutes: u32,
}

impl LeadTime {
    /// `None` for a zero duration. Minutes past 59 carry into hours.
    pub fn new(hours: u32, minutes: u32) -> Option<Self> {
        if hours == 0 && minutes == 0 {
            return None;
        }
        Some(Self {
            hours: hours + minutes / 60,
            minutes: minutes % 60,
        })
    }

    pub fn from_hours(hours: u32) -> Option<Self> {
        Self::new(hours, 0)
    }

    pub fn hours(&self) -> u32 {
        self.hours
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn total_minutes(&self) -> i64 {
        i64::from(self.hours) * 60 + i64::from(self.minutes)
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.total_minutes())
    }
}

impl Ord for LeadTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_minutes().cmp(&other.total_minutes())
    }
}

impl PartialOrd for LeadTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LeadTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.hours, self.minutes) {
            (h, 0) => write!(f, "{}h", h),
            (0, m) => write!(f, "{}m", m),
            (h, m) => write!(f, "{}h {}m", h, m),
        }
    }
}

impl FromStr for LeadTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_offset_line(s).ok_or_else(|| format!("Invalid lead time: '{}'. Use e.g. 2h, 45m or 1h 5m", s))
    }
}

impl TryFrom<String> for LeadTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LeadTime> for String {
    fn from(value: LeadTime) -> Self {
        value.to_string()
    }
}

fn offset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:(?P<h>\d{1,3})\s*h)?\s*(?:(?P<m>\d{1,3})\s*m)?\s*$")
            .expect("offset regex is valid")
    })
}

/// Parse one line as a lead time. Hours come before minutes.
pub fn parse_offset_line(line: &str) -> Option<LeadTime> {
    let caps = offset_regex().captures(line)?;
    let hours = caps.name("h").map(|m| m.as_str().parse::<u32>());
    let minutes = caps.name("m").map(|m| m.as_str().parse::<u32>());
    if hours.is_none() && minutes.is_none() {
        return None;
    }
    let hours = hours.transpose().ok()?.unwrap_or(0);
    let minutes = minutes.transpose().ok()?.unwrap_or(0);
    LeadTime::new(hours, minutes)
}

/// First line of `text` that is a lead time, skipping the date line.
///
/// Absence is a normal result: the caller then offers a picker.
pub fn parse_offset(text: &str, date_line: Option<usize>) -> Option<LeadTime> {
    text.lines()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != date_line)
        .find_map(|(_, line)| parse_offset_line(line))
}
