//! Timezone abbreviation table.

use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// US abbreviations seen in load posts, mapped to IANA zones.
pub const DEFAULT_ABBREVIATIONS: &[(&str, &str)] = &[
    ("PST", "America/Los_Angeles"),
    ("PDT", "America/Los_Angeles"),
    ("MST", "America/Denver"),
    ("MDT", "America/Denver"),
    ("CST", "America/Chicago"),
    ("CDT", "America/Chicago"),
    ("EST", "America/New_York"),
    ("EDT", "America/New_York"),
    ("AKST", "America/Anchorage"),
    ("AKDT", "America/Anchorage"),
    ("HST", "Pacific/Honolulu"),
    ("HDT", "Pacific/Honolulu"),
    ("UTC", "UTC"),
    ("GMT", "UTC"),
];

/// Abbreviation lookup. Keys are stored upper-case.
#[derive(Debug, Clone)]
pub struct TimezoneTable {
    zones: HashMap<String, Tz>,
    unknown_fallback_utc: bool,
}

impl Default for TimezoneTable {
    fn default() -> Self {
        let zones = DEFAULT_ABBREVIATIONS
            .iter()
            .filter_map(|(abbr, name)| name.parse::<Tz>().ok().map(|tz| (abbr.to_string(), tz)))
            .collect();
        Self {
            zones,
            unknown_fallback_utc: false,
        }
    }
}

impl TimezoneTable {
    /// Defaults plus configured entries. Configured entries win.
    pub fn with_overrides(
        overrides: &BTreeMap<String, String>,
        unknown_fallback_utc: bool,
    ) -> Result<Self> {
        let mut table = Self::default();
        for (abbr, name) in overrides {
            let tz = name.parse::<Tz>().map_err(|e| {
                Error::Config(format!("timezone '{}' for '{}' is not valid: {}", name, abbr, e))
            })?;
            table.zones.insert(abbr.trim().to_uppercase(), tz);
        }
        table.unknown_fallback_utc = unknown_fallback_utc;
        Ok(table)
    }

    /// Exact lookup, no fallback.
    pub fn lookup(&self, abbr: &str) -> Option<Tz> {
        self.zones.get(&abbr.to_uppercase()).copied()
    }

    /// Lookup honouring the UTC fallback policy.
    pub fn resolve(&self, abbr: &str) -> Option<Tz> {
        match self.lookup(abbr) {
            Some(tz) => Some(tz),
            None if self.unknown_fallback_utc => {
                tracing::debug!("Unknown timezone '{}', falling back to UTC", abbr);
                Some(Tz::UTC)
            }
            None => None,
        }
    }

    pub fn unknown_fallback_utc(&self) -> bool {
        self.unknown_fallback_utc
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = TimezoneTable::default();
        assert_eq!(table.len(), DEFAULT_ABBREVIATIONS.len());
        assert_eq!(table.lookup("cdt"), Some(chrono_tz::America::Chicago));
        assert_eq!(table.lookup("GMT"), Some(Tz::UTC));
        assert_eq!(table.lookup("XYZ"), None);
        assert_eq!(table.resolve("XYZ"), None);
    }

    #[test]
    fn test_overrides_and_fallback() {
        let mut overrides = BTreeMap::new();
        overrides.insert("cet".to_string(), "Europe/Paris".to_string());
        let table = TimezoneTable::with_overrides(&overrides, true).unwrap();
        assert_eq!(table.lookup("CET"), Some(chrono_tz::Europe::Paris));
        assert_eq!(table.resolve("XYZ"), Some(Tz::UTC));
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert("BAD".to_string(), "Mars/Olympus".to_string());
        let err = TimezoneTable::with_overrides(&overrides, false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
