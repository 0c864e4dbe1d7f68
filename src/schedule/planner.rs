//! Fire-time planning: `PU - lead time - buffer`, plus the reachable catalog.

use chrono::{DateTime, Duration, Utc};

use super::offset::LeadTime;

pub const DEFAULT_BUFFER_MINUTES: i64 = 10;
pub const DEFAULT_MIN_DELAY_SECONDS: i64 = 2;
pub const DEFAULT_CATALOG_HOURS: [u32; 7] = [12, 9, 8, 7, 6, 2, 1];

pub fn default_catalog() -> Vec<LeadTime> {
    DEFAULT_CATALOG_HOURS
        .iter()
        .filter_map(|h| LeadTime::from_hours(*h))
        .collect()
}

#[derive(Debug, Clone)]
pub struct FireTimePlanner {
    buffer: Duration,
    min_delay: Duration,
    catalog: Vec<LeadTime>,
}

impl Default for FireTimePlanner {
    fn default() -> Self {
        Self::new(
            Duration::minutes(DEFAULT_BUFFER_MINUTES),
            Duration::seconds(DEFAULT_MIN_DELAY_SECONDS),
            default_catalog(),
        )
    }
}

impl FireTimePlanner {
    pub fn new(buffer: Duration, min_delay: Duration, catalog: Vec<LeadTime>) -> Self {
        Self {
            buffer,
            min_delay,
            catalog,
        }
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn catalog(&self) -> &[LeadTime] {
        &self.catalog
    }

    /// When the notice for `lead` should go out.
    pub fn fire_time(&self, pickup: DateTime<Utc>, lead: LeadTime) -> DateTime<Utc> {
        pickup - lead.duration() - self.buffer
    }

    /// The notice would still go out after `now + min_delay`.
    pub fn is_reachable(&self, pickup: DateTime<Utc>, lead: LeadTime, now: DateTime<Utc>) -> bool {
        self.fire_time(pickup, lead) > now + self.min_delay
    }

    /// Catalog entries still reachable at `now`, catalog order kept.
    ///
    /// Always recomputed; an entry offered a minute ago may be gone.
    pub fn reachable(&self, pickup: DateTime<Utc>, now: DateTime<Utc>) -> Vec<LeadTime> {
        self.catalog
            .iter()
            .copied()
            .filter(|lead| self.is_reachable(pickup, *lead, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_fire_time() {
        let planner = FireTimePlanner::default();
        let pickup = utc("2025-09-26T07:30:00Z");
        let lead = LeadTime::new(1, 5).unwrap();
        assert_eq!(planner.fire_time(pickup, lead), utc("2025-09-26T06:15:00Z"));
    }

    #[test]
    fn test_reachable_drops_past_entries() {
        let planner = FireTimePlanner::default();
        let pickup = utc("2025-09-26T07:30:00Z");
        let now = utc("2025-09-25T21:00:00Z");

        let labels: Vec<String> = planner
            .reachable(pickup, now)
            .iter()
            .map(|l| l.to_string())
            .collect();
        assert_eq!(labels, vec!["9h", "8h", "7h", "6h", "2h", "1h"]);
    }

    #[test]
    fn test_reachable_is_sound() {
        let planner = FireTimePlanner::default();
        let pickup = utc("2025-09-26T07:30:00Z");
        for minutes_before in [0i64, 30, 70, 75, 130, 400, 800] {
            let now = pickup - Duration::minutes(minutes_before);
            for lead in planner.reachable(pickup, now) {
                assert!(pickup - lead.duration() - planner.buffer() > now);
            }
        }
    }

    #[test]
    fn test_min_delay_guard() {
        let planner = FireTimePlanner::default();
        let pickup = utc("2025-09-26T07:30:00Z");
        let lead = LeadTime::from_hours(1).unwrap();
        let fire = planner.fire_time(pickup, lead);

        assert!(!planner.is_reachable(pickup, lead, fire - Duration::seconds(1)));
        assert!(planner.is_reachable(pickup, lead, fire - Duration::seconds(3)));
    }

    #[test]
    fn test_nothing_reachable_close_to_pickup() {
        let planner = FireTimePlanner::default();
        let pickup = utc("2025-09-26T07:30:00Z");
        assert!(planner.reachable(pickup, pickup - Duration::minutes(30)).is_empty());
    }
}
