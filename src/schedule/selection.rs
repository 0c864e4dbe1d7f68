//! Multi-select lead-time picker state.
//!
//! One [`Selection`] per PU message that arrived without an inline lead time.
//! Phases: `Open` -> `Toggling` -> `Submitted`. A selection that can no longer
//! be found (evicted, process restarted) is treated as expired by the caller.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use super::offset::LeadTime;
use super::planner::FireTimePlanner;

/// Prefix of every picker callback payload.
pub const CALLBACK_NAMESPACE: &str = "pu";

/// Choice value of the submit button.
pub const SUBMIT_MARKER: &str = "submit";

/// Opaque handle for one picker dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectionToken(Ulid);

impl SelectionToken {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SelectionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SelectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SelectionToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| format!("Invalid selection token '{}': {}", s, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Toggle(LeadTime),
    Submit,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Toggle(lead) => write!(f, "{}", lead),
            Choice::Submit => f.write_str(SUBMIT_MARKER),
        }
    }
}

/// Callback payload `pu:<token>:<choice>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackData {
    pub token: SelectionToken,
    pub choice: Choice,
}

impl CallbackData {
    pub fn new(token: SelectionToken, choice: Choice) -> Self {
        Self { token, choice }
    }

    /// `None` for payloads from other namespaces or malformed ones.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        if parts.next()? != CALLBACK_NAMESPACE {
            return None;
        }
        let token = parts.next()?.parse().ok()?;
        let choice = match parts.next()? {
            SUBMIT_MARKER => Choice::Submit,
            label => Choice::Toggle(label.parse().ok()?),
        };
        Some(Self { token, choice })
    }
}

impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", CALLBACK_NAMESPACE, self.token, self.choice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Open,
    Toggling,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub lead: LeadTime,
    /// Whether `lead` is selected after the toggle.
    pub now_selected: bool,
    /// `lead` could not be toggled on because its notice time has passed.
    pub unreachable: bool,
    /// Previously selected entries removed because they became unreachable.
    pub dropped: Vec<LeadTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Schedule these, largest lead time first. The selection is closed.
    Ready(Vec<LeadTime>),
    /// Nothing left to schedule; the selection stays open.
    NothingValid { dropped: Vec<LeadTime> },
}

/// In-flight picker for one PU message.
#[derive(Debug, Clone)]
pub struct Selection {
    pub token: SelectionToken,
    pub chat_id: i64,
    pub origin_message_id: i32,
    pub pickup: DateTime<Tz>,
    /// Message carrying the picker buttons, once sent.
    pub control_message_id: Option<i32>,
    selected: BTreeSet<LeadTime>,
    phase: SelectionPhase,
}

impl Selection {
    pub fn new(chat_id: i64, origin_message_id: i32, pickup: DateTime<Tz>) -> Self {
        Self {
            token: SelectionToken::new(),
            chat_id,
            origin_message_id,
            pickup,
            control_message_id: None,
            selected: BTreeSet::new(),
            phase: SelectionPhase::Open,
        }
    }

    pub fn phase(&self) -> SelectionPhase {
        self.phase
    }

    pub fn selected(&self) -> &BTreeSet<LeadTime> {
        &self.selected
    }

    pub fn is_selected(&self, lead: LeadTime) -> bool {
        self.selected.contains(&lead)
    }

    pub fn pickup_utc(&self) -> DateTime<Utc> {
        self.pickup.with_timezone(&Utc)
    }

    /// Lead times that can still be offered.
    pub fn candidates(&self, planner: &FireTimePlanner, now: DateTime<Utc>) -> Vec<LeadTime> {
        planner.reachable(self.pickup_utc(), now)
    }

    fn prune(&mut self, planner: &FireTimePlanner, now: DateTime<Utc>) -> Vec<LeadTime> {
        let pickup = self.pickup_utc();
        let dropped: Vec<LeadTime> = self
            .selected
            .iter()
            .copied()
            .filter(|lead| !planner.is_reachable(pickup, *lead, now))
            .collect();
        for lead in &dropped {
            self.selected.remove(lead);
        }
        dropped
    }

    pub fn toggle(&mut self, lead: LeadTime, planner: &FireTimePlanner, now: DateTime<Utc>) -> ToggleOutcome {
        let dropped = self.prune(planner, now);
        if self.phase == SelectionPhase::Open {
            self.phase = SelectionPhase::Toggling;
        }

        if !planner.is_reachable(self.pickup_utc(), lead, now) {
            return ToggleOutcome {
                lead,
                now_selected: false,
                unreachable: true,
                dropped,
            };
        }

        let now_selected = if self.selected.remove(&lead) {
            false
        } else {
            self.selected.insert(lead);
            true
        };

        ToggleOutcome {
            lead,
            now_selected,
            unreachable: false,
            dropped,
        }
    }

    pub fn submit(&mut self, planner: &FireTimePlanner, now: DateTime<Utc>) -> SubmitOutcome {
        let dropped = self.prune(planner, now);
        if self.selected.is_empty() {
            return SubmitOutcome::NothingValid { dropped };
        }
        self.phase = SelectionPhase::Submitted;
        SubmitOutcome::Ready(self.selected.iter().rev().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn pickup() -> DateTime<Tz> {
        chrono_tz::America::Chicago
            .with_ymd_and_hms(2025, 9, 26, 2, 30, 0)
            .unwrap()
    }

    fn lead(s: &str) -> LeadTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_callback_data_wire_format() {
        let token = SelectionToken::new();
        let data = CallbackData::new(token, Choice::Toggle(lead("12h")));
        let wire = data.to_string();
        assert_eq!(wire, format!("pu:{}:12h", token));
        assert!(wire.len() <= 64);
        assert_eq!(CallbackData::parse(&wire), Some(data));

        let submit = CallbackData::new(token, Choice::Submit);
        assert_eq!(submit.to_string(), format!("pu:{}:submit", token));
        assert_eq!(CallbackData::parse(&submit.to_string()), Some(submit));
    }

    #[test]
    fn test_callback_data_rejects_foreign_payloads() {
        let token = SelectionToken::new();
        assert_eq!(CallbackData::parse(&format!("other:{}:12h", token)), None);
        assert_eq!(CallbackData::parse("pu:not-a-token:12h"), None);
        assert_eq!(CallbackData::parse(&format!("pu:{}:bogus", token)), None);
        assert_eq!(CallbackData::parse("pu"), None);
    }

    #[test]
    fn test_toggle_twice_restores_selection() {
        let planner = FireTimePlanner::default();
        let now = pickup().with_timezone(&Utc) - Duration::hours(24);
        let mut selection = Selection::new(1, 10, pickup());
        assert_eq!(selection.phase(), SelectionPhase::Open);

        selection.toggle(lead("2h"), &planner, now);
        let before = selection.selected().clone();

        let first = selection.toggle(lead("6h"), &planner, now);
        assert!(first.now_selected);
        let second = selection.toggle(lead("6h"), &planner, now);
        assert!(!second.now_selected);

        assert_eq!(selection.selected(), &before);
        assert_eq!(selection.phase(), SelectionPhase::Toggling);
    }

    #[test]
    fn test_toggle_unreachable_is_refused() {
        let planner = FireTimePlanner::default();
        let now = pickup().with_timezone(&Utc) - Duration::hours(3);
        let mut selection = Selection::new(1, 10, pickup());

        let outcome = selection.toggle(lead("12h"), &planner, now);
        assert!(outcome.unreachable);
        assert!(!outcome.now_selected);
        assert!(selection.selected().is_empty());
    }

    #[test]
    fn test_toggle_drops_entries_that_expired() {
        let planner = FireTimePlanner::default();
        let pickup_utc = pickup().with_timezone(&Utc);
        let mut selection = Selection::new(1, 10, pickup());

        selection.toggle(lead("2h"), &planner, pickup_utc - Duration::hours(3));
        assert!(selection.is_selected(lead("2h")));

        let later = pickup_utc - Duration::minutes(100);
        let outcome = selection.toggle(lead("1h"), &planner, later);
        assert_eq!(outcome.dropped, vec![lead("2h")]);
        assert!(selection.is_selected(lead("1h")));
        assert!(!selection.is_selected(lead("2h")));
    }

    #[test]
    fn test_submit_empty_stays_open() {
        let planner = FireTimePlanner::default();
        let now = pickup().with_timezone(&Utc) - Duration::hours(24);
        let mut selection = Selection::new(1, 10, pickup());

        assert_eq!(
            selection.submit(&planner, now),
            SubmitOutcome::NothingValid { dropped: vec![] }
        );
        assert_ne!(selection.phase(), SelectionPhase::Submitted);
    }

    #[test]
    fn test_submit_with_all_expired_stays_open() {
        let planner = FireTimePlanner::default();
        let pickup_utc = pickup().with_timezone(&Utc);
        let mut selection = Selection::new(1, 10, pickup());
        selection.toggle(lead("2h"), &planner, pickup_utc - Duration::hours(5));

        let outcome = selection.submit(&planner, pickup_utc - Duration::minutes(90));
        assert_eq!(outcome, SubmitOutcome::NothingValid { dropped: vec![lead("2h")] });
        assert_ne!(selection.phase(), SelectionPhase::Submitted);
    }

    #[test]
    fn test_submit_ready_largest_first() {
        let planner = FireTimePlanner::default();
        let now = pickup().with_timezone(&Utc) - Duration::hours(24);
        let mut selection = Selection::new(1, 10, pickup());
        selection.toggle(lead("1h"), &planner, now);
        selection.toggle(lead("9h"), &planner, now);
        selection.toggle(lead("2h"), &planner, now);

        assert_eq!(
            selection.submit(&planner, now),
            SubmitOutcome::Ready(vec![lead("9h"), lead("2h"), lead("1h")])
        );
        assert_eq!(selection.phase(), SelectionPhase::Submitted);
    }
}
