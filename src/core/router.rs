//! Intent router: classify an inbound message and dispatch it.
//!
//! Priority: rate commands, then PU date lines, then announcements.
//! User mistakes become short hints; text that matches nothing is ignored.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::{Arc, OnceLock};

use super::outbox::{Button, Control, Outbound, Outbox};
use super::state::{EngineState, JobKey, RegisteredJob};
use crate::config::Settings;
use crate::error::Result;
use crate::rate::extract::{ascii_fold, quote_from_text};
use crate::rate::{adjust_trip, AdjustError, CounterOfferLadder, RateQuote};
use crate::schedule::{
    parse_offset, strip_pu_prefix, CallbackData, Choice, DateTimeResolver, FireTimePlanner,
    LeadTime, ResolveError, ScheduleError, Scheduled, ScheduledJob, SchedulerAdapter, Selection,
    SelectionToken, SubmitOutcome,
};

const PICKER_COLUMNS: usize = 4;
const SUBMIT_LABEL: &str = "📅 Schedule";
const EXPIRED_TOAST: &str = "This picker has expired. Post the PU again.";
const TOO_LARGE_HINT: &str = "❗ That price is too large to work with.";

/// An inbound text message.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    /// Text of the message this one replies to, if any.
    pub reply_to_text: Option<String>,
}

/// A button press.
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub chat_id: i64,
    /// Message carrying the pressed button.
    pub message_id: Option<i32>,
    pub data: String,
}

/// Which path handled a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Rate,
    Counter,
    Schedule,
    Announcement,
    Ignored,
}

/// Replies and canned texts taken from settings.
#[derive(Debug, Clone)]
struct Texts {
    notice: String,
    ack: String,
    trip_prompts: Vec<String>,
    /// Upper-cased; alerts are matched case-insensitively.
    load_alert_marker: String,
    load_alert_reply: Option<String>,
}

pub struct Router {
    state: Arc<EngineState>,
    outbox: Arc<dyn Outbox>,
    scheduler: SchedulerAdapter,
    resolver: DateTimeResolver,
    planner: FireTimePlanner,
    ladder: CounterOfferLadder,
    texts: Texts,
}

fn adjust_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(add|minus)\s+\$?(-?[0-9]+(?:\.[0-9]{1,2})?)\s*$")
            .expect("adjust regex is valid")
    })
}

fn counter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*counter\b\s*(.*)$").expect("counter regex is valid"))
}

/// `Add 50` → `+50`, `Minus 50` → `-50`.
pub fn parse_adjust_command(text: &str) -> Option<Decimal> {
    let folded = ascii_fold(text);
    let caps = adjust_regex().captures(folded.trim())?;
    let amount: Decimal = caps.get(2)?.as_str().parse().ok()?;
    if caps.get(1)?.as_str().eq_ignore_ascii_case("minus") {
        Some(-amount)
    } else {
        Some(amount)
    }
}

pub fn looks_like_trip_post(text: &str) -> bool {
    text.contains('🗺') || ascii_fold(text).to_lowercase().contains("trip id")
}

fn adjust_hint(err: &AdjustError) -> String {
    match err {
        AdjustError::NegativeRate => "❗ That would make the rate negative.".to_string(),
        AdjustError::RateTooLarge => TOO_LARGE_HINT.to_string(),
        _ => "❗ Rate/Miles not found. The post needs lines like:\n '💰 Rate: $123.45' and '🚛 Trip: 431.63mi'"
            .to_string(),
    }
}

fn resolve_hint(err: &ResolveError) -> String {
    let example = "Example: 'PU: 5 Sep, 15:40 PDT'";
    match err {
        ResolveError::MissingTimezone => format!("❗ PU time needs a timezone such as PDT or CDT. {}", example),
        ResolveError::UnknownTimezone(abbr) => format!("❗ Unknown timezone '{}'. {}", abbr, example),
        ResolveError::NoGrammar => format!("❗ Could not read the PU time. {}", example),
        ResolveError::CalendarOverflow => "❗ That date does not exist. Check the day and month.".to_string(),
        ResolveError::InvalidClock => "❗ That clock time is not valid.".to_string(),
        ResolveError::NonexistentLocalTime(zone) => {
            format!("❗ That time is skipped by the daylight saving change in {}.", zone)
        }
    }
}

fn schedule_hint(err: &ScheduleError) -> String {
    match err {
        ScheduleError::PastDue(_) => "⚠️ That notice time has already passed.".to_string(),
        _ => "⚠️ Could not schedule. Please check the PU time and offset.".to_string(),
    }
}

fn format_pickup(pickup: &DateTime<Tz>) -> String {
    pickup.format("%a %b %-d %H:%M %Z").to_string()
}

fn join_leads(leads: &[LeadTime]) -> String {
    leads.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ")
}

/// Picker text plus buttons for the currently reachable lead times.
fn render_picker(selection: &Selection, candidates: &[LeadTime], note: Option<&str>) -> (String, Control) {
    let mut text = format!(
        "🕒 PU {}\nPick when to post the notice, then press Schedule.",
        format_pickup(&selection.pickup)
    );
    if let Some(note) = note {
        text.push_str("\n\n");
        text.push_str(note);
    }

    let mut rows: Vec<Vec<Button>> = candidates
        .chunks(PICKER_COLUMNS)
        .map(|chunk| {
            chunk
                .iter()
                .map(|lead| {
                    let label = if selection.is_selected(*lead) {
                        format!("✅ {}", lead)
                    } else {
                        lead.to_string()
                    };
                    let data = CallbackData::new(selection.token, Choice::Toggle(*lead));
                    Button::new(label, data.to_string())
                })
                .collect()
        })
        .collect();
    let submit = CallbackData::new(selection.token, Choice::Submit);
    rows.push(vec![Button::new(SUBMIT_LABEL, submit.to_string())]);

    (text, Control { rows })
}

impl Router {
    pub fn new(
        settings: &Settings,
        state: Arc<EngineState>,
        outbox: Arc<dyn Outbox>,
        scheduler: SchedulerAdapter,
    ) -> Result<Self> {
        let table = settings.timezones.table()?;
        let planner = FireTimePlanner::new(
            chrono::Duration::minutes(settings.schedule.buffer_minutes),
            chrono::Duration::seconds(settings.schedule.min_delay_seconds),
            settings.schedule.catalog.clone(),
        );
        let ladder = CounterOfferLadder::new(
            settings.rates.markups.clone(),
            settings.rates.bare_number_ceiling,
        );
        let announcements = &settings.announcements;

        Ok(Self {
            state,
            outbox,
            scheduler,
            resolver: DateTimeResolver::new(table),
            planner,
            ladder,
            texts: Texts {
                notice: settings.schedule.notice_text.clone(),
                ack: settings.schedule.ack_text.clone(),
                trip_prompts: announcements.trip_prompts.clone(),
                load_alert_marker: announcements.load_alert_marker.to_uppercase(),
                load_alert_reply: announcements.load_alert_reply.clone(),
            },
        })
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn planner(&self) -> &FireTimePlanner {
        &self.planner
    }

    async fn reply(&self, msg: &Inbound, text: impl Into<String>) -> Result<i32> {
        self.outbox
            .send(Outbound::reply(msg.chat_id, msg.message_id, text))
            .await
    }

    pub async fn handle_message(&self, msg: &Inbound, now: DateTime<Utc>) -> Result<Handled> {
        let trip_post = looks_like_trip_post(&msg.text);
        if trip_post {
            self.state.remember_trip(msg.chat_id, &msg.text).await;
        }

        if let Some(handled) = self.try_rate_path(msg).await? {
            return Ok(handled);
        }
        if let Some(handled) = self.try_date_path(msg, now).await? {
            return Ok(handled);
        }
        self.try_announcement(msg, trip_post).await
    }

    fn counter_text(&self, quote: &RateQuote) -> String {
        self.ladder.render(quote).unwrap_or_else(|| {
            tracing::debug!(?quote, "Counter ladder out of range");
            TOO_LARGE_HINT.to_string()
        })
    }

    async fn try_rate_path(&self, msg: &Inbound) -> Result<Option<Handled>> {
        if let Some(delta) = parse_adjust_command(&msg.text) {
            let source = match &msg.reply_to_text {
                Some(text) => Some(text.clone()),
                None => self.state.last_trip(msg.chat_id).await,
            };
            let Some(source) = source else {
                self.reply(msg, "❗ Reply to a trip post with 'Add 100' or 'Minus 100'.")
                    .await?;
                return Ok(Some(Handled::Rate));
            };

            match adjust_trip(&source, delta) {
                Ok(adjustment) => {
                    tracing::info!(
                        chat_id = msg.chat_id,
                        rate = %adjustment.rate,
                        per_mile = %adjustment.per_mile,
                        templated = adjustment.templated,
                        "Adjusted trip rate"
                    );
                    self.reply(msg, adjustment.text).await?;
                }
                Err(e) => {
                    tracing::debug!("Rate adjustment refused: {}", e);
                    self.reply(msg, adjust_hint(&e)).await?;
                }
            }
            return Ok(Some(Handled::Rate));
        }

        if let Some(caps) = counter_regex().captures(msg.text.trim()) {
            let inline = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let quote = if !inline.is_empty() {
                self.ladder.classify_bare(inline)
            } else {
                msg.reply_to_text.as_deref().and_then(|text| {
                    self.ladder
                        .classify_bare(text)
                        .or_else(|| quote_from_text(text))
                })
            };

            match quote {
                Some(quote) => {
                    self.reply(msg, self.counter_text(&quote)).await?;
                }
                None => {
                    self.reply(msg, "❗ No price found. Reply 'counter' to a post with a $ rate or $/mi.")
                        .await?;
                }
            }
            return Ok(Some(Handled::Counter));
        }

        if let Some(quote) = self.ladder.classify_bare(&msg.text) {
            self.reply(msg, self.counter_text(&quote)).await?;
            return Ok(Some(Handled::Counter));
        }

        Ok(None)
    }

    async fn try_date_path(&self, msg: &Inbound, now: DateTime<Utc>) -> Result<Option<Handled>> {
        let mut hint: Option<ResolveError> = None;
        let mut found: Option<(usize, DateTime<Tz>)> = None;

        for (idx, line) in msg.text.lines().enumerate() {
            let (labelled, body) = strip_pu_prefix(line);
            if body.is_empty() {
                continue;
            }
            match self.resolver.resolve(body, now) {
                Ok(pickup) => {
                    found = Some((idx, pickup));
                    break;
                }
                Err(e) if hint.is_none() && (labelled || e.shape_matched()) => hint = Some(e),
                Err(_) => {}
            }
        }

        let Some((idx, pickup)) = found else {
            return match hint {
                Some(err) => {
                    self.reply(msg, resolve_hint(&err)).await?;
                    Ok(Some(Handled::Schedule))
                }
                None => Ok(None),
            };
        };

        match parse_offset(&msg.text, Some(idx)) {
            Some(lead) => self.schedule_inline(msg, pickup, lead, now).await?,
            None => self.open_picker(msg, pickup, now).await?,
        }
        Ok(Some(Handled::Schedule))
    }

    async fn schedule_inline(
        &self,
        msg: &Inbound,
        pickup: DateTime<Tz>,
        lead: LeadTime,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self
            .schedule_lead(msg.chat_id, msg.message_id, pickup.with_timezone(&Utc), lead, now)
            .await
        {
            Ok(_) => {
                self.reply(msg, self.texts.ack.clone()).await?;
            }
            Err(e) => {
                tracing::warn!("Failed to schedule notice for chat {}: {}", msg.chat_id, e);
                self.reply(msg, schedule_hint(&e)).await?;
            }
        }
        Ok(())
    }

    /// Schedule one notice, replacing any earlier job for the same lead time.
    async fn schedule_lead(
        &self,
        chat_id: i64,
        origin_message_id: i32,
        pickup: DateTime<Utc>,
        lead: LeadTime,
        now: DateTime<Utc>,
    ) -> std::result::Result<DateTime<Utc>, ScheduleError> {
        let key = JobKey {
            chat_id,
            origin_message_id,
            lead,
        };
        if let Some(previous) = self.state.take_job(&key).await {
            self.scheduler.cancel(&previous.scheduled).await;
        }

        let fire_at = self.planner.fire_time(pickup, lead);
        let job = ScheduledJob::new(fire_at, chat_id, origin_message_id, self.texts.notice.clone());
        let scheduled = self.scheduler.schedule(job, now).await?;

        if !matches!(scheduled, Scheduled::FiredNow) {
            let registered = RegisteredJob { fire_at, scheduled };
            if let Some(replaced) = self.state.register_job(key, registered, now).await {
                self.scheduler.cancel(&replaced.scheduled).await;
            }
        }
        tracing::info!(chat_id, origin_message_id, %lead, %fire_at, "Scheduled pickup notice");
        Ok(fire_at)
    }

    async fn open_picker(
        &self,
        msg: &Inbound,
        pickup: DateTime<Tz>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut selection = Selection::new(msg.chat_id, msg.message_id, pickup);
        let candidates = selection.candidates(&self.planner, now);
        if candidates.is_empty() {
            self.reply(
                msg,
                format!(
                    "❗ PU {} is too close, no lead time is still reachable.",
                    format_pickup(&pickup)
                ),
            )
            .await?;
            return Ok(());
        }

        let (text, control) = render_picker(&selection, &candidates, None);
        let sent = self
            .outbox
            .send(Outbound::reply(msg.chat_id, msg.message_id, text).with_control(control))
            .await?;
        selection.control_message_id = Some(sent);
        tracing::debug!(token = %selection.token, "Opened lead time picker");
        self.state.insert_selection(selection, now).await;
        Ok(())
    }

    /// Handle a picker button. Returns toast text for the presser, or `None`
    /// when the payload is not a picker callback.
    pub async fn handle_callback(&self, event: &CallbackEvent, now: DateTime<Utc>) -> Result<Option<String>> {
        let Some(data) = CallbackData::parse(&event.data) else {
            return Ok(None);
        };

        match data.choice {
            Choice::Toggle(lead) => self.toggle(data.token, lead, event, now).await.map(Some),
            Choice::Submit => self.submit(data.token, event, now).await.map(Some),
        }
    }

    async fn toggle(
        &self,
        token: SelectionToken,
        lead: LeadTime,
        event: &CallbackEvent,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let rendered = {
            let mut selections = self.state.selections().await;
            selections.get_mut(&token).map(|selection| {
                let outcome = selection.toggle(lead, &self.planner, now);
                let candidates = selection.candidates(&self.planner, now);
                let note = (!outcome.dropped.is_empty())
                    .then(|| format!("Removed, no longer reachable: {}", join_leads(&outcome.dropped)));
                let (text, control) = render_picker(selection, &candidates, note.as_deref());
                (outcome, text, control, selection.chat_id, selection.control_message_id)
            })
        };

        let Some((outcome, text, control, chat_id, control_id)) = rendered else {
            return Ok(EXPIRED_TOAST.to_string());
        };

        if let Some(message_id) = control_id.or(event.message_id) {
            self.outbox.edit(chat_id, message_id, &text, Some(&control)).await?;
        }

        let toast = if outcome.unreachable {
            format!("⏰ {} is no longer reachable", outcome.lead)
        } else if outcome.now_selected {
            format!("✅ {} selected", outcome.lead)
        } else {
            format!("{} removed", outcome.lead)
        };
        Ok(toast)
    }

    async fn submit(&self, token: SelectionToken, event: &CallbackEvent, now: DateTime<Utc>) -> Result<String> {
        // Resolve and close under one lock so a double press schedules once.
        let resolved = {
            let mut selections = self.state.selections().await;
            match selections.get_mut(&token) {
                None => None,
                Some(selection) => match selection.submit(&self.planner, now) {
                    SubmitOutcome::Ready(leads) => selections
                        .remove(&token)
                        .map(|selection| Ok((selection, leads))),
                    SubmitOutcome::NothingValid { dropped } => {
                        let candidates = selection.candidates(&self.planner, now);
                        let note = if dropped.is_empty() {
                            "Pick at least one lead time first.".to_string()
                        } else {
                            format!("No longer reachable: {}. Pick again.", join_leads(&dropped))
                        };
                        let (text, control) = render_picker(selection, &candidates, Some(&note));
                        Some(Err((text, control, selection.chat_id, selection.control_message_id)))
                    }
                },
            }
        };

        let (selection, leads) = match resolved {
            None => return Ok(EXPIRED_TOAST.to_string()),
            Some(Err((text, control, chat_id, control_id))) => {
                if let Some(message_id) = control_id.or(event.message_id) {
                    self.outbox.edit(chat_id, message_id, &text, Some(&control)).await?;
                }
                return Ok("Nothing to schedule. Pick again.".to_string());
            }
            Some(Ok(ready)) => ready,
        };

        let pickup = selection.pickup_utc();
        let mut done = Vec::new();
        let mut failed = Vec::new();
        for lead in &leads {
            match self
                .schedule_lead(selection.chat_id, selection.origin_message_id, pickup, *lead, now)
                .await
            {
                Ok(_) => done.push(*lead),
                Err(e) => {
                    tracing::warn!("Failed to schedule {} for token {}: {}", lead, token, e);
                    failed.push(*lead);
                }
            }
        }

        let mut text = format!("🕒 PU {}", format_pickup(&selection.pickup));
        if !done.is_empty() {
            text.push_str(&format!("\n✅ Scheduled: {}", join_leads(&done)));
        }
        if !failed.is_empty() {
            text.push_str(&format!("\n⚠️ Could not schedule: {}", join_leads(&failed)));
        }
        if let Some(message_id) = selection.control_message_id.or(event.message_id) {
            self.outbox.edit(selection.chat_id, message_id, &text, None).await?;
        }

        Ok(if failed.is_empty() {
            "Scheduled".to_string()
        } else {
            "Some notices could not be scheduled".to_string()
        })
    }

    async fn try_announcement(&self, msg: &Inbound, trip_post: bool) -> Result<Handled> {
        if trip_post && !self.texts.trip_prompts.is_empty() {
            for prompt in &self.texts.trip_prompts {
                self.reply(msg, prompt.clone()).await?;
            }
            return Ok(Handled::Announcement);
        }

        if let Some(reply) = &self.texts.load_alert_reply {
            let marker = &self.texts.load_alert_marker;
            if !marker.is_empty() && msg.text.to_uppercase().contains(marker.as_str()) {
                self.reply(msg, reply.clone()).await?;
                return Ok(Handled::Announcement);
            }
        }

        Ok(Handled::Ignored)
    }
}
