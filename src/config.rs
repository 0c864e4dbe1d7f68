//! Configuration loading for TripBot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::rate::counter::{DEFAULT_BARE_NUMBER_CEILING, DEFAULT_MARKUPS};
use crate::schedule::planner::{default_catalog, DEFAULT_BUFFER_MINUTES, DEFAULT_MIN_DELAY_SECONDS};
use crate::schedule::{LeadTime, PastDuePolicy, TimezoneTable};

/// Get the TripBot home directory (~/.tripbot).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".tripbot"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.tripbot/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'tripbot setup' first.",
            path.display()
        )));
    }

    load_settings_from(&path)
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings, or defaults when no settings file exists yet.
///
/// A file that exists but does not parse or validate is an error.
pub fn load_settings_or_default() -> Result<Settings> {
    load_settings_or_default_from(&get_settings_path()?)
}

pub fn load_settings_or_default_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::info!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }
    load_settings_from(path)
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    let schedule = &settings.schedule;
    if schedule.buffer_minutes < 0 {
        return Err(Error::Config("schedule.buffer_minutes must not be negative".to_string()));
    }
    if schedule.min_delay_seconds < 0 {
        return Err(Error::Config(
            "schedule.min_delay_seconds must not be negative".to_string(),
        ));
    }
    if schedule.catalog.is_empty() {
        return Err(Error::Config("schedule.catalog must list at least one lead time".to_string()));
    }
    if schedule.queue_tick_millis == 0 {
        return Err(Error::Config("schedule.queue_tick_millis must be positive".to_string()));
    }
    if schedule.notice_text.trim().is_empty() {
        return Err(Error::Config("schedule.notice_text must not be empty".to_string()));
    }

    let rates = &settings.rates;
    if rates.markups.is_empty() {
        return Err(Error::Config("rates.markups must not be empty".to_string()));
    }
    if let Some(bad) = rates.markups.iter().find(|m| m.is_sign_negative()) {
        return Err(Error::Config(format!("rates.markups contains negative value {}", bad)));
    }
    if rates.bare_number_ceiling <= Decimal::ZERO {
        return Err(Error::Config("rates.bare_number_ceiling must be positive".to_string()));
    }

    // Rejects unknown IANA names.
    settings.timezones.table()?;
    Ok(())
}

/// Telegram transport configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
}

/// Who may trigger the bot in group chats.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AccessConfig {
    /// Only chat administrators may trigger commands and pickers.
    #[serde(default)]
    pub admins_only: bool,
}

/// Pickup notice scheduling.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ScheduleConfig {
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: i64,
    #[serde(default = "default_min_delay_seconds")]
    pub min_delay_seconds: i64,
    #[serde(default = "default_catalog")]
    pub catalog: Vec<LeadTime>,
    #[serde(default)]
    pub past_due: PastDuePolicy,
    /// Use the in-memory job queue; when off every job runs on a plain timer.
    #[serde(default = "default_true")]
    pub use_job_queue: bool,
    #[serde(default = "default_queue_tick_millis")]
    pub queue_tick_millis: u64,
    #[serde(default = "default_notice_text")]
    pub notice_text: String,
    #[serde(default = "default_ack_text")]
    pub ack_text: String,
}

fn default_buffer_minutes() -> i64 {
    DEFAULT_BUFFER_MINUTES
}

fn default_min_delay_seconds() -> i64 {
    DEFAULT_MIN_DELAY_SECONDS
}

fn default_true() -> bool {
    true
}

fn default_queue_tick_millis() -> u64 {
    1000
}

fn default_notice_text() -> String {
    "Load will be available on AI soon!".to_string()
}

fn default_ack_text() -> String {
    "noted".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: default_buffer_minutes(),
            min_delay_seconds: default_min_delay_seconds(),
            catalog: default_catalog(),
            past_due: PastDuePolicy::default(),
            use_job_queue: default_true(),
            queue_tick_millis: default_queue_tick_millis(),
            notice_text: default_notice_text(),
            ack_text: default_ack_text(),
        }
    }
}

/// Counter-offer ladder.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RatesConfig {
    #[serde(default = "default_markups")]
    pub markups: Vec<Decimal>,
    /// Bare numbers at or below this are read as per-mile rates.
    #[serde(default = "default_bare_number_ceiling")]
    pub bare_number_ceiling: Decimal,
}

fn default_markups() -> Vec<Decimal> {
    DEFAULT_MARKUPS.to_vec()
}

fn default_bare_number_ceiling() -> Decimal {
    DEFAULT_BARE_NUMBER_CEILING
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            markups: default_markups(),
            bare_number_ceiling: default_bare_number_ceiling(),
        }
    }
}

/// Extra or overriding abbreviation entries, e.g. `"AEST": "Australia/Sydney"`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TimezoneConfig {
    #[serde(default)]
    pub abbreviations: BTreeMap<String, String>,
    #[serde(default)]
    pub unknown_fallback_utc: bool,
}

impl TimezoneConfig {
    pub fn table(&self) -> Result<TimezoneTable> {
        TimezoneTable::with_overrides(&self.abbreviations, self.unknown_fallback_utc)
    }
}

/// Canned replies to trip posts and load alerts.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnnouncementConfig {
    #[serde(default = "default_trip_prompts")]
    pub trip_prompts: Vec<String>,
    #[serde(default = "default_load_alert_marker")]
    pub load_alert_marker: String,
    #[serde(default = "default_load_alert_reply")]
    pub load_alert_reply: Option<String>,
}

fn default_trip_prompts() -> Vec<String> {
    vec![
        "Please review all posted trucks, the driver is already covered. If you see a post for a covered truck, remove it.\n\nIt only takes a few seconds, let's check.".to_string(),
        "Update team!\n\nPlease ask the dispatch when you need to send the load to the driver.\nAssign Driver and Tractor.\nIf there is RSRV note that on google sheets and send it to RSRV Group.".to_string(),
    ]
}

fn default_load_alert_marker() -> String {
    "New Load Alert".to_string()
}

fn default_load_alert_reply() -> Option<String> {
    Some("Please check all post trucks, the driver was covered! It takes just few seconds, let's do!".to_string())
}

impl Default for AnnouncementConfig {
    fn default() -> Self {
        Self {
            trip_prompts: default_trip_prompts(),
            load_alert_marker: default_load_alert_marker(),
            load_alert_reply: default_load_alert_reply(),
        }
    }
}

/// TripBot settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub rates: RatesConfig,

    #[serde(default)]
    pub timezones: TimezoneConfig,

    #[serde(default)]
    pub announcements: AnnouncementConfig,
}

impl Settings {
    /// Write settings as pretty JSON, creating the parent directory.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = get_settings_path()?;
        self.save_to(&path)?;
        Ok(path)
    }
}
