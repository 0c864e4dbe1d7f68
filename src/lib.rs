//! TripBot library root.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod rate;
pub mod schedule;
pub mod telegram;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{EngineState, Router};
pub use error::{Error, Result};
pub use telegram::run_telegram_daemon;
