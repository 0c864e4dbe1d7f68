//! CLI commands for TripBot using clap.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::config::{get_settings_path, load_settings, load_settings_or_default, Settings};
use crate::rate::extract::quote_from_text;
use crate::rate::{adjust_trip, CounterOfferLadder};
use crate::schedule::{strip_pu_prefix, DateTimeResolver, FireTimePlanner, LeadTime};

#[derive(Parser)]
#[command(name = "tripbot")]
#[command(version)]
#[command(about = "TripBot - freight dispatch helper for Telegram groups", long_about = None)]
pub struct Commands {
    /// Emit console logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the Telegram bot
    Start {
        /// Bot token; overrides the one in settings
        #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Run setup wizard
    Setup,

    /// Show the effective configuration
    Config {
        /// Only print the settings file path
        #[arg(long)]
        path: bool,
    },

    /// Resolve a PU line and list reachable lead times
    Resolve {
        /// e.g. "PU: 5 Sep, 15:40 PDT"
        line: String,

        /// Print the notice time for this lead time only
        #[arg(long)]
        lead: Option<LeadTime>,
    },

    /// Print the counter-offer ladder for a price or post
    Quote {
        /// A bare price such as 18, $1,200 or 2.10/mi, or a whole post
        text: String,
    },

    /// Apply an Add/Minus adjustment to a post stored in a file
    Adjust {
        /// Signed amount, e.g. 50 or -25
        #[arg(allow_hyphen_values = true)]
        delta: Decimal,

        /// File holding the post text
        file: PathBuf,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Start { token } => cmd_start(token.clone()).await,
            Command::Setup => cmd_setup(),
            Command::Config { path } => cmd_config(*path),
            Command::Resolve { line, lead } => cmd_resolve(line, *lead),
            Command::Quote { text } => cmd_quote(text),
            Command::Adjust { delta, file } => cmd_adjust(*delta, file),
        }
    }
}

// Command implementations

async fn cmd_start(token: Option<String>) -> Result<()> {
    crate::telegram::run_telegram_daemon(token).await?;
    Ok(())
}

fn prompt(label: &str, default: &str) -> Result<String> {
    let mut stdout = io::stdout();
    if default.is_empty() {
        print!("{}: ", label);
    } else {
        print!("{} [{}]: ", label, default);
    }
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

fn cmd_setup() -> Result<()> {
    println!("\nTripBot setup\n");

    let mut settings = load_settings_or_default()?;

    let token = prompt("📱 Telegram Bot Token (from @BotFather)", "")?;
    if !token.is_empty() {
        settings.telegram.bot_token = Some(token);
    }

    let buffer = prompt(
        "⏱  Minutes of buffer before each notice",
        &settings.schedule.buffer_minutes.to_string(),
    )?;
    settings.schedule.buffer_minutes = buffer
        .parse()
        .with_context(|| format!("'{}' is not a number of minutes", buffer))?;

    let admins = prompt(
        "🔒 Only chat admins may use the bot? (y/n)",
        if settings.access.admins_only { "y" } else { "n" },
    )?;
    settings.access.admins_only = admins.eq_ignore_ascii_case("y");

    crate::config::validate_settings(&settings)?;
    let path = settings.save()?;
    println!("\n✓ Saved settings to {}", path.display());
    println!("Run 'tripbot start' to launch the bot.");
    Ok(())
}

fn cmd_config(path_only: bool) -> Result<()> {
    let path = get_settings_path()?;
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }

    let settings = if path.exists() {
        load_settings()?
    } else {
        println!("# {} not found, showing defaults", path.display());
        Settings::default()
    };

    let mut shown = settings.clone();
    if shown.telegram.bot_token.is_some() {
        shown.telegram.bot_token = Some("********".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

fn planner_from(settings: &Settings) -> FireTimePlanner {
    FireTimePlanner::new(
        chrono::Duration::minutes(settings.schedule.buffer_minutes),
        chrono::Duration::seconds(settings.schedule.min_delay_seconds),
        settings.schedule.catalog.clone(),
    )
}

fn cmd_resolve(line: &str, lead: Option<LeadTime>) -> Result<()> {
    let settings = load_settings_or_default()?;
    let resolver = DateTimeResolver::new(settings.timezones.table()?);
    let planner = planner_from(&settings);
    let now = Utc::now();

    let (_, body) = strip_pu_prefix(line);
    let pickup = resolver
        .resolve(body, now)
        .with_context(|| format!("could not resolve '{}'", line))?;
    let pickup_utc = pickup.with_timezone(&Utc);

    println!("PU:  {}", pickup.format("%a %b %-d %Y %H:%M %Z"));
    println!("UTC: {}", pickup_utc.to_rfc3339());

    let leads = match lead {
        Some(lead) => vec![lead],
        None => planner.reachable(pickup_utc, now),
    };
    if leads.is_empty() {
        println!("No lead time is still reachable.");
    }
    for lead in leads {
        let fire_at = planner.fire_time(pickup_utc, lead);
        let marker = if planner.is_reachable(pickup_utc, lead, now) {
            ""
        } else {
            " (already due)"
        };
        println!("{:>7} -> notice at {}{}", lead.to_string(), fire_at.to_rfc3339(), marker);
    }
    Ok(())
}

fn cmd_quote(text: &str) -> Result<()> {
    let settings = load_settings_or_default()?;
    let ladder = CounterOfferLadder::new(settings.rates.markups, settings.rates.bare_number_ceiling);
    let quote = ladder
        .classify_bare(text)
        .or_else(|| quote_from_text(text))
        .context("no price found")?;
    let text = ladder.render(&quote).context("price is too large for a counter offer")?;
    println!("{}", text);
    Ok(())
}

fn cmd_adjust(delta: Decimal, file: &PathBuf) -> Result<()> {
    let original = std::fs::read_to_string(file)
        .with_context(|| format!("could not read {}", file.display()))?;
    let adjustment = adjust_trip(&original, delta)?;
    if adjustment.templated {
        tracing::info!("No 💰 lines found; appended a rate block");
    }
    println!("{}", adjustment.text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_subcommands() {
        let cli = Commands::try_parse_from(["tripbot", "adjust", "-25", "post.txt"]).unwrap();
        match cli.command {
            Command::Adjust { delta, file } => {
                assert_eq!(delta, dec!(-25));
                assert_eq!(file, PathBuf::from("post.txt"));
            }
            _ => panic!("expected adjust"),
        }

        let cli = Commands::try_parse_from(["tripbot", "resolve", "Sep 5, 15:40 PDT", "--lead", "1h 5m"]).unwrap();
        match cli.command {
            Command::Resolve { lead, .. } => assert_eq!(lead, LeadTime::new(1, 5)),
            _ => panic!("expected resolve"),
        }

        assert!(Commands::try_parse_from(["tripbot", "resolve", "x", "--lead", "0m"]).is_err());
    }

    #[test]
    fn test_adjust_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("post.txt");
        std::fs::write(&path, "💰 Rate: $500.00\n🚛 Trip: 250mi").unwrap();
        assert!(cmd_adjust(dec!(50), &path).is_ok());
        assert!(cmd_adjust(dec!(-600), &path).is_err());
    }
}
