//! Telegram bot client - dispatcher with message and button branches.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{Chat, User};

use crate::config::{get_settings_path, load_settings_or_default_from, Settings};
use crate::core::outbox::Outbox;
use crate::core::router::{CallbackEvent, Inbound, Router};
use crate::core::state::EngineState;
use crate::error::Error;
use crate::schedule::{JobQueue, SchedulerAdapter};

use super::outbox::TelegramOutbox;

type HandlerResult = Result<(), Error>;

const HELP_TEXT: &str = "👋 TripBot is alive. Add me to your group and disable privacy mode in BotFather so I can read messages.

• Reply 'Add 100' or 'Minus 100' to a trip post to recalculate Rate and $/mi.
• Reply 'counter' to a post, or send a bare price like 18 or $1,200, for counter offers.
• When someone posts a Trip ID, I reply with the team reminders.
• Post like:
  PU: 5 Sep, 15:40 PDT
  1h 5m
  → I will post a notice at PU − offset − buffer.
• Leave out the offset and I will offer a lead time picker.";

const FAILURE_TEXT: &str = "⚠️ Something went wrong while handling that message.";

/// Who may trigger the bot.
#[derive(Debug, Clone, Copy)]
struct Access {
    admins_only: bool,
}

impl Access {
    async fn allows(&self, bot: &Bot, chat: &Chat, user: Option<&User>) -> Result<bool, Error> {
        if !self.admins_only || chat.is_private() {
            return Ok(true);
        }
        let Some(user) = user else {
            return Ok(false);
        };
        let member = bot.get_chat_member(chat.id, user.id).await?;
        Ok(member.is_privileged())
    }
}

/// Run the telegram bot until Ctrl+C.
pub async fn run_telegram_daemon(token_override: Option<String>) -> Result<(), Error> {
    run_telegram_daemon_with(&get_settings_path()?, token_override).await
}

/// Like [`run_telegram_daemon`] with an explicit settings file.
///
/// A missing file means defaults; an unreadable or invalid one stops startup.
pub async fn run_telegram_daemon_with(
    settings_path: &Path,
    token_override: Option<String>,
) -> Result<(), Error> {
    tracing::info!("Starting Telegram bot...");

    let settings = load_settings_or_default_from(settings_path)?;

    let token = token_override
        .or_else(|| settings.telegram.bot_token.clone())
        .ok_or_else(|| {
            Error::Telegram("No bot token configured. Run 'tripbot setup' or set BOT_TOKEN.".to_string())
        })?;

    let bot = Bot::new(token);

    if let Err(e) = bot
        .set_my_commands(vec![
            teloxide::types::BotCommand::new("start", "Show what the bot does"),
            teloxide::types::BotCommand::new("help", "Show help"),
        ])
        .await
    {
        tracing::warn!("Failed to set commands: {}", e);
    }

    let outbox: Arc<dyn Outbox> = Arc::new(TelegramOutbox::new(bot.clone()));
    let (router, queue) = build_router(&settings, outbox).await?;
    let access = Access {
        admins_only: settings.access.admins_only,
    };

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    tracing::info!("Telegram dispatcher running");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router, access])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    if let Some(queue) = queue {
        queue.stop().await;
    }
    tracing::info!("Telegram bot stopped");
    Ok(())
}

async fn build_router(
    settings: &Settings,
    outbox: Arc<dyn Outbox>,
) -> Result<(Arc<Router>, Option<Arc<JobQueue>>), Error> {
    let mut scheduler = SchedulerAdapter::new(
        Arc::clone(&outbox),
        chrono::Duration::seconds(settings.schedule.min_delay_seconds),
        settings.schedule.past_due,
    );

    let queue = if settings.schedule.use_job_queue {
        let queue = Arc::new(JobQueue::new(std::time::Duration::from_millis(
            settings.schedule.queue_tick_millis,
        )));
        queue.start(Arc::clone(&outbox)).await;
        scheduler = scheduler.with_executor(queue.clone());
        Some(queue)
    } else {
        tracing::warn!("Job queue disabled; notices use in-process timers");
        None
    };

    let router = Router::new(settings, Arc::new(EngineState::new()), outbox, scheduler)?;
    Ok((Arc::new(router), queue))
}

fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    Some(command.split('@').next().unwrap_or(command))
}

async fn on_message(bot: Bot, msg: Message, router: Arc<Router>, access: Access) -> HandlerResult {
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };

    if let Some(command) = command_name(text) {
        if matches!(command, "start" | "help") {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
        }
        return Ok(());
    }

    if !access.allows(&bot, &msg.chat, msg.from.as_ref()).await? {
        tracing::debug!("Ignoring message from non-admin in chat {}", msg.chat.id);
        return Ok(());
    }

    let inbound = Inbound {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: text.to_string(),
        reply_to_text: msg
            .reply_to_message()
            .and_then(|reply| reply.text())
            .map(str::to_string),
    };

    match router.handle_message(&inbound, Utc::now()).await {
        Ok(handled) => {
            tracing::debug!(chat_id = inbound.chat_id, ?handled, "Message handled");
        }
        Err(e) => {
            tracing::error!("Failed to handle message in chat {}: {}", inbound.chat_id, e);
            bot.send_message(msg.chat.id, FAILURE_TEXT).await?;
        }
    }
    Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, router: Arc<Router>, access: Access) -> HandlerResult {
    let (Some(data), Some(message)) = (q.data.clone(), q.message.as_ref()) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return Ok(());
    };

    if !access.allows(&bot, message.chat(), Some(&q.from)).await? {
        bot.answer_callback_query(q.id.clone())
            .text("Only chat admins can use this.")
            .await?;
        return Ok(());
    }

    let event = CallbackEvent {
        chat_id: message.chat().id.0,
        message_id: Some(message.id().0),
        data,
    };

    let toast = match router.handle_callback(&event, Utc::now()).await {
        Ok(toast) => toast,
        Err(e) => {
            tracing::error!("Failed to handle button in chat {}: {}", event.chat_id, e);
            Some("Something went wrong".to_string())
        }
    };

    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Some(toast) = toast {
        answer = answer.text(toast);
    }
    answer.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outbox::testing::RecordingOutbox;

    #[test]
    fn test_command_name() {
        assert_eq!(command_name("/start"), Some("start"));
        assert_eq!(command_name("/help@trip_bot extra"), Some("help"));
        assert_eq!(command_name("Add 50"), None);
    }

    #[tokio::test]
    async fn test_malformed_settings_stop_startup() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"access":{"admins_only":true},}"#).unwrap();

        let result = run_telegram_daemon_with(&path, Some("123:abc".to_string())).await;
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_missing_settings_need_a_token() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = run_telegram_daemon_with(&dir.path().join("settings.json"), None).await;
        assert!(matches!(result, Err(Error::Telegram(_))));
    }

    #[tokio::test]
    async fn test_build_router_with_queue() {
        let outbox: Arc<dyn Outbox> = Arc::new(RecordingOutbox::new());
        let (router, queue) = build_router(&Settings::default(), outbox).await.unwrap();
        let queue = queue.unwrap();
        assert!(queue.is_running().await);
        assert_eq!(router.planner().catalog().len(), 7);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_build_router_without_queue() {
        let mut settings = Settings::default();
        settings.schedule.use_job_queue = false;
        let outbox: Arc<dyn Outbox> = Arc::new(RecordingOutbox::new());
        let (_, queue) = build_router(&settings, outbox).await.unwrap();
        assert!(queue.is_none());
    }
}
