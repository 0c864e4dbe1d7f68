//! Telegram implementation of the outbound seam.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ReplyParameters};

use crate::core::outbox::{Control, Outbound, Outbox};
use crate::error::Result;

pub fn keyboard(control: &Control) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(control.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.data.clone()))
            .collect::<Vec<_>>()
    }))
}

#[derive(Clone)]
pub struct TelegramOutbox {
    bot: Bot,
}

impl TelegramOutbox {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Outbox for TelegramOutbox {
    async fn send(&self, message: Outbound) -> Result<i32> {
        let mut request = self.bot.send_message(ChatId(message.chat_id), message.text);
        if let Some(reply_to) = message.reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)).allow_sending_without_reply());
        }
        if let Some(control) = &message.control {
            request = request.reply_markup(keyboard(control));
        }
        if message.silent {
            request = request.disable_notification(true);
        }

        let sent = request.await?;
        Ok(sent.id.0)
    }

    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        control: Option<&Control>,
    ) -> Result<()> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        if let Some(control) = control {
            request = request.reply_markup(keyboard(control));
        }
        request.await?;
        Ok(())
    }
}
