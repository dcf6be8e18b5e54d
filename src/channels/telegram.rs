use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;

use crate::traits::OutboundNotifier;

/// Telegram transport for rendered alerts. Transport failures surface as
/// errors for the caller to log; nothing here retries.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot: Bot::new(bot_token),
        }
    }
}

#[async_trait]
impl OutboundNotifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }
}
