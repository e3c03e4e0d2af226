use futures_core::future::BoxFuture;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use thiserror::Error;

pub type Bot = teloxide::adaptors::Throttle<teloxide::Bot>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

/// Delivers a rendered MarkdownV2 message to a chat.
pub trait Notifier: Send + Sync {
    fn notify(&self, chat_id: ChatId, message: String) -> BoxFuture<'_, Result<(), Error>>;
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(&self, chat_id: ChatId, message: String) -> Result<(), Error> {
        self.bot
            .send_message(chat_id, message)
            .parse_mode(ParseMode::MarkdownV2)
            .await?;
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, chat_id: ChatId, message: String) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(self.send(chat_id, message))
    }
}
