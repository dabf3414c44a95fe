// ABOUTME: Telegram transport for the broadcast bot built on teloxide long polling
// ABOUTME: Sends HTML messages with a web-app button and streams /start and /stop commands

use anyhow::{Context, Result};
use async_trait::async_trait;
use herald_core::config::TelegramConfig;
use herald_core::{
    parse_message, CommandStream, DeliveryError, InboundCommand, InteractiveAction,
    MessageTransport, OutgoingMessage, ParseResult, SubscriberId,
};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, UpdateKind, WebAppInfo,
};
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Long-poll timeout passed to getUpdates, in seconds
const POLL_TIMEOUT_SECS: u32 = 30;
/// Backoff after a failed getUpdates call
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// TelegramTransport
// =============================================================================

pub struct TelegramTransport {
    bot: Bot,
    /// Username from getMe, used to accept `/cmd@username` in groups
    bot_username: String,
    bot_user_id: u64,
    shutdown: CancellationToken,
}

impl TelegramTransport {
    /// Create a transport and verify the token with a `getMe` call.
    pub async fn new(config: &TelegramConfig) -> Result<Self> {
        let bot = Bot::new(&config.bot_token);

        let me = bot.get_me().await.context("Failed to call Telegram getMe")?;
        let bot_username = me.username().to_string();

        tracing::info!(
            bot_username = %bot_username,
            bot_id = me.id.0,
            "Telegram bot authenticated"
        );

        Ok(Self {
            bot,
            bot_username,
            bot_user_id: me.id.0,
            shutdown: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(
        &self,
        recipient: SubscriberId,
        message: OutgoingMessage,
    ) -> std::result::Result<(), DeliveryError> {
        let mut request = self
            .bot
            .send_message(ChatId(recipient.get()), message.text)
            .parse_mode(ParseMode::Html);
        if let Some(action) = message.action.as_ref() {
            request = request.reply_markup(build_keyboard(action));
        }

        request.await.map(|_| ()).map_err(map_request_error)
    }

    async fn commands(&self) -> Result<CommandStream> {
        let (tx, rx) = mpsc::channel(256);
        let bot = self.bot.clone();
        let bot_username = self.bot_username.clone();
        let bot_user_id = self.bot_user_id;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut offset: i32 = 0;

            loop {
                let poll = bot.get_updates().offset(offset).timeout(POLL_TIMEOUT_SECS);
                let result = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = poll.send() => result,
                };

                let updates = match result {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!(
                            platform = "telegram",
                            error = %e,
                            "Long polling error, retrying in 5s"
                        );
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                        }
                    }
                };

                for update in &updates {
                    offset = update.id.as_offset();

                    let UpdateKind::Message(message) = &update.kind else {
                        continue;
                    };
                    let Some(text) = message.text() else {
                        continue;
                    };
                    let Some(from) = message.from.as_ref() else {
                        continue;
                    };

                    // Skip messages from the bot itself
                    if from.id.0 == bot_user_id {
                        continue;
                    }

                    let Some(command) = command_from_text(
                        from.id.0,
                        message.chat.id.0,
                        message.id.0,
                        text,
                        &bot_username,
                    ) else {
                        continue;
                    };

                    if tx.send(command).await.is_err() {
                        tracing::warn!(platform = "telegram", "Command stream receiver dropped");
                        return;
                    }
                }
            }

            tracing::debug!(platform = "telegram", "Long polling stopped");
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn platform_id(&self) -> &'static str {
        "telegram"
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!(platform = "telegram", "Shutting down Telegram transport");
        self.shutdown.cancel();
        Ok(())
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Inline keyboard with a single button for the message's action
pub fn build_keyboard(action: &InteractiveAction) -> InlineKeyboardMarkup {
    match action {
        InteractiveAction::OpenWebApp { label, url } => {
            InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::web_app(
                label.clone(),
                WebAppInfo { url: url.clone() },
            )]])
        }
    }
}

/// Classify a failed Bot API call for the delivery engine.
pub fn map_request_error(error: RequestError) -> DeliveryError {
    match error {
        RequestError::Api(api) => map_api_error(api),
        RequestError::RetryAfter(secs) => DeliveryError::RateLimited {
            retry_after: secs.duration(),
        },
        RequestError::Network(e) => DeliveryError::Network(e.to_string()),
        RequestError::Io(e) => DeliveryError::Network(e.to_string()),
        other => DeliveryError::Rejected(other.to_string()),
    }
}

fn map_api_error(error: ApiError) -> DeliveryError {
    match error {
        ApiError::BotBlocked | ApiError::BotKicked | ApiError::BotKickedFromSupergroup => {
            DeliveryError::Blocked
        }
        ApiError::ChatNotFound | ApiError::UserNotFound => DeliveryError::ChatNotFound,
        ApiError::UserDeactivated => DeliveryError::Deactivated,
        other => DeliveryError::Rejected(other.to_string()),
    }
}

/// Build an inbound command from a text message, or `None` when the text is
/// not a command for this bot.
pub fn command_from_text(
    sender: u64,
    chat_id: i64,
    message_id: i32,
    text: &str,
    bot_username: &str,
) -> Option<InboundCommand> {
    match parse_message(text, Some(bot_username)) {
        ParseResult::Command { command, payload } => Some(InboundCommand {
            sender: SubscriberId(sender as i64),
            chat: SubscriberId(chat_id),
            command,
            payload,
            event_id: format!("{}:{}", chat_id, message_id),
        }),
        ParseResult::Ignore => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::BotCommand;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_telegram_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TelegramTransport>();
    }

    #[test]
    fn test_build_keyboard_single_web_app_button() {
        let url = url::Url::parse("https://igor8link.github.io/").unwrap();
        let markup = build_keyboard(&InteractiveAction::open_web_app("Открыть Web App", url));

        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 1);
        let button = &markup.inline_keyboard[0][0];
        assert_eq!(button.text, "Открыть Web App");
        match &button.kind {
            InlineKeyboardButtonKind::WebApp(info) => {
                assert_eq!(info.url.as_str(), "https://igor8link.github.io/")
            }
            other => panic!("expected web app button, got {:?}", other),
        }
    }

    #[test]
    fn test_map_api_errors() {
        assert_eq!(
            map_request_error(RequestError::Api(ApiError::BotBlocked)),
            DeliveryError::Blocked
        );
        assert_eq!(
            map_request_error(RequestError::Api(ApiError::ChatNotFound)),
            DeliveryError::ChatNotFound
        );
        assert_eq!(
            map_request_error(RequestError::Api(ApiError::UserDeactivated)),
            DeliveryError::Deactivated
        );
        assert!(matches!(
            map_request_error(RequestError::Api(ApiError::MessageTextIsEmpty)),
            DeliveryError::Rejected(_)
        ));
    }

    #[test]
    fn test_command_from_private_text() {
        let command = command_from_text(42, 42, 7, "/start", "kiddzone_bot").unwrap();
        assert_eq!(command.sender, SubscriberId(42));
        assert_eq!(command.chat, SubscriberId(42));
        assert_eq!(command.command, BotCommand::Start);
        assert_eq!(command.event_id, "42:7");
    }

    #[test]
    fn test_command_from_group_text_addressed_to_bot() {
        let command =
            command_from_text(42, -100123, 1, "/stop@Kiddzone_Bot", "kiddzone_bot").unwrap();
        assert_eq!(command.sender, SubscriberId(42));
        assert_eq!(command.chat, SubscriberId(-100123));
        assert_eq!(command.command, BotCommand::Stop);
    }

    #[test]
    fn test_non_commands_are_dropped() {
        assert!(command_from_text(42, 42, 1, "hello", "kiddzone_bot").is_none());
        assert!(command_from_text(42, 42, 1, "/help", "kiddzone_bot").is_none());
        assert!(command_from_text(42, 42, 1, "/start@other_bot", "kiddzone_bot").is_none());
    }
}
