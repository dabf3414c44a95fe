// ABOUTME: Transport capability consumed by handlers and the delivery engine
// ABOUTME: Typed outgoing messages, inbound commands, and per-recipient delivery errors

use anyhow::Result;
use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;
use url::Url;

use crate::commands::BotCommand;
use crate::registry::SubscriberId;

// =============================================================================
// Outgoing messages
// =============================================================================

/// Attachment that opens something inside the messaging client when tapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveAction {
    /// Button that opens an external web application
    OpenWebApp { label: String, url: Url },
}

impl InteractiveAction {
    pub fn open_web_app(label: impl Into<String>, url: Url) -> Self {
        Self::OpenWebApp {
            label: label.into(),
            url,
        }
    }
}

/// A message addressed to one recipient. Text is HTML-formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub action: Option<InteractiveAction>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: InteractiveAction) -> Self {
        self.action = Some(action);
        self
    }
}

// =============================================================================
// Inbound commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    /// Who issued the command; this is the identifier kept in the registry
    pub sender: SubscriberId,
    /// Where the reply goes (equal to `sender` in private chats)
    pub chat: SubscriberId,
    pub command: BotCommand,
    /// Text after the command name, e.g. a deep-link payload for /start
    pub payload: String,
    /// Platform-specific event ID
    pub event_id: String,
}

pub type CommandStream = Pin<Box<dyn Stream<Item = InboundCommand> + Send>>;

// =============================================================================
// Delivery errors
// =============================================================================

/// Why a single send failed. Only failures that say something about the
/// recipient (`drops_recipient`) unsubscribe them; the rest are about the
/// platform or the message and leave the registry alone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("recipient blocked the bot")]
    Blocked,

    #[error("chat not found")]
    ChatNotFound,

    #[error("recipient account is deactivated")]
    Deactivated,

    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("rejected by platform: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),
}

impl DeliveryError {
    /// True when the recipient can no longer be reached: they blocked the
    /// bot, the chat is gone, or the account was deleted.
    pub fn drops_recipient(&self) -> bool {
        matches!(
            self,
            DeliveryError::Blocked | DeliveryError::ChatNotFound | DeliveryError::Deactivated
        )
    }

    /// Short label used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Blocked => "blocked",
            DeliveryError::ChatNotFound => "chat_not_found",
            DeliveryError::Deactivated => "deactivated",
            DeliveryError::RateLimited { .. } => "rate_limited",
            DeliveryError::Rejected(_) => "rejected",
            DeliveryError::Network(_) => "network",
        }
    }
}

// =============================================================================
// MessageTransport
// =============================================================================

/// The messaging platform as seen by the core: send to a recipient, and
/// receive recognized commands.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver one message. The outcome is typed so the delivery engine can
    /// tell an unreachable recipient apart from a bug in the caller.
    async fn send(
        &self,
        recipient: SubscriberId,
        message: OutgoingMessage,
    ) -> std::result::Result<(), DeliveryError>;

    /// Stream of recognized inbound commands
    async fn commands(&self) -> Result<CommandStream>;

    /// Platform identifier (e.g., "telegram")
    fn platform_id(&self) -> &'static str;

    /// Close the platform session
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
