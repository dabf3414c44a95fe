// ABOUTME: /start and /stop command handlers that mutate the subscriber registry
// ABOUTME: Each inbound command yields one reply and at most one registry write

use crate::commands::BotCommand;
use crate::context::AppContext;
use crate::metrics;
use crate::registry::{SubscribeOutcome, SubscriberId, UnsubscribeOutcome};
use crate::traits::{InboundCommand, OutgoingMessage};

/// What a handler did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Start(SubscribeOutcome),
    Stop(UnsubscribeOutcome),
}

/// Route an inbound command to its handler.
pub async fn dispatch(ctx: &AppContext, command: &InboundCommand) -> HandlerOutcome {
    tracing::debug!(
        command = %command.command,
        sender = %command.sender,
        event_id = %command.event_id,
        "Handling command"
    );

    match command.command {
        BotCommand::Start => {
            HandlerOutcome::Start(handle_start(ctx, command.sender, command.chat).await)
        }
        BotCommand::Stop => {
            HandlerOutcome::Stop(handle_stop(ctx, command.sender, command.chat).await)
        }
    }
}

/// Subscribe the sender if needed, then send the welcome message with the
/// open-app button. The welcome goes out whether or not the sender was new.
pub async fn handle_start(
    ctx: &AppContext,
    sender: SubscriberId,
    chat: SubscriberId,
) -> SubscribeOutcome {
    let outcome = ctx.registry.subscribe(sender);
    match outcome {
        SubscribeOutcome::Added => {
            metrics::record_subscribed();
            tracing::info!(subscriber_id = %sender, "Added new subscriber");
        }
        SubscribeOutcome::AlreadySubscribed => {
            tracing::info!(subscriber_id = %sender, "Subscriber already registered");
        }
    }

    reply(ctx, chat, ctx.welcome_message()).await;
    outcome
}

/// Remove the sender if subscribed and confirm; otherwise tell them they
/// were not subscribed. The registry is untouched in the second case.
pub async fn handle_stop(
    ctx: &AppContext,
    sender: SubscriberId,
    chat: SubscriberId,
) -> UnsubscribeOutcome {
    let outcome = ctx.registry.unsubscribe(sender);
    let text = match outcome {
        UnsubscribeOutcome::Removed => {
            metrics::record_removed("command", 1);
            tracing::info!(subscriber_id = %sender, "Subscriber opted out");
            ctx.messages.unsubscribed.clone()
        }
        UnsubscribeOutcome::NotSubscribed => {
            tracing::debug!(subscriber_id = %sender, "Opt-out from unknown subscriber");
            ctx.messages.not_subscribed.clone()
        }
    };

    reply(ctx, chat, OutgoingMessage::text(text)).await;
    outcome
}

async fn reply(ctx: &AppContext, chat: SubscriberId, message: OutgoingMessage) {
    if let Err(e) = ctx.transport.send(chat, message).await {
        tracing::warn!(
            chat_id = %chat,
            error = %e,
            "Failed to send command reply"
        );
    }
}
