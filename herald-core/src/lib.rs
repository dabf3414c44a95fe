// ABOUTME: Platform-agnostic core of the subscriber broadcast bot
// ABOUTME: Registry persistence, command handling, and the broadcast scheduling loop

pub mod broadcast;
pub mod commands;
pub mod config;
pub mod context;
pub mod handlers;
pub mod metrics;
pub mod paths;
pub mod registry;
pub mod scheduler;
pub mod testing;
pub mod traits;

pub use broadcast::{CycleReport, DeliveryEngine};
pub use commands::{parse_message, BotCommand, ParseResult};
pub use context::AppContext;
pub use registry::{
    PruneStrategy, RegistryError, RegistryStore, SubscribeOutcome, SubscriberId,
    SubscriberRegistry, SubscriberSet, UnsubscribeOutcome,
};
pub use scheduler::{BroadcastHandle, BroadcastScheduler};
pub use traits::{
    CommandStream, DeliveryError, InboundCommand, InteractiveAction, MessageTransport,
    OutgoingMessage,
};
