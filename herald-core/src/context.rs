// ABOUTME: Process-wide context shared by command handlers and the broadcast scheduler
// ABOUTME: Built once at startup from Config plus a transport, then passed explicitly

use std::sync::Arc;

use crate::config::{BroadcastConfig, Config, MessagesConfig};
use crate::registry::SubscriberRegistry;
use crate::traits::{InteractiveAction, MessageTransport, OutgoingMessage};

/// Everything a handler or broadcast cycle needs. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub transport: Arc<dyn MessageTransport>,
    pub registry: SubscriberRegistry,
    pub messages: Arc<MessagesConfig>,
    pub broadcast: BroadcastConfig,
}

impl AppContext {
    pub fn new(transport: Arc<dyn MessageTransport>, config: &Config) -> Self {
        Self {
            transport,
            registry: SubscriberRegistry::open(config.registry_path()),
            messages: Arc::new(config.messages.clone()),
            broadcast: config.broadcast.clone(),
        }
    }

    /// Button that opens the shop web app
    pub fn open_app_action(&self) -> InteractiveAction {
        InteractiveAction::open_web_app(
            self.messages.button_label.clone(),
            self.messages.web_app_url.clone(),
        )
    }

    pub fn welcome_message(&self) -> OutgoingMessage {
        OutgoingMessage::text(self.messages.welcome.clone()).with_action(self.open_app_action())
    }

    pub fn promo_message(&self) -> OutgoingMessage {
        OutgoingMessage::text(self.messages.promo.clone()).with_action(self.open_app_action())
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("platform", &self.transport.platform_id())
            .field("registry", &self.registry.store().path())
            .field("broadcast", &self.broadcast)
            .finish()
    }
}
