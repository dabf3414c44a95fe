// ABOUTME: Root library module for the herald broadcast bot binary
// ABOUTME: Telegram transport, process supervisor, and logging setup on top of herald-core

pub mod app;
pub mod logging;
pub mod platform;

// Re-export the platform-agnostic core
pub use herald_core::config;
pub use herald_core::paths;
pub use herald_core::registry;
pub use herald_core::{AppContext, BroadcastScheduler, DeliveryEngine, SubscriberId};
