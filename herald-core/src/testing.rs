// ABOUTME: In-memory MessageTransport for tests - records sends, scripts failures.
// ABOUTME: Allows deterministic handler and broadcast tests without a real bot.
//!
//! # Example
//!
//! ```no_run
//! use herald_core::testing::MockTransport;
//! use herald_core::{DeliveryError, SubscriberId};
//!
//! let transport = MockTransport::new().fail_for(SubscriberId(2), DeliveryError::Blocked);
//! assert!(transport.sent().is_empty());
//! ```

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::registry::SubscriberId;
use crate::traits::{
    CommandStream, DeliveryError, InboundCommand, MessageTransport, OutgoingMessage,
};

/// One recorded call to `send`
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub recipient: SubscriberId,
    pub message: OutgoingMessage,
    /// Tokio clock time of the call (honors paused time in tests)
    pub at: Instant,
    /// Whether the mock reported success
    pub delivered: bool,
}

/// Mock transport for testing
#[derive(Clone)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failures: Arc<Mutex<HashMap<SubscriberId, DeliveryError>>>,
    command_tx: mpsc::UnboundedSender<InboundCommand>,
    command_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<InboundCommand>>>>,
    shutdown_calls: Arc<Mutex<usize>>,
    fail_shutdown: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock where every send succeeds
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            command_tx,
            command_rx: Arc::new(Mutex::new(Some(command_rx))),
            shutdown_calls: Arc::new(Mutex::new(0)),
            fail_shutdown: false,
        }
    }

    /// Every send to `recipient` fails with `error`
    pub fn fail_for(self, recipient: SubscriberId, error: DeliveryError) -> Self {
        self.set_failure(recipient, error);
        self
    }

    /// `shutdown()` returns an error
    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn set_failure(&self, recipient: SubscriberId, error: DeliveryError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(recipient, error);
        }
    }

    /// Queue an inbound command for the stream returned by `commands()`
    pub fn push_command(&self, command: InboundCommand) {
        let _ = self.command_tx.send(command);
    }

    /// Every send attempt so far, in call order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Recipients of every send attempt, in call order
    pub fn recipients(&self) -> Vec<SubscriberId> {
        self.sent().into_iter().map(|s| s.recipient).collect()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn send(
        &self,
        recipient: SubscriberId,
        message: OutgoingMessage,
    ) -> std::result::Result<(), DeliveryError> {
        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|f| f.get(&recipient).cloned());

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                recipient,
                message,
                at: Instant::now(),
                delivered: failure.is_none(),
            });
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn commands(&self) -> Result<CommandStream> {
        let rx = self
            .command_rx
            .lock()
            .ok()
            .and_then(|mut rx| rx.take())
            .ok_or_else(|| anyhow::anyhow!("Mock command stream already taken"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    fn platform_id(&self) -> &'static str {
        "mock"
    }

    async fn shutdown(&self) -> Result<()> {
        if let Ok(mut calls) = self.shutdown_calls.lock() {
            *calls += 1;
        }
        if self.fail_shutdown {
            anyhow::bail!("mock shutdown failure");
        }
        Ok(())
    }
}
