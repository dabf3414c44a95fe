// ABOUTME: Long-lived broadcast scheduler task with an owned, cancellable handle
// ABOUTME: Waits a startup delay, then alternates broadcast cycles and fixed idle waits

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::DeliveryEngine;
use crate::context::AppContext;

/// Spawns the broadcast loop.
pub struct BroadcastScheduler;

impl BroadcastScheduler {
    /// Start the broadcast loop on the current runtime.
    pub fn spawn(ctx: AppContext) -> BroadcastHandle {
        Self::spawn_with_token(ctx, CancellationToken::new())
    }

    /// Start the broadcast loop, stopping when `token` (or a parent of it) is cancelled.
    pub fn spawn_with_token(ctx: AppContext, token: CancellationToken) -> BroadcastHandle {
        let task_token = token.clone();
        let join_handle = tokio::spawn(async move { run_scheduler(ctx, task_token).await });

        BroadcastHandle {
            join_handle,
            cancellation_token: token,
        }
    }
}

/// Handle owned by the process supervisor.
pub struct BroadcastHandle {
    join_handle: JoinHandle<u64>,
    cancellation_token: CancellationToken,
}

impl BroadcastHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Stop the loop and wait for it. An in-flight cycle finishes first
    /// unless cycles are configured as interruptible. Returns the number of
    /// cycles that ran.
    pub async fn shutdown(self) -> Result<u64> {
        self.cancellation_token.cancel();
        self.join_handle
            .await
            .context("Broadcast scheduler task failed")
    }
}

/// Scheduler loop: startup delay, then cycle / idle-wait forever.
///
/// The idle wait is measured from the end of the previous cycle and starts
/// regardless of how that cycle went. Returns the number of cycles run once
/// cancelled.
pub async fn run_scheduler(ctx: AppContext, cancel: CancellationToken) -> u64 {
    let interval = ctx.broadcast.interval();
    tracing::info!(
        interval_secs = interval.as_secs(),
        startup_delay_ms = ctx.broadcast.startup_delay_ms,
        send_delay_ms = ctx.broadcast.send_delay_ms,
        "Starting broadcast scheduler"
    );

    let mut cycles: u64 = 0;

    if wait_or_cancel(ctx.broadcast.startup_delay(), &cancel).await {
        loop {
            DeliveryEngine::run_cycle(&ctx, &cancel).await;
            cycles += 1;

            if cancel.is_cancelled() || !wait_or_cancel(interval, &cancel).await {
                break;
            }
        }
    }

    tracing::info!(cycles, "Broadcast scheduler stopped");
    cycles
}

/// Sleep for `duration`; returns false if cancelled first.
async fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
