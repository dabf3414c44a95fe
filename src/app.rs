// ABOUTME: Process supervisor that runs command handling and the broadcast loop together
// ABOUTME: Owns the scheduler handle and shuts everything down on the stop signal

use anyhow::{Context, Result};
use futures_util::StreamExt;
use herald_core::handlers;
use herald_core::{AppContext, BroadcastScheduler, CommandStream};
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What a run did, reported after shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub commands_handled: u64,
    pub broadcast_cycles: u64,
}

/// Run until Ctrl+C.
pub async fn run(ctx: AppContext) -> Result<RunSummary> {
    run_until(ctx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
        }
    })
    .await
}

/// Run command handling and the broadcast scheduler until `shutdown`
/// resolves or the command stream ends.
///
/// Shutdown order: stop taking commands, let in-flight handlers finish, stop
/// the scheduler (a running cycle completes unless cycles are interruptible),
/// then close the transport.
pub async fn run_until<F>(ctx: AppContext, shutdown: F) -> Result<RunSummary>
where
    F: Future<Output = ()>,
{
    let commands = ctx
        .transport
        .commands()
        .await
        .context("Failed to open command stream")?;

    let root = CancellationToken::new();
    let scheduler = BroadcastScheduler::spawn_with_token(ctx.clone(), root.child_token());
    let mut consumer = tokio::spawn(consume_commands(
        ctx.clone(),
        commands,
        root.child_token(),
    ));

    tracing::info!(
        platform = ctx.transport.platform_id(),
        "Bot ready, listening for /start and /stop"
    );

    let mut consumer_result = None;
    tokio::select! {
        _ = shutdown => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
        result = &mut consumer => {
            tracing::warn!("Command stream ended, shutting down");
            consumer_result = Some(result);
        }
    }

    root.cancel();

    let commands_handled = match consumer_result {
        Some(result) => result,
        None => consumer.await,
    }
    .context("Command consumer task failed")?;

    let broadcast_cycles = scheduler.shutdown().await?;

    if let Err(e) = ctx.transport.shutdown().await {
        tracing::warn!(error = %e, "Transport shutdown failed");
    }

    let summary = RunSummary {
        commands_handled,
        broadcast_cycles,
    };
    tracing::info!(
        commands_handled = summary.commands_handled,
        broadcast_cycles = summary.broadcast_cycles,
        "Shutdown complete"
    );
    Ok(summary)
}

/// Dispatch each inbound command on its own task so a slow reply never holds
/// up the next command. Returns the number of commands handled.
async fn consume_commands(
    ctx: AppContext,
    mut commands: CommandStream,
    cancel: CancellationToken,
) -> u64 {
    let mut in_flight = JoinSet::new();
    let mut handled: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Command handler task panicked");
                }
            }
            next = commands.next() => {
                let Some(command) = next else {
                    break;
                };
                handled += 1;
                let ctx = ctx.clone();
                in_flight.spawn(async move {
                    handlers::dispatch(&ctx, &command).await;
                });
            }
        }
    }

    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Command handler task panicked");
        }
    }

    handled
}
