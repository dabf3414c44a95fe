// ABOUTME: Delivery engine for one broadcast cycle over a registry snapshot
// ABOUTME: Sends sequentially with a rate-limit pause and prunes unreachable recipients

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::AppContext;
use crate::metrics;
use crate::registry::SubscriberSet;

/// Summary of one broadcast cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Recipients in the snapshot taken at cycle start
    pub recipients: usize,
    /// Sends actually attempted (less than `recipients` only when interrupted)
    pub attempted: usize,
    pub delivered: usize,
    /// Recipients found unreachable and dropped from the registry
    pub removed: SubscriberSet,
    /// Recipients whose send failed for a reason not tied to them; still subscribed
    pub kept: SubscriberSet,
    /// Shutdown stopped the cycle before every recipient was tried
    pub interrupted: bool,
}

impl CycleReport {
    fn new(cycle_id: Uuid, recipients: usize) -> Self {
        let now = Utc::now();
        Self {
            cycle_id,
            started_at: now,
            finished_at: now,
            recipients,
            attempted: 0,
            delivered: 0,
            removed: SubscriberSet::new(),
            kept: SubscriberSet::new(),
            interrupted: false,
        }
    }

    /// True when the registry was empty and nothing was sent
    pub fn is_empty(&self) -> bool {
        self.recipients == 0
    }

    /// Wall-clock time the cycle took
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Runs broadcast cycles against the registry and transport in an `AppContext`.
pub struct DeliveryEngine;

impl DeliveryEngine {
    /// Run one cycle: snapshot, send to each recipient in turn, then write
    /// back the registry without the recipients found unreachable.
    ///
    /// A failed send never aborts the cycle. Failures that are not about the
    /// recipient (network, rate limit, rejected message) keep them subscribed
    /// unless `drop_on_any_failure` is set. With `interruptible_cycles` set,
    /// a cancelled `cancel` token stops the cycle between recipients; removals
    /// observed up to that point are still persisted.
    pub async fn run_cycle(ctx: &AppContext, cancel: &CancellationToken) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        metrics::record_cycle();

        let snapshot = ctx.registry.snapshot();
        let mut report = CycleReport::new(cycle_id, snapshot.len());

        if snapshot.is_empty() {
            tracing::info!(cycle_id = %cycle_id, "Subscriber registry is empty, skipping broadcast");
            return report;
        }

        tracing::info!(
            cycle_id = %cycle_id,
            recipients = snapshot.len(),
            "Starting broadcast"
        );

        let message = ctx.promo_message();
        let send_delay = ctx.broadcast.send_delay();

        for &recipient in &snapshot {
            if ctx.broadcast.interruptible_cycles && cancel.is_cancelled() {
                tracing::warn!(
                    cycle_id = %cycle_id,
                    remaining = snapshot.len() - report.attempted,
                    "Shutdown requested, interrupting broadcast"
                );
                report.interrupted = true;
                break;
            }

            report.attempted += 1;
            match ctx.transport.send(recipient, message.clone()).await {
                Ok(()) => {
                    report.delivered += 1;
                    metrics::record_delivered();
                    tokio::time::sleep(send_delay).await;
                }
                Err(e) => {
                    metrics::record_delivery_failure(e.kind());
                    if e.drops_recipient() || ctx.broadcast.drop_on_any_failure {
                        tracing::warn!(
                            cycle_id = %cycle_id,
                            subscriber_id = %recipient,
                            error = %e,
                            "Failed to deliver broadcast, dropping subscriber"
                        );
                        report.removed.insert(recipient);
                    } else {
                        tracing::warn!(
                            cycle_id = %cycle_id,
                            subscriber_id = %recipient,
                            error = %e,
                            "Failed to deliver broadcast, keeping subscriber"
                        );
                        report.kept.insert(recipient);
                    }
                }
            }
        }

        if !report.removed.is_empty() {
            let remaining = ctx.registry.prune(
                &snapshot,
                &report.removed,
                ctx.broadcast.prune_strategy(),
            );
            metrics::record_removed("unreachable", report.removed.len());
            tracing::info!(
                cycle_id = %cycle_id,
                removed = ?report.removed,
                remaining = remaining.len(),
                "Removed unreachable subscribers"
            );
        }

        report.finished_at = Utc::now();
        tracing::info!(
            cycle_id = %cycle_id,
            attempted = report.attempted,
            delivered = report.delivered,
            removed = report.removed.len(),
            kept_after_failure = report.kept.len(),
            interrupted = report.interrupted,
            started_at = %report.started_at.to_rfc3339(),
            duration_ms = report.duration().num_milliseconds(),
            "Broadcast cycle finished"
        );
        report
    }
}
