// ABOUTME: Counter and gauge helpers for broadcast and registry activity
// ABOUTME: Thin wrappers over the metrics facade so call sites stay one line

use ::metrics::{counter, describe_counter, describe_gauge, gauge};

pub const BROADCAST_CYCLES: &str = "herald_broadcast_cycles_total";
pub const MESSAGES_DELIVERED: &str = "herald_messages_delivered_total";
pub const DELIVERY_FAILURES: &str = "herald_delivery_failures_total";
pub const SUBSCRIBERS_ADDED: &str = "herald_subscribers_added_total";
pub const SUBSCRIBERS_REMOVED: &str = "herald_subscribers_removed_total";
pub const SUBSCRIBERS: &str = "herald_subscribers";

/// Register descriptions with whatever recorder is installed.
pub fn describe() {
    describe_counter!(BROADCAST_CYCLES, "Broadcast cycles started");
    describe_counter!(MESSAGES_DELIVERED, "Broadcast messages accepted by the transport");
    describe_counter!(DELIVERY_FAILURES, "Broadcast sends that failed");
    describe_counter!(SUBSCRIBERS_ADDED, "Subscribers added via /start");
    describe_counter!(SUBSCRIBERS_REMOVED, "Subscribers removed, by reason");
    describe_gauge!(SUBSCRIBERS, "Subscribers in the registry after the last write");
}

pub fn record_cycle() {
    counter!(BROADCAST_CYCLES).increment(1);
}

pub fn record_delivered() {
    counter!(MESSAGES_DELIVERED).increment(1);
}

pub fn record_delivery_failure(kind: &'static str) {
    counter!(DELIVERY_FAILURES, "kind" => kind).increment(1);
}

pub fn record_subscribed() {
    counter!(SUBSCRIBERS_ADDED).increment(1);
}

/// `reason` is "command" for /stop or "unreachable" for failed deliveries
pub fn record_removed(reason: &'static str, count: usize) {
    counter!(SUBSCRIBERS_REMOVED, "reason" => reason).increment(count as u64);
}

pub fn set_subscriber_count(count: usize) {
    gauge!(SUBSCRIBERS).set(count as f64);
}
