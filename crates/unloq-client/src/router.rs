//! Inbound event routing.

use std::panic::{AssertUnwindSafe, catch_unwind};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};
use unloq_core::SubscriptionRegistry;
use unloq_core::event::split_envelope;

/// Deliver one inbound event to the matching callbacks of its namespace.
///
/// Callbacks run in registration order on a snapshot taken under the
/// registry lock, so they may change subscriptions themselves. A panicking
/// callback is logged and skipped. Returns how many callbacks were invoked.
pub(crate) fn route_event(registry: &Mutex<SubscriptionRegistry>, raw: Value) -> usize {
    let Some((namespace, delivery)) = split_envelope(raw) else {
        debug!("dropping event without a namespace");
        return 0;
    };

    let targets = registry.lock().snapshot(&namespace);
    if targets.is_empty() {
        debug!(namespace = %namespace, "dropping event for unknown namespace");
        return 0;
    }

    let mut invoked = 0;
    for (filter, callback) in targets {
        if !filter.matches(&delivery.event_type) {
            continue;
        }
        invoked += 1;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback.call(&delivery))) {
            error!(
                namespace = %namespace,
                event_type = %delivery.event_type,
                panic = panic_message(panic.as_ref()),
                "event callback panicked"
            );
        }
    }
    invoked
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
