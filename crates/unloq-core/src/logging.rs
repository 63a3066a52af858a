//! Log filter setup for the `unloq-events` binary.
//!
//! The client crates only emit `tracing` events. A configured level applies
//! to the `unloq_*` targets; everything else (tungstenite, rustls, tokio)
//! stays at `warn` so the gateway traffic is readable at `debug`.

use tracing_subscriber::EnvFilter;

/// Crate targets that a bare level is scoped to.
const CLIENT_TARGETS: &[&str] = &[
    "unloq_core",
    "unloq_settings",
    "unloq_client",
    "unloq_events",
];

/// Level for third-party targets when only a bare level is configured.
const DEPENDENCY_LEVEL: &str = "warn";

/// Directive used when the configured level does not parse.
const FALLBACK_LEVEL: &str = "info";

/// Expand a configured log level into an `EnvFilter` directive.
///
/// A bare level such as `debug` is scoped to the client crates. Anything that
/// already names a target (`a=b`) or lists several directives is passed
/// through unchanged.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        return filter_directive(FALLBACK_LEVEL);
    }
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut directive = DEPENDENCY_LEVEL.to_string();
    for target in CLIENT_TARGETS {
        directive.push(',');
        directive.push_str(target);
        directive.push('=');
        directive.push_str(level);
    }
    directive
}

/// Build the filter: `RUST_LOG` when set, otherwise the configured level.
fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(filter_directive(level))
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(FALLBACK_LEVEL)))
}

/// Install the stderr subscriber. Later calls leave the first one in place.
pub fn init_subscriber(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
