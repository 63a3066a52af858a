//! # unloq-events
//!
//! Subscribe to one namespace of the events gateway and print every matching
//! event as a JSON line until interrupted.

#![deny(unsafe_code)]

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use unloq_client::{ClientNotification, EventsClient};
use unloq_core::{EventCallback, Filter, Matcher, logging, namespaces};
use unloq_settings::{EventsSettings, load_settings_from_path, settings_path};

/// Print events from the UNLOQ events gateway.
#[derive(Parser, Debug)]
#[command(name = "unloq-events", about = "Print events from the UNLOQ events gateway")]
struct Cli {
    /// Settings file (defaults to `~/.unloq/events.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Gateway URL (overrides settings and `UNLOQ_GATEWAY`).
    #[arg(long)]
    gateway: Option<String>,

    /// API key (overrides settings and `UNLOQ_KEY`).
    #[arg(long)]
    key: Option<String>,

    /// Namespace to subscribe to.
    #[arg(long, default_value = namespaces::IAM)]
    namespace: String,

    /// Only print events of this exact type (repeatable).
    #[arg(long = "type", value_name = "TYPE")]
    types: Vec<String>,

    /// Only print events whose type matches this regex (repeatable).
    #[arg(long = "pattern", value_name = "REGEX")]
    patterns: Vec<String>,

    /// Log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings and apply command-line overrides.
    fn settings(&self) -> Result<EventsSettings> {
        let path = self.settings.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(gateway) = &self.gateway {
            settings.gateway.clone_from(gateway);
        }
        if let Some(key) = &self.key {
            settings.key = Some(key.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }

    /// The filter described by `--type` and `--pattern`.
    fn filter(&self) -> Result<Filter> {
        let mut filter: Filter = self.types.iter().cloned().map(Matcher::from).collect();
        for pattern in &self.patterns {
            filter = filter.with(Matcher::pattern(pattern)?);
        }
        Ok(filter)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    logging::init_subscriber(&settings.logging.level);
    let filter = cli.filter()?;

    let client = EventsClient::new(settings)?;
    let mut notifications = client.notifications();
    let _ = tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            match notification {
                ClientNotification::Connect => info!("connected"),
                ClientNotification::Disconnect { reason, error } => {
                    warn!(reason = %reason, error = ?error, "disconnected");
                }
                ClientNotification::Error(err) => warn!(error = %err, "background error"),
            }
        }
    });

    let print = EventCallback::new(|delivery| {
        let line = serde_json::to_string(delivery).unwrap_or_default();
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
    });

    let _ = client
        .subscribe_filtered(&cli.namespace, filter, print.clone())
        .await
        .with_context(|| format!("Failed to subscribe to {}", cli.namespace))?;
    info!(namespace = %cli.namespace, "subscribed");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    if let Err(err) = client.unsubscribe(&cli.namespace, Some(&print)).await {
        warn!(error = %err, "unsubscribe failed");
    }
    client.close();
    Ok(())
}
