//! Settings types and their resolution into connection options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, SettingsError};

/// Gateway used when none is configured.
pub const DEFAULT_GATEWAY: &str = "https://events.unloq.io";
/// Environment variable holding the API key.
pub const KEY_ENV: &str = "UNLOQ_KEY";
/// Environment variable overriding the gateway.
pub const GATEWAY_ENV: &str = "UNLOQ_GATEWAY";
/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "UNLOQ_LOG_LEVEL";

/// Request path the gateway serves its socket on.
pub const ENFORCED_PATH: &str = "/ws";
/// Reconnection delay the gateway expects clients to use.
pub const ENFORCED_RECONNECTION_DELAY_MS: u64 = 2000;
/// Connect timeout applied to every attempt.
pub const ENFORCED_TIMEOUT_MS: u64 = 2000;
/// `user-agent` header value sent on the handshake.
pub const USER_AGENT: &str = "unloq-events";

/// Root settings for the events client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventsSettings {
    /// Gateway base URL (`http(s)://` or `ws(s)://`).
    pub gateway: String,
    /// API key. Falls back to `UNLOQ_KEY` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Options passed through to the transport.
    pub transport: TransportSettings,
    /// Logging settings (used by binaries).
    pub logging: LoggingSettings,
}

impl Default for EventsSettings {
    fn default() -> Self {
        Self {
            gateway: DEFAULT_GATEWAY.to_string(),
            key: None,
            transport: TransportSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Transport connection options.
///
/// Some of these are overridden on [`EventsSettings::resolve`]; see the
/// `ENFORCED_*` constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Request path of the socket endpoint.
    pub path: String,
    /// Whether the transport reconnects on its own after losing the connection.
    pub reconnection: bool,
    /// Maximum consecutive reconnection attempts (`None` = unbounded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnection_attempts: Option<u32>,
    /// Initial delay between reconnection attempts in milliseconds.
    pub reconnection_delay_ms: u64,
    /// Upper bound for the exponential reconnection delay in milliseconds.
    pub reconnection_delay_max_ms: u64,
    /// Jitter applied to reconnection delays (0.0–1.0).
    pub randomization_factor: f64,
    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Extra headers sent with the handshake request.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            path: ENFORCED_PATH.to_string(),
            reconnection: true,
            reconnection_attempts: None,
            reconnection_delay_ms: ENFORCED_RECONNECTION_DELAY_MS,
            reconnection_delay_max_ms: 5000,
            randomization_factor: 0.0,
            timeout_ms: ENFORCED_TIMEOUT_MS,
            extra_headers: BTreeMap::new(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Settings after defaults, credential lookup, and enforced overrides.
#[derive(Clone, Debug)]
pub struct ResolvedSettings {
    /// Gateway base URL as configured.
    pub gateway: String,
    /// API key in use.
    pub key: String,
    /// Transport options with overrides applied.
    pub transport: TransportSettings,
    url: Url,
}

impl ResolvedSettings {
    /// WebSocket URL of the gateway socket endpoint.
    pub fn websocket_url(&self) -> &Url {
        &self.url
    }
}

impl EventsSettings {
    /// Resolve against the process environment.
    pub fn resolve(self) -> Result<ResolvedSettings> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `env` to look up variables.
    ///
    /// Empty gateway → [`DEFAULT_GATEWAY`]; missing key → `UNLOQ_KEY`, then
    /// [`SettingsError::MissingKey`]. The path, reconnection delay, jitter,
    /// timeout, `user-agent`, and `Authorization` header are always
    /// overwritten; other extra headers are kept.
    pub fn resolve_with(self, env: impl Fn(&str) -> Option<String>) -> Result<ResolvedSettings> {
        let gateway = if self.gateway.is_empty() {
            DEFAULT_GATEWAY.to_string()
        } else {
            self.gateway
        };
        let key = self
            .key
            .filter(|k| !k.is_empty())
            .or_else(|| env(KEY_ENV).filter(|k| !k.is_empty()))
            .ok_or(SettingsError::MissingKey(KEY_ENV))?;

        let mut transport = self.transport;
        transport.path = ENFORCED_PATH.to_string();
        transport.reconnection_delay_ms = ENFORCED_RECONNECTION_DELAY_MS;
        transport.randomization_factor = 0.0;
        transport.timeout_ms = ENFORCED_TIMEOUT_MS;
        transport.extra_headers.retain(|name, _| {
            !name.eq_ignore_ascii_case("user-agent") && !name.eq_ignore_ascii_case("authorization")
        });
        let _ = transport
            .extra_headers
            .insert("user-agent".to_string(), USER_AGENT.to_string());
        let _ = transport
            .extra_headers
            .insert("Authorization".to_string(), format!("Bearer {key}"));

        let url = websocket_url(&gateway, &transport.path)?;
        Ok(ResolvedSettings {
            gateway,
            key,
            transport,
            url,
        })
    }
}

/// Map a gateway base URL onto its WebSocket endpoint.
pub fn websocket_url(gateway: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(gateway).map_err(|e| SettingsError::invalid_gateway(gateway, e))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(SettingsError::invalid_gateway(
                gateway,
                format!("unsupported scheme '{other}'"),
            ));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| SettingsError::invalid_gateway(gateway, format!("cannot switch to {scheme}")))?;
    url.set_path(path);
    Ok(url)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
