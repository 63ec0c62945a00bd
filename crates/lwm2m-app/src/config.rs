//! Orchestration-layer configuration.
//!
//! [`ClientConfig`] is assembled by the CLI from `clap` flags (with
//! `RUST_LOG`-style environment fallback for logging only); the core
//! engines never read process environment themselves.

use lwm2m_client::LifecycleConfig;

/// Log verbosity, mapped onto a `tracing-subscriber` env-filter string by
/// the CLI binary — the only place in the workspace that installs a
/// global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only failures.
    Error,
    /// Failures plus conditions worth a human's attention.
    Warn,
    /// Routine lifecycle transitions.
    #[default]
    Info,
    /// Per-dispatch detail.
    Debug,
    /// Everything, including retransmission bookkeeping.
    Trace,
}

impl LogLevel {
    /// The `tracing-subscriber` `EnvFilter` directive this level maps to.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// One operational server this device registers with, preconfigured
/// rather than learned from a bootstrap exchange.
#[derive(Debug, Clone)]
pub struct OperationalServer {
    /// The server's CoAP(s) URI.
    pub uri: String,
    /// The short server id this device uses to address it in ACLs.
    pub short_server_id: u16,
}

/// Static configuration for one device's server contexts, built from CLI
/// flags at orchestration-layer startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The bootstrap server's URI, if bootstrap is used. Mutually
    /// complementary with `operational_servers` — a device may have
    /// either, or preconfigured operational servers alongside a
    /// bootstrap fallback.
    pub bootstrap_uri: Option<String>,
    /// Preconfigured operational servers, skipping the bootstrap
    /// handshake entirely.
    pub operational_servers: Vec<OperationalServer>,
    /// Overrides the modem oracle's endpoint name, e.g. for testing
    /// against a server that expects a fixed identity.
    pub endpoint_name_override: Option<String>,
    /// Log verbosity for the CLI's `tracing-subscriber`.
    pub log_level: LogLevel,
    /// Lifecycle tuning shared by every configured server context.
    pub lifecycle: LifecycleConfig,
    /// Seconds of real time between forced Confirmable promotions of an
    /// otherwise-NonConfirmable observe notification stream, per server.
    pub coap_con_interval_secs: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootstrap_uri: None,
            operational_servers: Vec::new(),
            endpoint_name_override: None,
            log_level: LogLevel::default(),
            lifecycle: LifecycleConfig::default(),
            coap_con_interval_secs: 86400,
        }
    }
}
