//! Events and actions crossing the lifecycle state machine's boundary.

use lwm2m_core::engine::ExchangeOutcome;

/// Which of the lifecycle's own outstanding exchanges a completed
/// [`ExchangeOutcome`] belongs to. The context tracks at most one at a
/// time — it never has a Register and an Update both in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRequest {
    /// A Bootstrap-Request sent to the bootstrap server.
    Bootstrap,
    /// A Register request sent to an operational server.
    Register,
    /// An Update request refreshing an existing registration.
    Update,
    /// A Deregister request tearing down a registration.
    Deregister,
}

/// What drives the lifecycle state machine forward, beyond the passage of
/// time (see `LifecycleContext::tick`).
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The exchange previously sent for `request` completed or timed out.
    ExchangeCompleted {
        /// Which exchange this outcome belongs to.
        request: PendingRequest,
        /// What happened.
        outcome: ExchangeOutcome,
    },
    /// The bootstrap server signaled it has finished writing configuration
    /// (an out-of-band event from the bootstrap object, not a CoAP
    /// response — the "bootstrap_done" delayed-work label).
    BootstrapFinished,
    /// `Execute` was invoked on this server's `/1/x/4` (Disable) resource.
    DisableRequested,
    /// `Execute` was invoked on this server's `/1/x/8`
    /// (Registration-Update-Trigger) resource.
    UpdateTriggered,
    /// Establishing the transport for `request` failed before any CoAP
    /// exchange could even be attempted — a DNS/PDN activation or DTLS
    /// handshake failure, distinct from a timed-out exchange.
    ConnectFailed {
        /// Which exchange this would have been.
        request: PendingRequest,
    },
}

/// Work the orchestration layer must perform on behalf of the lifecycle
/// state machine: send a request, log a transition, or drop and rebuild
/// the transport.
#[derive(Debug, Clone)]
pub enum LifecycleAction {
    /// Send a Bootstrap-Request, Register, Update, or Deregister message.
    /// Serialization and retransmission are the message engine's job —
    /// this only says "send this, for this purpose, now".
    SendRequest {
        /// Which exchange this is, so the completed outcome routes back
        /// to the right handler.
        request: PendingRequest,
    },
    /// A human-readable transition or diagnostic message.
    Log(String),
    /// Drop the current transport and reconnect from scratch (a response
    /// timeout after a connection was already established).
    Reconnect,
    /// Swap the configured APN and retry PDN activation.
    SwapApn,
    /// Toggle between IPv6 and IPv4 and retry the connection.
    ToggleIpFamily,
    /// Bootstrap is permanently unrecoverable; surface to the application.
    EmitBootstrapError(String),
}
