//! Per-server session state: one [`ServerSession`] per configured
//! bootstrap or operational server, pairing its protocol engine and
//! lifecycle context with the addressing state the orchestration loop
//! needs to route datagrams and build requests.

use std::{collections::BTreeMap, net::SocketAddr};

use lwm2m_client::{LifecycleContext, PendingRequest};
use lwm2m_core::{AttributeState, Engine, Environment, ObserverStore, QueueHandle};

/// Which role a configured server plays for this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    /// The bootstrap server, addressed via `/bs`.
    Bootstrap,
    /// An operational server, addressed by its short server id.
    Operational {
        /// The short server id this device uses to address the server in
        /// ACLs and in Update/Deregister requests.
        short_server_id: u16,
    },
}

/// Runtime state for one configured server: its protocol engine,
/// lifecycle context, and the addressing state needed to route inbound
/// datagrams back to it and to resume a Register session across Update
/// and Deregister requests.
pub struct ServerSession<E: Environment> {
    /// Which role this server plays.
    pub role: ServerRole,
    /// The server's configured CoAP(s) URI.
    pub server_uri: String,
    /// The resolved peer address, once `resolve_peer` has succeeded.
    pub peer: Option<SocketAddr>,
    /// The sans-IO retransmission engine for this server's exchanges.
    pub engine: Engine<E>,
    /// The lifecycle state machine governing this server's registration.
    pub lifecycle: LifecycleContext<E::Instant>,
    /// The request currently in flight, if any, and the queue handle the
    /// engine assigned it — needed to match an `EngineAction::Deliver`
    /// outcome back to the lifecycle event it completes.
    pub pending: Option<(PendingRequest, QueueHandle)>,
    /// The Location-Path returned by this server's 2.01 Created response
    /// to Register, used to address subsequent Update and Deregister
    /// requests. Empty until a successful Register.
    pub location_path: Option<String>,
    /// Active Observe subscriptions this server holds, keyed by remote
    /// address and resource path. Transport-scoped (an `Observer` carries
    /// a `SocketAddr`), so it lives here rather than in the
    /// transport-agnostic object model.
    pub observers: ObserverStore,
    /// Notification attribute state for every path this server currently
    /// observes, keyed by resource path.
    pub attributes: BTreeMap<String, AttributeState>,
    /// When the observer tick last ran, to compute the elapsed duration
    /// `AttributeState::evaluate` needs.
    pub last_observer_tick: E::Instant,
}

impl<E: Environment> ServerSession<E> {
    /// A freshly configured session with no peer resolved yet and no
    /// request in flight.
    pub fn new(role: ServerRole, server_uri: String, lifecycle: LifecycleContext<E::Instant>, now: E::Instant) -> Self {
        Self {
            role,
            server_uri,
            peer: None,
            engine: Engine::new(),
            lifecycle,
            pending: None,
            location_path: None,
            observers: ObserverStore::new(),
            attributes: BTreeMap::new(),
            last_observer_tick: now,
        }
    }

    /// The short server id this session is addressed as in ACLs, or the
    /// bootstrap sentinel if this is the bootstrap session.
    pub fn short_server_id(&self) -> u16 {
        match self.role {
            ServerRole::Bootstrap => lwm2m_core::registry::BOOTSTRAP_SHORT_SERVER_ID,
            ServerRole::Operational { short_server_id } => short_server_id,
        }
    }

    /// True if `candidate` is the peer this session is talking to.
    pub fn owns_peer(&self, candidate: SocketAddr) -> bool {
        self.peer == Some(candidate)
    }
}
