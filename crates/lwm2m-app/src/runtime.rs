//! Orchestration loop wiring the protocol engine, lifecycle state machine,
//! and object model to a concrete [`Driver`].
//!
//! [`Runtime`] performs no protocol logic of its own — every decision
//! about retransmission, registration timing, or request authorization
//! already happened in `lwm2m-core`/`lwm2m-client`. This module only
//! turns their actions into datagrams and vice versa.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use lwm2m_client::{
    ClientError, DispatchOutcome, ExecuteEffect, LifecycleConfig, LifecycleContext, LifecycleEvent,
    Lwm2mClient, PendingRequest,
    objects::ResourceValue,
};
use lwm2m_core::{
    AttributeSet, AttributeState, CoreError, Environment, NotifyDecision, ObjectHandler, Observer, QueueHandle,
    engine::{EngineAction, ExchangeOutcome},
    registry,
};
use lwm2m_proto::{Code, CoapOption, Message, MessageType, TlvElement, content_format, number};
use tracing::{error, info, warn};

use crate::{
    config::ClientConfig,
    driver::Driver,
    error::DriverError,
    session::{ServerRole, ServerSession},
};

/// Drives every configured server session to completion on each wakeup:
/// resolves peers, routes one inbound datagram, and advances every
/// session's retransmission and lifecycle timers. Callers loop
/// [`Runtime::process_cycle`], sleeping on driver-specific readiness
/// between calls — the exact cadence is the binary's concern, not this
/// crate's.
pub struct Runtime<D, E>
where
    D: Driver<Error = DriverError, Instant = E::Instant>,
    E: Environment,
{
    driver: D,
    env: E,
    client: Lwm2mClient,
    sessions: Vec<ServerSession<E>>,
    con_interval_secs: u32,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Error = DriverError, Instant = E::Instant>,
    E: Environment,
{
    /// Build a runtime with one session per configured server. No peer is
    /// resolved yet; the first request this session sends resolves it.
    pub fn new(driver: D, env: E, client: Lwm2mClient, config: &ClientConfig) -> Self {
        let mut sessions = Vec::new();
        if let Some(uri) = &config.bootstrap_uri {
            sessions.push(ServerSession::new(
                ServerRole::Bootstrap,
                uri.clone(),
                fresh_lifecycle(&env, &config.lifecycle),
                env.now(),
            ));
        }
        for server in &config.operational_servers {
            sessions.push(ServerSession::new(
                ServerRole::Operational { short_server_id: server.short_server_id },
                server.uri.clone(),
                LifecycleContext::new_operational(env.now(), config.lifecycle.clone()),
                env.now(),
            ));
        }
        let con_interval_secs = config.coap_con_interval_secs;
        Self { driver, env, client, sessions, con_interval_secs }
    }

    /// Read-only access to the object model, for `client print`/`client
    /// status` rendering.
    pub fn client(&self) -> &Lwm2mClient {
        &self.client
    }

    /// Mutable access to the object model, for telemetry samples (e.g. a
    /// battery reading) that originate outside any CoAP exchange.
    pub fn client_mut(&mut self) -> &mut Lwm2mClient {
        &mut self.client
    }

    /// Read-only access to every configured session's lifecycle state.
    pub fn sessions(&self) -> &[ServerSession<E>] {
        &self.sessions
    }

    /// Mutable access to every configured session, for tests that need to
    /// seed attribute state a write-attributes request would otherwise
    /// narrow (see the open question in `DESIGN.md` on that gap).
    pub fn sessions_mut(&mut self) -> &mut [ServerSession<E>] {
        &mut self.sessions
    }

    /// Mutable access to the underlying driver, for tests that need to
    /// inject inbound datagrams or inspect what was sent without routing
    /// everything through a real transport.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Poll one datagram and route it, then advance every session's
    /// engine and lifecycle timers. One call is one unit of forward
    /// progress; the binary decides how often to call it.
    pub async fn process_cycle(&mut self) -> Result<(), DriverError> {
        if let Some((bytes, peer)) = self.driver.poll_datagram().await? {
            self.route_datagram(&bytes, peer).await?;
        }

        for index in 0..self.sessions.len() {
            self.drive_engine_tick(index).await?;
            self.drive_lifecycle_tick(index).await?;
            self.drive_observer_tick(index).await?;
        }

        Ok(())
    }

    async fn ensure_peer(&mut self, index: usize) -> Result<SocketAddr, DriverError> {
        if let Some(peer) = self.sessions[index].peer {
            return Ok(peer);
        }
        let uri = self.sessions[index].server_uri.clone();
        let peer = self.driver.resolve_peer(&uri).await?;
        self.sessions[index].peer = Some(peer);
        Ok(peer)
    }

    async fn route_datagram(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), DriverError> {
        let Some(index) = self.sessions.iter().position(|s| s.owns_peer(peer)) else {
            warn!(%peer, "datagram from unrecognized peer, dropping");
            return Ok(());
        };
        let actions = self.sessions[index].engine.on_datagram(bytes, peer);
        self.process_engine_actions(index, actions).await
    }

    async fn drive_engine_tick(&mut self, index: usize) -> Result<(), DriverError> {
        let Some(peer) = self.sessions[index].peer else { return Ok(()) };
        let actions = self.sessions[index].engine.tick(&self.env, peer);
        self.process_engine_actions(index, actions).await
    }

    async fn drive_lifecycle_tick(&mut self, index: usize) -> Result<(), DriverError> {
        let now = self.env.now();
        let actions = self.sessions[index].lifecycle.tick(now);
        self.process_lifecycle_actions(index, actions).await
    }

    /// Evaluate every path this session currently observes against its
    /// attribute state, and send a notification for whichever ones are
    /// due. A resource that's stopped being readable (its instance was
    /// deleted underneath the subscription) drops its observer instead of
    /// erroring the whole tick.
    async fn drive_observer_tick(&mut self, index: usize) -> Result<(), DriverError> {
        let Some(peer) = self.sessions[index].peer else { return Ok(()) };
        if self.sessions[index].attributes.is_empty() {
            return Ok(());
        }

        let now = self.env.now();
        let elapsed = now - self.sessions[index].last_observer_tick;
        self.sessions[index].last_observer_tick = now;

        let elapsed_secs = elapsed.as_secs() as u32;
        let handles: Vec<_> = self.sessions[index].observers.matching(None).into_iter().map(|(h, _)| h).collect();
        for handle in handles {
            if let Some(observer) = self.sessions[index].observers.get_mut(handle) {
                observer.con_notification_epoch = observer.con_notification_epoch.saturating_add(elapsed_secs);
            }
        }

        let requester_ssid = self.sessions[index].short_server_id();
        let requester_is_bootstrap = matches!(self.sessions[index].role, ServerRole::Bootstrap);
        let now_unix = self.driver.now_unix();
        let paths: Vec<String> = self.sessions[index].attributes.keys().cloned().collect();

        for path in paths {
            let segments = path_segments_of(&path);
            let value = match self.client.dispatch(
                &segments,
                Code::GET,
                &[],
                None,
                requester_ssid,
                requester_is_bootstrap,
                now_unix,
            ) {
                Ok(DispatchOutcome::Value(value) | DispatchOutcome::Observed { value, .. }) => value,
                Ok(_) => continue,
                Err(err) => {
                    warn!(?err, %path, "observed resource no longer readable, dropping subscription");
                    if let Some(handle) = self.sessions[index].observers.find(peer, &path) {
                        self.sessions[index].observers.unregister(handle);
                    }
                    self.sessions[index].attributes.remove(&path);
                    continue;
                },
            };

            let decision = self
                .sessions[index]
                .attributes
                .get_mut(&path)
                .expect("path drawn from this session's own attribute map")
                .evaluate(elapsed, numeric_value(&value));
            if decision == NotifyDecision::Skip {
                continue;
            }
            self.send_notification(index, peer, &path, value).await?;
        }
        Ok(())
    }

    async fn process_engine_actions(&mut self, index: usize, actions: Vec<EngineAction>) -> Result<(), DriverError> {
        for action in actions {
            match action {
                EngineAction::Transmit { bytes, peer } => {
                    self.driver.send_datagram(&bytes, peer).await?;
                },
                EngineAction::Deliver { handle, outcome } => {
                    self.complete_pending(index, handle, outcome).await?;
                },
                EngineAction::InboundRequest { message, peer } => {
                    self.handle_inbound_request(index, message, peer).await?;
                },
            }
        }
        Ok(())
    }

    async fn process_lifecycle_actions(
        &mut self,
        index: usize,
        actions: Vec<lwm2m_client::LifecycleAction>,
    ) -> Result<(), DriverError> {
        for action in actions {
            match action {
                lwm2m_client::LifecycleAction::SendRequest { request } => {
                    self.send_lifecycle_request(index, request).await?;
                },
                lwm2m_client::LifecycleAction::Log(message) => {
                    info!(server = %self.sessions[index].server_uri, "{message}");
                },
                lwm2m_client::LifecycleAction::Reconnect => {
                    self.sessions[index].peer = None;
                },
                lwm2m_client::LifecycleAction::SwapApn => self.driver.swap_apn().await?,
                lwm2m_client::LifecycleAction::ToggleIpFamily => self.driver.toggle_ip_family().await?,
                lwm2m_client::LifecycleAction::EmitBootstrapError(message) => {
                    error!(server = %self.sessions[index].server_uri, "{message}");
                },
            }
        }
        Ok(())
    }

    async fn complete_pending(
        &mut self,
        index: usize,
        handle: QueueHandle,
        outcome: ExchangeOutcome,
    ) -> Result<(), DriverError> {
        let Some((request, pending_handle)) = self.sessions[index].pending.take() else {
            return Ok(());
        };
        if pending_handle != handle {
            self.sessions[index].pending = Some((request, pending_handle));
            return Ok(());
        }

        if request == PendingRequest::Register {
            if let ExchangeOutcome::Response(message) = &outcome {
                if let Some(location) = extract_location_path(message) {
                    self.sessions[index].location_path = Some(location);
                }
            }
        }

        let now = self.env.now();
        match self.sessions[index].lifecycle.handle(LifecycleEvent::ExchangeCompleted { request, outcome }, now) {
            Ok(actions) => self.process_lifecycle_actions(index, actions).await,
            Err(err) => {
                error!(?err, "lifecycle rejected exchange completion");
                Ok(())
            },
        }
    }

    async fn send_lifecycle_request(&mut self, index: usize, request: PendingRequest) -> Result<(), DriverError> {
        let peer = match self.ensure_peer(index).await {
            Ok(peer) => peer,
            Err(err) if err.is_transient() => return self.handle_connect_failure(index, request, err).await,
            Err(err) => return Err(err),
        };
        let endpoint = self.driver.endpoint_name().to_string();

        let message = match request {
            PendingRequest::Bootstrap => self.build_bootstrap_request(&endpoint),
            PendingRequest::Register => self.build_register_request(index, &endpoint),
            PendingRequest::Update => self.build_update_request(index),
            PendingRequest::Deregister => self.build_deregister_request(index),
        };

        let (handle, actions) = self.sessions[index]
            .engine
            .send(&self.env, &message, peer)
            .map_err(|err| DriverError::Socket(err.to_string()))?;
        self.sessions[index].pending = Some((request, handle));
        Box::pin(self.process_engine_actions(index, actions)).await
    }

    /// The transport never came up for `request` (DNS/PDN activation or a
    /// handshake failure). Routes into the lifecycle's own fallback policy
    /// (toggle IP family, then swap APN, then back off) instead of
    /// propagating — a session that can't resolve its peer this cycle
    /// should retry later, not take the whole runtime down.
    async fn handle_connect_failure(
        &mut self,
        index: usize,
        request: PendingRequest,
        err: DriverError,
    ) -> Result<(), DriverError> {
        warn!(?err, ?request, "failed to establish transport for lifecycle request");
        let now = self.env.now();
        match self.sessions[index].lifecycle.handle(LifecycleEvent::ConnectFailed { request }, now) {
            Ok(actions) => Box::pin(self.process_lifecycle_actions(index, actions)).await,
            Err(err) => {
                error!(?err, "lifecycle rejected connect failure");
                Ok(())
            },
        }
    }

    fn fresh_token(&self) -> Bytes {
        let mut token = [0u8; 4];
        self.env.random_bytes(&mut token);
        Bytes::copy_from_slice(&token)
    }

    fn build_bootstrap_request(&mut self, endpoint: &str) -> Message {
        Message {
            msg_type: MessageType::Confirmable,
            code: Code::POST,
            mid: self.env.random_u16(),
            token: self.fresh_token(),
            options: vec![
                CoapOption::string(number::URI_PATH, "bs"),
                CoapOption::string(number::URI_QUERY, format!("ep={endpoint}")),
            ],
            payload: Bytes::new(),
        }
    }

    fn build_register_request(&mut self, index: usize, endpoint: &str) -> Message {
        let lifetime = match self.sessions[index].role {
            ServerRole::Operational { short_server_id } => {
                self.client.server().instance_for_server(short_server_id).map(|i| i.lifetime).unwrap_or(86400)
            },
            ServerRole::Bootstrap => 86400,
        };
        let payload = Bytes::from(link_format(&self.client).into_bytes());
        Message {
            msg_type: MessageType::Confirmable,
            code: Code::POST,
            mid: self.env.random_u16(),
            token: self.fresh_token(),
            options: vec![
                CoapOption::string(number::URI_PATH, "rd"),
                CoapOption::string(number::URI_QUERY, format!("ep={endpoint}")),
                CoapOption::string(number::URI_QUERY, format!("lt={lifetime}")),
                CoapOption::string(number::URI_QUERY, "lwm2m=1.1"),
                CoapOption::string(number::URI_QUERY, "b=U"),
                CoapOption::uint(number::CONTENT_FORMAT, u32::from(content_format::LINK_FORMAT)),
            ],
            payload,
        }
    }

    fn build_update_request(&mut self, index: usize) -> Message {
        let options = location_segments(&self.sessions[index].location_path)
            .into_iter()
            .map(|segment| CoapOption::string(number::URI_PATH, segment))
            .collect();
        Message {
            msg_type: MessageType::Confirmable,
            code: Code::POST,
            mid: self.env.random_u16(),
            token: self.fresh_token(),
            options,
            payload: Bytes::new(),
        }
    }

    fn build_deregister_request(&mut self, index: usize) -> Message {
        let options = location_segments(&self.sessions[index].location_path)
            .into_iter()
            .map(|segment| CoapOption::string(number::URI_PATH, segment))
            .collect();
        Message {
            msg_type: MessageType::Confirmable,
            code: Code::DELETE,
            mid: self.env.random_u16(),
            token: self.fresh_token(),
            options,
            payload: Bytes::new(),
        }
    }

    async fn handle_inbound_request(
        &mut self,
        index: usize,
        message: Message,
        peer: SocketAddr,
    ) -> Result<(), DriverError> {
        let requester_ssid = self.sessions[index].short_server_id();
        let requester_is_bootstrap = matches!(self.sessions[index].role, ServerRole::Bootstrap);
        let now_unix = self.driver.now_unix();

        let segments = match registry::path_segments(&message.options) {
            Ok(segments) => segments,
            Err(err) => return self.send_error_response(&message, peer, ClientError::from(err)).await,
        };

        if message.code == Code::POST && segments.as_slice() == ["bs"] {
            return self.handle_bootstrap_finish(index, &message, peer).await;
        }

        let payload = match decode_request_payload(&message) {
            Ok(payload) => payload,
            Err(err) => return self.send_error_response(&message, peer, err).await,
        };

        let result = self.client.dispatch(
            &segments,
            message.code,
            &message.options,
            payload,
            requester_ssid,
            requester_is_bootstrap,
            now_unix,
        );

        match result {
            Ok(DispatchOutcome::Observed { value, register }) => {
                let path = resource_path_string(&segments);
                self.apply_observe(index, &message, peer, &path, register);
                self.send_value_response(&message, peer, &value, register.then_some(0)).await
            },
            Ok(outcome) => self.send_dispatch_response(index, &message, peer, outcome).await,
            Err(err) => self.send_error_response(&message, peer, err).await,
        }
    }

    /// The bootstrap server signaling it is done provisioning (`POST /bs`
    /// with no further path). Bypasses `Lwm2mClient::dispatch` entirely —
    /// `/bs` is not a resolvable object path — and feeds the lifecycle's
    /// own `BootstrapFinished` event instead, then repoints this session at
    /// whichever operational server the bootstrap writes just configured.
    async fn handle_bootstrap_finish(&mut self, index: usize, message: &Message, peer: SocketAddr) -> Result<(), DriverError> {
        let now = self.env.now();
        match self.sessions[index].lifecycle.handle(LifecycleEvent::BootstrapFinished, now) {
            Ok(actions) => {
                self.promote_bootstrapped_session(index);
                self.send_changed_response(message, peer).await?;
                self.process_lifecycle_actions(index, actions).await
            },
            Err(err) => self.send_error_response(message, peer, err).await,
        }
    }

    /// Point this session at the first operational server instance the
    /// bootstrap just wrote, so the Register the lifecycle is about to send
    /// goes to that server rather than lingering on the bootstrap peer.
    /// A no-op if the bootstrap server never wrote one — the lifecycle will
    /// simply fail to find a peer and fall back to its own retry policy.
    fn promote_bootstrapped_session(&mut self, index: usize) {
        let Some(instance) = self.client.security().first_operational_instance() else { return };
        let server_uri = instance.server_uri.clone();
        let short_server_id = instance.short_server_id.unwrap_or(0);
        self.sessions[index].server_uri = server_uri;
        self.sessions[index].role = ServerRole::Operational { short_server_id };
        self.sessions[index].peer = None;
    }

    async fn send_changed_response(&mut self, request: &Message, peer: SocketAddr) -> Result<(), DriverError> {
        let response = Message {
            msg_type: response_type(request.msg_type),
            code: Code::CHANGED,
            mid: request.mid,
            token: request.token.clone(),
            options: Vec::new(),
            payload: Bytes::new(),
        };
        self.send_message_now(&response, peer).await
    }

    /// Register or cancel an Observe subscription. Registering also seeds
    /// the path's attribute tracker (at server-record defaults, until a
    /// write-attributes request narrows it) so the next observer tick has
    /// something to evaluate.
    fn apply_observe(&mut self, index: usize, request: &Message, peer: SocketAddr, path: &str, register: bool) {
        if register {
            let observer = Observer {
                remote: peer,
                token: request.token.to_vec(),
                resource_path: path.to_string(),
                last_mid: 0,
                con_notification_epoch: 0,
            };
            match self.sessions[index].observers.register(observer) {
                Ok(_) => {
                    self.sessions[index]
                        .attributes
                        .entry(path.to_string())
                        .or_insert_with(|| AttributeState::new(AttributeSet::default()));
                },
                Err(err) => warn!(?err, %path, "observer store full, dropping subscription"),
            }
        } else if let Some(handle) = self.sessions[index].observers.find(peer, path) {
            self.sessions[index].observers.unregister(handle);
            self.sessions[index].attributes.remove(path);
        }
    }

    /// Reply to a request (an Observe registration/cancellation, or a
    /// plain Read) with `value`, carrying the `Observe` option when
    /// `observe_seq` is `Some` (registration only — a cancellation's
    /// response carries none, signaling the subscription ended).
    async fn send_value_response(
        &mut self,
        request: &Message,
        peer: SocketAddr,
        value: &ResourceValue,
        observe_seq: Option<u16>,
    ) -> Result<(), DriverError> {
        let (format, payload) = match encode_response_payload(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                return self
                    .send_error_response(request, peer, ClientError::Core(CoreError::InvalidEncoding(err.to_string())))
                    .await;
            },
        };
        let mut options = vec![CoapOption::uint(number::CONTENT_FORMAT, u32::from(format))];
        if let Some(seq) = observe_seq {
            options.push(CoapOption::uint(number::OBSERVE, u32::from(seq)));
        }
        let response = Message {
            msg_type: response_type(request.msg_type),
            code: Code::CONTENT,
            mid: request.mid,
            token: request.token.clone(),
            options,
            payload,
        };
        self.send_message_now(&response, peer).await
    }

    /// Send one observer notification: a Confirmable promotion if
    /// `con_interval_secs` worth of real time has passed since the last
    /// one, otherwise NonConfirmable, with a fresh monotonically
    /// increasing `Observe` sequence number from the store.
    async fn send_notification(
        &mut self,
        index: usize,
        peer: SocketAddr,
        path: &str,
        value: ResourceValue,
    ) -> Result<(), DriverError> {
        let Some(handle) = self.sessions[index].observers.find(peer, path) else { return Ok(()) };
        let (format, payload) = match encode_response_payload(&value) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(?err, %path, "failed to encode notification payload");
                return Ok(());
            },
        };
        let seq = self.sessions[index].observers.next_notification_mid(handle).unwrap_or(0);
        let con_interval = self.con_interval_secs;
        let Some(observer) = self.sessions[index].observers.get_mut(handle) else { return Ok(()) };
        let promote_to_con = observer.con_notification_epoch >= con_interval;
        if promote_to_con {
            observer.con_notification_epoch = 0;
        }
        let token = Bytes::copy_from_slice(&observer.token);

        let message = Message {
            msg_type: if promote_to_con { MessageType::Confirmable } else { MessageType::NonConfirmable },
            code: Code::CONTENT,
            mid: seq,
            token,
            options: vec![
                CoapOption::uint(number::OBSERVE, u32::from(seq)),
                CoapOption::uint(number::CONTENT_FORMAT, u32::from(format)),
            ],
            payload,
        };
        self.send_message_now(&message, peer).await
    }

    async fn send_dispatch_response(
        &mut self,
        index: usize,
        request: &Message,
        peer: SocketAddr,
        outcome: DispatchOutcome,
    ) -> Result<(), DriverError> {
        let (code, options, payload) = match &outcome {
            DispatchOutcome::Value(value) => match encode_response_payload(value) {
                Ok((format, bytes)) => {
                    (Code::CONTENT, vec![CoapOption::uint(number::CONTENT_FORMAT, u32::from(format))], bytes)
                },
                Err(err) => {
                    return self
                        .send_error_response(request, peer, ClientError::Core(CoreError::InvalidEncoding(err.to_string())))
                        .await;
                },
            },
            DispatchOutcome::Written => (Code::CHANGED, Vec::new(), Bytes::new()),
            DispatchOutcome::WrittenPartial { block } => {
                (Code::CONTINUE, vec![CoapOption::uint(number::BLOCK1, block.to_u32())], Bytes::new())
            },
            DispatchOutcome::Deleted => (Code::DELETED, Vec::new(), Bytes::new()),
            DispatchOutcome::Executed(_) => (Code::CHANGED, Vec::new(), Bytes::new()),
            DispatchOutcome::Observed { .. } => {
                unreachable!("Observed outcomes are routed to send_value_response before reaching here")
            },
        };

        let response = Message {
            msg_type: response_type(request.msg_type),
            code,
            mid: request.mid,
            token: request.token.clone(),
            options,
            payload,
        };
        self.send_message_now(&response, peer).await?;

        if let DispatchOutcome::Executed(Some(effect)) = outcome {
            self.apply_execute_effect(index, effect).await?;
        }
        Ok(())
    }

    async fn send_error_response(
        &mut self,
        request: &Message,
        peer: SocketAddr,
        err: ClientError,
    ) -> Result<(), DriverError> {
        warn!(?err, "rejecting request");
        let code = match &err {
            ClientError::Core(core) => core.response_code().unwrap_or(Code::INTERNAL_SERVER_ERROR),
            ClientError::InvalidState { .. } | ClientError::BootstrapExhausted(_) => Code::INTERNAL_SERVER_ERROR,
        };
        let response = Message {
            msg_type: response_type(request.msg_type),
            code,
            mid: request.mid,
            token: request.token.clone(),
            options: Vec::new(),
            payload: Bytes::new(),
        };
        self.send_message_now(&response, peer).await
    }

    async fn send_message_now(&mut self, message: &Message, peer: SocketAddr) -> Result<(), DriverError> {
        let mut buf = BytesMut::new();
        message.encode(&mut buf).map_err(|err| DriverError::Socket(err.to_string()))?;
        self.driver.send_datagram(&buf, peer).await
    }

    async fn apply_execute_effect(&mut self, index: usize, effect: ExecuteEffect) -> Result<(), DriverError> {
        match effect {
            ExecuteEffect::Disable => {
                let now = self.env.now();
                match self.sessions[index].lifecycle.handle(LifecycleEvent::DisableRequested, now) {
                    Ok(actions) => self.process_lifecycle_actions(index, actions).await?,
                    Err(err) => error!(?err, "disable request rejected by lifecycle"),
                }
            },
            ExecuteEffect::UpdateTrigger => {
                let now = self.env.now();
                match self.sessions[index].lifecycle.handle(LifecycleEvent::UpdateTriggered, now) {
                    Ok(actions) => self.process_lifecycle_actions(index, actions).await?,
                    Err(err) => error!(?err, "update trigger rejected by lifecycle"),
                }
            },
            ExecuteEffect::Reboot | ExecuteEffect::FactoryReset | ExecuteEffect::ScheduleFirmwareReboot => {
                info!(?effect, "device action requested; restart left to the platform");
            },
        }
        Ok(())
    }
}

fn fresh_lifecycle<E: Environment>(env: &E, config: &LifecycleConfig) -> LifecycleContext<E::Instant> {
    LifecycleContext::new(env.now(), config.clone())
}

fn resource_path_string(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

fn path_segments_of(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn numeric_value(value: &ResourceValue) -> Option<f64> {
    match value {
        ResourceValue::Integer(n) => Some(*n as f64),
        ResourceValue::Float(f) => Some(*f),
        ResourceValue::Time(t) => Some(*t as f64),
        _ => None,
    }
}

fn response_type(request_type: MessageType) -> MessageType {
    match request_type {
        MessageType::Confirmable => MessageType::Acknowledgement,
        _ => MessageType::NonConfirmable,
    }
}

fn location_segments(location: &Option<String>) -> Vec<String> {
    location.as_deref().unwrap_or("rd").split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn extract_location_path(message: &Message) -> Option<String> {
    let segments: Vec<&str> = message
        .options
        .iter()
        .filter(|o| o.number == number::LOCATION_PATH)
        .filter_map(|o| lwm2m_proto::option_as_str(o).ok())
        .collect();
    if segments.is_empty() { None } else { Some(segments.join("/")) }
}

/// `</oid/iid>,</oid/iid>…` covering every object but Security (`/0`),
/// which is never advertised to a server.
fn link_format(client: &Lwm2mClient) -> String {
    let mut entries = Vec::new();
    for iid in client.server().instance_ids() {
        entries.push(format!("</1/{iid}>"));
    }
    for iid in client.access_control().instance_ids() {
        entries.push(format!("</2/{iid}>"));
    }
    for iid in client.device().instance_ids() {
        entries.push(format!("</3/{iid}>"));
    }
    for iid in client.connectivity().instance_ids() {
        entries.push(format!("</4/{iid}>"));
    }
    for iid in client.firmware().instance_ids() {
        entries.push(format!("</5/{iid}>"));
    }
    entries.join(",")
}

fn decode_request_payload(message: &Message) -> Result<Option<ResourceValue>, ClientError> {
    if message.payload.is_empty() {
        return Ok(None);
    }
    let format = message
        .options
        .iter()
        .find(|o| o.number == number::CONTENT_FORMAT)
        .and_then(|o| lwm2m_proto::option_as_uint(o).ok())
        .unwrap_or(u32::from(content_format::OCTET_STREAM));

    let value = match format {
        v if v == u32::from(content_format::PLAIN_TEXT) => ResourceValue::String(
            String::from_utf8(message.payload.to_vec())
                .map_err(|_| ClientError::Core(CoreError::InvalidEncoding("payload is not valid UTF-8".to_string())))?,
        ),
        v if v == u32::from(content_format::TLV) => decode_tlv_payload(message.payload.clone())?,
        _ => ResourceValue::Opaque(message.payload.to_vec()),
    };
    Ok(Some(value))
}

/// A TLV payload carries either one scalar resource (most writes), a
/// handful of top-level resource elements (a bootstrap instance-level
/// write, one element per resource), or a single `ObjectInstance`/
/// `MultiResource` container wrapping its children (the same write,
/// nested instead of flattened). All three decode to the same shape the
/// object model expects, collapsing to a plain scalar only when exactly
/// one element decodes and it isn't itself a container.
fn decode_tlv_payload(mut buf: Bytes) -> Result<ResourceValue, ClientError> {
    let mut elements = Vec::new();
    while !buf.is_empty() {
        elements.push(TlvElement::decode(&mut buf).map_err(CoreError::from)?);
    }
    match elements.as_slice() {
        [single] => Ok(tlv_element_to_value(single)),
        _ => Ok(ResourceValue::Instance(elements.iter().map(|e| (e.id, tlv_element_to_value(e))).collect())),
    }
}

fn tlv_element_to_value(element: &TlvElement) -> ResourceValue {
    match element.as_children() {
        Ok(children) => ResourceValue::Instance(children.iter().map(|c| (c.id, tlv_element_to_value(c))).collect()),
        Err(_) => match element.as_integer() {
            Ok(n) => ResourceValue::Integer(i64::from(n)),
            Err(_) => match element.as_boolean() {
                Ok(b) => ResourceValue::Boolean(b),
                Err(_) => ResourceValue::Opaque(element.as_bytes().map(|b| b.to_vec()).unwrap_or_default()),
            },
        },
    }
}

fn encode_response_payload(value: &ResourceValue) -> Result<(u16, Bytes), lwm2m_proto::ProtoError> {
    let encoded = match value {
        ResourceValue::String(s) => (content_format::PLAIN_TEXT, Bytes::from(s.clone().into_bytes())),
        ResourceValue::Opaque(bytes) => (content_format::OCTET_STREAM, Bytes::from(bytes.clone())),
        ResourceValue::Float(f) => (content_format::PLAIN_TEXT, Bytes::from(f.to_string().into_bytes())),
        ResourceValue::Integer(n) => (content_format::TLV, encode_scalar_tlv(TlvElement::integer(0, *n as i32))?),
        ResourceValue::Time(t) => (content_format::TLV, encode_scalar_tlv(TlvElement::integer(0, *t as i32))?),
        ResourceValue::Boolean(b) => (content_format::TLV, encode_scalar_tlv(TlvElement::boolean(0, *b))?),
        ResourceValue::Instance(resources) => {
            let children = resources.iter().map(|(id, v)| value_to_tlv(*id, v)).collect();
            (content_format::TLV, encode_scalar_tlv(TlvElement::instance(0, children))?)
        },
    };
    Ok(encoded)
}

fn value_to_tlv(id: u16, value: &ResourceValue) -> TlvElement {
    match value {
        ResourceValue::String(s) => TlvElement::bytes(id, s.clone().into_bytes()),
        ResourceValue::Opaque(bytes) => TlvElement::bytes(id, bytes.clone()),
        ResourceValue::Float(f) => TlvElement::bytes(id, f.to_string().into_bytes()),
        ResourceValue::Integer(n) => TlvElement::integer(id, *n as i32),
        ResourceValue::Time(t) => TlvElement::integer(id, *t as i32),
        ResourceValue::Boolean(b) => TlvElement::boolean(id, *b),
        ResourceValue::Instance(resources) => {
            TlvElement::instance(id, resources.iter().map(|(rid, v)| value_to_tlv(*rid, v)).collect())
        },
    }
}

fn encode_scalar_tlv(element: TlvElement) -> Result<Bytes, lwm2m_proto::ProtoError> {
    let mut buf = BytesMut::new();
    element.encode(&mut buf)?;
    Ok(buf.freeze())
}
