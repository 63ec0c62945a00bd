//! Per-server lifecycle state machine.
//!
//! Drives one server context through bootstrap, registration, periodic
//! update, and deregistration. Pure state manipulation, same as the
//! message engine it sits above: callers pass in time and completed
//! exchange outcomes, and get back a list of [`LifecycleAction`]s to
//! carry out.
//!
//! ```text
//! Configured ─(hold-off)─> Bootstrap ─(2.04)─> BootstrapWait
//!     ^                                             │
//!     └─────────────────(bootstrap finished)────────┘
//!
//! Register ─(2.01/2.04)─> Registered ─(0.9×lifetime)─> Update
//!     ^                        ^                          │
//!     │                        └──────────(2.04)───────────┤
//!     └───────────(4.xx / re-register)──────────────────────┘
//!
//! (any state) ─(Disable)─> Deregister ─(2.02)─> Disabled ─(timeout)─> Register
//! ```

use std::{
    ops::{Add, Sub},
    time::Duration,
};

use lwm2m_core::engine::ExchangeOutcome;
use lwm2m_proto::Code;

use crate::{
    error::ClientError,
    event::{LifecycleAction, LifecycleEvent, PendingRequest},
};

/// Default hold-off before a freshly configured context attempts bootstrap.
pub const DEFAULT_HOLD_OFF: Duration = Duration::from_secs(5);

/// Default registration lifetime, renewed at 0.9× this value.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(86400);

/// How long to wait for the bootstrap server to signal completion after a
/// successful Bootstrap-Request.
pub const DEFAULT_BOOTSTRAP_WAIT: Duration = Duration::from_secs(20);

/// How long a context stays `Disabled` before attempting to register again.
pub const DEFAULT_DISABLE_TIMEOUT: Duration = Duration::from_secs(86400);

/// Maximum consecutive bootstrap timeouts before giving up permanently.
pub const DEFAULT_MAX_BOOTSTRAP_ATTEMPTS: u8 = 5;

/// Where a server context sits in the registration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Configured but not yet attempting bootstrap (waiting out hold-off).
    Configured,
    /// Bootstrap-Request sent, awaiting the 2.04 acknowledgement.
    Bootstrap,
    /// Bootstrap acknowledged; waiting for the bootstrap server to signal
    /// it has finished writing Security/Server/ACL instances.
    BootstrapWait,
    /// Register sent, awaiting 2.01/2.04.
    Register,
    /// Registered; the lifetime timer is running.
    Registered,
    /// Update sent, awaiting 2.04 or a rejection forcing re-registration.
    Update,
    /// Deregister sent, awaiting 2.02.
    Deregister,
    /// Deregistered by request; will attempt to register again after
    /// `disable_timeout`.
    Disabled,
}

/// Tuning knobs for one server context's lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Delay after configuration before the first bootstrap attempt.
    pub hold_off: Duration,
    /// Registration lifetime; renewed at 0.9× this value.
    pub lifetime: Duration,
    /// How long to wait for bootstrap-finished after a 2.04.
    pub bootstrap_wait: Duration,
    /// How long to stay `Disabled` before re-registering.
    pub disable_timeout: Duration,
    /// Consecutive bootstrap timeouts tolerated before giving up.
    pub max_bootstrap_attempts: u8,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            hold_off: DEFAULT_HOLD_OFF,
            lifetime: DEFAULT_LIFETIME,
            bootstrap_wait: DEFAULT_BOOTSTRAP_WAIT,
            disable_timeout: DEFAULT_DISABLE_TIMEOUT,
            max_bootstrap_attempts: DEFAULT_MAX_BOOTSTRAP_ATTEMPTS,
        }
    }
}

/// The per-server lifecycle state machine.
///
/// Generic over `I` so the exact same transitions run against
/// [`std::time::Instant`] in production and a virtual clock in tests.
#[derive(Debug, Clone)]
pub struct LifecycleContext<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    state: LifecycleState,
    config: LifecycleConfig,
    /// Deadline at which the next timer-driven action fires, if any.
    deadline: Option<I>,
    bootstrap_attempts: u8,
    /// True for a preconfigured operational server: the hold-off leads
    /// straight into `Register` instead of a bootstrap exchange.
    skip_bootstrap: bool,
    /// Consecutive connect failures (DNS/PDN/handshake) since the last
    /// successful exchange, driving the toggle-then-swap-then-backoff
    /// fallback sequence.
    connect_attempts: u8,
}

impl<I> LifecycleContext<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// A freshly configured context, waiting out its hold-off before the
    /// first bootstrap attempt.
    pub fn new(now: I, config: LifecycleConfig) -> Self {
        let deadline = Some(now + config.hold_off);
        Self {
            state: LifecycleState::Configured,
            config,
            deadline,
            bootstrap_attempts: 0,
            skip_bootstrap: false,
            connect_attempts: 0,
        }
    }

    /// A context for a preconfigured operational server: the hold-off
    /// elapsing sends a Register request directly, skipping the
    /// bootstrap handshake entirely.
    pub fn new_operational(now: I, config: LifecycleConfig) -> Self {
        let deadline = Some(now + config.hold_off);
        Self {
            state: LifecycleState::Configured,
            config,
            deadline,
            bootstrap_attempts: 0,
            skip_bootstrap: true,
            connect_attempts: 0,
        }
    }

    /// The context's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn invalid(&self, operation: &'static str) -> ClientError {
        ClientError::InvalidState { state: self.state, operation }
    }

    fn enter(&mut self, state: LifecycleState, deadline: Option<I>) {
        self.state = state;
        self.deadline = deadline;
    }

    /// Periodic maintenance: fire whichever timer-driven transition is
    /// due (hold-off elapsed, lifetime renewal due, disable timeout
    /// elapsed). A no-op if no deadline has passed.
    pub fn tick(&mut self, now: I) -> Vec<LifecycleAction> {
        let Some(deadline) = self.deadline else { return Vec::new() };
        if now < deadline {
            return Vec::new();
        }

        match self.state {
            LifecycleState::Configured if self.skip_bootstrap => {
                self.enter(LifecycleState::Register, None);
                vec![LifecycleAction::SendRequest { request: PendingRequest::Register }]
            },
            LifecycleState::Configured => {
                self.enter(LifecycleState::Bootstrap, None);
                vec![LifecycleAction::SendRequest { request: PendingRequest::Bootstrap }]
            },
            LifecycleState::Registered => {
                self.enter(LifecycleState::Update, None);
                vec![LifecycleAction::SendRequest { request: PendingRequest::Update }]
            },
            LifecycleState::Disabled => {
                self.enter(LifecycleState::Register, None);
                vec![LifecycleAction::SendRequest { request: PendingRequest::Register }]
            },
            LifecycleState::BootstrapWait => {
                // The bootstrap server never signaled completion in time.
                // Fall back to retrying the whole bootstrap exchange.
                self.bootstrap_attempts += 1;
                if self.bootstrap_attempts >= self.config.max_bootstrap_attempts {
                    self.enter(LifecycleState::Configured, None);
                    return vec![LifecycleAction::EmitBootstrapError(
                        "bootstrap server never signaled completion".to_string(),
                    )];
                }
                self.enter(LifecycleState::Bootstrap, None);
                vec![LifecycleAction::SendRequest { request: PendingRequest::Bootstrap }]
            },
            // A connect failure parked a deadline here (see
            // `handle_connect_failure`) instead of resending immediately;
            // this is that deferred retry, once the fallback action had a
            // chance to take effect.
            LifecycleState::Bootstrap => {
                self.deadline = None;
                vec![LifecycleAction::SendRequest { request: PendingRequest::Bootstrap }]
            },
            LifecycleState::Register => {
                self.deadline = None;
                vec![LifecycleAction::SendRequest { request: PendingRequest::Register }]
            },
            LifecycleState::Update => {
                self.deadline = None;
                vec![LifecycleAction::SendRequest { request: PendingRequest::Update }]
            },
            LifecycleState::Deregister => {
                self.deadline = None;
                vec![LifecycleAction::SendRequest { request: PendingRequest::Deregister }]
            },
        }
    }

    /// Handle a completed exchange or an externally triggered event
    /// (Disable execute, Registration-Update-Trigger execute, bootstrap
    /// completion signal).
    pub fn handle(
        &mut self,
        event: LifecycleEvent,
        now: I,
    ) -> Result<Vec<LifecycleAction>, ClientError> {
        match event {
            LifecycleEvent::DisableRequested => {
                self.enter(LifecycleState::Deregister, None);
                Ok(vec![LifecycleAction::SendRequest { request: PendingRequest::Deregister }])
            },
            LifecycleEvent::UpdateTriggered => {
                if self.state != LifecycleState::Registered {
                    return Err(self.invalid("update_triggered"));
                }
                self.enter(LifecycleState::Update, None);
                Ok(vec![LifecycleAction::SendRequest { request: PendingRequest::Update }])
            },
            LifecycleEvent::BootstrapFinished => {
                if self.state != LifecycleState::BootstrapWait {
                    return Err(self.invalid("bootstrap_finished"));
                }
                self.bootstrap_attempts = 0;
                self.enter(LifecycleState::Register, None);
                Ok(vec![
                    LifecycleAction::Log("bootstrap finished, registering".to_string()),
                    LifecycleAction::SendRequest { request: PendingRequest::Register },
                ])
            },
            LifecycleEvent::ExchangeCompleted { request, outcome } => {
                self.handle_exchange(request, outcome, now)
            },
            LifecycleEvent::ConnectFailed { request } => Ok(self.handle_connect_failure(request, now)),
        }
    }

    /// The transport for `request` never came up at all — DNS/PDN/handshake
    /// failure, not a timed-out exchange. Spec fallback order: toggle the
    /// IP family, then swap the APN, then fall back to the normal backoff
    /// and retry once the current state's deadline elapses.
    fn handle_connect_failure(&mut self, request: PendingRequest, now: I) -> Vec<LifecycleAction> {
        self.connect_attempts += 1;
        let fallback = match self.connect_attempts {
            1 => LifecycleAction::ToggleIpFamily,
            2 => LifecycleAction::SwapApn,
            _ => LifecycleAction::Reconnect,
        };
        self.deadline = Some(now + self.config.hold_off);
        vec![LifecycleAction::Log(format!("connect failed for {request:?}, retrying after fallback")), fallback]
    }

    fn handle_exchange(
        &mut self,
        request: PendingRequest,
        outcome: ExchangeOutcome,
        now: I,
    ) -> Result<Vec<LifecycleAction>, ClientError> {
        self.connect_attempts = 0;
        match (self.state, request) {
            (LifecycleState::Bootstrap, PendingRequest::Bootstrap) => {
                self.handle_bootstrap_outcome(outcome)
            },
            (LifecycleState::Register, PendingRequest::Register) => {
                self.handle_register_outcome(outcome, now)
            },
            (LifecycleState::Update, PendingRequest::Update) => {
                self.handle_update_outcome(outcome, now)
            },
            (LifecycleState::Deregister, PendingRequest::Deregister) => {
                self.handle_deregister_outcome(outcome)
            },
            _ => Err(self.invalid("exchange_completed")),
        }
    }

    fn handle_bootstrap_outcome(
        &mut self,
        outcome: ExchangeOutcome,
    ) -> Result<Vec<LifecycleAction>, ClientError> {
        match outcome {
            ExchangeOutcome::Response(msg) if msg.code == Code::CHANGED => {
                self.enter(LifecycleState::BootstrapWait, None);
                Ok(vec![LifecycleAction::Log("bootstrap acknowledged, awaiting finish".to_string())])
            },
            ExchangeOutcome::Response(_) => {
                self.bootstrap_attempts += 1;
                if self.bootstrap_attempts >= self.config.max_bootstrap_attempts {
                    self.enter(LifecycleState::Configured, None);
                    return Ok(vec![LifecycleAction::EmitBootstrapError(
                        "bootstrap server rejected the request".to_string(),
                    )]);
                }
                Ok(vec![LifecycleAction::SendRequest { request: PendingRequest::Bootstrap }])
            },
            ExchangeOutcome::Timeout => {
                self.bootstrap_attempts += 1;
                if self.bootstrap_attempts >= self.config.max_bootstrap_attempts {
                    self.enter(LifecycleState::Configured, None);
                    return Ok(vec![LifecycleAction::EmitBootstrapError(
                        "bootstrap exhausted retries with no response".to_string(),
                    )]);
                }
                Ok(vec![LifecycleAction::Reconnect])
            },
        }
    }

    fn handle_register_outcome(
        &mut self,
        outcome: ExchangeOutcome,
        now: I,
    ) -> Result<Vec<LifecycleAction>, ClientError> {
        match outcome {
            ExchangeOutcome::Response(msg) if msg.code == Code::CREATED || msg.code == Code::CHANGED => {
                self.enter(LifecycleState::Registered, Some(now + lifetime_refresh(&self.config)));
                Ok(vec![LifecycleAction::Log("registered".to_string())])
            },
            ExchangeOutcome::Response(_) => {
                // Server rejected registration outright; retry from scratch.
                Ok(vec![LifecycleAction::SendRequest { request: PendingRequest::Register }])
            },
            ExchangeOutcome::Timeout => Ok(vec![LifecycleAction::Reconnect]),
        }
    }

    fn handle_update_outcome(
        &mut self,
        outcome: ExchangeOutcome,
        now: I,
    ) -> Result<Vec<LifecycleAction>, ClientError> {
        match outcome {
            ExchangeOutcome::Response(msg) if msg.code == Code::CHANGED => {
                self.enter(LifecycleState::Registered, Some(now + lifetime_refresh(&self.config)));
                Ok(vec![LifecycleAction::Log("registration refreshed".to_string())])
            },
            ExchangeOutcome::Response(msg)
                if msg.code == Code::BAD_REQUEST
                    || msg.code == Code::FORBIDDEN
                    || msg.code == Code::NOT_FOUND =>
            {
                // The server forgot this registration; re-register.
                self.enter(LifecycleState::Register, None);
                Ok(vec![LifecycleAction::SendRequest { request: PendingRequest::Register }])
            },
            ExchangeOutcome::Response(_) => {
                self.enter(LifecycleState::Registered, Some(now + lifetime_refresh(&self.config)));
                Ok(vec![])
            },
            ExchangeOutcome::Timeout => {
                self.enter(LifecycleState::Register, None);
                Ok(vec![LifecycleAction::Reconnect])
            },
        }
    }

    fn handle_deregister_outcome(
        &mut self,
        outcome: ExchangeOutcome,
    ) -> Result<Vec<LifecycleAction>, ClientError> {
        // A dropped peer already forgot us; either way we disable locally.
        let log = match outcome {
            ExchangeOutcome::Response(msg) if msg.code == Code::DELETED => {
                "deregistered".to_string()
            },
            ExchangeOutcome::Response(_) => "deregister rejected, disabling locally".to_string(),
            ExchangeOutcome::Timeout => "deregister timed out, disabling locally".to_string(),
        };
        self.state = LifecycleState::Disabled;
        self.deadline = None;
        Ok(vec![LifecycleAction::Log(log)])
    }
}

fn lifetime_refresh(config: &LifecycleConfig) -> Duration {
    config.lifetime.mul_f64(0.9)
}
