//! Property tests for invariants that only show up across a sequence of
//! ticks/exchanges, rather than within a single encode/decode call — the
//! kind of thing the unit-level proptests living next to `lwm2m-proto`'s
//! codecs and `lwm2m-core`'s queue/ACL can't exercise by themselves.

use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use lwm2m_core::{
    Environment,
    engine::{Engine, EngineAction, ExchangeOutcome},
    env::test_utils::MockEnv,
    observer::{Observer, ObserverStore},
};
use lwm2m_client::{LifecycleConfig, LifecycleContext, LifecycleEvent, LifecycleState, PendingRequest};
use lwm2m_proto::{Code, Message, MessageType};
use proptest::prelude::*;

fn peer() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 5683)
}

fn exchange_response(code: Code) -> LifecycleEvent {
    LifecycleEvent::ExchangeCompleted {
        request: PendingRequest::Update,
        outcome: ExchangeOutcome::Response(Message {
            msg_type: MessageType::Acknowledgement,
            code,
            mid: 1,
            token: Bytes::new(),
            options: Vec::new(),
            payload: Bytes::new(),
        }),
    }
}

/// Drive a freshly configured context all the way to `Registered`,
/// through bootstrap and registration, using only its public API.
fn registered_context(env: &MockEnv) -> LifecycleContext<<MockEnv as Environment>::Instant> {
    let mut ctx = LifecycleContext::new(env.now(), LifecycleConfig::default());
    env.advance(Duration::from_secs(6));
    ctx.tick(env.now());
    assert_eq!(ctx.state(), LifecycleState::Bootstrap);

    ctx.handle(
        LifecycleEvent::ExchangeCompleted {
            request: PendingRequest::Bootstrap,
            outcome: ExchangeOutcome::Response(Message {
                msg_type: MessageType::Acknowledgement,
                code: Code::CHANGED,
                mid: 1,
                token: Bytes::new(),
                options: Vec::new(),
                payload: Bytes::new(),
            }),
        },
        env.now(),
    )
    .unwrap();
    assert_eq!(ctx.state(), LifecycleState::BootstrapWait);

    ctx.handle(LifecycleEvent::BootstrapFinished, env.now()).unwrap();
    assert_eq!(ctx.state(), LifecycleState::Register);

    ctx.handle(
        LifecycleEvent::ExchangeCompleted {
            request: PendingRequest::Register,
            outcome: ExchangeOutcome::Response(Message {
                msg_type: MessageType::Acknowledgement,
                code: Code::CREATED,
                mid: 1,
                token: Bytes::new(),
                options: Vec::new(),
                payload: Bytes::new(),
            }),
        },
        env.now(),
    )
    .unwrap();
    assert_eq!(ctx.state(), LifecycleState::Registered);
    ctx
}

fn confirmable(mid: u16, token: &[u8]) -> Message {
    Message {
        msg_type: MessageType::Confirmable,
        code: Code::GET,
        mid,
        token: Bytes::copy_from_slice(token),
        options: Vec::new(),
        payload: Bytes::new(),
    }
}

proptest! {
    /// Lifecycle idempotence: issuing an update while `Registered` never
    /// leaves the context sitting in `Configured` on success, and a
    /// rejection that says the server forgot the registration
    /// (4.00/4.03/4.04) always routes back through `Register`, never
    /// silently stays `Update` forever.
    #[test]
    fn prop_update_outcome_never_strands_registered_context(
        code_index in 0usize..5,
    ) {
        let codes = [Code::CHANGED, Code::BAD_REQUEST, Code::FORBIDDEN, Code::NOT_FOUND, Code::CONTENT];
        let code = codes[code_index];

        let env = MockEnv::new();
        let mut ctx = registered_context(&env);

        ctx.handle(LifecycleEvent::UpdateTriggered, env.now()).unwrap();
        prop_assert_eq!(ctx.state(), LifecycleState::Update);

        ctx.handle(exchange_response(code), env.now()).unwrap();

        prop_assert_ne!(ctx.state(), LifecycleState::Configured);
        match code {
            Code::BAD_REQUEST | Code::FORBIDDEN | Code::NOT_FOUND => {
                prop_assert_eq!(ctx.state(), LifecycleState::Register);
            },
            _ => {
                prop_assert_eq!(ctx.state(), LifecycleState::Registered);
            },
        }
    }

    /// Retry bound: within one context, consecutive network failures
    /// produce a monotone-non-decreasing retransmit delay until the
    /// exchange times out after the fixed retry budget.
    #[test]
    fn prop_retransmit_delay_is_monotone_until_timeout(token in proptest::collection::vec(any::<u8>(), 1..8)) {
        const STEP: Duration = Duration::from_millis(100);

        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        let (handle, _actions) = engine.send(&env, &confirmable(1, &token), peer()).unwrap();

        let mut last_gap: Option<Duration> = None;
        let mut timed_out = false;

        // Step the virtual clock in small increments and let the engine
        // decide, each time, whether a deadline has actually come due —
        // the elapsed time since the previous firing IS the backoff delay.
        'outer: for _ in 0..4 {
            let mut elapsed = Duration::ZERO;
            loop {
                env.advance(STEP);
                elapsed += STEP;
                let actions = engine.tick(&env, peer());
                if actions.is_empty() {
                    prop_assert!(elapsed < Duration::from_secs(60), "retransmit deadline never arrived");
                    continue;
                }

                match &actions[0] {
                    EngineAction::Transmit { .. } => {
                        if let Some(last) = last_gap {
                            prop_assert!(elapsed + STEP >= last);
                        }
                        last_gap = Some(elapsed);
                        break;
                    },
                    EngineAction::Deliver { handle: delivered, outcome: ExchangeOutcome::Timeout } => {
                        prop_assert_eq!(*delivered, handle);
                        timed_out = true;
                        break 'outer;
                    },
                    other => prop_assert!(false, "unexpected action: {other:?}"),
                }
            }
        }

        if !timed_out {
            // Four retransmits spent; the next due check must time out.
            loop {
                env.advance(STEP);
                let actions = engine.tick(&env, peer());
                if let Some(action) = actions.first() {
                    let is_timeout = matches!(action, EngineAction::Deliver { outcome: ExchangeOutcome::Timeout, .. });
                    prop_assert!(is_timeout);
                    timed_out = true;
                    break;
                }
            }
        }

        prop_assert!(timed_out, "exchange never timed out within the retry budget");
        prop_assert_eq!(engine.pending_count(), 0);
    }

    /// Observer notify ordering: for a single observer, successive
    /// notification mids increase modulo 2^16 — i.e. each call either
    /// increases the mid or wraps around to a smaller value, never
    /// repeats, and never regresses except by wrapping.
    #[test]
    fn prop_observer_mids_increase_modulo_u16(remote_port in 1u16..=65535, calls in 1usize..2000) {
        let mut store = ObserverStore::new();
        let remote = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), remote_port);
        let handle = store
            .register(Observer {
                remote,
                token: vec![0],
                resource_path: "/3/0/9".to_string(),
                last_mid: 0,
                con_notification_epoch: 0,
            })
            .unwrap();

        let mut previous = 0u16;
        for _ in 0..calls {
            let mid = store.next_notification_mid(handle).unwrap();
            let expected = previous.wrapping_add(1);
            prop_assert_eq!(mid, expected);
            previous = mid;
        }
    }
}
