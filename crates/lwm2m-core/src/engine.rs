//! Sans-IO message engine: serializes outbound exchanges, tracks
//! retransmission, matches inbound responses.
//!
//! Every public method here is pure state manipulation — no socket, no
//! clock side effects beyond reading [`Environment::now`]. Each call
//! returns the [`EngineAction`]s the orchestration layer (in `lwm2m-app`)
//! must carry out: write bytes to a socket, or deliver an outcome to a
//! caller-registered callback.

use std::{net::SocketAddr, time::Duration};

use bytes::{Bytes, BytesMut};
use lwm2m_proto::Message;

use crate::{
    env::Environment,
    error::CoreError,
    queue::{MAX_RETRANSMIT, Queue, QueueHandle, QueueItem},
};

const ACK_TIMEOUT: Duration = Duration::from_secs(2);
const ACK_RANDOM_FACTOR_MAX: Duration = Duration::from_millis(1000);

/// Outcome of a completed (or abandoned) confirmable exchange.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    /// A response matching the request's token was received.
    Response(Message),
    /// The retransmission window was exhausted without a response.
    Timeout,
}

/// Work the orchestration layer must perform on behalf of the engine.
#[derive(Debug, Clone)]
pub enum EngineAction {
    /// Write `bytes` to `peer`.
    Transmit {
        /// Serialized datagram.
        bytes: Bytes,
        /// Destination address.
        peer: SocketAddr,
    },
    /// Deliver a finished exchange's outcome to whoever is holding `handle`.
    Deliver {
        /// The handle [`Engine::send`] returned for this exchange.
        handle: QueueHandle,
        /// What happened.
        outcome: ExchangeOutcome,
    },
    /// An incoming confirmable or non-confirmable *request* (not matched
    /// to any queued exchange) was decoded and should be routed to the
    /// resource registry.
    InboundRequest {
        /// The decoded request.
        message: Message,
        /// Where it came from.
        peer: SocketAddr,
    },
}

/// The maximum datagram size this engine will attempt to send. Messages
/// above this size must be split with block-wise transfer before calling
/// [`Engine::send`].
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Drives retransmission and response matching for one transport
/// endpoint (one per server context).
pub struct Engine<E: Environment> {
    queue: Queue<E>,
}

impl<E: Environment> Engine<E> {
    /// A fresh engine with an empty retransmission queue.
    pub fn new() -> Self {
        Self { queue: Queue::new() }
    }

    /// Number of in-flight confirmable exchanges.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Serialize `message` and, if confirmable, register it for
    /// retransmission. Returns the handle plus the [`EngineAction`]s to
    /// carry out (at minimum, one `Transmit`).
    pub fn send(
        &mut self,
        env: &E,
        message: &Message,
        peer: SocketAddr,
    ) -> Result<(QueueHandle, Vec<EngineAction>), CoreError> {
        let mut buf = BytesMut::new();
        message.encode(&mut buf).map_err(CoreError::from)?;
        let bytes = buf.freeze();
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(CoreError::InvalidArgument("serialized message exceeds transport MTU"));
        }

        let is_confirmable = matches!(message.msg_type, lwm2m_proto::MessageType::Confirmable);
        let actions = vec![EngineAction::Transmit { bytes: bytes.clone(), peer }];

        if !is_confirmable {
            // Fire-and-forget: no queue slot, no handle worth tracking beyond
            // this call. Use a sentinel that callers must not look up.
            return Ok((sentinel_handle(), actions));
        }

        let item = QueueItem {
            bytes,
            mid: message.mid,
            token: message.token.clone(),
            retransmit_count: 0,
        };
        let retransmit_at = env.now();
        let handle = self.queue.add(item, retransmit_at)?;
        Ok((handle, actions))
    }

    /// Abort a still-queued exchange; no-op if it already completed.
    pub fn abort(&mut self, handle: QueueHandle) {
        self.queue.remove(handle);
    }

    /// Process a received datagram. If it matches a queued exchange by
    /// token, the exchange completes and a `Deliver` action is returned.
    /// Otherwise, if it decodes as a request, it is surfaced as
    /// `InboundRequest`. Malformed datagrams and duplicate responses
    /// (already-removed tokens) produce no actions.
    pub fn on_datagram(&mut self, bytes: &[u8], peer: SocketAddr) -> Vec<EngineAction> {
        let Ok(message) = Message::decode(bytes) else {
            return Vec::new();
        };

        if message.code.is_success() || message.code.is_error() {
            if let Some((handle, _item)) = self.queue.remove_by_token(&message.token) {
                return vec![EngineAction::Deliver { handle, outcome: ExchangeOutcome::Response(message) }];
            }
            // No matching queue entry: either a duplicate or an unsolicited
            // response. Drop silently, per the protocol's dedup rule.
            return Vec::new();
        }

        vec![EngineAction::InboundRequest { message, peer }]
    }

    /// Advance retransmission timers: re-transmit any exchange whose
    /// deadline has passed, up to [`MAX_RETRANSMIT`] times, after which the
    /// exchange times out and its slot is freed.
    pub fn tick(&mut self, env: &E, peer: SocketAddr) -> Vec<EngineAction> {
        let due = self.queue.due_for_retransmit(env.now());
        let mut actions = Vec::new();

        for (handle, _) in due {
            let Some(item) = self.queue.get(handle) else { continue };
            if item.retransmit_count >= MAX_RETRANSMIT {
                self.queue.remove(handle);
                actions.push(EngineAction::Deliver { handle, outcome: ExchangeOutcome::Timeout });
                continue;
            }

            let bytes = item.bytes.clone();
            let backoff = retransmit_delay(env, item.retransmit_count);
            self.queue.mark_retransmitted(handle, env.now() + backoff);
            actions.push(EngineAction::Transmit { bytes, peer });
        }

        actions
    }
}

impl<E: Environment> Default for Engine<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn retransmit_delay<E: Environment>(env: &E, attempt: u8) -> Duration {
    let base = ACK_TIMEOUT * 2u32.pow(u32::from(attempt));
    base + env.random_jitter(ACK_RANDOM_FACTOR_MAX)
}

/// A handle value fire-and-forget sends use in place of a real queue slot —
/// callers must not use it to look anything up.
fn sentinel_handle() -> QueueHandle {
    QueueHandle::from_raw(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::test_utils::MockEnv;
    use lwm2m_proto::{Code, MessageType};

    fn peer() -> SocketAddr {
        "127.0.0.1:5683".parse().unwrap()
    }

    fn confirmable_get(mid: u16, token: &[u8]) -> Message {
        Message {
            msg_type: MessageType::Confirmable,
            code: Code::GET,
            mid,
            token: Bytes::copy_from_slice(token),
            options: vec![],
            payload: Bytes::new(),
        }
    }

    #[test]
    fn send_confirmable_queues_and_transmits() {
        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        let (_handle, actions) = engine.send(&env, &confirmable_get(1, &[1]), peer()).unwrap();
        assert_eq!(engine.pending_count(), 1);
        assert!(matches!(actions[0], EngineAction::Transmit { .. }));
    }

    #[test]
    fn send_non_confirmable_does_not_queue() {
        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        let mut msg = confirmable_get(1, &[1]);
        msg.msg_type = MessageType::NonConfirmable;
        engine.send(&env, &msg, peer()).unwrap();
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn response_completes_exchange() {
        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        engine.send(&env, &confirmable_get(1, &[0xAB]), peer()).unwrap();

        let response = Message {
            msg_type: MessageType::Acknowledgement,
            code: Code::CONTENT,
            mid: 1,
            token: Bytes::from_static(&[0xAB]),
            options: vec![],
            payload: Bytes::new(),
        };
        let mut buf = bytes::BytesMut::new();
        response.encode(&mut buf).unwrap();

        let actions = engine.on_datagram(&buf, peer());
        assert_eq!(engine.pending_count(), 0);
        assert!(matches!(
            actions.as_slice(),
            [EngineAction::Deliver { outcome: ExchangeOutcome::Response(_), .. }]
        ));
    }

    #[test]
    fn duplicate_response_is_dropped_silently() {
        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        engine.send(&env, &confirmable_get(1, &[0xAB]), peer()).unwrap();

        let response = Message {
            msg_type: MessageType::Acknowledgement,
            code: Code::CONTENT,
            mid: 1,
            token: Bytes::from_static(&[0xAB]),
            options: vec![],
            payload: Bytes::new(),
        };
        let mut buf = bytes::BytesMut::new();
        response.encode(&mut buf).unwrap();

        engine.on_datagram(&buf, peer());
        let second = engine.on_datagram(&buf, peer());
        assert!(second.is_empty());
    }

    #[test]
    fn exhausted_retries_time_out() {
        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        engine.send(&env, &confirmable_get(1, &[1]), peer()).unwrap();

        for _ in 0..=MAX_RETRANSMIT {
            env.advance(Duration::from_secs(60));
            engine.tick(&env, peer());
        }

        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn abort_frees_the_slot() {
        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        let (handle, _) = engine.send(&env, &confirmable_get(1, &[1]), peer()).unwrap();
        engine.abort(handle);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn oversized_message_is_rejected() {
        let env = MockEnv::new();
        let mut engine: Engine<MockEnv> = Engine::new();
        let mut msg = confirmable_get(1, &[1]);
        msg.payload = Bytes::from(vec![0u8; MAX_DATAGRAM_SIZE + 1]);
        assert!(engine.send(&env, &msg, peer()).is_err());
    }
}
