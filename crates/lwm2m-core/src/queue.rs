//! Fixed-capacity retransmission queue.
//!
//! A confirmable send occupies one slot until it's acknowledged, times out,
//! or is explicitly aborted. This is the only place retransmission timers
//! live — the message engine (`engine.rs`) drives them by walking the
//! queue on each tick.

use bytes::Bytes;

use crate::{env::Environment, error::CoreError};

/// Capacity of the retransmission queue. A device with this many
/// in-flight confirmable exchanges across all contexts has exhausted its
/// budget; further sends fail with [`CoreError::OutOfMemory`].
pub const QUEUE_SIZE: usize = 4;

/// Maximum number of retransmissions before an exchange is abandoned.
pub const MAX_RETRANSMIT: u8 = 4;

/// Opaque handle identifying a queued exchange; stable for the item's
/// lifetime in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle(u8);

impl QueueHandle {
    pub(crate) fn from_raw(value: u8) -> Self {
        Self(value)
    }
}

/// A pending confirmable exchange awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// The serialized datagram, kept for retransmission.
    pub bytes: Bytes,
    /// The message id used to match a duplicate ack/reset.
    pub mid: u16,
    /// The token used to match the eventual response.
    pub token: Bytes,
    /// How many retransmissions have been sent so far.
    pub retransmit_count: u8,
}

struct Slot<I> {
    item: Option<QueueItem>,
    next_retransmit_at: Option<I>,
}

/// Fixed-capacity ring of in-flight confirmable exchanges.
pub struct Queue<E: Environment> {
    slots: Vec<Slot<E::Instant>>,
}

impl<E: Environment> Queue<E> {
    /// An empty queue with [`QUEUE_SIZE`] slots.
    pub fn new() -> Self {
        let slots = (0..QUEUE_SIZE).map(|_| Slot { item: None, next_retransmit_at: None }).collect();
        Self { slots }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.item.is_some()).count()
    }

    /// True if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `item` into the first free slot, scheduling its first
    /// retransmission at `retransmit_at`.
    pub fn add(&mut self, item: QueueItem, retransmit_at: E::Instant) -> Result<QueueHandle, CoreError> {
        let index = self
            .slots
            .iter()
            .position(|s| s.item.is_none())
            .ok_or(CoreError::OutOfMemory("retransmission queue"))?;
        self.slots[index] = Slot { item: Some(item), next_retransmit_at: Some(retransmit_at) };
        Ok(QueueHandle(index as u8))
    }

    /// Free the slot at `handle`, if still occupied. Returns the item that
    /// was there, if any.
    pub fn remove(&mut self, handle: QueueHandle) -> Option<QueueItem> {
        let slot = self.slots.get_mut(handle.0 as usize)?;
        slot.next_retransmit_at = None;
        slot.item.take()
    }

    /// Find and remove the item matching `token`, if any, returning its
    /// handle alongside the removed item.
    pub fn remove_by_token(&mut self, token: &[u8]) -> Option<(QueueHandle, QueueItem)> {
        let index = self.slots.iter().position(|s| {
            s.item.as_ref().is_some_and(|item| !item.token.is_empty() && item.token == token)
        })?;
        self.slots[index].next_retransmit_at = None;
        let item = self.slots[index].item.take()?;
        Some((QueueHandle(index as u8), item))
    }

    /// Find and remove the item matching `mid`, if any.
    pub fn remove_by_mid(&mut self, mid: u16) -> Option<QueueItem> {
        let index = self.slots.iter().position(|s| s.item.as_ref().is_some_and(|item| item.mid == mid))?;
        self.slots[index].next_retransmit_at = None;
        self.slots[index].item.take()
    }

    /// Iterate occupied slots whose retransmission deadline has passed, in
    /// slot-index order, yielding `(handle, next_retransmit_at)`.
    pub fn due_for_retransmit(&self, now: E::Instant) -> Vec<(QueueHandle, E::Instant)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let deadline = slot.next_retransmit_at?;
                slot.item.as_ref()?;
                (deadline <= now).then_some((QueueHandle(i as u8), deadline))
            })
            .collect()
    }

    /// Record a retransmission attempt: bumps the item's retry count and
    /// reschedules its next deadline. Returns `None` if the handle is
    /// stale (already removed).
    pub fn mark_retransmitted(&mut self, handle: QueueHandle, next_retransmit_at: E::Instant) -> Option<u8> {
        let slot = self.slots.get_mut(handle.0 as usize)?;
        let item = slot.item.as_mut()?;
        item.retransmit_count += 1;
        slot.next_retransmit_at = Some(next_retransmit_at);
        Some(item.retransmit_count)
    }

    /// Borrow the item at `handle`, if occupied.
    pub fn get(&self, handle: QueueHandle) -> Option<&QueueItem> {
        self.slots.get(handle.0 as usize)?.item.as_ref()
    }
}

impl<E: Environment> Default for Queue<E> {
    fn default() -> Self {
        Self::new()
    }
}
