//! Observer store: tracks which remote servers are watching which
//! resources, so the attribute engine (`attribute.rs`) knows who to
//! notify on a value change.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Capacity of the observer table.
pub const MAX_OBSERVERS: usize = 8;

/// Opaque handle identifying a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverHandle(u8);

/// A path being watched plus the last message id used to notify it, so
/// notifications can be issued with monotonically increasing mids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observer {
    /// The server watching this resource.
    pub remote: SocketAddr,
    /// The client token to echo back in notifications.
    pub token: Vec<u8>,
    /// The object/instance/resource path being observed, e.g. `/3/0/9`.
    pub resource_path: String,
    /// The message id of the most recent notification sent.
    pub last_mid: u16,
    /// Seconds accumulated since the last Confirmable notification. Reset
    /// to 0 whenever a CON is sent; a NON notification leaves it running.
    pub con_notification_epoch: u32,
}

/// Fixed-capacity table of active observations, serializable so it
/// survives a reconnect via the KV persistence oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObserverStore {
    slots: Vec<Option<Observer>>,
}

impl ObserverStore {
    /// An empty store with [`MAX_OBSERVERS`] slots.
    pub fn new() -> Self {
        Self { slots: vec![None; MAX_OBSERVERS] }
    }

    /// Number of active observations.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if no observation is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_slot(&self, remote: SocketAddr, resource_path: &str) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref().is_some_and(|o| o.remote == remote && o.resource_path == resource_path)
        })
    }

    /// Register (or refresh, if an entry for the same `(remote,
    /// resource_path)` already exists) an observation.
    pub fn register(&mut self, observer: Observer) -> Result<ObserverHandle, CoreError> {
        if let Some(index) = self.find_slot(observer.remote, &observer.resource_path) {
            self.slots[index] = Some(observer);
            return Ok(ObserverHandle(index as u8));
        }

        let index = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(CoreError::OutOfMemory("observer store"))?;
        self.slots[index] = Some(observer);
        Ok(ObserverHandle(index as u8))
    }

    /// Remove the observation at `handle`; no-op if already absent.
    pub fn unregister(&mut self, handle: ObserverHandle) {
        if let Some(slot) = self.slots.get_mut(handle.0 as usize) {
            *slot = None;
        }
    }

    /// Remove every observation targeting `resource_path` (used when the
    /// underlying instance is deleted).
    pub fn unregister_path(&mut self, resource_path: &str) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|o| o.resource_path == resource_path) {
                *slot = None;
            }
        }
    }

    /// Look up the handle for an existing `(remote, resource_path)` pair.
    pub fn find(&self, remote: SocketAddr, resource_path: &str) -> Option<ObserverHandle> {
        self.find_slot(remote, resource_path).map(|i| ObserverHandle(i as u8))
    }

    /// Borrow the observer at `handle`.
    pub fn get(&self, handle: ObserverHandle) -> Option<&Observer> {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    /// Borrow the observer at `handle`, mutably (used to bump `last_mid`).
    pub fn get_mut(&mut self, handle: ObserverHandle) -> Option<&mut Observer> {
        self.slots.get_mut(handle.0 as usize)?.as_mut()
    }

    /// Allocate the next message id for a notification to `handle`,
    /// wrapping modulo 2^16, and record it as `last_mid`. Returns `None`
    /// if `handle` no longer refers to an active observation.
    pub fn next_notification_mid(&mut self, handle: ObserverHandle) -> Option<u16> {
        let observer = self.get_mut(handle)?;
        observer.last_mid = observer.last_mid.wrapping_add(1);
        Some(observer.last_mid)
    }

    /// All active observers matching `resource_path`, or all active
    /// observers when `resource_path` is `None`.
    pub fn matching(&self, resource_path: Option<&str>) -> Vec<(ObserverHandle, &Observer)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let observer = slot.as_ref()?;
                let matches = resource_path.is_none_or(|p| p == observer.resource_path);
                matches.then_some((ObserverHandle(i as u8), observer))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn sample(port: u16, path: &str) -> Observer {
        Observer {
            remote: addr(port),
            token: vec![1, 2],
            resource_path: path.to_string(),
            last_mid: 0,
            con_notification_epoch: 0,
        }
    }

    #[test]
    fn register_reuses_matching_slot() {
        let mut store = ObserverStore::new();
        let first = store.register(sample(1, "/3/0/9")).unwrap();
        let second = store.register(sample(1, "/3/0/9")).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fills_and_rejects_when_full() {
        let mut store = ObserverStore::new();
        for i in 0..MAX_OBSERVERS as u16 {
            store.register(sample(i, "/3/0/9")).unwrap();
        }
        assert!(store.register(sample(999, "/3/0/9")).is_err());
    }

    #[test]
    fn unregister_frees_slot() {
        let mut store = ObserverStore::new();
        let handle = store.register(sample(1, "/3/0/9")).unwrap();
        store.unregister(handle);
        assert!(store.is_empty());
    }

    #[test]
    fn next_notification_mid_increments_and_records_last_mid() {
        let mut store = ObserverStore::new();
        let handle = store.register(sample(1, "/3/0/9")).unwrap();

        assert_eq!(store.next_notification_mid(handle), Some(1));
        assert_eq!(store.next_notification_mid(handle), Some(2));
        assert_eq!(store.get(handle).unwrap().last_mid, 2);
    }

    #[test]
    fn next_notification_mid_wraps_at_u16_max() {
        let mut store = ObserverStore::new();
        let mut observer = sample(1, "/3/0/9");
        observer.last_mid = u16::MAX;
        let handle = store.register(observer).unwrap();

        assert_eq!(store.next_notification_mid(handle), Some(0));
    }

    #[test]
    fn matching_filters_by_path() {
        let mut store = ObserverStore::new();
        store.register(sample(1, "/3/0/9")).unwrap();
        store.register(sample(2, "/1/0/1")).unwrap();

        assert_eq!(store.matching(Some("/3/0/9")).len(), 1);
        assert_eq!(store.matching(None).len(), 2);
    }

    #[test]
    fn unregister_path_removes_all_matches() {
        let mut store = ObserverStore::new();
        store.register(sample(1, "/3/0/9")).unwrap();
        store.register(sample(2, "/3/0/9")).unwrap();
        store.unregister_path("/3/0/9");
        assert!(store.is_empty());
    }

    #[test]
    fn serializes_for_kv_persistence() {
        let mut store = ObserverStore::new();
        store.register(sample(1, "/3/0/9")).unwrap();
        let bytes = {
            let mut buf = Vec::new();
            ciborium::into_writer(&store, &mut buf).unwrap();
            buf
        };
        let restored: ObserverStore = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(restored.len(), 1);
    }
}
