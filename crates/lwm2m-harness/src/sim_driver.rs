//! Deterministic simulation driver for orchestration-layer integration
//! tests.
//!
//! [`SimDriver`] implements [`lwm2m_app::Driver`] over an in-memory
//! datagram queue keyed by peer address, a virtual clock shared with the
//! [`lwm2m_app::Runtime`] it drives, and an in-memory map standing in for
//! flash — the exact same `Runtime` code that drives a real UDP socket in
//! production runs unmodified against this driver in tests.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use lwm2m_app::{Driver, DriverError};
use lwm2m_core::Environment;

use crate::sim_env::SimEnv;

/// One simulated peer's datagram queues, from the device's point of view.
#[derive(Default)]
struct PeerQueues {
    /// Datagrams the peer has sent, waiting to be polled.
    inbound: VecDeque<Vec<u8>>,
    /// Datagrams the device has sent to this peer, for test assertions.
    outbound: Vec<Vec<u8>>,
}

/// Deterministic stand-in for a UDP socket, modem oracle, and flash KV
/// store. Peers are addressed by a small deterministic port assigned the
/// first time their URI is resolved, rather than by real DNS/PDN
/// activation.
pub struct SimDriver {
    env: SimEnv,
    endpoint_name: String,
    peers: BTreeMap<SocketAddr, PeerQueues>,
    uri_to_peer: HashMap<String, SocketAddr>,
    next_port: u16,
    kv: HashMap<u16, Vec<u8>>,
    apn_swaps: u32,
    ip_family_toggles: u32,
    drop_next_sends: usize,
}

impl SimDriver {
    /// A fresh driver with no peers resolved yet and an empty KV store.
    pub fn new(env: SimEnv, endpoint_name: impl Into<String>) -> Self {
        Self {
            env,
            endpoint_name: endpoint_name.into(),
            peers: BTreeMap::new(),
            uri_to_peer: HashMap::new(),
            next_port: 5683,
            kv: HashMap::new(),
            apn_swaps: 0,
            ip_family_toggles: 0,
            drop_next_sends: 0,
        }
    }

    /// The socket address a server URI resolves to, assigning one
    /// deterministically if this is the first time it has been seen.
    pub fn peer_for(&mut self, server_uri: &str) -> SocketAddr {
        let peers = &mut self.peers;
        let next_port = &mut self.next_port;
        *self.uri_to_peer.entry(server_uri.to_string()).or_insert_with(|| {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), *next_port);
            *next_port += 1;
            peers.entry(addr).or_default();
            addr
        })
    }

    /// Queue a datagram as if `peer` had sent it to the device. Panics if
    /// `peer` has never been resolved — call [`SimDriver::peer_for`]
    /// first, or resolve it through a prior [`Driver::resolve_peer`] call.
    pub fn inject_datagram(&mut self, peer: SocketAddr, bytes: Vec<u8>) {
        self.peers.entry(peer).or_default().inbound.push_back(bytes);
    }

    /// Drain every datagram the device has sent to `peer` so far.
    pub fn take_sent(&mut self, peer: SocketAddr) -> Vec<Vec<u8>> {
        self.peers.get_mut(&peer).map(std::mem::take).map(|q| q.outbound).unwrap_or_default()
    }

    /// Drop the next `count` outbound sends silently, simulating packet
    /// loss for retransmission tests.
    pub fn drop_next_sends(&mut self, count: usize) {
        self.drop_next_sends = count;
    }

    /// How many times [`Driver::swap_apn`] has been called.
    pub fn apn_swaps(&self) -> u32 {
        self.apn_swaps
    }

    /// How many times [`Driver::toggle_ip_family`] has been called.
    pub fn ip_family_toggles(&self) -> u32 {
        self.ip_family_toggles
    }
}

impl Driver for SimDriver {
    type Error = DriverError;
    type Instant = <SimEnv as Environment>::Instant;

    async fn poll_datagram(&mut self) -> Result<Option<(Vec<u8>, SocketAddr)>, Self::Error> {
        for (peer, queues) in &mut self.peers {
            if let Some(bytes) = queues.inbound.pop_front() {
                return Ok(Some((bytes, *peer)));
            }
        }
        Ok(None)
    }

    async fn send_datagram(&mut self, bytes: &[u8], peer: SocketAddr) -> Result<(), Self::Error> {
        if self.drop_next_sends > 0 {
            self.drop_next_sends -= 1;
            return Ok(());
        }
        self.peers.entry(peer).or_default().outbound.push(bytes.to_vec());
        Ok(())
    }

    async fn resolve_peer(&mut self, server_uri: &str) -> Result<SocketAddr, Self::Error> {
        Ok(self.peer_for(server_uri))
    }

    fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    async fn swap_apn(&mut self) -> Result<(), Self::Error> {
        self.apn_swaps += 1;
        Ok(())
    }

    async fn toggle_ip_family(&mut self) -> Result<(), Self::Error> {
        self.ip_family_toggles += 1;
        Ok(())
    }

    async fn kv_get(&mut self, key: u16) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.kv.get(&key).cloned())
    }

    async fn kv_put(&mut self, key: u16, bytes: Vec<u8>) -> Result<(), Self::Error> {
        self.kv.insert(key, bytes);
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn now_unix(&self) -> i64 {
        self.env.now_unix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolved_peer_is_stable() {
        let mut driver = SimDriver::new(SimEnv::with_seed(1), "urn:imei:1");
        let a = driver.resolve_peer("coap://server1").await.unwrap();
        let b = driver.resolve_peer("coap://server1").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_uris_get_distinct_peers() {
        let mut driver = SimDriver::new(SimEnv::with_seed(1), "urn:imei:1");
        let a = driver.resolve_peer("coap://server1").await.unwrap();
        let b = driver.resolve_peer("coap://server2").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn injected_datagram_is_polled() {
        let mut driver = SimDriver::new(SimEnv::with_seed(1), "urn:imei:1");
        let peer = driver.resolve_peer("coap://server1").await.unwrap();
        driver.inject_datagram(peer, vec![1, 2, 3]);
        let (bytes, from) = driver.poll_datagram().await.unwrap().unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(from, peer);
    }

    #[tokio::test]
    async fn sent_datagrams_are_captured() {
        let mut driver = SimDriver::new(SimEnv::with_seed(1), "urn:imei:1");
        let peer = driver.resolve_peer("coap://server1").await.unwrap();
        driver.send_datagram(&[9, 9], peer).await.unwrap();
        assert_eq!(driver.take_sent(peer), vec![vec![9, 9]]);
    }

    #[tokio::test]
    async fn dropped_sends_never_reach_the_peer() {
        let mut driver = SimDriver::new(SimEnv::with_seed(1), "urn:imei:1");
        let peer = driver.resolve_peer("coap://server1").await.unwrap();
        driver.drop_next_sends(1);
        driver.send_datagram(&[1], peer).await.unwrap();
        driver.send_datagram(&[2], peer).await.unwrap();
        assert_eq!(driver.take_sent(peer), vec![vec![2]]);
    }

    #[tokio::test]
    async fn kv_round_trips() {
        let mut driver = SimDriver::new(SimEnv::with_seed(1), "urn:imei:1");
        assert_eq!(driver.kv_get(7).await.unwrap(), None);
        driver.kv_put(7, vec![4, 5, 6]).await.unwrap();
        assert_eq!(driver.kv_get(7).await.unwrap(), Some(vec![4, 5, 6]));
    }
}
