//! In-process transport used by tests and local simulations.
//!
//! A [`MemNet`] hub wires any number of [`MemTransport`] instances
//! together through ordered per-node queues, so delivery is reliable and
//! in send order, exactly like the production channel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use bytes::Bytes;
use rand::Rng;
use tokio::sync::mpsc;

use super::{DiscoveryInfo, PeerId, PeerTransport, TransportEvent};

#[derive(Default)]
struct Node {
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
    advertising: Option<DiscoveryInfo>,
    browsing: bool,
    session_open: bool,
    connected: BTreeSet<PeerId>,
}

impl Node {
    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            // a dropped receiver just means that node is gone
            let _ = events.send(event);
        }
    }
}

#[derive(Default)]
struct Hub {
    nodes: BTreeMap<PeerId, Node>,
}

impl Hub {
    fn connect(&mut self, a: PeerId, b: PeerId) {
        if a == b {
            return;
        }
        let fresh = self
            .nodes
            .get_mut(&a)
            .map(|node| node.connected.insert(b))
            .unwrap_or(false);
        if let Some(node) = self.nodes.get_mut(&b) {
            node.connected.insert(a);
            if fresh {
                node.emit(TransportEvent::PeerConnected(a));
            }
        }
        if fresh && let Some(node) = self.nodes.get(&a) {
            node.emit(TransportEvent::PeerConnected(b));
        }
    }

    fn drop_links(&mut self, peer: PeerId) {
        let Some(connected) = self
            .nodes
            .get_mut(&peer)
            .map(|node| std::mem::take(&mut node.connected))
        else {
            return;
        };
        for other in connected {
            if let Some(node) = self.nodes.get_mut(&other) {
                node.connected.remove(&peer);
                node.emit(TransportEvent::PeerDisconnected(peer));
            }
        }
    }

    fn announce_lost(&mut self, peer: PeerId) {
        for (id, node) in &self.nodes {
            if *id != peer && node.browsing {
                node.emit(TransportEvent::PeerLost(peer));
            }
        }
    }
}

/// The shared hub. Clone it freely; every clone refers to the same
/// simulated network.
#[derive(Clone, Default)]
pub struct MemNet {
    inner: Arc<Mutex<Hub>>,
}

impl MemNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport endpoint attached to this hub.
    pub fn transport(&self) -> MemTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        MemTransport {
            net: self.clone(),
            local: None,
            events_tx: tx,
            events_rx: Some(rx),
        }
    }

    /// Abruptly cut a peer off, as a radio loss would. The peer's own
    /// transport is not told; everyone else sees `PeerDisconnected`.
    pub fn sever(&self, peer: PeerId) {
        let mut hub = self.inner.lock().expect("mem hub poisoned");
        hub.drop_links(peer);
        if let Some(node) = hub.nodes.get_mut(&peer) {
            node.advertising = None;
            node.session_open = false;
        }
        hub.announce_lost(peer);
    }

    /// Push a duplicate disconnect notification at one observer. Test
    /// hook for the exactly-once handling of repeated callbacks.
    pub fn inject_disconnect(&self, observer: PeerId, about: PeerId) {
        let hub = self.inner.lock().expect("mem hub poisoned");
        if let Some(node) = hub.nodes.get(&observer) {
            node.emit(TransportEvent::PeerDisconnected(about));
        }
    }
}

/// One simulated device on a [`MemNet`].
pub struct MemTransport {
    net: MemNet,
    local: Option<PeerId>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl MemTransport {
    fn local(&self) -> Result<PeerId> {
        match self.local {
            Some(peer) => Ok(peer),
            None => bail!("identity has not been set"),
        }
    }
}

impl PeerTransport for MemTransport {
    async fn set_identity(&mut self, _name: &str) -> Result<PeerId> {
        if let Some(peer) = self.local {
            return Ok(peer);
        }
        let peer = PeerId(rand::rng().random());
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        let node = hub.nodes.entry(peer).or_default();
        node.events = Some(self.events_tx.clone());
        self.local = Some(peer);
        Ok(peer)
    }

    fn local_peer(&self) -> Option<PeerId> {
        self.local
    }

    async fn start_advertising(&mut self, info: DiscoveryInfo) -> Result<()> {
        let peer = self.local()?;
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        if hub
            .nodes
            .get(&peer)
            .is_some_and(|node| node.advertising.is_some())
        {
            return Ok(());
        }
        if let Some(node) = hub.nodes.get_mut(&peer) {
            node.advertising = Some(info.clone());
        }
        for (id, node) in &hub.nodes {
            if *id != peer && node.browsing {
                node.emit(TransportEvent::PeerFound {
                    peer,
                    info: info.clone(),
                });
            }
        }
        Ok(())
    }

    async fn stop_advertising(&mut self) {
        let Some(peer) = self.local else { return };
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        let was_on = hub
            .nodes
            .get_mut(&peer)
            .map(|node| node.advertising.take().is_some())
            .unwrap_or(false);
        if was_on {
            hub.announce_lost(peer);
        }
    }

    async fn start_browsing(&mut self) -> Result<()> {
        let peer = self.local()?;
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        if hub.nodes.get(&peer).is_some_and(|node| node.browsing) {
            return Ok(());
        }
        if let Some(node) = hub.nodes.get_mut(&peer) {
            node.browsing = true;
        }
        let found: Vec<(PeerId, DiscoveryInfo)> = hub
            .nodes
            .iter()
            .filter(|(id, node)| **id != peer && node.advertising.is_some())
            .map(|(id, node)| (*id, node.advertising.clone().unwrap_or_default()))
            .collect();
        if let Some(node) = hub.nodes.get(&peer) {
            for (found_peer, info) in found {
                node.emit(TransportEvent::PeerFound {
                    peer: found_peer,
                    info,
                });
            }
        }
        Ok(())
    }

    async fn stop_browsing(&mut self) {
        let Some(peer) = self.local else { return };
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        if let Some(node) = hub.nodes.get_mut(&peer) {
            node.browsing = false;
        }
    }

    async fn open_session(&mut self) -> Result<()> {
        let peer = self.local()?;
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        if let Some(node) = hub.nodes.get_mut(&peer) {
            node.session_open = true;
        }
        Ok(())
    }

    async fn invite(&mut self, target: &PeerId) -> Result<()> {
        let peer = self.local()?;
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        let accepted = hub.nodes.get(target).is_some_and(|node| {
            node.advertising.is_some() && node.session_open && node.events.is_some()
        });
        let ready = hub.nodes.get(&peer).is_some_and(|node| node.session_open);
        if !accepted || !ready {
            // invitation quietly times out; the join deadline handles it
            return Ok(());
        }
        let mut group: Vec<PeerId> = hub
            .nodes
            .get(target)
            .map(|node| node.connected.iter().copied().collect())
            .unwrap_or_default();
        group.push(*target);
        for member in group {
            hub.connect(peer, member);
        }
        Ok(())
    }

    async fn broadcast(&mut self, bytes: Bytes) {
        let Some(peer) = self.local else { return };
        let hub = self.net.inner.lock().expect("mem hub poisoned");
        let Some(node) = hub.nodes.get(&peer) else {
            return;
        };
        for other in &node.connected {
            if let Some(target) = hub.nodes.get(other) {
                target.emit(TransportEvent::Data {
                    from: peer,
                    payload: bytes.clone(),
                });
            }
        }
    }

    async fn send(&mut self, bytes: Bytes, to: &[PeerId]) {
        let Some(peer) = self.local else { return };
        let hub = self.net.inner.lock().expect("mem hub poisoned");
        let Some(node) = hub.nodes.get(&peer) else {
            return;
        };
        for other in to {
            if node.connected.contains(other)
                && let Some(target) = hub.nodes.get(other)
            {
                target.emit(TransportEvent::Data {
                    from: peer,
                    payload: bytes.clone(),
                });
            }
        }
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        let Some(peer) = self.local else {
            return Vec::new();
        };
        let hub = self.net.inner.lock().expect("mem hub poisoned");
        hub.nodes
            .get(&peer)
            .map(|node| node.connected.iter().copied().collect())
            .unwrap_or_default()
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.take()
    }

    async fn terminate(&mut self) {
        let Some(peer) = self.local else { return };
        let mut hub = self.net.inner.lock().expect("mem hub poisoned");
        hub.drop_links(peer);
        let was_advertising = hub
            .nodes
            .get_mut(&peer)
            .map(|node| {
                let on = node.advertising.take().is_some();
                node.browsing = false;
                node.session_open = false;
                on
            })
            .unwrap_or(false);
        if was_advertising {
            hub.announce_lost(peer);
        }
    }
}
