//! Peer discovery and the reliable broadcast channel.
//!
//! No game semantics live here: the session layer decides who to invite
//! and what the bytes mean.

pub mod iroh;
pub mod mem;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Discovery metadata key carrying the room identifier.
pub const INFO_ROOM_UUID: &str = "room-uuid";
/// Discovery metadata key carrying the joinability token.
pub const INFO_ACCESS_CODE: &str = "room-access-code";

/// Small string-keyed map advertised alongside a peer's presence, so
/// joiners can match by access code instead of accepting every
/// announcement.
pub type DiscoveryInfo = BTreeMap<String, String>;

/// Opaque network identity, stable for the lifetime of one connection and
/// not persistent across sessions.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub [u8; 32]);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..5] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..")
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

/// Transport callbacks, marshaled onto the session's single event loop
/// through an ordered queue.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Browsing discovered an advertising peer.
    PeerFound { peer: PeerId, info: DiscoveryInfo },
    /// A previously found peer stopped advertising or went stale.
    PeerLost(PeerId),
    /// The peer joined our session channel.
    PeerConnected(PeerId),
    /// The peer's link dropped, for any reason. May be delivered more
    /// than once for the same peer.
    PeerDisconnected(PeerId),
    /// One message from the reliable, ordered channel.
    Data { from: PeerId, payload: Bytes },
}

/// Discovery/advertising plus a reliable, ordered, broadcast-capable
/// channel between connected peers.
///
/// `set_identity` must be called before anything else. The start/stop
/// pairs are tracked by on/off flags: repeating a call in the same state
/// is a no-op, never an error. Send failures are swallowed: delivery is
/// best effort, and the periodic full-state rebroadcast heals any single
/// dropped message.
///
/// Methods return named `Send` futures (implementations just write
/// `async fn`) so a session generic over its transport can live on a
/// spawned task.
pub trait PeerTransport: Send + 'static {
    /// Establish the local peer's displayed identity. Idempotent per
    /// session.
    fn set_identity(&mut self, name: &str) -> impl Future<Output = Result<PeerId>> + Send;

    fn local_peer(&self) -> Option<PeerId>;

    /// Announce local presence with discovery metadata.
    fn start_advertising(&mut self, info: DiscoveryInfo)
    -> impl Future<Output = Result<()>> + Send;

    fn stop_advertising(&mut self) -> impl Future<Output = ()> + Send;

    /// Start watching for advertising peers; yields `PeerFound`/`PeerLost`.
    fn start_browsing(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn stop_browsing(&mut self) -> impl Future<Output = ()> + Send;

    /// Create the reliable channel. Must precede invitations and sends.
    fn open_session(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Ask a found peer to join our session. The advertising side accepts
    /// automatically; trust is implicit within physical proximity.
    fn invite(&mut self, peer: &PeerId) -> impl Future<Output = Result<()>> + Send;

    /// Reliable, ordered delivery to every connected peer. Silently does
    /// nothing when no peer is connected.
    fn broadcast(&mut self, bytes: Bytes) -> impl Future<Output = ()> + Send;

    /// Targeted variant of [`PeerTransport::broadcast`].
    fn send(&mut self, bytes: Bytes, to: &[PeerId]) -> impl Future<Output = ()> + Send;

    fn connected_peers(&self) -> Vec<PeerId>;

    /// Take the event queue. Yields `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;

    /// Stop advertising, browsing and the session. The transport may be
    /// reconfigured afterwards for a new session.
    fn terminate(&mut self) -> impl Future<Output = ()> + Send;
}
