//! Production transport over iroh.
//!
//! Discovery/advertising rides on local-network (mDNS) discovery records:
//! an advertiser packs its display name and metadata into the record's
//! user data, and browsers watch the discovery stream. The reliable
//! broadcast channel is a gossip topic derived from the advertising
//! peer's id; inviting a peer means joining its topic, which the
//! advertiser accepts by construction (trust is implicit on the local
//! network).

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use iroh::discovery::UserData;
use iroh::discovery::mdns::MdnsDiscovery;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointId, SecretKey};
use iroh_gossip::{
    ALPN as GOSSIP_ALPN,
    api::{Event as GossipEvent, GossipSender},
    net::Gossip,
    proto::TopicId,
};
use n0_future::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{DiscoveryInfo, PeerId, PeerTransport, TransportEvent};

/// How long a peer may stay silent on the discovery stream before
/// browsers report it lost.
const DISCOVERY_STALE_AFTER: Duration = Duration::from_secs(10);

struct Node {
    endpoint: Endpoint,
    gossip: Gossip,
    router: Router,
    local: PeerId,
}

struct Session {
    sender: GossipSender,
    recv_task: JoinHandle<()>,
    connected: Arc<Mutex<BTreeSet<PeerId>>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

pub struct IrohTransport {
    data_dir: PathBuf,
    node: Option<Node>,
    advertising: bool,
    browse_task: Option<JoinHandle<()>>,
    session: Option<Session>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl IrohTransport {
    /// `data_dir` holds the endpoint keypair so a device keeps its
    /// network identity between sessions; `None` uses a throwaway
    /// directory.
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => tempfile::tempdir()?.keep(),
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            data_dir,
            node: None,
            advertising: false,
            browse_task: None,
            session: None,
            events_tx,
            events_rx: Some(events_rx),
        })
    }

    fn node(&self) -> Result<&Node> {
        match &self.node {
            Some(node) => Ok(node),
            None => bail!("identity has not been set"),
        }
    }

    async fn join_topic(&mut self, owner: PeerId) -> Result<()> {
        let node = self.node()?;
        let topic = TopicId::from_bytes(owner.0);
        let bootstrap = if owner == node.local {
            Vec::new()
        } else {
            vec![EndpointId::from_bytes(&owner.0).context("invalid peer id")?]
        };
        let gossip = node.gossip.clone();
        let events = self.events_tx.clone();
        let connected = Arc::new(Mutex::new(BTreeSet::new()));
        let connected_task = connected.clone();

        // subscribing is async; hand the sender back through a oneshot so
        // broadcast can start as soon as the swarm forms
        let (sender_tx, sender_rx) = tokio::sync::oneshot::channel();
        let recv_task = tokio::spawn(async move {
            let topic = match gossip.subscribe(topic, bootstrap).await {
                Ok(topic) => topic,
                Err(err) => {
                    warn!("failed to join session topic: {err:#}");
                    return;
                }
            };
            let (sender, mut receiver) = topic.split();
            let _ = sender_tx.send(sender);
            while let Some(event) = receiver.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        warn!("gossip receiver error: {err:#}");
                        break;
                    }
                };
                match event {
                    GossipEvent::NeighborUp(id) => {
                        let peer = PeerId(*id.as_bytes());
                        connected_task
                            .lock()
                            .expect("connected set poisoned")
                            .insert(peer);
                        let _ = events.send(TransportEvent::PeerConnected(peer));
                    }
                    GossipEvent::NeighborDown(id) => {
                        let peer = PeerId(*id.as_bytes());
                        connected_task
                            .lock()
                            .expect("connected set poisoned")
                            .remove(&peer);
                        let _ = events.send(TransportEvent::PeerDisconnected(peer));
                    }
                    GossipEvent::Received(message) => {
                        let _ = events.send(TransportEvent::Data {
                            from: PeerId(*message.delivered_from.as_bytes()),
                            payload: message.content,
                        });
                    }
                    GossipEvent::Lagged => {
                        // dropped gossip messages heal on the next heartbeat
                        debug!("gossip receiver lagged");
                    }
                }
            }
        });
        let sender = sender_rx
            .await
            .context("session topic closed before it was joined")?;
        self.session = Some(Session {
            sender,
            recv_task,
            connected,
        });
        Ok(())
    }
}

impl PeerTransport for IrohTransport {
    async fn set_identity(&mut self, _name: &str) -> Result<PeerId> {
        if let Some(node) = &self.node {
            return Ok(node.local);
        }
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let key = load_secret_key(self.data_dir.join("keypair")).await?;
        let endpoint = Endpoint::builder()
            .secret_key(key)
            .add_discovery(MdnsDiscovery::builder())
            .bind()
            .await?;
        let gossip = Gossip::builder().spawn(endpoint.clone());
        let router = Router::builder(endpoint.clone())
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();
        let local = PeerId(*endpoint.id().as_bytes());
        self.node = Some(Node {
            endpoint,
            gossip,
            router,
            local,
        });
        Ok(local)
    }

    fn local_peer(&self) -> Option<PeerId> {
        self.node.as_ref().map(|node| node.local)
    }

    async fn start_advertising(&mut self, info: DiscoveryInfo) -> Result<()> {
        if self.advertising {
            return Ok(());
        }
        let node = self.node()?;
        let user_data = UserData::try_from(encode_user_data(&info))
            .context("discovery metadata too large")?;
        node.endpoint.set_user_data_for_discovery(Some(user_data));
        self.advertising = true;
        Ok(())
    }

    async fn stop_advertising(&mut self) {
        if !self.advertising {
            return;
        }
        if let Some(node) = &self.node {
            node.endpoint.set_user_data_for_discovery(None);
        }
        self.advertising = false;
    }

    async fn start_browsing(&mut self) -> Result<()> {
        if self.browse_task.is_some() {
            return Ok(());
        }
        let node = self.node()?;
        let mut stream = node.endpoint.discovery_stream();
        let local = node.local;
        let events = self.events_tx.clone();
        self.browse_task = Some(tokio::spawn(async move {
            let mut last_seen: BTreeMap<PeerId, tokio::time::Instant> = BTreeMap::new();
            let mut sweep = tokio::time::interval(Duration::from_secs(2));
            loop {
                tokio::select! {
                    item = stream.next() => {
                        let Some(item) = item else { break };
                        let item = match item {
                            Ok(item) => item,
                            Err(_lagged) => continue,
                        };
                        let peer = PeerId(*item.endpoint_id().as_bytes());
                        if peer == local {
                            continue;
                        }
                        let Some(user_data) = item.user_data() else {
                            continue;
                        };
                        let info = decode_user_data(user_data.as_ref());
                        let fresh = last_seen
                            .insert(peer, tokio::time::Instant::now())
                            .is_none();
                        if fresh {
                            let _ = events.send(TransportEvent::PeerFound { peer, info });
                        }
                    }
                    _ = sweep.tick() => {
                        let now = tokio::time::Instant::now();
                        let stale: Vec<PeerId> = last_seen
                            .iter()
                            .filter(|(_, seen)| now.duration_since(**seen) > DISCOVERY_STALE_AFTER)
                            .map(|(peer, _)| *peer)
                            .collect();
                        for peer in stale {
                            last_seen.remove(&peer);
                            let _ = events.send(TransportEvent::PeerLost(peer));
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    async fn stop_browsing(&mut self) {
        if let Some(task) = self.browse_task.take() {
            task.abort();
        }
    }

    async fn open_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let local = self.node()?.local;
        self.join_topic(local).await
    }

    async fn invite(&mut self, peer: &PeerId) -> Result<()> {
        if self.node.is_none() {
            bail!("identity has not been set");
        }
        // joining the advertiser's topic is the invitation; the advertiser
        // accepts automatically by carrying the swarm
        self.session = None;
        self.join_topic(*peer).await
    }

    async fn broadcast(&mut self, bytes: Bytes) {
        let Some(session) = &self.session else { return };
        if session
            .connected
            .lock()
            .expect("connected set poisoned")
            .is_empty()
        {
            return;
        }
        if let Err(err) = session.sender.broadcast(bytes).await {
            // best effort; the heartbeat rebroadcast heals the gap
            debug!("broadcast failed: {err:#}");
        }
    }

    async fn send(&mut self, bytes: Bytes, to: &[PeerId]) {
        // gossip has no targeted lane; receivers filter, so a broadcast
        // is an acceptable over-delivery for the small welcome payloads
        if to.is_empty() {
            return;
        }
        self.broadcast(bytes).await;
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.session
            .as_ref()
            .map(|session| {
                session
                    .connected
                    .lock()
                    .expect("connected set poisoned")
                    .iter()
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.take()
    }

    async fn terminate(&mut self) {
        self.stop_advertising().await;
        self.stop_browsing().await;
        self.session = None;
        if let Some(node) = self.node.take()
            && let Err(err) = node.router.shutdown().await
        {
            warn!("router shutdown failed: {err:#}");
        }
    }
}

fn encode_user_data(info: &DiscoveryInfo) -> String {
    info.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn decode_user_data(raw: &str) -> DiscoveryInfo {
    raw.split(';')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

async fn load_secret_key(key_path: PathBuf) -> Result<SecretKey> {
    if key_path.exists() {
        let key_bytes = tokio::fs::read(key_path).await?;
        let secret_key = SecretKey::try_from(&key_bytes[0..32])?;
        Ok(secret_key)
    } else {
        let secret_key = SecretKey::generate(&mut rand::rng());

        let key_path = key_path.canonicalize().unwrap_or(key_path);
        let key_path_parent = key_path.parent().ok_or_else(|| {
            anyhow::anyhow!("no parent directory found for '{}'", key_path.display())
        })?;
        tokio::fs::create_dir_all(&key_path_parent).await?;

        // write-then-rename so a crash never leaves a half-written key
        let (file, temp_file_path) = tempfile::NamedTempFile::new_in(key_path_parent)
            .context("unable to create tempfile")?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);
        file.write_all(&secret_key.to_bytes())
            .await
            .context("unable to write keyfile")?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(temp_file_path, key_path)
            .await
            .context("failed to rename keyfile")?;

        Ok(secret_key)
    }
}
