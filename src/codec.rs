//! Wire envelope for replicated objects.
//!
//! Every broadcast message is exactly one encoded [`Payload`]. The enum
//! tag order is the wire contract: append new variants, never reorder.
//! Decode faults (malformed bytes, unknown tag) drop the message; the
//! next heartbeat carries a fresher object, so nothing retries.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::cards::CardCollection;
use crate::event::ActionEvent;
use crate::player::Player;
use crate::room::{GameMode, Room};
use crate::round::Round;
use crate::stats::Statistics;
use crate::timer::RoundTimer;
use crate::transport::PeerId;

/// The previous Room schema, which carried no access code: those builds
/// advertised the code as the room's display name. Kept so a current
/// build can decode broadcasts from an older host.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoomV1 {
    pub name: String,
    pub uuid: Uuid,
    pub mode: GameMode,
    pub players: Vec<Player>,
    pub connected_peers: BTreeMap<PeerId, Uuid>,
}

impl From<RoomV1> for Room {
    fn from(v1: RoomV1) -> Self {
        Room::from_legacy_parts(v1.name, v1.uuid, v1.mode, v1.players, v1.connected_peers)
    }
}

/// One replicated object instance.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Payload {
    Player(Player),
    RoomV1(RoomV1),
    Room(Room),
    Cards(CardCollection),
    Round(Round),
    Stats(Statistics),
    Timer(RoundTimer),
    Action(ActionEvent),
}

pub fn encode(payload: &Payload) -> anyhow::Result<Bytes> {
    Ok(postcard::to_stdvec(payload)?.into())
}

/// Decode one message, normalizing legacy schemas. `None` means the
/// message was undecodable and has been dropped.
pub fn decode(bytes: &[u8]) -> Option<Payload> {
    match postcard::from_bytes::<Payload>(bytes) {
        Ok(Payload::RoomV1(v1)) => Some(Payload::Room(v1.into())),
        Ok(payload) => Some(payload),
        Err(err) => {
            debug!("dropping undecodable payload ({} bytes): {err}", bytes.len());
            None
        }
    }
}
