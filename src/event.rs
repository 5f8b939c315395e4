//! Discrete fire-and-forget notifications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an [`ActionEvent`] announces.
///
/// The wire carries a raw code (see the table in `from_code`) so a newer
/// peer can introduce kinds an older peer simply ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Confirm,
    EndRound,
    GameOver,
    GameAborted,
    Ready,
    Cancel,
    SelectCard,
    /// Anything this build does not recognize. Ignored, never an error.
    Unknown(u8),
}

impl EventKind {
    pub fn code(self) -> u8 {
        match self {
            EventKind::Confirm => 0,
            EventKind::EndRound => 1,
            EventKind::GameOver => 2,
            EventKind::GameAborted => 3,
            EventKind::Ready => 4,
            EventKind::Cancel => 5,
            EventKind::SelectCard => 6,
            EventKind::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => EventKind::Confirm,
            1 => EventKind::EndRound,
            2 => EventKind::GameOver,
            3 => EventKind::GameAborted,
            4 => EventKind::Ready,
            5 => EventKind::Cancel,
            6 => EventKind::SelectCard,
            other => EventKind::Unknown(other),
        }
    }
}

/// A one-shot notification broadcast once per occurrence, outside the
/// periodic state sync. Used for low-latency side effects (haptics,
/// timeline entries) and the small pregame mutations (ready/cancel) that
/// should not wait for the next heartbeat.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActionEvent {
    kind: u8,
    pub parameters: BTreeMap<String, String>,
}

impl ActionEvent {
    pub const PARAM_UUID: &'static str = "uuid";
    pub const PARAM_CARD_INDEX: &'static str = "card-index";

    pub fn new(kind: EventKind) -> Self {
        Self {
            kind: kind.code(),
            parameters: BTreeMap::new(),
        }
    }

    /// Event stamped with the acting player's uuid.
    pub fn from_player(kind: EventKind, uuid: Uuid) -> Self {
        let mut event = Self::new(kind);
        event
            .parameters
            .insert(Self::PARAM_UUID.to_string(), uuid.to_string());
        event
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_code(self.kind)
    }

    pub fn player_uuid(&self) -> Option<Uuid> {
        self.parameters
            .get(Self::PARAM_UUID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}
