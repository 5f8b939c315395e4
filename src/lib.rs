//! Peer session and game-state synchronization engine for a local ad-hoc
//! word-guessing party game.
//!
//! Devices on the same network discover each other, form a room behind a
//! short access code, and replicate room/round state from the
//! authoritative host: a periodic full-state heartbeat heals anything a
//! discrete action broadcast missed.

mod cards;
mod codec;
mod error;
mod event;
mod player;
mod room;
mod round;
mod session;
mod stats;
mod timer;
pub mod transport;

pub use cards::{Card, CardCollection, CardTeam, MINIGAME_CARD_COUNT, REGULAR_CARD_COUNT};
pub use codec::{Payload, RoomV1, decode, encode};
pub use error::EngineError;
pub use event::{ActionEvent, EventKind};
pub use player::{Player, Team};
pub use room::{GameMode, ROOM_MAX_SIZE, Room};
pub use round::{CLUE_PLACEHOLDER, NUMBER_OF_WORDS_PLACEHOLDER, Round, SelectionOutcome};
pub use session::{
    EndReason, GameSession, SessionConfig, SessionEvent, SessionPhase, SessionSnapshot,
    TerminateReason,
};
pub use stats::Statistics;
pub use timer::{RoundTimer, TimerState};
