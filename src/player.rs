use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two playable teams.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn other(&self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

impl Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::Red => write!(f, "Red"),
            Team::Blue => write!(f, "Blue"),
        }
    }
}

/// One participant in a room.
///
/// Every device owns exactly one authoritative `Player` for itself; all
/// other players it knows about are replicas received from the host.
/// Equality is by uuid so a replica compares equal to the local original.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Player {
    uuid: Uuid,
    pub name: String,
    pub team: Team,
    is_host: bool,
    pub is_clue_giver: bool,
    pub is_ready: bool,
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for Player {}

impl Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Player {
    pub fn new(name: &str, team: Team, is_host: bool) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            team,
            is_host,
            is_clue_giver: false,
            is_ready: false,
        }
    }

    /// The non-networked opponent used in minigame rooms. It occupies a
    /// player slot but never maps to a connected peer.
    pub fn cpu() -> Self {
        Self {
            uuid: Uuid::nil(),
            name: "CPU".to_string(),
            team: Team::Blue,
            is_host: false,
            is_clue_giver: true,
            is_ready: true,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_cpu(&self) -> bool {
        self.uuid.is_nil()
    }

    pub fn set_team(&mut self, team: Team) {
        if self.team != team {
            self.team = team;
            // a clue-giver nomination does not survive switching sides
            self.is_clue_giver = false;
        }
    }
}
