use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::player::Team;

/// Session-scoped score keeping. Regular mode counts wins per team;
/// minigame mode tracks the best record (most opponent cards still on the
/// board at a win). Reset when the session returns to the main menu.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    red_wins: u32,
    blue_wins: u32,
    best_record: Option<u32>,
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} : {}", self.red_wins, self.blue_wins)
    }
}

impl Statistics {
    pub fn record_win_for_team(&mut self, team: Team) {
        match team {
            Team::Red => self.red_wins += 1,
            Team::Blue => self.blue_wins += 1,
        }
    }

    pub fn wins_for_team(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.red_wins,
            Team::Blue => self.blue_wins,
        }
    }

    /// Keeps the best (highest) record seen this session.
    pub fn set_best_record(&mut self, remaining: u32) {
        match self.best_record {
            Some(best) if best >= remaining => {}
            _ => self.best_record = Some(remaining),
        }
    }

    pub fn best_record(&self) -> Option<u32> {
        self.best_record
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
