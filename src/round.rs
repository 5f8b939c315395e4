//! Per-game turn state machine.

use serde::{Deserialize, Serialize};

use crate::cards::{CardCollection, CardTeam};
use crate::error::EngineError;
use crate::player::Team;

/// Placeholder text shown in the clue fields before the clue-giver types.
/// A confirm that still carries either placeholder is rejected.
pub const CLUE_PLACEHOLDER: &str = "Enter clue";
pub const NUMBER_OF_WORDS_PLACEHOLDER: &str = "#";

/// What a card selection did to the game, evaluated immediately after the
/// card flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Somebody won; the game is over.
    GameWon { winner: Team },
    /// Turn passes to the other team.
    RoundEnded,
    /// Another guess is allowed.
    Continue,
}

/// One game's worth of turns.
///
/// Logically single-writer: only the acting team's clue-giver (or the
/// host, for lifecycle transitions) advances it, and everyone else
/// overwrites their replica from broadcasts. Terminal states are one-way;
/// construct a fresh `Round` for the next game.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub current_team: Team,
    clue: Option<String>,
    number_of_words: Option<String>,
    winning_team: Option<Team>,
    aborted: bool,
    game_ended: bool,
}

impl Round {
    pub fn new(starting_team: Team) -> Self {
        Self {
            current_team: starting_team,
            clue: None,
            number_of_words: None,
            winning_team: None,
            aborted: false,
            game_ended: false,
        }
    }

    pub fn clue(&self) -> Option<&str> {
        self.clue.as_deref()
    }

    pub fn number_of_words(&self) -> Option<&str> {
        self.number_of_words.as_deref()
    }

    pub fn winning_team(&self) -> Option<Team> {
        self.winning_team
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn has_game_ended(&self) -> bool {
        self.game_ended
    }

    pub fn is_terminal(&self) -> bool {
        self.game_ended || self.aborted
    }

    /// Guessing is open once the clue-giver has confirmed both fields.
    pub fn both_fields_set(&self) -> bool {
        self.clue.is_some() && self.number_of_words.is_some()
    }

    /// Confirm the clue for the current turn. Rejects empty input and the
    /// untouched placeholder defaults.
    pub fn set_clue_and_count(&mut self, clue: &str, count: &str) -> Result<(), EngineError> {
        if self.is_terminal() {
            return Err(EngineError::RoundOver);
        }
        let clue = clue.trim();
        let count = count.trim();
        if clue.is_empty()
            || count.is_empty()
            || clue == CLUE_PLACEHOLDER
            || count == NUMBER_OF_WORDS_PLACEHOLDER
        {
            return Err(EngineError::EmptyClue);
        }
        self.clue = Some(clue.to_string());
        self.number_of_words = Some(count.to_string());
        Ok(())
    }

    /// Pass the turn to the other team and clear the clue fields for the
    /// next clue-giver.
    pub fn end_round(&mut self, ending_team: Team) -> Result<(), EngineError> {
        if self.is_terminal() {
            return Err(EngineError::RoundOver);
        }
        self.current_team = ending_team.other();
        self.clue = None;
        self.number_of_words = None;
        Ok(())
    }

    /// Keep the turn with the same team but clear the clue fields. Used in
    /// minigame mode, where control returns to the human team after the
    /// automated opponent's exchange.
    pub fn restart_turn(&mut self, team: Team) -> Result<(), EngineError> {
        if self.is_terminal() {
            return Err(EngineError::RoundOver);
        }
        self.current_team = team;
        self.clue = None;
        self.number_of_words = None;
        Ok(())
    }

    pub fn set_winning_team(&mut self, team: Team) {
        self.winning_team = Some(team);
    }

    pub fn end_game(&mut self) {
        self.game_ended = true;
    }

    /// Unconditional: any peer observing the flag leaves the round
    /// immediately and returns to the pregame room.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Outcome policy for a selection the acting team just made, checked
    /// in order against the post-selection card counts:
    ///
    /// 1. assassin card: the other team wins immediately;
    /// 2. the opposing team has no cards left: the acting team wins;
    /// 3. opposing or neutral card: the round ends, turn passes;
    /// 4. the acting team has no cards left: the acting team wins;
    /// 5. otherwise another guess is allowed.
    pub fn selection_outcome(
        &self,
        card_team: CardTeam,
        acting_team: Team,
        cards: &CardCollection,
    ) -> SelectionOutcome {
        let opponent = acting_team.other();
        if card_team == CardTeam::Assassin {
            return SelectionOutcome::GameWon { winner: opponent };
        }
        if cards.cards_remaining_for_team(opponent.into()) == 0 {
            return SelectionOutcome::GameWon {
                winner: acting_team,
            };
        }
        if card_team == opponent.into() || card_team == CardTeam::Neutral {
            return SelectionOutcome::RoundEnded;
        }
        if cards.cards_remaining_for_team(acting_team.into()) == 0 {
            return SelectionOutcome::GameWon {
                winner: acting_team,
            };
        }
        SelectionOutcome::Continue
    }
}
