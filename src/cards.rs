//! Card layout and selection state.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::player::Team;
use crate::room::GameMode;

pub const REGULAR_CARD_COUNT: usize = 22;
pub const MINIGAME_CARD_COUNT: usize = 18;

/// Candidate words the layout draws from, always without replacement.
const WORD_POOL: &[&str] = &[
    "anchor", "apple", "arrow", "badge", "bank", "beacon", "bear", "bell",
    "bridge", "button", "cable", "candle", "castle", "cloud", "comet",
    "compass", "copper", "crane", "crown", "diamond", "dragon", "engine",
    "falcon", "feather", "flute", "forest", "fountain", "glacier", "glove",
    "hammer", "harbor", "hollow", "island", "jungle", "kettle", "ladder",
    "lantern", "lemon", "marble", "meadow", "mirror", "needle", "orbit",
    "organ", "palace", "parrot", "pearl", "pillar", "pirate", "prism",
    "raven", "ribbon", "river", "saddle", "shadow", "signal", "spider",
    "spring", "statue", "summit", "thread", "tiger", "tunnel", "violet",
    "walnut", "whale", "willow", "zephyr",
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardTeam {
    Red,
    Blue,
    Neutral,
    Assassin,
}

impl From<Team> for CardTeam {
    fn from(team: Team) -> Self {
        match team {
            Team::Red => CardTeam::Red,
            Team::Blue => CardTeam::Blue,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Card {
    word: String,
    team: CardTeam,
    selected: bool,
}

impl Card {
    fn new(word: &str, team: CardTeam) -> Self {
        Self {
            word: word.to_string(),
            team,
            selected: false,
        }
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn team(&self) -> CardTeam {
        self.team
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn accessibility_label(&self) -> &'static str {
        match self.team {
            CardTeam::Red => "red card",
            CardTeam::Blue => "blue card",
            CardTeam::Neutral => "neutral card",
            CardTeam::Assassin => "assassin card",
        }
    }

    /// Label read out for a card cell. The accessibility flag is a
    /// read-only input from local settings.
    pub fn display_label(&self, accessibility: bool) -> String {
        if accessibility {
            format!("{} {}", self.word, self.accessibility_label())
        } else {
            self.word.clone()
        }
    }
}

/// The fixed card slots for one game.
///
/// The key (team-per-slot layout) is generated independently of which
/// words fill the slots. Cards only ever transition unselected → selected.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CardCollection {
    cards: Vec<Card>,
    starting_team: Team,
}

impl CardCollection {
    pub fn new(mode: GameMode) -> Self {
        let mut rng = rand::rng();
        let (key, starting_team) = generate_key(mode, &mut rng);

        let mut pool: Vec<&str> = WORD_POOL.to_vec();
        pool.shuffle(&mut rng);

        let cards = key
            .iter()
            .zip(pool)
            .map(|(team, word)| Card::new(word, *team))
            .collect();
        Self {
            cards,
            starting_team,
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn card(&self, index: usize) -> Option<&Card> {
        self.cards.get(index)
    }

    pub fn starting_team(&self) -> Team {
        self.starting_team
    }

    /// Mark a card selected and report its team. Re-selecting a selected
    /// card is rejected so a duplicate guess can never re-trigger win/loss
    /// evaluation.
    pub fn select(&mut self, index: usize) -> Result<CardTeam, EngineError> {
        let card = self
            .cards
            .get_mut(index)
            .ok_or(EngineError::CardOutOfRange(index))?;
        if card.selected {
            return Err(EngineError::CardAlreadySelected(index));
        }
        card.selected = true;
        Ok(card.team)
    }

    pub fn cards_remaining_for_team(&self, team: CardTeam) -> usize {
        self.cards
            .iter()
            .filter(|c| c.team == team && !c.selected)
            .count()
    }

    /// Minigame only: the non-networked opponent eliminates one of its own
    /// remaining cards at random after each human round.
    pub fn auto_eliminate_opponent_card(&mut self, opponent: Team) -> Option<usize> {
        let opponent: CardTeam = opponent.into();
        let remaining: Vec<usize> = self
            .cards
            .iter()
            .enumerate()
            .filter(|(_, c)| c.team == opponent && !c.selected)
            .map(|(i, _)| i)
            .collect();
        if remaining.is_empty() {
            return None;
        }
        let pick = remaining[rand::rng().random_range(0..remaining.len())];
        self.cards[pick].selected = true;
        Some(pick)
    }
}

/// Team-per-slot layout. Regular: 22 slots split 8/8/5/1 with a random
/// starting team. Minigame: 18 slots split 8 red / 7 blue / 2 neutral /
/// 1 assassin, red (the human team) always starting.
fn generate_key<R: Rng>(mode: GameMode, rng: &mut R) -> (Vec<CardTeam>, Team) {
    let (counts, starting_team) = match mode {
        GameMode::Regular => {
            let start = if rng.random_range(0..2) == 0 {
                Team::Red
            } else {
                Team::Blue
            };
            ([8usize, 8, 5, 1], start)
        }
        GameMode::Minigame => ([8usize, 7, 2, 1], Team::Red),
    };
    let mut key = Vec::with_capacity(counts.iter().sum());
    for (team, count) in [
        (CardTeam::Red, counts[0]),
        (CardTeam::Blue, counts[1]),
        (CardTeam::Neutral, counts[2]),
        (CardTeam::Assassin, counts[3]),
    ] {
        key.extend(std::iter::repeat_n(team, count));
    }
    key.shuffle(rng);
    (key, starting_team)
}
