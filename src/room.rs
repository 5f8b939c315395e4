//! Host-owned registry of players and room lifecycle.

use std::collections::BTreeMap;
use std::fmt::Display;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::{Player, Team};
use crate::transport::PeerId;

const ACCESS_CODE_LENGTH: usize = 4;
const ACCESS_CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
/// Maximum number of human players in a regular room. A minigame room
/// allows one more slot for the non-networked opponent.
pub const ROOM_MAX_SIZE: usize = 8;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Regular,
    Minigame,
}

/// The room registry. The host owns the authoritative copy and mutates it;
/// every other device holds a replica that is fully overwritten on each
/// received broadcast.
///
/// Invariant while the room is open: every uuid in `connected_peers` is
/// also present in `players`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Room {
    uuid: Uuid,
    pub name: String,
    access_code: String,
    pub mode: GameMode,
    players: Vec<Player>,
    connected_peers: BTreeMap<PeerId, Uuid>,
}

impl Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room {} [{}]", self.name, self.access_code)
    }
}

impl Room {
    pub fn new(mode: GameMode) -> Self {
        let access_code = generate_access_code();
        Self {
            uuid: Uuid::new_v4(),
            name: access_code.clone(),
            access_code,
            mode,
            players: Vec::new(),
            connected_peers: BTreeMap::new(),
        }
    }

    /// Rebuild a room decoded from an older wire schema that carried no
    /// access code. Those rooms advertised the code as their display name.
    pub(crate) fn from_legacy_parts(
        name: String,
        uuid: Uuid,
        mode: GameMode,
        players: Vec<Player>,
        connected_peers: BTreeMap<PeerId, Uuid>,
    ) -> Self {
        Self {
            uuid,
            access_code: name.clone(),
            name,
            mode,
            players,
            connected_peers,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn access_code(&self) -> &str {
        &self.access_code
    }

    /// Issued each time the room (re)enters pregame so stale joiners
    /// cannot match a session that has moved on.
    pub fn generate_new_access_code(&mut self) {
        self.access_code = generate_access_code();
        self.name = self.access_code.clone();
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn max_size(&self) -> usize {
        match self.mode {
            GameMode::Regular => ROOM_MAX_SIZE,
            // extra slot for the CPU opponent
            GameMode::Minigame => ROOM_MAX_SIZE + 1,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn add_player(&mut self, player: Player) {
        if !self.players.contains(&player) {
            self.players.push(player);
        }
    }

    pub fn add_cpu_player(&mut self) {
        self.add_player(Player::cpu());
    }

    pub fn remove_cpu_player(&mut self) {
        self.remove_player_with_uuid(Uuid::nil());
    }

    pub fn player_with_uuid(&self, uuid: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.uuid() == uuid)
    }

    pub fn player_with_uuid_mut(&mut self, uuid: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.uuid() == uuid)
    }

    pub fn contains_uuid(&self, uuid: Uuid) -> bool {
        self.player_with_uuid(uuid).is_some()
    }

    pub fn remove_player_with_uuid(&mut self, uuid: Uuid) {
        self.players.retain(|p| p.uuid() != uuid);
        self.connected_peers.retain(|_, v| *v != uuid);
    }

    pub fn remove_player_at(&mut self, index: usize) -> Option<Uuid> {
        if index >= self.players.len() {
            return None;
        }
        let uuid = self.players[index].uuid();
        self.remove_player_with_uuid(uuid);
        Some(uuid)
    }

    pub fn add_connected_peer(&mut self, peer: PeerId, uuid: Uuid) {
        self.connected_peers.insert(peer, uuid);
    }

    pub fn remove_connected_peer(&mut self, peer: &PeerId) {
        self.connected_peers.remove(peer);
    }

    pub fn uuid_for_peer(&self, peer: &PeerId) -> Option<Uuid> {
        self.connected_peers.get(peer).copied()
    }

    pub fn connected_peers(&self) -> &BTreeMap<PeerId, Uuid> {
        &self.connected_peers
    }

    /// Merge a player announcement received from a peer. The host is the
    /// only side that calls this; guests wait for the next broadcast.
    ///
    /// A clue-giver claim is stripped when the team already has one, so the
    /// at-most-one-per-team invariant survives concurrent nominations.
    pub fn apply_player_update(&mut self, mut incoming: Player) {
        if incoming.is_clue_giver
            && let Some(current) = self.clue_giver_uuid_for_team(incoming.team)
            && current != incoming.uuid()
        {
            incoming.is_clue_giver = false;
        }
        match self.player_with_uuid_mut(incoming.uuid()) {
            Some(existing) => *existing = incoming,
            None if !self.is_full() => self.players.push(incoming),
            None => {}
        }
    }

    fn clue_giver_count_for_team(&self, team: Team) -> usize {
        self.players
            .iter()
            .filter(|p| p.team == team && p.is_clue_giver)
            .count()
    }

    /// The team's clue-giver, if it has exactly one.
    pub fn clue_giver_uuid_for_team(&self, team: Team) -> Option<Uuid> {
        let mut found = self.players.iter().filter(|p| p.team == team && p.is_clue_giver);
        match (found.next(), found.next()) {
            (Some(p), None) => Some(p.uuid()),
            _ => None,
        }
    }

    /// Assign the first listed player of the team as clue-giver. Only does
    /// anything when the team currently has none.
    pub fn auto_assign_clue_giver_for_team(&mut self, team: Team) {
        if self.clue_giver_count_for_team(team) > 0 {
            return;
        }
        if let Some(player) = self.players.iter_mut().find(|p| p.team == team) {
            player.is_clue_giver = true;
        }
    }

    /// Host-side housekeeping run every tick: stable display order (team,
    /// clue-givers first) and re-election of any missing clue-giver.
    pub fn refresh(&mut self) {
        self.players
            .sort_by_key(|p| (p.team, !p.is_clue_giver));
        self.auto_assign_clue_giver_for_team(Team::Red);
        self.auto_assign_clue_giver_for_team(Team::Blue);
    }

    pub fn team_size(&self, team: Team) -> usize {
        self.players.iter().filter(|p| p.team == team).count()
    }

    /// Regular mode needs at least two players per team. Minigame rooms
    /// must hold exactly 3 or 4 players, the CPU slot included.
    pub fn team_sizes_valid(&self) -> bool {
        match self.mode {
            GameMode::Regular => {
                self.team_size(Team::Red) >= 2 && self.team_size(Team::Blue) >= 2
            }
            GameMode::Minigame => matches!(self.players.len(), 3 | 4),
        }
    }

    pub fn clue_givers_selected(&self) -> bool {
        self.clue_giver_uuid_for_team(Team::Red).is_some()
            && self.clue_giver_uuid_for_team(Team::Blue).is_some()
    }

    pub fn can_start_game(&self) -> bool {
        self.team_sizes_valid() && self.clue_givers_selected()
    }

    /// Human-readable list of unmet start requirements, for the pregame
    /// checklist dialog.
    pub fn start_checklist(&self) -> Vec<&'static str> {
        let mut unmet = Vec::new();
        if !self.team_sizes_valid() {
            unmet.push(match self.mode {
                GameMode::Regular => "both teams need at least 2 players",
                GameMode::Minigame => "the room must have 3 or 4 players",
            });
        }
        if !self.clue_givers_selected() {
            unmet.push("each team needs a clue-giver");
        }
        unmet
    }

    pub fn cancel_ready_for_all_players(&mut self) {
        for player in &mut self.players {
            if !player.is_cpu() {
                player.is_ready = false;
            }
        }
    }

    pub fn reset(&mut self) {
        self.players.clear();
        self.connected_peers.clear();
    }
}

fn generate_access_code() -> String {
    let mut rng = rand::rng();
    (0..ACCESS_CODE_LENGTH)
        .map(|_| ACCESS_CODE_ALPHABET[rng.random_range(0..ACCESS_CODE_ALPHABET.len())] as char)
        .collect()
}
