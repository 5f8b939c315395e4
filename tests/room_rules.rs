//! Pregame room invariants: start conditions, clue-giver election and the
//! peer registry.

use cipherdeck::*;
use rand::Rng;

fn player(name: &str, team: Team) -> Player {
    Player::new(name, team, false)
}

#[test]
fn access_code_is_four_lowercase_letters() {
    for _ in 0..50 {
        let room = Room::new(GameMode::Regular);
        let code = room.access_code();
        assert_eq!(code.len(), 4);
        assert!(code.chars().all(|c| c.is_ascii_lowercase()));
        assert_eq!(room.name, code);
    }
}

#[test]
fn regenerating_the_access_code_changes_the_name_too() {
    let mut room = Room::new(GameMode::Regular);
    let old = room.access_code().to_string();
    // 1/456976 chance of a collision per attempt; ten tries is plenty
    for _ in 0..10 {
        room.generate_new_access_code();
        if room.access_code() != old {
            break;
        }
    }
    assert_ne!(room.access_code(), old);
    assert_eq!(room.name, room.access_code());
}

#[test]
fn can_start_game_matches_team_sizes_and_clue_givers() {
    let mut rng = rand::rng();
    for _ in 0..200 {
        let mut room = Room::new(GameMode::Regular);
        let count = rng.random_range(0..8);
        for i in 0..count {
            let team = if rng.random_range(0..2) == 0 {
                Team::Red
            } else {
                Team::Blue
            };
            let mut p = player(&format!("p{i}"), team);
            p.is_clue_giver = rng.random_range(0..3) == 0;
            room.add_player(p);
        }
        let red = room.team_size(Team::Red);
        let blue = room.team_size(Team::Blue);
        let red_givers = room
            .players()
            .iter()
            .filter(|p| p.team == Team::Red && p.is_clue_giver)
            .count();
        let blue_givers = room
            .players()
            .iter()
            .filter(|p| p.team == Team::Blue && p.is_clue_giver)
            .count();
        let expected = red >= 2 && blue >= 2 && red_givers == 1 && blue_givers == 1;
        assert_eq!(room.can_start_game(), expected);
        assert_eq!(
            room.can_start_game(),
            room.team_sizes_valid() && room.clue_givers_selected()
        );
    }
}

#[test]
fn minigame_room_size_policy() {
    let mut room = Room::new(GameMode::Minigame);
    room.add_cpu_player();
    room.add_player(player("a", Team::Red));
    assert!(!room.team_sizes_valid()); // 2 total
    room.add_player(player("b", Team::Red));
    assert!(room.team_sizes_valid()); // 3 total, CPU included
    room.add_player(player("c", Team::Red));
    assert!(room.team_sizes_valid()); // 4 total
    room.add_player(player("d", Team::Red));
    assert!(!room.team_sizes_valid()); // 5 total
}

#[test]
fn refresh_elects_exactly_one_clue_giver_per_team() {
    let mut rng = rand::rng();
    for _ in 0..200 {
        let mut room = Room::new(GameMode::Regular);
        for i in 0..rng.random_range(1..8) {
            let team = if rng.random_range(0..2) == 0 {
                Team::Red
            } else {
                Team::Blue
            };
            room.add_player(player(&format!("p{i}"), team));
        }
        // a few random membership shakeups
        for _ in 0..rng.random_range(0..4) {
            if room.players().is_empty() {
                break;
            }
            let index = rng.random_range(0..room.players().len());
            room.remove_player_at(index);
        }
        room.refresh();
        for team in [Team::Red, Team::Blue] {
            let givers = room
                .players()
                .iter()
                .filter(|p| p.team == team && p.is_clue_giver)
                .count();
            if room.team_size(team) == 0 {
                assert_eq!(givers, 0);
            } else {
                assert_eq!(givers, 1, "team {team} should have exactly one clue-giver");
            }
        }
    }
}

#[test]
fn refresh_sorts_clue_givers_first_within_team() {
    let mut room = Room::new(GameMode::Regular);
    room.add_player(player("r1", Team::Red));
    room.add_player(player("b1", Team::Blue));
    let mut blue_giver = player("b2", Team::Blue);
    blue_giver.is_clue_giver = true;
    room.add_player(blue_giver);
    room.refresh();

    let teams: Vec<Team> = room.players().iter().map(|p| p.team).collect();
    assert_eq!(teams, vec![Team::Red, Team::Blue, Team::Blue]);
    // within blue, the clue-giver leads
    assert!(room.players()[1].is_clue_giver);
    assert_eq!(room.players()[1].name, "b2");
}

#[test]
fn clue_giver_claim_is_stripped_when_team_already_has_one() {
    let mut room = Room::new(GameMode::Regular);
    let mut first = player("first", Team::Red);
    first.is_clue_giver = true;
    room.add_player(first.clone());

    let mut second = player("second", Team::Red);
    second.is_clue_giver = true;
    room.apply_player_update(second.clone());

    assert!(!room.player_with_uuid(second.uuid()).unwrap().is_clue_giver);
    assert!(room.player_with_uuid(first.uuid()).unwrap().is_clue_giver);
    assert_eq!(room.clue_giver_uuid_for_team(Team::Red), Some(first.uuid()));
}

#[test]
fn applying_the_same_player_twice_does_not_duplicate() {
    let mut room = Room::new(GameMode::Regular);
    let p = player("dup", Team::Red);
    room.apply_player_update(p.clone());
    room.apply_player_update(p.clone());
    assert_eq!(room.players().len(), 1);
}

#[test]
fn removing_a_player_also_drops_its_peer_entries() {
    let mut room = Room::new(GameMode::Regular);
    let a = player("a", Team::Red);
    let b = player("b", Team::Blue);
    room.add_player(a.clone());
    room.add_player(b.clone());
    room.add_connected_peer(cipherdeck::transport::PeerId([1; 32]), a.uuid());
    room.add_connected_peer(cipherdeck::transport::PeerId([2; 32]), b.uuid());

    room.remove_player_with_uuid(a.uuid());

    // connected peer uuids stay a subset of the player list
    for uuid in room.connected_peers().values() {
        assert!(room.contains_uuid(*uuid));
    }
    assert_eq!(room.connected_peers().len(), 1);
}

#[test]
fn room_capacity_accounts_for_the_cpu_slot() {
    let mut regular = Room::new(GameMode::Regular);
    for i in 0..ROOM_MAX_SIZE {
        regular.add_player(player(&format!("p{i}"), Team::Red));
    }
    assert!(regular.is_full());

    let mut minigame = Room::new(GameMode::Minigame);
    minigame.add_cpu_player();
    for i in 0..ROOM_MAX_SIZE {
        minigame.add_player(player(&format!("p{i}"), Team::Red));
    }
    assert!(minigame.is_full());
    assert_eq!(minigame.players().len(), ROOM_MAX_SIZE + 1);
}
