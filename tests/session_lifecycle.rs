//! End-to-end session behavior over the in-memory transport: discovery by
//! access code, replication, game flow and disconnect recovery.

mod common;
use common::*;

use anyhow::Result;
use cipherdeck::*;

#[tokio::test]
async fn joiner_with_matching_code_gets_the_room() -> Result<()> {
    let (net, host, _host_events, access_code) = setup_host(GameMode::Regular).await?;
    let (guest, _guest_events) = join_guest(&net, &access_code, "ana").await?;

    wait_until(|| host.room().players().len() == 2).await?;
    wait_until(|| guest.room().players().len() == 2).await?;
    assert_eq!(guest.phase(), SessionPhase::Lobby);
    assert_eq!(guest.room().uuid(), host.room().uuid());
    assert!(guest.room().contains_uuid(guest.local_player().uuid()));
    Ok(())
}

#[tokio::test]
async fn joiner_with_wrong_code_is_never_invited() -> Result<()> {
    let (net, host, _host_events, _access_code) = setup_host(GameMode::Regular).await?;

    // digits can never appear in a generated code
    let (stranger, mut stranger_events) = GameSession::join(
        net.transport(),
        "0000",
        test_config("stranger", GameMode::Regular),
    )
    .await?;

    let event = await_matching(&mut stranger_events, |event| {
        matches!(event, SessionEvent::JoinFailed(_))
    })
    .await?;
    assert!(matches!(event, SessionEvent::JoinFailed(_)));
    assert_eq!(stranger.phase(), SessionPhase::Ended);
    assert_eq!(host.room().players().len(), 1);
    Ok(())
}

#[tokio::test]
async fn start_is_rejected_until_the_room_is_valid() -> Result<()> {
    let (net, host, _host_events, access_code) = setup_host(GameMode::Regular).await?;
    let (_guest, _guest_events) = join_guest(&net, &access_code, "ana").await?;
    wait_until(|| host.room().players().len() == 2).await?;

    match host.start_game().await {
        Err(EngineError::CannotStartGame(checklist)) => {
            assert!(checklist.contains("at least 2 players"));
        }
        other => panic!("expected a start rejection, got {other:?}"),
    }
    assert_eq!(host.phase(), SessionPhase::Lobby);
    Ok(())
}

#[tokio::test]
async fn guests_cannot_start_or_reconfigure() -> Result<()> {
    let (net, _host, _host_events, access_code) = setup_host(GameMode::Regular).await?;
    let (guest, _guest_events) = join_guest(&net, &access_code, "ana").await?;

    assert_eq!(guest.start_game().await, Err(EngineError::NotHost));
    assert_eq!(
        guest.set_mode(GameMode::Minigame).await,
        Err(EngineError::NotHost)
    );
    assert_eq!(guest.set_timer(true, 2).await, Err(EngineError::NotHost));
    Ok(())
}

#[tokio::test]
async fn full_regular_game_replicates_across_all_devices() -> Result<()> {
    let (_net, mut sessions, _access_code) = setup_regular_room().await?;

    sessions[0].0.start_game().await?;
    for (_, events) in sessions.iter_mut().skip(1) {
        await_matching(events, |event| {
            matches!(event, SessionEvent::GameShouldStart)
        })
        .await?;
    }

    // every replica sees the same 8/8/5/1 deal
    wait_until(|| sessions.iter().all(|(s, _)| s.cards().is_some())).await?;
    let host_cards = sessions[0].0.cards().unwrap();
    assert_eq!(host_cards.len(), REGULAR_CARD_COUNT);
    for team in [CardTeam::Red, CardTeam::Blue] {
        assert_eq!(host_cards.cards_remaining_for_team(team), 8);
    }
    assert_eq!(host_cards.cards_remaining_for_team(CardTeam::Neutral), 5);
    assert_eq!(host_cards.cards_remaining_for_team(CardTeam::Assassin), 1);
    for (session, _) in &sessions {
        let replica = session.cards().unwrap();
        let words: Vec<String> = replica.cards().iter().map(|c| c.word().to_string()).collect();
        let host_words: Vec<String> =
            host_cards.cards().iter().map(|c| c.word().to_string()).collect();
        assert_eq!(words, host_words);
    }

    let round = sessions[0].0.round().unwrap();
    let acting = round.current_team;
    assert_eq!(acting, host_cards.starting_team());
    assert!(!round.both_fields_set());

    // the acting clue-giver confirms; everyone converges on the clue
    let giver = clue_giver_index(&sessions, acting).expect("a clue-giver must exist");
    sessions[giver].0.confirm_clue("harbor", "2").await?;
    settled(|| {
        sessions.iter().all(|(s, _)| {
            s.round().is_some_and(|r| r.clue() == Some("harbor") && r.both_fields_set())
        })
    })
    .await?;

    // an own-team guess with cards to spare keeps the turn
    let guesser = guesser_index(&sessions, acting).expect("a guesser must exist");
    let own = CardTeam::from(acting);
    let own_index = sessions[guesser]
        .0
        .cards()
        .unwrap()
        .cards()
        .iter()
        .position(|c| c.team() == own && !c.is_selected())
        .unwrap();
    sessions[guesser].0.select_card(own_index).await?;
    settled(|| {
        sessions.iter().all(|(s, _)| {
            s.cards()
                .is_some_and(|c| c.card(own_index).is_some_and(|card| card.is_selected()))
        })
    })
    .await?;
    assert_eq!(
        sessions[guesser].0.round().unwrap().current_team,
        acting,
        "an own-team guess must not pass the turn"
    );

    // picking the same card again is a guarded no-op
    assert_eq!(
        sessions[guesser].0.select_card(own_index).await,
        Err(EngineError::CardAlreadySelected(own_index))
    );

    // a neutral guess ends the round for the other team
    let neutral_index = sessions[guesser]
        .0
        .cards()
        .unwrap()
        .cards()
        .iter()
        .position(|c| c.team() == CardTeam::Neutral && !c.is_selected())
        .unwrap();
    sessions[guesser].0.select_card(neutral_index).await?;
    wait_until(|| {
        sessions.iter().all(|(s, _)| {
            s.round()
                .is_some_and(|r| r.current_team == acting.other() && !r.both_fields_set())
        })
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn invalid_game_actions_are_rejected_locally() -> Result<()> {
    let (_net, sessions, _access_code) = setup_regular_room().await?;
    sessions[0].0.start_game().await?;
    wait_until(|| sessions.iter().all(|(s, _)| s.round().is_some())).await?;

    let acting = sessions[0].0.round().unwrap().current_team;
    let giver = clue_giver_index(&sessions, acting).unwrap();
    let guesser = guesser_index(&sessions, acting).unwrap();
    let off_turn = guesser_index(&sessions, acting.other()).unwrap();

    // guessing before a clue is confirmed
    assert_eq!(
        sessions[guesser].0.select_card(0).await,
        Err(EngineError::ClueMissing)
    );
    // confirming from the wrong seat
    assert_eq!(
        sessions[guesser].0.confirm_clue("harbor", "2").await,
        Err(EngineError::NotClueGiver)
    );
    sessions[giver].0.confirm_clue("harbor", "2").await?;
    settled(|| {
        sessions
            .iter()
            .all(|(s, _)| s.round().is_some_and(|r| r.both_fields_set()))
    })
    .await?;
    // guessing from the wrong team
    assert_eq!(
        sessions[off_turn].0.select_card(0).await,
        Err(EngineError::NotYourTurn)
    );
    // the clue-giver may not guess
    assert_eq!(
        sessions[giver].0.select_card(0).await,
        Err(EngineError::NotClueGiver)
    );
    Ok(())
}

#[tokio::test]
async fn ready_flags_replicate_through_the_host() -> Result<()> {
    let (net, host, _host_events, access_code) = setup_host(GameMode::Regular).await?;
    let (guest, _guest_events) = join_guest(&net, &access_code, "ana").await?;
    let (other, _other_events) = join_guest(&net, &access_code, "bo").await?;
    wait_until(|| host.room().players().len() == 3).await?;

    guest.set_ready(true).await?;
    let guest_uuid = guest.local_player().uuid();
    wait_until(|| {
        other
            .room()
            .player_with_uuid(guest_uuid)
            .is_some_and(|p| p.is_ready)
    })
    .await?;

    guest.set_ready(false).await?;
    wait_until(|| {
        other
            .room()
            .player_with_uuid(guest_uuid)
            .is_some_and(|p| !p.is_ready)
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn kicked_player_exits_via_player_removed() -> Result<()> {
    let (net, host, _host_events, access_code) = setup_host(GameMode::Regular).await?;
    let (kicked, mut kicked_events) = join_guest(&net, &access_code, "ana").await?;
    wait_until(|| host.room().players().len() == 2).await?;

    host.kick_player(kicked.local_player().uuid()).await?;
    await_matching(&mut kicked_events, |event| {
        matches!(event, SessionEvent::PlayerRemoved)
    })
    .await?;
    assert_eq!(kicked.phase(), SessionPhase::Ended);
    wait_until(|| host.room().players().len() == 1).await?;
    Ok(())
}

#[tokio::test]
async fn host_disconnect_terminates_each_guest_exactly_once() -> Result<()> {
    let (net, mut sessions, _access_code) = setup_regular_room().await?;
    sessions[0].0.start_game().await?;
    wait_until(|| sessions.iter().all(|(s, _)| s.phase() == SessionPhase::InGame)).await?;

    let room = sessions[1].0.room();
    let host_peer = host_peer(&room).expect("host peer must be registered");
    let observer_uuid = sessions[1].0.local_player().uuid();
    let observer_peer = peer_of(&room, observer_uuid).expect("guest peer must be registered");

    net.sever(host_peer);
    // pile on duplicate notifications at one observer
    net.inject_disconnect(observer_peer, host_peer);
    net.inject_disconnect(observer_peer, host_peer);

    for (session, events) in sessions.iter_mut().skip(1) {
        await_matching(events, |event| {
            matches!(
                event,
                SessionEvent::RoomTerminated(TerminateReason::HostDisconnected)
            )
        })
        .await?;
        wait_until(|| session.phase() == SessionPhase::Ended).await?;
    }

    // the duplicate notifications must not produce a second exit signal
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    while let Ok(event) = sessions[1].1.try_recv() {
        assert!(
            !matches!(event, SessionEvent::RoomTerminated(_)),
            "host-disconnected exit must fire exactly once"
        );
    }
    Ok(())
}

#[tokio::test]
async fn guest_disconnect_mid_game_aborts_to_pregame() -> Result<()> {
    let (net, mut sessions, access_code) = setup_regular_room().await?;
    sessions[0].0.start_game().await?;
    wait_until(|| sessions.iter().all(|(s, _)| s.phase() == SessionPhase::InGame)).await?;

    let room = sessions[0].0.room();
    let victim_uuid = sessions[3].0.local_player().uuid();
    let victim_peer = peer_of(&room, victim_uuid).expect("guest peer must be registered");
    net.sever(victim_peer);

    // the host aborts the round and returns everyone to pregame
    await_matching(&mut sessions[0].1, |event| {
        matches!(
            event,
            SessionEvent::GameShouldEnd(EndReason::PlayerDisconnected)
        )
    })
    .await?;
    await_matching(&mut sessions[1].1, |event| {
        matches!(event, SessionEvent::GameShouldEnd(EndReason::Aborted))
    })
    .await?;

    wait_until(|| sessions[0].0.phase() == SessionPhase::Lobby).await?;
    wait_until(|| sessions[1].0.phase() == SessionPhase::Lobby).await?;
    wait_until(|| sessions[0].0.room().players().len() == 3).await?;

    // re-entering pregame mints a fresh joinability token
    assert_ne!(sessions[0].0.room().access_code(), access_code);
    Ok(())
}

#[tokio::test]
async fn host_leaving_closes_the_room_for_everyone() -> Result<()> {
    let (net, host, _host_events, access_code) = setup_host(GameMode::Regular).await?;
    let (guest, mut guest_events) = join_guest(&net, &access_code, "ana").await?;

    host.leave().await?;
    await_matching(&mut guest_events, |event| {
        matches!(
            event,
            SessionEvent::RoomTerminated(TerminateReason::RoomClosed)
        )
    })
    .await?;
    wait_until(|| guest.phase() == SessionPhase::Ended).await?;
    Ok(())
}

#[tokio::test]
async fn timer_config_replicates_to_guests() -> Result<()> {
    let (net, host, _host_events, access_code) = setup_host(GameMode::Regular).await?;
    let (guest, _guest_events) = join_guest(&net, &access_code, "ana").await?;

    host.set_timer(true, 3).await?;
    wait_until(|| {
        let timer = guest.timer();
        timer.enabled && timer.duration_minutes == 3
    })
    .await?;
    Ok(())
}
