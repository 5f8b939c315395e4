#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use cipherdeck::transport::PeerId;
use cipherdeck::transport::mem::MemNet;
use cipherdeck::*;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

pub fn test_config(name: &str, mode: GameMode) -> SessionConfig {
    let mut config = SessionConfig::new(name);
    config.mode = mode;
    config.heartbeat_interval = Duration::from_millis(100);
    config.refresh_interval = Duration::from_millis(50);
    config.join_timeout = Duration::from_millis(800);
    config
}

pub async fn await_event(events: &mut mpsc::Receiver<SessionEvent>) -> Result<SessionEvent> {
    timeout(Duration::from_secs(3), events.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("event channel closed"))
}

/// Drain events until one matches, or time out.
pub async fn await_matching(
    events: &mut mpsc::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> Result<SessionEvent> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .ok_or_else(|| anyhow::anyhow!("timed out waiting for a matching event"))?;
        let event = timeout(remaining, events.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("event channel closed"))?;
        if pred(&event) {
            return Ok(event);
        }
    }
}

/// Wait for a condition, let one full heartbeat period pass, then require
/// it to still hold. Shields assertions from a stale broadcast that was
/// already in flight when the condition first became true.
pub async fn settled(mut condition: impl FnMut() -> bool) -> Result<()> {
    wait_until(&mut condition).await?;
    sleep(Duration::from_millis(250)).await;
    wait_until(&mut condition).await
}

/// Poll a condition until it holds, or time out.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("timed out waiting for condition");
        }
        sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

pub async fn setup_host(
    mode: GameMode,
) -> Result<(MemNet, GameSession, mpsc::Receiver<SessionEvent>, String)> {
    let net = MemNet::new();
    let (host, host_events) =
        GameSession::host(net.transport(), test_config("host", mode)).await?;
    let access_code = host.room().access_code().to_string();
    Ok((net, host, host_events, access_code))
}

pub async fn join_guest(
    net: &MemNet,
    access_code: &str,
    name: &str,
) -> Result<(GameSession, mpsc::Receiver<SessionEvent>)> {
    let (guest, mut guest_events) = GameSession::join(
        net.transport(),
        access_code,
        test_config(name, GameMode::Regular),
    )
    .await?;
    await_matching(&mut guest_events, |event| {
        matches!(event, SessionEvent::JoinedRoom)
    })
    .await?;
    Ok((guest, guest_events))
}

/// The peer id a given player uuid is connected through, as replicated in
/// the room registry.
pub fn peer_of(room: &Room, uuid: uuid::Uuid) -> Option<PeerId> {
    room.connected_peers()
        .iter()
        .find(|(_, mapped)| **mapped == uuid)
        .map(|(peer, _)| *peer)
}

pub fn host_peer(room: &Room) -> Option<PeerId> {
    let host = room.players().iter().find(|p| p.is_host())?;
    peer_of(room, host.uuid())
}

/// Host plus three guests, two players per team, clue-givers elected by
/// the host's housekeeping pass.
pub async fn setup_regular_room() -> Result<(
    MemNet,
    Vec<(GameSession, mpsc::Receiver<SessionEvent>)>,
    String,
)> {
    let (net, host, host_events, access_code) = setup_host(GameMode::Regular).await?;
    let mut sessions = vec![(host, host_events)];
    for name in ["ana", "bo", "cy"] {
        let (guest, guest_events) = join_guest(&net, &access_code, name).await?;
        sessions.push((guest, guest_events));
    }
    // ana stays red with the host; bo and cy defect to blue
    sessions[2].0.set_team(Team::Blue).await?;
    sessions[3].0.set_team(Team::Blue).await?;
    wait_until(|| {
        sessions.iter().all(|(session, _)| {
            let room = session.room();
            room.players().len() == 4 && room.can_start_game()
        })
    })
    .await?;
    Ok((net, sessions, access_code))
}

/// Find the session whose local player gives clues for `team`.
pub fn clue_giver_index(
    sessions: &[(GameSession, mpsc::Receiver<SessionEvent>)],
    team: Team,
) -> Option<usize> {
    sessions.iter().position(|(session, _)| {
        let local = session.local_player();
        local.team == team && local.is_clue_giver
    })
}

/// Find a session on `team` that is not the clue-giver.
pub fn guesser_index(
    sessions: &[(GameSession, mpsc::Receiver<SessionEvent>)],
    team: Team,
) -> Option<usize> {
    sessions.iter().position(|(session, _)| {
        let local = session.local_player();
        local.team == team && !local.is_clue_giver
    })
}
