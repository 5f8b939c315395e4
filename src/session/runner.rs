//! The session actor.
//!
//! One task per device owns every mutable singleton. Transport callbacks,
//! UI commands and the three clocks (heartbeat, refresh, round deadline)
//! are serialized through a single `select!` loop, which is what makes
//! the no-locking rule checkable instead of assumed.

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cards::{CardCollection, CardTeam};
use crate::codec::{self, Payload};
use crate::error::EngineError;
use crate::event::{ActionEvent, EventKind};
use crate::player::{Player, Team};
use crate::room::{GameMode, Room};
use crate::round::{Round, SelectionOutcome};
use crate::stats::Statistics;
use crate::timer::{RoundTimer, TimerState};
use crate::transport::{
    DiscoveryInfo, INFO_ACCESS_CODE, INFO_ROOM_UUID, PeerId, PeerTransport, TransportEvent,
};

use super::{
    Command, CommandReply, EndReason, SessionConfig, SessionEvent, SessionPhase, SessionSnapshot,
    TerminateReason,
};

pub(super) struct Runner<T: PeerTransport> {
    transport: T,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::Receiver<(Command, CommandReply)>,
    events: mpsc::Sender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    cancel: CancellationToken,
    config: SessionConfig,

    local: Player,
    room: Room,
    round: Option<Round>,
    cards: Option<CardCollection>,
    stats: Statistics,
    timer: RoundTimer,
    phase: SessionPhase,

    /// Guest: the access code we are hunting for.
    join_code: Option<String>,
    /// Guest: the advertiser we invited.
    host_peer: Option<PeerId>,
    /// Exactly-once guard for the host-disconnected exit path.
    host_gone: bool,
    /// Host: the code currently baked into the advertised metadata.
    advertised_code: Option<String>,

    join_deadline: Option<Instant>,
    turn_deadline: Option<Instant>,
    done: bool,
}

impl<T: PeerTransport> Runner<T> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        transport: T,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        commands: mpsc::Receiver<(Command, CommandReply)>,
        events: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
        config: SessionConfig,
        local: Player,
        room: Room,
        join_code: Option<String>,
        advertised_code: Option<String>,
    ) -> Self {
        let phase = if join_code.is_none() {
            SessionPhase::Lobby
        } else {
            SessionPhase::Joining
        };
        let join_deadline = join_code
            .as_ref()
            .map(|_| Instant::now() + config.join_timeout);
        let snapshot = SessionSnapshot {
            phase,
            local: local.clone(),
            room: room.clone(),
            round: None,
            cards: None,
            stats: Statistics::default(),
            timer: RoundTimer::default(),
        };
        let (snapshot_tx, _) = watch::channel(snapshot);
        Self {
            transport,
            transport_events,
            commands,
            events,
            snapshot_tx,
            cancel,
            config,
            local,
            room,
            round: None,
            cards: None,
            stats: Statistics::default(),
            timer: RoundTimer::default(),
            phase,
            join_code,
            host_peer: None,
            host_gone: false,
            advertised_code,
            join_deadline,
            turn_deadline: None,
            done: false,
        }
    }

    pub(super) fn snapshot_rx(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub(super) async fn run(mut self) {
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = interval(self.config.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.done {
            let far = Instant::now() + self.config.heartbeat_interval;
            let turn_at = self.turn_deadline.unwrap_or(far);
            let join_at = self.join_deadline.unwrap_or(far);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.done = true;
                }
                command = self.commands.recv() => match command {
                    Some((command, reply)) => {
                        let result = self.handle_command(command).await;
                        let _ = reply.send(result);
                    }
                    None => self.done = true,
                },
                event = self.transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => self.done = true,
                },
                _ = heartbeat.tick() => self.on_heartbeat().await,
                _ = refresh.tick() => self.on_refresh().await,
                _ = sleep_until(turn_at), if self.turn_deadline.is_some() => {
                    self.on_turn_expired().await;
                }
                _ = sleep_until(join_at), if self.join_deadline.is_some() => {
                    self.on_join_timeout().await;
                }
            }
            self.publish_snapshot();
        }

        self.transport.terminate().await;
        self.phase = SessionPhase::Ended;
        self.publish_snapshot();
    }

    // --- commands ---

    async fn handle_command(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::SetTeam(team) => self.set_team(team).await,
            Command::NominateClueGiver => self.nominate_clue_giver().await,
            Command::SetReady(ready) => self.set_ready(ready).await,
            Command::SetMode(mode) => self.set_mode(mode).await,
            Command::SetTimer { enabled, minutes } => self.set_timer(enabled, minutes).await,
            Command::KickPlayer(uuid) => self.kick_player(uuid).await,
            Command::StartGame => self.start_game().await,
            Command::ConfirmClue { clue, count } => self.confirm_clue(&clue, &count).await,
            Command::SelectCard(index) => self.select_card(index).await,
            Command::EndRound => self.end_round().await,
            Command::AbortGame => self.abort_game().await,
            Command::Leave => self.leave().await,
        }
    }

    async fn set_team(&mut self, team: Team) -> Result<(), EngineError> {
        if self.phase != SessionPhase::Lobby {
            return Ok(());
        }
        if self.room.mode == GameMode::Minigame {
            return Err(EngineError::TeamLocked);
        }
        self.local.set_team(team);
        if self.local.is_host() {
            let uuid = self.local.uuid();
            if let Some(player) = self.room.player_with_uuid_mut(uuid) {
                player.set_team(team);
            }
            self.room.refresh();
            self.sync_local_from_room();
            self.broadcast(Payload::Room(self.room.clone())).await;
        } else {
            self.broadcast(Payload::Player(self.local.clone())).await;
        }
        Ok(())
    }

    async fn nominate_clue_giver(&mut self) -> Result<(), EngineError> {
        if self.phase != SessionPhase::Lobby {
            return Ok(());
        }
        self.local.is_clue_giver = true;
        if self.local.is_host() {
            self.room.apply_player_update(self.local.clone());
            self.room.refresh();
            self.sync_local_from_room();
            self.broadcast(Payload::Room(self.room.clone())).await;
        } else {
            self.broadcast(Payload::Player(self.local.clone())).await;
        }
        Ok(())
    }

    async fn set_ready(&mut self, ready: bool) -> Result<(), EngineError> {
        if self.phase != SessionPhase::Lobby {
            return Ok(());
        }
        self.local.is_ready = ready;
        if self.local.is_host() {
            let uuid = self.local.uuid();
            if let Some(player) = self.room.player_with_uuid_mut(uuid) {
                player.is_ready = ready;
            }
            self.broadcast(Payload::Room(self.room.clone())).await;
        } else {
            let kind = if ready {
                EventKind::Ready
            } else {
                EventKind::Cancel
            };
            let event = ActionEvent::from_player(kind, self.local.uuid());
            self.broadcast(Payload::Action(event)).await;
        }
        Ok(())
    }

    async fn set_mode(&mut self, mode: GameMode) -> Result<(), EngineError> {
        if !self.local.is_host() {
            return Err(EngineError::NotHost);
        }
        if self.phase != SessionPhase::Lobby || self.room.mode == mode {
            return Ok(());
        }
        self.room.mode = mode;
        match mode {
            GameMode::Minigame => {
                // every human plays against the automated opponent
                let uuids: Vec<_> = self.room.players().iter().map(|p| p.uuid()).collect();
                for uuid in uuids {
                    if let Some(player) = self.room.player_with_uuid_mut(uuid)
                        && !player.is_cpu()
                    {
                        player.set_team(Team::Red);
                    }
                }
                self.room.add_cpu_player();
            }
            GameMode::Regular => self.room.remove_cpu_player(),
        }
        self.room.refresh();
        self.sync_local_from_room();
        self.broadcast(Payload::Room(self.room.clone())).await;
        Ok(())
    }

    async fn set_timer(&mut self, enabled: bool, minutes: u32) -> Result<(), EngineError> {
        if !self.local.is_host() {
            return Err(EngineError::NotHost);
        }
        self.timer.enabled = enabled;
        self.timer.duration_minutes = minutes.max(1);
        self.timer.invalidate();
        self.turn_deadline = None;
        self.broadcast(Payload::Timer(self.timer.clone())).await;
        Ok(())
    }

    async fn kick_player(&mut self, uuid: uuid::Uuid) -> Result<(), EngineError> {
        if !self.local.is_host() {
            return Err(EngineError::NotHost);
        }
        if uuid == self.local.uuid() {
            return Ok(());
        }
        self.room.remove_player_with_uuid(uuid);
        self.room.refresh();
        self.broadcast(Payload::Room(self.room.clone())).await;
        Ok(())
    }

    async fn start_game(&mut self) -> Result<(), EngineError> {
        if !self.local.is_host() {
            return Err(EngineError::NotHost);
        }
        if self.phase != SessionPhase::Lobby {
            return Err(EngineError::CannotStartGame(
                "a game is already in progress".to_string(),
            ));
        }
        if !self.room.can_start_game() {
            return Err(EngineError::CannotStartGame(
                self.room.start_checklist().join("; "),
            ));
        }
        self.room.cancel_ready_for_all_players();
        let cards = CardCollection::new(self.room.mode);
        let round = Round::new(cards.starting_team());
        self.broadcast(Payload::Cards(cards.clone())).await;
        self.broadcast(Payload::Round(round.clone())).await;
        self.broadcast(Payload::Room(self.room.clone())).await;
        self.cards = Some(cards);
        self.round = Some(round);
        self.phase = SessionPhase::InGame;
        // no joining mid-game
        self.transport.stop_advertising().await;
        self.advertised_code = None;
        self.emit(SessionEvent::GameShouldStart);
        self.recompute_turn_deadline();
        Ok(())
    }

    async fn confirm_clue(&mut self, clue: &str, count: &str) -> Result<(), EngineError> {
        if self.phase != SessionPhase::InGame {
            return Err(EngineError::NoRound);
        }
        let round = self.round.as_mut().ok_or(EngineError::NoRound)?;
        if round.is_terminal() {
            return Err(EngineError::RoundOver);
        }
        if !self.local.is_clue_giver || self.local.team != round.current_team {
            return Err(EngineError::NotClueGiver);
        }
        round.set_clue_and_count(clue, count)?;
        let round = round.clone();
        self.broadcast(Payload::Round(round)).await;
        let event = ActionEvent::from_player(EventKind::Confirm, self.local.uuid());
        self.broadcast(Payload::Action(event)).await;
        Ok(())
    }

    async fn select_card(&mut self, index: usize) -> Result<(), EngineError> {
        if self.phase != SessionPhase::InGame {
            return Err(EngineError::NoRound);
        }
        let round = self.round.as_ref().ok_or(EngineError::NoRound)?;
        if round.is_terminal() {
            return Err(EngineError::RoundOver);
        }
        if self.local.is_clue_giver {
            return Err(EngineError::NotClueGiver);
        }
        if self.local.team != round.current_team {
            return Err(EngineError::NotYourTurn);
        }
        if !round.both_fields_set() {
            return Err(EngineError::ClueMissing);
        }
        let card_team = {
            let cards = self.cards.as_mut().ok_or(EngineError::NoRound)?;
            cards.select(index)?
        };
        let acting = self.local.team;

        if let Some(cards) = self.cards.clone() {
            self.broadcast(Payload::Cards(cards)).await;
        }
        let mut event = ActionEvent::from_player(EventKind::SelectCard, self.local.uuid());
        event
            .parameters
            .insert(ActionEvent::PARAM_CARD_INDEX.to_string(), index.to_string());
        self.broadcast(Payload::Action(event)).await;

        let outcome = match (self.round.as_ref(), self.cards.as_ref()) {
            (Some(round), Some(cards)) => round.selection_outcome(card_team, acting, cards),
            _ => return Ok(()),
        };
        match outcome {
            SelectionOutcome::GameWon { winner } => self.finish_game(winner).await,
            SelectionOutcome::RoundEnded => self.finish_round(acting).await,
            SelectionOutcome::Continue => {}
        }
        Ok(())
    }

    async fn end_round(&mut self) -> Result<(), EngineError> {
        if self.phase != SessionPhase::InGame {
            return Err(EngineError::NoRound);
        }
        let round = self.round.as_ref().ok_or(EngineError::NoRound)?;
        if round.is_terminal() {
            return Err(EngineError::RoundOver);
        }
        if self.local.team != round.current_team {
            return Err(EngineError::NotYourTurn);
        }
        if !round.both_fields_set() {
            return Err(EngineError::ClueMissing);
        }
        let team = self.local.team;
        self.finish_round(team).await;
        Ok(())
    }

    async fn abort_game(&mut self) -> Result<(), EngineError> {
        let Some(round) = self.round.as_mut() else {
            return Ok(());
        };
        if round.is_terminal() {
            return Ok(());
        }
        round.abort();
        let round = round.clone();
        self.broadcast(Payload::Round(round)).await;
        let event = ActionEvent::from_player(EventKind::GameAborted, self.local.uuid());
        self.broadcast(Payload::Action(event)).await;
        self.emit(SessionEvent::GameShouldEnd(EndReason::Aborted));
        self.return_to_lobby().await;
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), EngineError> {
        if self.local.is_host() {
            // an empty room tells every replica the session is over
            self.room.reset();
            self.broadcast(Payload::Room(self.room.clone())).await;
        }
        self.stats.reset();
        self.emit(SessionEvent::RoomTerminated(TerminateReason::Left));
        self.phase = SessionPhase::Ended;
        self.done = true;
        Ok(())
    }

    // --- clocks ---

    async fn on_heartbeat(&mut self) {
        if !self.local.is_host() {
            return;
        }
        match self.phase {
            SessionPhase::Lobby => {
                self.room.refresh();
                self.sync_local_from_room();
                self.refresh_advertising().await;
                self.broadcast(Payload::Room(self.room.clone())).await;
                self.broadcast(Payload::Timer(self.timer.clone())).await;
                self.broadcast(Payload::Stats(self.stats.clone())).await;
            }
            SessionPhase::InGame => {
                self.broadcast(Payload::Room(self.room.clone())).await;
                if let Some(round) = self.round.clone() {
                    self.broadcast(Payload::Round(round)).await;
                }
                if let Some(cards) = self.cards.clone() {
                    self.broadcast(Payload::Cards(cards)).await;
                }
                self.broadcast(Payload::Stats(self.stats.clone())).await;
                self.broadcast(Payload::Timer(self.timer.clone())).await;
            }
            SessionPhase::Joining | SessionPhase::Ended => {}
        }
    }

    async fn on_refresh(&mut self) {
        if self.local.is_host() && self.phase == SessionPhase::Lobby {
            self.room.refresh();
            self.sync_local_from_room();
            self.refresh_advertising().await;
        }
        self.recompute_turn_deadline();
    }

    async fn on_turn_expired(&mut self) {
        self.turn_deadline = None;
        self.timer.invalidate();
        if self.phase != SessionPhase::InGame || !self.timer.enabled {
            return;
        }
        let Some(round) = self.round.as_ref() else {
            return;
        };
        if round.is_terminal() {
            return;
        }
        let current = round.current_team;
        // exactly one device acts on expiry so the turn flips once
        let acts = match self.room.mode {
            GameMode::Minigame => self.local.is_host(),
            GameMode::Regular => self.local.is_clue_giver && self.local.team == current,
        };
        if acts {
            self.finish_round(current).await;
        }
    }

    async fn on_join_timeout(&mut self) {
        self.join_deadline = None;
        if self.phase == SessionPhase::Joining {
            self.emit(SessionEvent::JoinFailed(
                "no room with that access code responded".to_string(),
            ));
            self.shut_down().await;
        }
    }

    /// Terminal exit shared by every "recovery via reset" path: tear the
    /// transport down but keep answering snapshot reads and commands.
    async fn shut_down(&mut self) {
        self.phase = SessionPhase::Ended;
        self.round = None;
        self.cards = None;
        self.timer.invalidate();
        self.turn_deadline = None;
        self.join_deadline = None;
        self.transport.terminate().await;
    }

    // --- transport events ---

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerFound { peer, info } => self.on_peer_found(peer, info).await,
            TransportEvent::PeerLost(peer) => debug!("lost sight of {peer}"),
            TransportEvent::PeerConnected(peer) => self.on_peer_connected(peer).await,
            TransportEvent::PeerDisconnected(peer) => self.on_peer_disconnected(peer).await,
            TransportEvent::Data { from, payload } => {
                if let Some(payload) = codec::decode(&payload) {
                    self.apply_payload(from, payload).await;
                }
            }
        }
    }

    async fn on_peer_found(&mut self, peer: PeerId, info: DiscoveryInfo) {
        let Some(code) = self.join_code.as_deref() else {
            return;
        };
        if self.phase != SessionPhase::Joining || self.host_peer.is_some() {
            return;
        }
        if info.get(INFO_ACCESS_CODE).map(String::as_str) != Some(code) {
            debug!("found {peer} advertising a different room");
            return;
        }
        self.host_peer = Some(peer);
        if let Err(err) = self.transport.invite(&peer).await {
            warn!("failed to invite {peer}: {err:#}");
            self.host_peer = None;
        }
    }

    async fn on_peer_connected(&mut self, peer: PeerId) {
        if self.local.is_host() {
            // welcome push so the newcomer doesn't wait out a heartbeat
            self.send_to(Payload::Room(self.room.clone()), peer).await;
            self.send_to(Payload::Timer(self.timer.clone()), peer).await;
            self.send_to(Payload::Stats(self.stats.clone()), peer).await;
        } else if self.host_peer == Some(peer) {
            // introduce ourselves; the host merges us into the room
            self.broadcast(Payload::Player(self.local.clone())).await;
        }
    }

    async fn on_peer_disconnected(&mut self, peer: PeerId) {
        let uuid = self.room.uuid_for_peer(&peer);
        let player = uuid.and_then(|uuid| self.room.player_with_uuid(uuid)).cloned();
        let host_dropped = self.host_peer == Some(peer)
            || player.as_ref().is_some_and(|p| p.is_host());

        if !self.local.is_host() {
            if host_dropped {
                // the session dies with the host; react exactly once no
                // matter how many times the transport repeats itself
                if !self.host_gone {
                    self.host_gone = true;
                    self.room.reset();
                    self.emit(SessionEvent::RoomTerminated(TerminateReason::HostDisconnected));
                    self.shut_down().await;
                }
            } else {
                self.emit(SessionEvent::PeerDisconnected {
                    player_name: player.map(|p| p.name),
                });
            }
            return;
        }

        let Some(uuid) = uuid else {
            return;
        };
        self.room.remove_player_with_uuid(uuid);
        self.room.refresh();
        self.sync_local_from_room();
        self.emit(SessionEvent::PeerDisconnected {
            player_name: player.map(|p| p.name),
        });
        if self.phase == SessionPhase::InGame {
            // can't keep a round alive with a hole in a team
            if let Some(round) = self.round.as_mut()
                && !round.is_terminal()
            {
                round.abort();
                let round = round.clone();
                self.broadcast(Payload::Round(round)).await;
            }
            self.emit(SessionEvent::GameShouldEnd(EndReason::PlayerDisconnected));
            self.return_to_lobby().await;
        } else {
            self.broadcast(Payload::Room(self.room.clone())).await;
        }
    }

    // --- receive-side replication ---

    async fn apply_payload(&mut self, from: PeerId, payload: Payload) {
        match payload {
            Payload::Player(player) => self.apply_player(from, player).await,
            Payload::Room(room) => self.apply_room(room).await,
            Payload::Cards(cards) => {
                self.cards = Some(cards.clone());
                self.emit(SessionEvent::CardsUpdated(cards));
            }
            Payload::Round(round) => self.apply_round(round).await,
            Payload::Stats(stats) => {
                self.stats = stats.clone();
                self.emit(SessionEvent::StatsUpdated(stats));
            }
            Payload::Timer(timer) => {
                if !self.local.is_host() {
                    self.timer.enabled = timer.enabled;
                    self.timer.duration_minutes = timer.duration_minutes;
                    self.recompute_turn_deadline();
                }
            }
            Payload::Action(event) => self.apply_action(event).await,
            // decode() normalizes legacy rooms, but stay graceful
            Payload::RoomV1(room) => self.apply_room(room.into()).await,
        }
    }

    async fn apply_player(&mut self, from: PeerId, player: Player) {
        if !self.local.is_host() {
            return;
        }
        if player.is_cpu() {
            // the CPU slot is host-owned; nobody announces it
            return;
        }
        self.room.add_connected_peer(from, player.uuid());
        self.room.apply_player_update(player);
        self.room.refresh();
        self.sync_local_from_room();
        self.broadcast(Payload::Room(self.room.clone())).await;
    }

    async fn apply_room(&mut self, incoming: Room) {
        if self.local.is_host() {
            debug!("ignoring room broadcast from a non-authoritative peer");
            return;
        }
        if incoming.is_empty() {
            if self.phase != SessionPhase::Ended {
                self.emit(SessionEvent::RoomTerminated(TerminateReason::RoomClosed));
                self.shut_down().await;
            }
            return;
        }
        if self.phase == SessionPhase::Joining {
            if incoming.contains_uuid(self.local.uuid()) {
                self.room = incoming;
                self.sync_local_from_room();
                self.join_deadline = None;
                self.transport.stop_browsing().await;
                self.phase = SessionPhase::Lobby;
                self.emit(SessionEvent::JoinedRoom);
                self.emit(SessionEvent::LobbyUpdated(self.room.clone()));
            }
            // otherwise the host hasn't merged us yet; wait for the next one
            return;
        }
        if !incoming.contains_uuid(self.local.uuid()) {
            self.emit(SessionEvent::PlayerRemoved);
            self.shut_down().await;
            return;
        }
        self.room = incoming;
        self.sync_local_from_room();
        self.emit(SessionEvent::LobbyUpdated(self.room.clone()));
    }

    async fn apply_round(&mut self, incoming: Round) {
        let previous = self.round.replace(incoming.clone());
        if incoming.is_aborted() {
            let seen = previous.as_ref().is_some_and(|p| p.is_aborted());
            if !seen && self.phase == SessionPhase::InGame {
                self.emit(SessionEvent::GameShouldEnd(EndReason::Aborted));
                self.return_to_lobby().await;
            }
            return;
        }
        if incoming.has_game_ended() {
            let seen = previous.as_ref().is_some_and(|p| p.has_game_ended());
            if !seen
                && self.phase == SessionPhase::InGame
                && let Some(winner) = incoming.winning_team()
            {
                let reason = if winner == self.local.team {
                    EndReason::Won
                } else {
                    EndReason::Lost
                };
                self.emit(SessionEvent::GameShouldEnd(reason));
                self.return_to_lobby().await;
            }
            return;
        }
        if self.phase == SessionPhase::Lobby {
            // the host dealt: follow it into the game
            self.phase = SessionPhase::InGame;
            self.emit(SessionEvent::GameShouldStart);
        }
        self.emit(SessionEvent::RoundUpdated(incoming));
        self.recompute_turn_deadline();
    }

    async fn apply_action(&mut self, event: ActionEvent) {
        match event.kind() {
            EventKind::Ready | EventKind::Cancel => {
                if self.local.is_host()
                    && let Some(uuid) = event.player_uuid()
                {
                    let ready = event.kind() == EventKind::Ready;
                    if let Some(player) = self.room.player_with_uuid_mut(uuid) {
                        player.is_ready = ready;
                    }
                    self.broadcast(Payload::Room(self.room.clone())).await;
                }
                self.emit(SessionEvent::ActionReceived(event));
            }
            EventKind::Unknown(code) => {
                debug!("ignoring unknown action event kind {code}");
            }
            _ => self.emit(SessionEvent::ActionReceived(event)),
        }
    }

    // --- game flow helpers ---

    /// Somebody won. Record it, tell everyone, go back to pregame.
    async fn finish_game(&mut self, winner: Team) {
        if let Some(round) = self.round.as_mut() {
            round.set_winning_team(winner);
            round.end_game();
        }
        match self.room.mode {
            GameMode::Regular => self.stats.record_win_for_team(winner),
            GameMode::Minigame => {
                if winner == Team::Red {
                    let remaining = self
                        .cards
                        .as_ref()
                        .map(|c| c.cards_remaining_for_team(CardTeam::Blue))
                        .unwrap_or(0);
                    self.stats.set_best_record(remaining as u32);
                }
            }
        }
        if let Some(round) = self.round.clone() {
            self.broadcast(Payload::Round(round)).await;
        }
        self.broadcast(Payload::Stats(self.stats.clone())).await;
        let event = ActionEvent::from_player(EventKind::GameOver, self.local.uuid());
        self.broadcast(Payload::Action(event)).await;
        let reason = if winner == self.local.team {
            EndReason::Won
        } else {
            EndReason::Lost
        };
        self.emit(SessionEvent::GameShouldEnd(reason));
        self.return_to_lobby().await;
    }

    /// The acting team's turn is over, by guess outcome, choice or timer.
    async fn finish_round(&mut self, ending_team: Team) {
        self.timer.invalidate();
        self.turn_deadline = None;
        match self.room.mode {
            GameMode::Regular => {
                if let Some(round) = self.round.as_mut()
                    && round.end_round(ending_team).is_ok()
                {
                    let round = round.clone();
                    self.broadcast(Payload::Round(round)).await;
                }
            }
            GameMode::Minigame => {
                // the automated opponent takes its exchange before control
                // returns to the human team
                if let Some(cards) = self.cards.as_mut() {
                    cards.auto_eliminate_opponent_card(Team::Blue);
                    let cards = cards.clone();
                    self.broadcast(Payload::Cards(cards)).await;
                }
                let opponent_cleared = self
                    .cards
                    .as_ref()
                    .is_some_and(|c| c.cards_remaining_for_team(CardTeam::Blue) == 0);
                if opponent_cleared {
                    self.finish_game(Team::Blue).await;
                    return;
                }
                if let Some(round) = self.round.as_mut()
                    && round.restart_turn(ending_team).is_ok()
                {
                    let round = round.clone();
                    self.broadcast(Payload::Round(round)).await;
                }
            }
        }
        let event = ActionEvent::from_player(EventKind::EndRound, self.local.uuid());
        self.broadcast(Payload::Action(event)).await;
        self.recompute_turn_deadline();
    }

    /// Clear game state and fall back to the pregame room. The host mints
    /// a fresh access code and resumes advertising under it.
    async fn return_to_lobby(&mut self) {
        self.round = None;
        self.cards = None;
        self.timer.invalidate();
        self.turn_deadline = None;
        if self.phase != SessionPhase::Ended {
            self.phase = SessionPhase::Lobby;
        }
        if self.local.is_host() {
            self.room.generate_new_access_code();
            self.room.cancel_ready_for_all_players();
            self.refresh_advertising().await;
            self.broadcast(Payload::Room(self.room.clone())).await;
        }
    }

    // --- plumbing ---

    async fn refresh_advertising(&mut self) {
        if self.phase != SessionPhase::Lobby {
            return;
        }
        if self.room.is_full() {
            self.transport.stop_advertising().await;
            self.advertised_code = None;
            return;
        }
        let code = self.room.access_code().to_string();
        if self.advertised_code.as_deref() == Some(code.as_str()) {
            return;
        }
        self.transport.stop_advertising().await;
        let mut info = DiscoveryInfo::new();
        info.insert(INFO_ROOM_UUID.to_string(), self.room.uuid().to_string());
        info.insert(INFO_ACCESS_CODE.to_string(), code.clone());
        match self.transport.start_advertising(info).await {
            Ok(()) => self.advertised_code = Some(code),
            Err(err) => warn!("failed to restart advertising: {err:#}"),
        }
    }

    fn recompute_turn_deadline(&mut self) {
        let live = self.phase == SessionPhase::InGame
            && self.timer.enabled
            && self.round.as_ref().is_some_and(|r| !r.is_terminal());
        if !live {
            self.timer.invalidate();
            self.turn_deadline = None;
            return;
        }
        let my_turn = self
            .round
            .as_ref()
            .is_some_and(|r| r.current_team == self.local.team);
        if !my_turn {
            self.timer.invalidate();
            self.turn_deadline = None;
            return;
        }
        if self.timer.state == TimerState::Stopped {
            self.timer.state = TimerState::WillStart;
        }
        if self.timer.state == TimerState::WillStart {
            self.turn_deadline = Some(Instant::now() + self.timer.duration());
            self.timer.state = TimerState::Started;
        }
    }

    fn sync_local_from_room(&mut self) {
        if let Some(player) = self.room.player_with_uuid(self.local.uuid()) {
            self.local = player.clone();
        }
    }

    async fn broadcast(&mut self, payload: Payload) {
        match codec::encode(&payload) {
            Ok(bytes) => self.transport.broadcast(bytes).await,
            Err(err) => warn!("failed to encode broadcast: {err:#}"),
        }
    }

    async fn send_to(&mut self, payload: Payload, peer: PeerId) {
        match codec::encode(&payload) {
            Ok(bytes) => self.transport.send(bytes, &[peer]).await,
            Err(err) => warn!("failed to encode message: {err:#}"),
        }
    }

    /// Events are advisory; if the UI stops listening we drop rather than
    /// stall the loop.
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.try_send(event);
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            phase: self.phase,
            local: self.local.clone(),
            room: self.room.clone(),
            round: self.round.clone(),
            cards: self.cards.clone(),
            stats: self.stats.clone(),
            timer: self.timer.clone(),
        });
    }
}
