//! Session orchestration.
//!
//! A [`GameSession`] owns one device's view of a room. All mutable state
//! lives inside a single actor task: transport callbacks, UI commands,
//! heartbeat and refresh ticks and the round deadline funnel into one
//! `select!` loop, so no locking is needed anywhere in the core. The UI
//! reads state through cheap snapshots and reacts to lifecycle events.

mod runner;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cards::CardCollection;
use crate::error::EngineError;
use crate::event::ActionEvent;
use crate::player::{Player, Team};
use crate::room::{GameMode, Room};
use crate::round::Round;
use crate::stats::Statistics;
use crate::timer::RoundTimer;
use crate::transport::{
    DiscoveryInfo, INFO_ACCESS_CODE, INFO_ROOM_UUID, PeerTransport,
};

use runner::Runner;

/// Tunables for one session. The intervals exist so tests can tighten
/// the cadence; the defaults match the shipped experience.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub player_name: String,
    pub mode: GameMode,
    /// Full-state rebroadcast cadence (host side).
    pub heartbeat_interval: Duration,
    /// Host housekeeping cadence (sorting, clue-giver election).
    pub refresh_interval: Duration,
    /// How long a joiner keeps looking before giving up.
    pub join_timeout: Duration,
    /// Read-only local setting: speak card teams in display labels.
    pub accessibility: bool,
}

impl SessionConfig {
    pub fn new(player_name: &str) -> Self {
        Self {
            player_name: player_name.to_string(),
            mode: GameMode::Regular,
            heartbeat_interval: Duration::from_secs(2),
            refresh_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(10),
            accessibility: false,
        }
    }
}

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Browsing for a room matching the access code.
    Joining,
    /// In the pregame room.
    Lobby,
    /// A round is in progress.
    InGame,
    /// The session is over; the transport has been torn down.
    Ended,
}

/// Why an in-progress game ended, from the local device's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Won,
    Lost,
    Aborted,
    PlayerDisconnected,
}

/// Why the whole session is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    HostDisconnected,
    /// The received room no longer has any players in it.
    RoomClosed,
    Left,
}

/// Lifecycle signals for the UI layer. These drive navigation and
/// feedback; state itself is read through [`GameSession::snapshot`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The host's room broadcast confirmed our membership.
    JoinedRoom,
    /// The join attempt was abandoned.
    JoinFailed(String),
    LobbyUpdated(Room),
    RoundUpdated(Round),
    CardsUpdated(CardCollection),
    StatsUpdated(Statistics),
    GameShouldStart,
    GameShouldEnd(EndReason),
    /// We are no longer listed in the room.
    PlayerRemoved,
    RoomTerminated(TerminateReason),
    /// Another (non-host) peer dropped from the session.
    PeerDisconnected { player_name: Option<String> },
    /// A discrete event arrived; hook for haptics and the timeline log.
    ActionReceived(ActionEvent),
}

/// Point-in-time copy of every replicated singleton.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub local: Player,
    pub room: Room,
    pub round: Option<Round>,
    pub cards: Option<CardCollection>,
    pub stats: Statistics,
    pub timer: RoundTimer,
}

pub(crate) enum Command {
    SetTeam(Team),
    NominateClueGiver,
    SetReady(bool),
    SetMode(GameMode),
    SetTimer { enabled: bool, minutes: u32 },
    KickPlayer(Uuid),
    StartGame,
    ConfirmClue { clue: String, count: String },
    SelectCard(usize),
    EndRound,
    AbortGame,
    Leave,
}

type CommandReply = oneshot::Sender<Result<(), EngineError>>;

/// Handle to one device's session actor.
pub struct GameSession {
    commands: mpsc::Sender<(Command, CommandReply)>,
    snapshot: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    accessibility: bool,
}

impl Drop for GameSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl GameSession {
    /// Create a room and start advertising it. The local player becomes
    /// the host and the authoritative owner of the room registry.
    pub async fn host<T: PeerTransport>(
        transport: T,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        Self::start(transport, config, None).await
    }

    /// Browse for a room advertising `access_code` and join it. Gives up
    /// after the configured join timeout.
    pub async fn join<T: PeerTransport>(
        transport: T,
        access_code: &str,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        Self::start(transport, config, Some(access_code.to_string())).await
    }

    async fn start<T: PeerTransport>(
        mut transport: T,
        config: SessionConfig,
        join_code: Option<String>,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        transport.set_identity(&config.player_name).await?;
        let transport_events = transport
            .take_events()
            .ok_or_else(|| anyhow::anyhow!("transport event queue already taken"))?;
        transport.open_session().await?;

        let is_host = join_code.is_none();
        let mut local = Player::new(&config.player_name, Team::Red, is_host);
        let mut room = Room::new(config.mode);
        let mut advertised_code = None;
        if is_host {
            if config.mode == GameMode::Minigame {
                room.add_cpu_player();
            }
            room.add_player(local.clone());
            if let Some(peer) = transport.local_peer() {
                room.add_connected_peer(peer, local.uuid());
            }
            room.refresh();
            if let Some(player) = room.player_with_uuid(local.uuid()) {
                local = player.clone();
            }
            let mut info = DiscoveryInfo::new();
            info.insert(INFO_ROOM_UUID.to_string(), room.uuid().to_string());
            info.insert(INFO_ACCESS_CODE.to_string(), room.access_code().to_string());
            transport.start_advertising(info).await?;
            advertised_code = Some(room.access_code().to_string());
        } else {
            transport.start_browsing().await?;
        }

        let accessibility = config.accessibility;
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();

        let runner = Runner::new(
            transport,
            transport_events,
            commands_rx,
            events_tx,
            cancel.clone(),
            config,
            local,
            room,
            join_code,
            advertised_code,
        );
        let snapshot = runner.snapshot_rx();
        let task = tokio::spawn(runner.run());

        Ok((
            Self {
                commands: commands_tx,
                snapshot,
                cancel,
                task: Some(task),
                accessibility,
            },
            events_rx,
        ))
    }

    // --- reads ---

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.snapshot.borrow().phase
    }

    pub fn room(&self) -> Room {
        self.snapshot.borrow().room.clone()
    }

    pub fn round(&self) -> Option<Round> {
        self.snapshot.borrow().round.clone()
    }

    pub fn cards(&self) -> Option<CardCollection> {
        self.snapshot.borrow().cards.clone()
    }

    pub fn stats(&self) -> Statistics {
        self.snapshot.borrow().stats.clone()
    }

    pub fn timer(&self) -> RoundTimer {
        self.snapshot.borrow().timer.clone()
    }

    pub fn local_player(&self) -> Player {
        self.snapshot.borrow().local.clone()
    }

    /// Display label for a card cell, honoring the local accessibility
    /// setting.
    pub fn card_label(&self, index: usize) -> Option<String> {
        let snapshot = self.snapshot.borrow();
        let card = snapshot.cards.as_ref()?.card(index)?;
        Some(card.display_label(self.accessibility))
    }

    // --- operations ---

    pub async fn set_team(&self, team: Team) -> Result<(), EngineError> {
        self.command(Command::SetTeam(team)).await
    }

    /// Claim the clue-giver role for the local player's team.
    pub async fn nominate_clue_giver(&self) -> Result<(), EngineError> {
        self.command(Command::NominateClueGiver).await
    }

    pub async fn set_ready(&self, ready: bool) -> Result<(), EngineError> {
        self.command(Command::SetReady(ready)).await
    }

    /// Host only, pregame only.
    pub async fn set_mode(&self, mode: GameMode) -> Result<(), EngineError> {
        self.command(Command::SetMode(mode)).await
    }

    /// Host only: configure the round countdown.
    pub async fn set_timer(&self, enabled: bool, minutes: u32) -> Result<(), EngineError> {
        self.command(Command::SetTimer { enabled, minutes }).await
    }

    /// Host only: remove a player from the room.
    pub async fn kick_player(&self, uuid: Uuid) -> Result<(), EngineError> {
        self.command(Command::KickPlayer(uuid)).await
    }

    /// Host only: deal the cards and open the first round.
    pub async fn start_game(&self) -> Result<(), EngineError> {
        self.command(Command::StartGame).await
    }

    /// Clue-giver of the acting team only.
    pub async fn confirm_clue(&self, clue: &str, count: &str) -> Result<(), EngineError> {
        self.command(Command::ConfirmClue {
            clue: clue.to_string(),
            count: count.to_string(),
        })
        .await
    }

    /// Guesser on the acting team only; needs a confirmed clue.
    pub async fn select_card(&self, index: usize) -> Result<(), EngineError> {
        self.command(Command::SelectCard(index)).await
    }

    pub async fn end_round(&self) -> Result<(), EngineError> {
        self.command(Command::EndRound).await
    }

    pub async fn abort_game(&self) -> Result<(), EngineError> {
        self.command(Command::AbortGame).await
    }

    /// Leave the room and tear the transport down.
    pub async fn leave(&self) -> Result<(), EngineError> {
        self.command(Command::Leave).await
    }

    async fn command(&self, command: Command) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send((command, reply_tx))
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        reply_rx.await.map_err(|_| EngineError::SessionClosed)?
    }
}
