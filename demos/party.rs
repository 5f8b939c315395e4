//! # Party demo
//!
//! Host a room on the local network or join one by its access code, then
//! drive the game from the terminal.
//!
//! ## Host a room
//!
//! ```sh
//! cargo run --example party host --name dana
//! ```
//!
//! ## Join a room
//!
//! ```sh
//! cargo run --example party join abcd --name kim
//! ```

use anyhow::Result;
use cipherdeck::transport::iroh::IrohTransport;
use cipherdeck::*;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Host a new room
    Host {
        #[arg(long, default_value = "host")]
        name: String,
        /// Play the reduced variant against the automated opponent
        #[arg(long)]
        minigame: bool,
    },
    /// Join a room by access code
    Join {
        /// The 4-letter access code shown on the host's screen
        code: String,
        #[arg(long, default_value = "guest")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cipherdeck=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let (session, events) = match cli.command {
        Commands::Host { name, minigame } => {
            let mut config = SessionConfig::new(&name);
            if minigame {
                config.mode = GameMode::Minigame;
            }
            let transport = IrohTransport::new(None)?;
            let (session, events) = GameSession::host(transport, config).await?;
            println!(
                "room open, access code: {}",
                session.room().access_code()
            );
            (session, events)
        }
        Commands::Join { code, name } => {
            let config = SessionConfig::new(&name);
            let transport = IrohTransport::new(None)?;
            let (session, events) = GameSession::join(transport, &code, config).await?;
            println!("looking for a room advertising '{code}'...");
            (session, events)
        }
    };

    tokio::spawn(print_events(events));
    repl(session).await
}

async fn print_events(mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::JoinedRoom => println!("* joined the room"),
            SessionEvent::JoinFailed(reason) => println!("* join failed: {reason}"),
            SessionEvent::GameShouldStart => println!("* game on!"),
            SessionEvent::GameShouldEnd(reason) => println!("* game over: {reason:?}"),
            SessionEvent::PlayerRemoved => println!("* you were removed from the room"),
            SessionEvent::RoomTerminated(reason) => println!("* session over: {reason:?}"),
            SessionEvent::PeerDisconnected { player_name } => {
                println!("* {} disconnected", player_name.as_deref().unwrap_or("someone"));
            }
            // state updates are rendered on demand via `board`
            _ => {}
        }
    }
}

async fn repl(session: GameSession) -> Result<()> {
    println!("commands: board | team red|blue | giver | ready | start | clue <word> <n> | pick <i> | end | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let result = match (parts.next(), parts.next(), parts.next()) {
            (Some("board"), _, _) => {
                render(&session);
                Ok(())
            }
            (Some("team"), Some("red"), _) => session.set_team(Team::Red).await,
            (Some("team"), Some("blue"), _) => session.set_team(Team::Blue).await,
            (Some("giver"), _, _) => session.nominate_clue_giver().await,
            (Some("ready"), _, _) => session.set_ready(true).await,
            (Some("start"), _, _) => session.start_game().await,
            (Some("clue"), Some(word), Some(count)) => session.confirm_clue(word, count).await,
            (Some("pick"), Some(index), _) => match index.parse() {
                Ok(index) => session.select_card(index).await,
                Err(_) => {
                    println!("pick wants a card number");
                    Ok(())
                }
            },
            (Some("end"), _, _) => session.end_round().await,
            (Some("quit"), _, _) => {
                let _ = session.leave().await;
                break;
            }
            (None, _, _) => Ok(()),
            _ => {
                println!("unknown command");
                Ok(())
            }
        };
        if let Err(err) = result {
            println!("! {err}");
        }
    }
    Ok(())
}

fn render(session: &GameSession) {
    let snapshot = session.snapshot();
    println!("phase: {:?}", snapshot.phase);
    println!("{}", snapshot.room);
    for player in snapshot.room.players() {
        let marks = format!(
            "{}{}{}",
            if player.is_host() { " host" } else { "" },
            if player.is_clue_giver { " clue-giver" } else { "" },
            if player.is_ready { " ready" } else { "" },
        );
        println!("  [{}] {}{}", player.team, player.name, marks);
    }
    if let Some(round) = &snapshot.round {
        println!(
            "turn: {} | clue: {} ({})",
            round.current_team,
            round.clue().unwrap_or(CLUE_PLACEHOLDER),
            round.number_of_words().unwrap_or(NUMBER_OF_WORDS_PLACEHOLDER),
        );
    }
    if let Some(cards) = &snapshot.cards {
        let show_teams = snapshot.local.is_clue_giver;
        for (index, card) in cards.cards().iter().enumerate() {
            let tag = if card.is_selected() {
                format!("[{:?}]", card.team())
            } else if show_teams {
                format!("({:?})", card.team())
            } else {
                String::new()
            };
            println!("  {index:2} {} {tag}", card.word());
        }
        println!("score: {}", snapshot.stats);
    }
}
