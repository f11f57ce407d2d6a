use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    ChannelStatus, ClickOutcome, GameClient, GameConfig, InteractionOverlay, OpeningCatalog,
    Session, StoreEvent,
};
use shared::domain::{CoordinateMove, Difficulty, Side, Square};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Terminal chess client")]
struct Args {
    #[arg(long, default_value = "player.toml")]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    difficulty: Option<Difficulty>,
    #[arg(long)]
    side: Option<Side>,
    /// Watch an engine-vs-engine game instead of playing.
    #[arg(long)]
    watch: bool,
    #[arg(long)]
    white: Option<Difficulty>,
    #[arg(long)]
    black: Option<Difficulty>,
    /// ECO code of the opening to start from.
    #[arg(long)]
    opening: Option<String>,
    #[arg(long)]
    speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Click(Square),
    Move(CoordinateMove),
    Moves(Square),
    Pause,
    Resume,
    Step,
    Speed(f64),
    State,
    Refresh,
    Reconnect,
    Analyze,
    Load(String),
    Openings(u32),
    Search(String),
    Games,
    Board,
    New,
    Help,
    Quit,
}

const HELP: &str = "commands: click <sq> | move <uci> | moves <sq> | pause | resume | step | \
speed <secs> | state | refresh | reconnect | analyze | load <fen> | openings [n] | search <name> | \
games | board | new | quit";

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let command = match word {
        "click" | "c" => Command::Click(rest.parse().map_err(|err| format!("{err}"))?),
        "move" | "m" => Command::Move(rest.parse().map_err(|err| format!("{err}"))?),
        "moves" => Command::Moves(rest.parse().map_err(|err| format!("{err}"))?),
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "step" => Command::Step,
        "speed" => Command::Speed(
            rest.parse()
                .map_err(|_| format!("speed expects seconds, got {rest:?}"))?,
        ),
        "state" => Command::State,
        "refresh" => Command::Refresh,
        "reconnect" => Command::Reconnect,
        "analyze" => Command::Analyze,
        "load" if !rest.is_empty() => Command::Load(rest.to_string()),
        "openings" if rest.is_empty() => Command::Openings(10),
        "openings" => Command::Openings(
            rest.parse()
                .map_err(|_| format!("openings expects a count, got {rest:?}"))?,
        ),
        "search" if !rest.is_empty() => Command::Search(rest.to_string()),
        "games" => Command::Games,
        "board" | "b" => Command::Board,
        "new" => Command::New,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => return Err(format!("unknown command {line:?}")),
    };
    Ok(command)
}

/// Plain text board, rank 8 first. Highlighted destinations show as `*`
/// (or `x` over a piece), the selected square in brackets.
fn render_board(session: &Session, overlay: &InteractionOverlay) -> String {
    let selected = overlay.selected_square();
    let mut out = String::new();
    for (row, pieces) in session.board.rows().enumerate() {
        let rank = 7 - row as u8;
        out.push_str(&format!("{} ", rank + 1));
        for (file, piece) in pieces.iter().enumerate() {
            let square = Square::new(file as u8, rank);
            let highlighted = square.is_some_and(|sq| overlay.highlights.contains_key(&sq));
            let cell = match (piece, highlighted) {
                (Some(_), true) => 'x',
                (None, true) => '*',
                (Some(piece), false) => piece.symbol(),
                (None, false) => '.',
            };
            if square.is_some() && square == selected {
                out.push_str(&format!("[{cell}]"));
            } else {
                out.push_str(&format!(" {cell} "));
            }
        }
        out.push('\n');
    }
    out.push_str("   a  b  c  d  e  f  g  h\n");
    out.push_str(&format!(
        "{} to move | {:?} | eval {:+.2}",
        session.side_to_move, session.status, session.evaluation
    ));
    if session.is_checkmate {
        out.push_str(" | checkmate");
    } else if session.is_stalemate {
        out.push_str(" | stalemate");
    } else if session.is_draw {
        out.push_str(" | draw");
    } else if session.is_check {
        out.push_str(" | check");
    }
    if let Some(name) = session.opening.as_ref().and_then(|o| o.name.as_deref()) {
        out.push_str(&format!(" | {name}"));
    }
    out
}

fn game_config(settings: &config::Settings, watch: bool, opening: Option<&str>) -> GameConfig {
    let config = if watch {
        GameConfig::engine_vs_engine(settings.white_difficulty, settings.black_difficulty)
    } else {
        GameConfig::human_vs_engine(settings.player_side, settings.difficulty)
    };
    match opening {
        Some(eco) => config.with_opening(eco),
        None => config,
    }
}

async fn print_board(client: &GameClient) {
    let state = client.store().state().await;
    println!("{}", render_board(&state.session, &state.overlay));
}

fn spawn_event_printer(client: Arc<GameClient>) {
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::SnapshotApplied {
                    position_changed: true,
                })
                | Ok(StoreEvent::SessionReplaced) => print_board(&client).await,
                Ok(StoreEvent::StatusChanged(status)) => println!("status: {status:?}"),
                Ok(StoreEvent::ChannelStatusChanged(kind, ChannelStatus::Failed(reason))) => {
                    println!("{kind} channel failed: {reason}")
                }
                Ok(StoreEvent::ChannelStatusChanged(kind, status)) => {
                    info!(channel = %kind, ?status, "channel status")
                }
                Ok(StoreEvent::SpeedChanged(seconds)) => println!("speed: {seconds:.1}s per move"),
                Ok(StoreEvent::ErrorRecorded(message)) => println!("error: {message}"),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn run_command(
    client: &GameClient,
    command: Command,
    new_game: &GameConfig,
    analysis_depth: u32,
) -> Result<bool> {
    match command {
        Command::Click(square) => match client.click(square).await {
            ClickOutcome::Selected { destinations, .. } => {
                let list: Vec<String> = destinations.iter().map(|mv| mv.to_string()).collect();
                println!("selected {square}: {}", list.join(" "));
            }
            ClickOutcome::Committed { mv, accepted } => {
                println!("{mv} {}", if accepted { "played" } else { "rejected" });
            }
            other => println!("{other:?}"),
        },
        Command::Move(mv) => {
            if !client.submit_move(mv).await {
                println!("{mv} rejected");
            }
        }
        Command::Moves(square) => {
            let moves = client.legal_destinations(square).await;
            let list: Vec<String> = moves.iter().map(|mv| mv.to_string()).collect();
            println!("{square}: {}", list.join(" "));
        }
        Command::Pause => client.pause().await,
        Command::Resume => client.resume().await,
        Command::Step => client.step().await,
        Command::Speed(seconds) => client.set_speed(seconds).await,
        Command::State => client.request_state().await,
        Command::Refresh => {
            client.refresh().await;
        }
        Command::Reconnect => {
            if let Err(err) = client.reconnect().await {
                println!("reconnect failed: {err}");
            }
        }
        Command::Analyze => {
            let fen = client.store().session().await.position;
            let report = client
                .analyze_position(&fen, analysis_depth)
                .await
                .context("analysis failed")?;
            println!(
                "eval {:+.2} best {} (depth {})",
                report.evaluation,
                report.best_move.as_deref().unwrap_or("-"),
                report.depth
            );
        }
        Command::Load(fen) => match client.load_position(&fen).await {
            Ok(()) => {}
            Err(err) => println!("cannot load position: {err}"),
        },
        Command::Openings(limit) => {
            let openings = client
                .catalog()
                .popular_openings(limit)
                .await
                .context("failed to list openings")?;
            for opening in openings {
                println!("{} {} ({})", opening.eco, opening.name, opening.moves);
            }
        }
        Command::Search(name) => match client
            .catalog()
            .search_openings(&name)
            .await
            .context("opening search failed")?
        {
            Some(opening) => println!("{} {} ({})", opening.eco, opening.name, opening.moves),
            None => println!("no opening named {name:?}"),
        },
        Command::Games => {
            let games = client
                .active_games()
                .await
                .context("failed to list games")?;
            for game in games {
                let id = game.id.map(|id| id.to_string()).unwrap_or_default();
                println!("{id} {:?} {:?}", game.mode, game.status);
            }
        }
        Command::Board => print_board(client).await,
        Command::New => {
            client
                .create_session(new_game.clone())
                .await
                .context("failed to create session")?;
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(v) = args.server_url {
        settings.server_url = v;
    }
    if let Some(v) = args.difficulty {
        settings.difficulty = v;
    }
    if let Some(v) = args.side {
        settings.player_side = v;
    }
    if let Some(v) = args.white {
        settings.white_difficulty = v;
    }
    if let Some(v) = args.black {
        settings.black_difficulty = v;
    }
    if let Some(v) = args.speed {
        settings.ai_speed_seconds = v;
    }
    info!(server_url = %settings.server_url, watch = args.watch, "starting player");

    let client = GameClient::new(settings.server_url.clone());
    spawn_event_printer(Arc::clone(&client));

    let new_game = game_config(&settings, args.watch, args.opening.as_deref());
    let session = client
        .create_session(new_game.clone())
        .await
        .with_context(|| format!("failed to create session on {}", settings.server_url))?;
    if session.mode.is_automated() {
        client.set_speed(settings.ai_speed_seconds).await;
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        match run_command(&client, command, &new_game, settings.analysis_depth).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => println!("{err:#}"),
        }
    }

    if let Err(err) = client.end_session().await {
        warn!("failed to end session: {err}");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
