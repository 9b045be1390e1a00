//! Headless racer for exercising a running server.
//!
//! Creates or joins the room, optionally starts the race once enough players are
//! in the lobby, then random-walks the maze until someone wins.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use shared::{
    decode_server, encode, ClientMessage, Coord, Direction, MazeModel, ServerMessage,
    MIN_PLAYERS_TO_START, MOVE_DELAY_MS,
};
use std::time::Duration;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless maze race bot")]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Create the room instead of joining it
    #[arg(long)]
    create: bool,

    /// While host, start once this many players are in the lobby
    #[arg(long, default_value_t = MIN_PLAYERS_TO_START)]
    start_at: usize,

    #[arg(long, default_value_t = MOVE_DELAY_MS)]
    move_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (ws, _) = connect_async(args.server.as_str()).await?;
    info!("Connected to {}", args.server);
    let (mut sink, mut stream) = ws.split();

    let opening = if args.create {
        ClientMessage::CreateRoom
    } else {
        ClientMessage::JoinRoom
    };
    sink.send(Message::Text(encode(&opening)?)).await?;

    let mut rng = rand::thread_rng();
    let mut my_id = None;
    let mut maze: Option<MazeModel> = None;
    let mut position = Coord::new(1, 1);
    let mut started = false;
    let mut ticker = interval(Duration::from_millis(args.move_delay_ms.max(1)));

    loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };

                match decode_server(&text)? {
                    ServerMessage::RoomReady { your_id, player, .. } => {
                        info!("In room as {} ({})", your_id, player.color);
                        my_id = Some(your_id);
                    }
                    ServerMessage::LobbyUpdate { players, host_id } => {
                        info!("Lobby: {} players", players.len());
                        let is_host = host_id.is_some() && host_id == my_id;
                        if is_host && !started && players.len() >= args.start_at {
                            sink.send(Message::Text(encode(&ClientMessage::StartGame)?)).await?;
                            started = true;
                        }
                    }
                    ServerMessage::GameStart { maze_data } => {
                        let model = maze_data.into_model()?;
                        info!("Race started on a {}x{} maze", model.width(), model.height());
                        position = model.start();
                        maze = Some(model);
                    }
                    ServerMessage::GameStateUpdate { players } => {
                        if let Some(me) = my_id.as_ref().and_then(|id| players.get(id)) {
                            position = Coord::new(me.x, me.y);
                        }
                    }
                    ServerMessage::Winner { winner_id } => {
                        if my_id.as_ref() == Some(&winner_id) {
                            info!("We won!");
                        } else {
                            info!("{} won the race", winner_id);
                        }
                        break;
                    }
                    ServerMessage::Error { message } => {
                        warn!("Server error: {}", message);
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                let Some(maze) = maze.as_ref() else { continue };
                let open: Vec<Direction> = Direction::ALL
                    .into_iter()
                    .filter(|dir| !maze.is_wall_at(dir.apply(position)))
                    .collect();
                if let Some(dir) = open.choose(&mut rng) {
                    let (dx, dy) = dir.delta();
                    debug!("Moving {:?} from ({}, {})", dir, position.x, position.y);
                    sink.send(Message::Text(encode(&ClientMessage::Move { dx, dy })?)).await?;
                }
            }
        }
    }

    let _ = sink.close().await;
    Ok(())
}
