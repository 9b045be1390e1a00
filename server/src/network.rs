//! Server network layer: WebSocket accept loop, per-connection tasks and the
//! single event loop that owns all room state.

use crate::client_manager::{ClientManager, ConnectionId, FrameSender};
use crate::config::{ConfigError, ServerConfig};
use crate::room::{Dispatch, RoomHost};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode_client, encode, ClientMessage, ProtocolError, ServerMessage};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Events sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: ConnectionId,
        addr: SocketAddr,
        sender: FrameSender,
    },
    Frame {
        conn_id: ConnectionId,
        message: ClientMessage,
    },
    Malformed {
        conn_id: ConnectionId,
        error: ProtocolError,
    },
    /// Control frames (ping/pong) that only prove liveness
    Activity {
        conn_id: ConnectionId,
    },
    Disconnected {
        conn_id: ConnectionId,
    },
}

pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    clients: ClientManager,
    room: RoomHost,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!("Server listening on ws://{}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            clients: ClientManager::new(config.max_connections()),
            room: RoomHost::new(config.session_config()),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Main server loop. Only returns once the accept task has stopped.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            config,
            clients,
            room,
            ..
        } = self;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        spawn_acceptor(listener, event_tx);

        let mut sync_timer = config.sync_interval().map(|period| {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });
        let mut ping_timer = interval(config.ping_interval());
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let idle_timeout = config.idle_timeout();

        info!(
            "Server started: {}x{} maze, {}-{} players",
            config.maze_width, config.maze_height, config.min_players, config.max_players
        );

        let mut state = LoopState { clients, room };

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => state.handle_event(event),
                        None => {
                            info!("Accept loop ended, server shutting down");
                            break;
                        }
                    }
                },

                _ = next_tick(&mut sync_timer) => {
                    if let Some(dispatch) = state.room.sync() {
                        state.deliver(vec![dispatch]);
                    }
                },

                _ = ping_timer.tick() => {
                    state.clients.ping_all();
                    state.reap_idle(idle_timeout);
                },
            }
        }

        Ok(())
    }
}

/// Mutable state the event loop owns
struct LoopState {
    clients: ClientManager,
    room: RoomHost,
}

impl LoopState {
    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected {
                conn_id,
                addr,
                sender,
            } => {
                if !self.clients.add_client(conn_id, addr, sender.clone()) {
                    reject_unregistered(&sender, "server is full");
                }
            }
            ServerEvent::Frame { conn_id, message } => {
                if !self.clients.contains(conn_id) {
                    debug!("Dropping frame from unregistered connection {}", conn_id);
                    return;
                }
                self.clients.touch(conn_id);
                let dispatches = self.room.handle_message(&mut self.clients, conn_id, message);
                self.deliver(dispatches);
            }
            ServerEvent::Malformed { conn_id, error } => {
                if !self.clients.contains(conn_id) {
                    return;
                }
                let dispatches = self.room.handle_malformed(conn_id, &error);
                self.deliver(dispatches);
            }
            ServerEvent::Activity { conn_id } => self.clients.touch(conn_id),
            ServerEvent::Disconnected { conn_id } => self.drop_connection(conn_id),
        }
    }

    fn deliver(&mut self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            match dispatch {
                Dispatch::Reply(conn_id, message) => {
                    self.clients.send_to(conn_id, &message);
                }
                Dispatch::Broadcast(message) => {
                    let delivered = self.clients.broadcast(&message);
                    debug!("Broadcast {} to {} connections", message.kind(), delivered);
                }
                Dispatch::Reject(conn_id, message) => {
                    self.clients.send_to(conn_id, &message);
                    self.clients.close(conn_id);
                    self.drop_connection(conn_id);
                }
            }
        }
    }

    fn drop_connection(&mut self, conn_id: ConnectionId) {
        if let Some(client) = self.clients.remove_client(&conn_id) {
            let dispatches = self.room.leave(client.player_id);
            self.deliver(dispatches);
        }
    }

    fn reap_idle(&mut self, timeout: Duration) {
        for conn_id in self.clients.idle_clients(timeout) {
            info!("Connection {} idle for over {:?}, closing", conn_id, timeout);
            self.clients.close(conn_id);
            self.drop_connection(conn_id);
        }
    }
}

fn reject_unregistered(sender: &FrameSender, reason: &str) {
    if let Ok(text) = encode(&ServerMessage::error(reason)) {
        let _ = sender.send(Message::Text(text));
    }
    let _ = sender.send(Message::Close(None));
}

async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

/// Spawns task that accepts TCP connections and hands each to its own task
fn spawn_acceptor(listener: TcpListener, events: mpsc::UnboundedSender<ServerEvent>) {
    tokio::spawn(async move {
        let mut next_id: ConnectionId = 1;

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let conn_id = next_id;
                    next_id = next_id.wrapping_add(1);
                    tokio::spawn(handle_connection(stream, addr, conn_id, events.clone()));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }

            if events.is_closed() {
                break;
            }
        }
    });
}

/// Runs one connection: handshake, then a writer task draining the outbound
/// channel and a reader loop forwarding decoded frames as events.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnectionId,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut source) = ws.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Message>();

    if events
        .send(ServerEvent::Connected {
            conn_id,
            addr,
            sender: frame_tx,
        })
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if let Err(e) = sink.send(frame).await {
                debug!("Write to connection {} failed: {}", conn_id, e);
                break;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => match decode_client(&text) {
                Ok(message) => ServerEvent::Frame { conn_id, message },
                Err(error) => ServerEvent::Malformed { conn_id, error },
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from connection {}", conn_id);
                ServerEvent::Activity { conn_id }
            }
            Ok(_) => ServerEvent::Activity { conn_id },
            Err(e) => {
                debug!("Read from connection {} failed: {}", conn_id, e);
                break;
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }

    let _ = events.send(ServerEvent::Disconnected { conn_id });
}
