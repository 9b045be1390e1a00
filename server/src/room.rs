//! Room dispatch: turns decoded client messages into session operations and the
//! frames that must go out as a result.
//!
//! The server runs a single room slot. A room exists from CREATE_ROOM until its
//! last player leaves, or until a finished race is replaced by the next CREATE_ROOM.

use crate::client_manager::{ClientManager, ConnectionId};
use crate::session::{GameSession, MoveOutcome, Phase, SessionConfig, SessionError};
use log::{debug, info, warn};
use shared::{ClientMessage, MazeData, PlayerId, ProtocolError, ServerMessage};

/// Outbound work produced by one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send to one connection
    Reply(ConnectionId, ServerMessage),
    /// Send to every connection bound to a room player
    Broadcast(ServerMessage),
    /// Send to one connection, then close it
    Reject(ConnectionId, ServerMessage),
}

pub struct RoomHost {
    config: SessionConfig,
    session: Option<GameSession>,
}

impl RoomHost {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn handle_message(
        &mut self,
        clients: &mut ClientManager,
        conn: ConnectionId,
        message: ClientMessage,
    ) -> Vec<Dispatch> {
        debug!("Connection {} sent {}", conn, message.kind());

        match message {
            ClientMessage::CreateRoom => self.create_room(clients, conn),
            ClientMessage::JoinRoom => self.join_room(clients, conn),
            ClientMessage::StartGame => match clients.player_of(conn).cloned() {
                Some(player_id) => self.start_game(&player_id),
                None => {
                    debug!("Ignoring START_GAME from connection {} outside a room", conn);
                    Vec::new()
                }
            },
            ClientMessage::Move { dx, dy } => match clients.player_of(conn).cloned() {
                Some(player_id) => self.move_player(&player_id, dx, dy),
                None => {
                    debug!("Ignoring MOVE from connection {} outside a room", conn);
                    Vec::new()
                }
            },
        }
    }

    /// Malformed frames are fatal for the sending connection
    pub fn handle_malformed(&self, conn: ConnectionId, error: &ProtocolError) -> Vec<Dispatch> {
        warn!("Connection {} sent a malformed frame: {}", conn, error);
        vec![Dispatch::Reject(conn, ServerMessage::error(error.to_string()))]
    }

    /// Leave path for a closed connection
    pub fn leave(&mut self, player_id: Option<PlayerId>) -> Vec<Dispatch> {
        let (Some(player_id), Some(session)) = (player_id, self.session.as_mut()) else {
            return Vec::new();
        };

        if let Err(e) = session.leave(&player_id) {
            debug!("Leave for {} ignored: {}", player_id, e);
            return Vec::new();
        }

        if session.is_empty() {
            info!("Last player left, room closed");
            self.session = None;
            return Vec::new();
        }

        match session.phase() {
            Phase::Lobby => vec![Dispatch::Broadcast(lobby_update(session))],
            Phase::Running | Phase::Finished => {
                vec![Dispatch::Broadcast(ServerMessage::GameStateUpdate {
                    players: session.roster(),
                })]
            }
        }
    }

    /// Periodic full snapshot while a race is in progress
    pub fn sync(&self) -> Option<Dispatch> {
        let session = self.session.as_ref()?;
        if session.phase() != Phase::Running {
            return None;
        }
        Some(Dispatch::Broadcast(ServerMessage::GameStateUpdate {
            players: session.snapshot().players,
        }))
    }

    fn create_room(&mut self, clients: &mut ClientManager, conn: ConnectionId) -> Vec<Dispatch> {
        if self.session.as_ref().map(GameSession::phase) == Some(Phase::Finished) {
            let released = clients.unbind_all();
            info!("Finished room replaced, {} players released", released);
            self.session = None;
        }
        if clients.player_of(conn).is_some() {
            return vec![Dispatch::Reject(conn, ServerMessage::error("already in a room"))];
        }
        if self.session.is_some() {
            return vec![Dispatch::Reject(
                conn,
                ServerMessage::error("a room is already open on this server"),
            )];
        }

        let mut session = GameSession::new(self.config.clone());
        let player_id = clients.allocate_player_id();
        let dispatches = match session.join(player_id.clone()) {
            Ok(player) => {
                clients.bind_player(conn, player_id.clone());
                info!("Room created by {}", player_id);
                vec![
                    Dispatch::Reply(
                        conn,
                        ServerMessage::RoomReady {
                            your_id: player_id,
                            player: player.to_snapshot(),
                            host_id: session.host().map(str::to_string),
                        },
                    ),
                    Dispatch::Broadcast(lobby_update(&session)),
                ]
            }
            Err(e) => return vec![Dispatch::Reject(conn, ServerMessage::error(e.to_string()))],
        };

        self.session = Some(session);
        dispatches
    }

    fn join_room(&mut self, clients: &mut ClientManager, conn: ConnectionId) -> Vec<Dispatch> {
        if clients.player_of(conn).is_some() {
            return vec![Dispatch::Reject(conn, ServerMessage::error("already in a room"))];
        }
        let Some(session) = self.session.as_mut() else {
            return vec![Dispatch::Reject(
                conn,
                ServerMessage::error("no open room to join"),
            )];
        };

        let player_id = clients.allocate_player_id();
        match session.join(player_id.clone()) {
            Ok(player) => {
                clients.bind_player(conn, player_id.clone());
                vec![
                    Dispatch::Reply(
                        conn,
                        ServerMessage::RoomReady {
                            your_id: player_id,
                            player: player.to_snapshot(),
                            host_id: session.host().map(str::to_string),
                        },
                    ),
                    Dispatch::Broadcast(lobby_update(session)),
                ]
            }
            Err(e) => {
                warn!("Join from connection {} rejected: {}", conn, e);
                vec![Dispatch::Reject(conn, ServerMessage::error(e.to_string()))]
            }
        }
    }

    fn start_game(&mut self, player_id: &str) -> Vec<Dispatch> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let maze_data = match session.start(player_id) {
            Ok(maze) => MazeData::from_model(maze),
            Err(e) => {
                log_rejection(player_id, "START_GAME", &e);
                return Vec::new();
            }
        };

        vec![
            Dispatch::Broadcast(ServerMessage::GameStart { maze_data }),
            Dispatch::Broadcast(ServerMessage::GameStateUpdate {
                players: session.roster(),
            }),
        ]
    }

    fn move_player(&mut self, player_id: &str, dx: i32, dy: i32) -> Vec<Dispatch> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        match session.move_player(player_id, dx, dy) {
            Ok(MoveOutcome::Blocked) => Vec::new(),
            Ok(MoveOutcome::Moved(_)) => vec![Dispatch::Broadcast(
                ServerMessage::GameStateUpdate {
                    players: session.roster(),
                },
            )],
            Ok(MoveOutcome::Won(_)) => vec![
                Dispatch::Broadcast(ServerMessage::GameStateUpdate {
                    players: session.roster(),
                }),
                Dispatch::Broadcast(ServerMessage::Winner {
                    winner_id: player_id.to_string(),
                }),
            ],
            Err(e) => {
                log_rejection(player_id, "MOVE", &e);
                Vec::new()
            }
        }
    }
}

fn lobby_update(session: &GameSession) -> ServerMessage {
    ServerMessage::LobbyUpdate {
        players: session.roster(),
        host_id: session.host().map(str::to_string),
    }
}

fn log_rejection(player_id: &str, kind: &str, error: &SessionError) {
    debug!(
        "{} from {} ignored ({:?}): {}",
        kind,
        player_id,
        error.class(),
        error
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode_client, Direction, MazeModel};
    use std::collections::{HashMap, HashSet, VecDeque};
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    struct Harness {
        room: RoomHost,
        clients: ClientManager,
        receivers: HashMap<ConnectionId, mpsc::UnboundedReceiver<Message>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                room: RoomHost::new(SessionConfig {
                    maze_width: 7,
                    maze_height: 7,
                    max_players: 2,
                    min_players: 2,
                }),
                clients: ClientManager::new(8),
                receivers: HashMap::new(),
            }
        }

        fn connect(&mut self, conn: ConnectionId) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.clients
                .add_client(conn, "127.0.0.1:9000".parse().unwrap(), tx);
            self.receivers.insert(conn, rx);
        }

        fn send(&mut self, conn: ConnectionId, message: ClientMessage) -> Vec<Dispatch> {
            self.room.handle_message(&mut self.clients, conn, message)
        }
    }

    fn broadcasts(dispatches: &[Dispatch]) -> Vec<&'static str> {
        dispatches
            .iter()
            .filter_map(|d| match d {
                Dispatch::Broadcast(msg) => Some(msg.kind()),
                _ => None,
            })
            .collect()
    }

    fn solve(maze: &MazeModel) -> Vec<(i32, i32)> {
        let mut came_from = HashMap::new();
        let mut seen = HashSet::from([maze.start()]);
        let mut queue = VecDeque::from([maze.start()]);
        while let Some(at) = queue.pop_front() {
            for dir in Direction::ALL {
                let next = dir.apply(at);
                if !maze.is_wall_at(next) && seen.insert(next) {
                    came_from.insert(next, (at, dir.delta()));
                    queue.push_back(next);
                }
            }
        }
        let mut path = Vec::new();
        let mut at = maze.goal();
        while let Some(&(prev, delta)) = came_from.get(&at) {
            path.push(delta);
            at = prev;
        }
        path.reverse();
        path
    }

    fn started() -> Harness {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.send(1, ClientMessage::CreateRoom);
        h.send(2, ClientMessage::JoinRoom);
        let out = h.send(1, ClientMessage::StartGame);
        assert_eq!(broadcasts(&out), vec!["GAME_START", "GAME_STATE_UPDATE"]);
        h
    }

    #[test]
    fn test_create_then_join() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);

        let out = h.send(1, ClientMessage::CreateRoom);
        match &out[0] {
            Dispatch::Reply(1, ServerMessage::RoomReady { your_id, player, .. }) => {
                assert_eq!(your_id, "P1");
                assert_eq!(player.id, "P1");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(broadcasts(&out), vec!["LOBBY_UPDATE"]);

        let out = h.send(2, ClientMessage::JoinRoom);
        match &out[1] {
            Dispatch::Broadcast(ServerMessage::LobbyUpdate { players, .. }) => {
                assert_eq!(players.len(), 2);
                assert!(players.contains_key("P2"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.clients.player_of(2).map(String::as_str), Some("P2"));
    }

    #[test]
    fn test_second_create_and_orphan_join_rejected() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);

        let out = h.send(2, ClientMessage::JoinRoom);
        assert!(matches!(out[0], Dispatch::Reject(2, ServerMessage::Error { .. })));

        h.send(1, ClientMessage::CreateRoom);
        let out = h.send(2, ClientMessage::CreateRoom);
        assert!(matches!(out[0], Dispatch::Reject(2, ServerMessage::Error { .. })));

        let out = h.send(1, ClientMessage::JoinRoom);
        assert!(matches!(out[0], Dispatch::Reject(1, ServerMessage::Error { .. })));
    }

    #[test]
    fn test_join_after_start_rejected() {
        let mut h = started();
        h.connect(3);
        let out = h.send(3, ClientMessage::JoinRoom);
        assert!(matches!(out[0], Dispatch::Reject(3, ServerMessage::Error { .. })));
        assert_eq!(h.room.session().unwrap().player_count(), 2);
    }

    #[test]
    fn test_non_host_start_is_silent() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.send(1, ClientMessage::CreateRoom);
        h.send(2, ClientMessage::JoinRoom);

        assert!(h.send(2, ClientMessage::StartGame).is_empty());
        assert_eq!(h.room.session().unwrap().phase(), Phase::Lobby);
    }

    #[test]
    fn test_move_from_unjoined_connection_is_ignored() {
        let mut h = started();
        h.connect(3);
        let before = h.room.session().unwrap().roster();
        assert!(h.send(3, ClientMessage::Move { dx: 1, dy: 0 }).is_empty());
        assert_eq!(h.room.session().unwrap().roster(), before);
    }

    #[test]
    fn test_illegal_and_blocked_moves_broadcast_nothing() {
        let mut h = started();
        assert!(h.send(1, ClientMessage::Move { dx: 1, dy: 1 }).is_empty());
        // (1,1) always has the border above it
        assert!(h.send(1, ClientMessage::Move { dx: 0, dy: -1 }).is_empty());
    }

    #[test]
    fn test_race_to_goal_emits_one_winner() {
        let mut h = started();
        let path = solve(h.room.session().unwrap().maze().unwrap());
        let (last, approach) = path.split_last().unwrap();

        for &(dx, dy) in approach {
            let out = h.send(1, ClientMessage::Move { dx, dy });
            assert_eq!(broadcasts(&out), vec!["GAME_STATE_UPDATE"]);
            h.send(2, ClientMessage::Move { dx, dy });
        }

        let first = h.send(1, ClientMessage::Move { dx: last.0, dy: last.1 });
        let second = h.send(2, ClientMessage::Move { dx: last.0, dy: last.1 });

        assert_eq!(broadcasts(&first), vec!["GAME_STATE_UPDATE", "WINNER"]);
        assert!(second.is_empty());
        assert!(first.contains(&Dispatch::Broadcast(ServerMessage::Winner {
            winner_id: "P1".into()
        })));
        assert!(h.room.sync().is_none());
    }

    #[test]
    fn test_leave_updates_then_closes_room() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.send(1, ClientMessage::CreateRoom);
        h.send(2, ClientMessage::JoinRoom);

        let removed = h.clients.remove_client(&1).unwrap();
        let out = h.room.leave(removed.player_id);
        assert_eq!(
            out,
            vec![Dispatch::Broadcast(lobby_update(h.room.session().unwrap()))]
        );
        match &out[0] {
            Dispatch::Broadcast(ServerMessage::LobbyUpdate { host_id, .. }) => {
                assert_eq!(host_id.as_deref(), Some("P2"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.room.session().unwrap().host(), Some("P2"));

        let removed = h.clients.remove_client(&2).unwrap();
        assert!(h.room.leave(removed.player_id).is_empty());
        assert!(h.room.session().is_none());

        // Slot is free again
        h.connect(3);
        let out = h.send(3, ClientMessage::CreateRoom);
        assert!(matches!(out[0], Dispatch::Reply(3, ServerMessage::RoomReady { .. })));
    }

    #[test]
    fn test_room_ready_names_host() {
        let mut h = Harness::new();
        h.connect(1);
        h.connect(2);
        h.send(1, ClientMessage::CreateRoom);

        let out = h.send(2, ClientMessage::JoinRoom);
        match &out[0] {
            Dispatch::Reply(2, ServerMessage::RoomReady { host_id, .. }) => {
                assert_eq!(host_id.as_deref(), Some("P1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_finished_room_is_replaced_by_next_create() {
        let mut h = started();
        let path = solve(h.room.session().unwrap().maze().unwrap());
        for &(dx, dy) in &path {
            h.send(1, ClientMessage::Move { dx, dy });
        }
        assert_eq!(h.room.session().unwrap().phase(), Phase::Finished);

        // Joining the finished race is still refused
        h.connect(3);
        let out = h.send(3, ClientMessage::JoinRoom);
        assert!(matches!(out[0], Dispatch::Reject(3, ServerMessage::Error { .. })));

        h.connect(4);
        let out = h.send(4, ClientMessage::CreateRoom);
        match &out[0] {
            Dispatch::Reply(4, ServerMessage::RoomReady { your_id, host_id, .. }) => {
                assert_eq!(host_id.as_ref(), Some(your_id));
            }
            other => panic!("unexpected {:?}", other),
        }

        let session = h.room.session().unwrap();
        assert_eq!(session.phase(), Phase::Lobby);
        assert_eq!(session.player_count(), 1);
        assert_eq!(h.clients.player_of(1), None);
        assert_eq!(h.clients.player_of(2), None);

        // Old racers are detached: leaving does not touch the new room
        let removed = h.clients.remove_client(&1).unwrap();
        assert!(h.room.leave(removed.player_id).is_empty());
        assert_eq!(h.room.session().unwrap().player_count(), 1);

        // and may join the new one
        let out = h.send(2, ClientMessage::JoinRoom);
        assert!(matches!(out[0], Dispatch::Reply(2, ServerMessage::RoomReady { .. })));
    }

    #[test]
    fn test_leave_mid_race_broadcasts_state() {
        let mut h = started();
        let removed = h.clients.remove_client(&2).unwrap();
        let out = h.room.leave(removed.player_id);
        match &out[0] {
            Dispatch::Broadcast(ServerMessage::GameStateUpdate { players }) => {
                assert!(!players.contains_key("P2"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(h.room.sync().is_some());
    }

    #[test]
    fn test_malformed_frame_rejects_connection() {
        let h = Harness::new();
        let err = decode_client(r#"{"type":"WARP"}"#).unwrap_err();
        let out = h.room.handle_malformed(4, &err);
        assert!(matches!(out[0], Dispatch::Reject(4, ServerMessage::Error { .. })));
    }
}
