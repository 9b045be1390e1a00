//! Client-side mirror of the authoritative room state

use log::{debug, info, warn};
use shared::{
    ClientMessage, Direction, MazeModel, PlayerId, PlayerSnapshot, PlayerState, ProtocolError,
    Roster, ServerMessage, MIN_PLAYERS_TO_START,
};
use std::collections::BTreeMap;

/// Session phase as observed by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Disconnected,
    Connecting,
    Lobby,
    Running,
    Finished,
}

impl ClientPhase {
    pub fn name(self) -> &'static str {
        match self {
            ClientPhase::Disconnected => "disconnected",
            ClientPhase::Connecting => "connecting",
            ClientPhase::Lobby => "lobby",
            ClientPhase::Running => "running",
            ClientPhase::Finished => "finished",
        }
    }
}

/// Whether this client opens a room or joins the open one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// Things the frame loop may want to react to (sounds, logging)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Joined { your_id: PlayerId },
    RosterChanged,
    RaceStarted,
    StateUpdated,
    Finished { winner_id: PlayerId, local_won: bool },
    Rejected { message: String },
}

/// A move intent ready to send, with local feedback on whether it will hit a wall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub message: ClientMessage,
    pub blocked: bool,
}

pub struct ClientSyncEngine {
    phase: ClientPhase,
    my_id: Option<PlayerId>,
    host_id: Option<PlayerId>,
    players: BTreeMap<PlayerId, PlayerState>,
    maze: Option<MazeModel>,
    winner: Option<PlayerId>,
    last_error: Option<String>,
}

impl ClientSyncEngine {
    pub fn new() -> Self {
        Self {
            phase: ClientPhase::Disconnected,
            my_id: None,
            host_id: None,
            players: BTreeMap::new(),
            maze: None,
            winner: None,
            last_error: None,
        }
    }

    /// Resets local state for a new connection and returns the message to send once
    /// the transport is open.
    pub fn begin_connect(&mut self, role: Role) -> ClientMessage {
        self.reset();
        self.last_error = None;
        self.phase = ClientPhase::Connecting;

        match role {
            Role::Host => ClientMessage::CreateRoom,
            Role::Guest => ClientMessage::JoinRoom,
        }
    }

    /// Applies one server message. An `Err` means the message made no sense here
    /// and the connection should be torn down.
    pub fn apply(&mut self, message: ServerMessage) -> Result<Vec<ClientEvent>, ProtocolError> {
        match message {
            ServerMessage::RoomReady {
                your_id,
                player,
                host_id,
            } => {
                self.expect_phase(&[ClientPhase::Connecting], "ROOM_READY")?;
                info!("Joined room as {}", your_id);
                self.players
                    .insert(player.id.clone(), PlayerState::from_snapshot(&player));
                self.my_id = Some(your_id.clone());
                self.host_id = host_id;
                self.phase = ClientPhase::Lobby;
                Ok(vec![ClientEvent::Joined { your_id }])
            }

            ServerMessage::LobbyUpdate { players, host_id } => {
                self.expect_phase(&[ClientPhase::Lobby], "LOBBY_UPDATE")?;
                self.reconcile(&players);
                if host_id.is_some() && host_id != self.host_id {
                    debug!("Host is now {:?}", host_id);
                    self.host_id = host_id;
                }
                Ok(vec![ClientEvent::RosterChanged])
            }

            ServerMessage::GameStart { maze_data } => {
                self.expect_phase(&[ClientPhase::Lobby], "GAME_START")?;
                let maze = maze_data.into_model()?;
                info!("Race started on a {}x{} maze", maze.width(), maze.height());
                self.maze = Some(maze);
                self.phase = ClientPhase::Running;
                Ok(vec![ClientEvent::RaceStarted])
            }

            ServerMessage::GameStateUpdate { players } => {
                self.expect_phase(
                    &[ClientPhase::Running, ClientPhase::Finished],
                    "GAME_STATE_UPDATE",
                )?;
                self.reconcile(&players);

                let mut events = vec![ClientEvent::StateUpdated];
                let finisher = self
                    .players
                    .values()
                    .find(|p| p.is_goal)
                    .map(|p| p.id.clone());
                if let Some(winner_id) = finisher {
                    events.extend(self.finish(winner_id));
                }
                Ok(events)
            }

            ServerMessage::Winner { winner_id } => {
                self.expect_phase(&[ClientPhase::Running, ClientPhase::Finished], "WINNER")?;
                let Some(player) = self.players.get_mut(&winner_id) else {
                    warn!("Ignoring WINNER for unknown player {}", winner_id);
                    return Ok(Vec::new());
                };
                player.is_goal = true;
                Ok(self.finish(winner_id).into_iter().collect())
            }

            ServerMessage::Error { message } => {
                self.expect_phase(
                    &[
                        ClientPhase::Connecting,
                        ClientPhase::Lobby,
                        ClientPhase::Running,
                        ClientPhase::Finished,
                    ],
                    "ERROR",
                )?;
                warn!("Server rejected request: {}", message);
                self.reset();
                self.last_error = Some(message.clone());
                Ok(vec![ClientEvent::Rejected { message }])
            }
        }
    }

    /// Transport closed or failed. Returns true if a session was in progress.
    pub fn on_transport_closed(&mut self) -> bool {
        let was_active = self.phase != ClientPhase::Disconnected;
        self.reset();
        was_active
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Builds a MOVE for the local player, or None when moving makes no sense
    pub fn request_move(&self, direction: Direction) -> Option<MoveRequest> {
        if self.phase != ClientPhase::Running {
            return None;
        }
        let maze = self.maze.as_ref()?;
        let me = self.local_player()?;
        if me.is_goal {
            return None;
        }

        let (dx, dy) = direction.delta();
        Some(MoveRequest {
            message: ClientMessage::Move { dx, dy },
            blocked: maze.is_wall_at(direction.apply(me.position)),
        })
    }

    /// True when the server last named this client as the room's host
    pub fn is_host(&self) -> bool {
        self.my_id.is_some() && self.my_id == self.host_id
    }

    pub fn can_start(&self) -> bool {
        self.is_host()
            && self.phase == ClientPhase::Lobby
            && self.players.len() >= MIN_PLAYERS_TO_START
    }

    pub fn start_request(&self) -> Option<ClientMessage> {
        self.can_start().then_some(ClientMessage::StartGame)
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn my_id(&self) -> Option<&str> {
        self.my_id.as_deref()
    }

    pub fn players(&self) -> &BTreeMap<PlayerId, PlayerState> {
        &self.players
    }

    pub fn local_player(&self) -> Option<&PlayerState> {
        self.my_id.as_ref().and_then(|id| self.players.get(id))
    }

    pub fn maze(&self) -> Option<&MazeModel> {
        self.maze.as_ref()
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Mirrors a full roster: known ids update in place, new ids are added and
    /// ids missing from the message are dropped.
    fn reconcile(&mut self, roster: &Roster) {
        self.players.retain(|id, _| roster.contains_key(id));

        for (id, snapshot) in roster {
            match self.players.get_mut(id) {
                Some(player) => player.update_from(snapshot),
                None => {
                    debug!("Player {} appeared", id);
                    self.players
                        .insert(id.clone(), PlayerState::from_snapshot(&normalise(id, snapshot)));
                }
            }
        }
    }

    /// Moves to Finished once; later calls are no-ops
    fn finish(&mut self, winner_id: PlayerId) -> Option<ClientEvent> {
        if self.phase == ClientPhase::Finished {
            return None;
        }
        let local_won = self.my_id.as_ref() == Some(&winner_id);
        info!("{} reached the goal", winner_id);
        self.phase = ClientPhase::Finished;
        self.winner = Some(winner_id.clone());
        Some(ClientEvent::Finished {
            winner_id,
            local_won,
        })
    }

    fn expect_phase(&self, allowed: &[ClientPhase], kind: &'static str) -> Result<(), ProtocolError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ProtocolError::Unexpected {
                message: kind,
                state: self.phase.name(),
            })
        }
    }

    fn reset(&mut self) {
        self.phase = ClientPhase::Disconnected;
        self.my_id = None;
        self.host_id = None;
        self.players.clear();
        self.maze = None;
        self.winner = None;
    }
}

impl Default for ClientSyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The roster key is authoritative for the id
fn normalise(id: &str, snapshot: &PlayerSnapshot) -> PlayerSnapshot {
    if snapshot.id == id {
        snapshot.clone()
    } else {
        PlayerSnapshot {
            id: id.to_string(),
            ..snapshot.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Coord, MazeData};
    use tokio_test::{assert_err, assert_ok};

    fn snapshot(id: &str, x: i32, y: i32, is_goal: bool) -> PlayerSnapshot {
        PlayerSnapshot {
            id: id.into(),
            x,
            y,
            color: "#E53935".into(),
            is_goal,
            visited: vec![Coord::new(x, y)],
        }
    }

    fn roster(players: &[PlayerSnapshot]) -> Roster {
        players.iter().map(|p| (p.id.clone(), p.clone())).collect()
    }

    /// 5x5 maze with an L-shaped corridor from (1,1) to (3,3)
    fn maze_data() -> MazeData {
        let mut walls = Vec::new();
        for y in 0..5 {
            for x in 0..5 {
                let open = (y == 1 && (1..=3).contains(&x)) || (x == 3 && (1..=3).contains(&y));
                if !open {
                    walls.push(Coord::new(x, y));
                }
            }
        }
        MazeData {
            width: 5,
            height: 5,
            start: Coord::new(1, 1),
            goal: Coord::new(3, 3),
            walls,
        }
    }

    fn running_engine() -> ClientSyncEngine {
        let mut engine = ClientSyncEngine::new();
        engine.begin_connect(Role::Host);
        assert_ok!(engine.apply(ServerMessage::RoomReady {
            your_id: "P1".into(),
            player: snapshot("P1", 1, 1, false),
            host_id: Some("P1".into()),
        }));
        assert_ok!(engine.apply(ServerMessage::LobbyUpdate {
            players: roster(&[snapshot("P1", 1, 1, false), snapshot("P2", 1, 1, false)]),
            host_id: Some("P1".into()),
        }));
        assert_ok!(engine.apply(ServerMessage::GameStart {
            maze_data: maze_data()
        }));
        engine
    }

    #[test]
    fn test_connect_flow_and_opening_message() {
        let mut engine = ClientSyncEngine::new();
        assert_eq!(engine.phase(), ClientPhase::Disconnected);
        assert_eq!(engine.begin_connect(Role::Guest), ClientMessage::JoinRoom);
        assert_eq!(engine.phase(), ClientPhase::Connecting);
        assert_eq!(engine.begin_connect(Role::Host), ClientMessage::CreateRoom);

        let events = assert_ok!(engine.apply(ServerMessage::RoomReady {
            your_id: "P1".into(),
            player: snapshot("P1", 1, 1, false),
            host_id: Some("P1".into()),
        }));
        assert_eq!(
            events,
            vec![ClientEvent::Joined {
                your_id: "P1".into()
            }]
        );
        assert_eq!(engine.phase(), ClientPhase::Lobby);
        assert_eq!(engine.local_player().unwrap().position, Coord::new(1, 1));
        assert!(!engine.can_start());
    }

    #[test]
    fn test_host_may_start_with_two_players() {
        let mut engine = ClientSyncEngine::new();
        engine.begin_connect(Role::Host);
        assert_ok!(engine.apply(ServerMessage::RoomReady {
            your_id: "P1".into(),
            player: snapshot("P1", 1, 1, false),
            host_id: Some("P1".into()),
        }));
        assert_eq!(engine.start_request(), None);

        assert_ok!(engine.apply(ServerMessage::LobbyUpdate {
            players: roster(&[snapshot("P1", 1, 1, false), snapshot("P2", 1, 1, false)]),
            host_id: Some("P1".into()),
        }));
        assert_eq!(engine.start_request(), Some(ClientMessage::StartGame));
    }

    #[test]
    fn test_guest_never_starts() {
        let mut engine = ClientSyncEngine::new();
        engine.begin_connect(Role::Guest);
        assert_ok!(engine.apply(ServerMessage::RoomReady {
            your_id: "P2".into(),
            player: snapshot("P2", 1, 1, false),
            host_id: Some("P1".into()),
        }));
        assert_ok!(engine.apply(ServerMessage::LobbyUpdate {
            players: roster(&[snapshot("P1", 1, 1, false), snapshot("P2", 1, 1, false)]),
            host_id: Some("P1".into()),
        }));
        assert!(!engine.can_start());
    }

    #[test]
    fn test_guest_promoted_when_host_leaves() {
        let mut engine = ClientSyncEngine::new();
        engine.begin_connect(Role::Guest);
        assert_ok!(engine.apply(ServerMessage::RoomReady {
            your_id: "P2".into(),
            player: snapshot("P2", 1, 1, false),
            host_id: Some("P1".into()),
        }));
        assert_ok!(engine.apply(ServerMessage::LobbyUpdate {
            players: roster(&[
                snapshot("P1", 1, 1, false),
                snapshot("P2", 1, 1, false),
                snapshot("P3", 1, 1, false),
            ]),
            host_id: Some("P1".into()),
        }));
        assert!(!engine.is_host());

        assert_ok!(engine.apply(ServerMessage::LobbyUpdate {
            players: roster(&[snapshot("P2", 1, 1, false), snapshot("P3", 1, 1, false)]),
            host_id: Some("P2".into()),
        }));
        assert!(engine.is_host());
        assert_eq!(engine.host_id(), Some("P2"));
        assert_eq!(engine.start_request(), Some(ClientMessage::StartGame));
    }

    #[test]
    fn test_lobby_update_without_host_keeps_previous() {
        let mut engine = ClientSyncEngine::new();
        engine.begin_connect(Role::Host);
        assert_ok!(engine.apply(ServerMessage::RoomReady {
            your_id: "P1".into(),
            player: snapshot("P1", 1, 1, false),
            host_id: Some("P1".into()),
        }));
        assert_ok!(engine.apply(ServerMessage::LobbyUpdate {
            players: roster(&[snapshot("P1", 1, 1, false), snapshot("P2", 1, 1, false)]),
            host_id: None,
        }));
        assert!(engine.can_start());
    }

    #[test]
    fn test_reconcile_adds_updates_and_removes() {
        let mut engine = running_engine();

        let update = roster(&[snapshot("P1", 2, 1, false), snapshot("P3", 1, 1, false)]);
        assert_ok!(engine.apply(ServerMessage::GameStateUpdate { players: update }));

        let ids: Vec<&str> = engine.players().keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["P1", "P3"]);
        assert_eq!(engine.players()["P1"].position, Coord::new(2, 1));
    }

    #[test]
    fn test_visited_is_replaced_not_merged() {
        let mut engine = running_engine();
        let mut p1 = snapshot("P1", 2, 1, false);
        p1.visited = vec![Coord::new(1, 1), Coord::new(2, 1)];
        assert_ok!(engine.apply(ServerMessage::GameStateUpdate {
            players: roster(&[p1])
        }));

        let mut p1 = snapshot("P1", 3, 1, false);
        p1.visited = vec![Coord::new(3, 1)];
        assert_ok!(engine.apply(ServerMessage::GameStateUpdate {
            players: roster(&[p1])
        }));
        assert_eq!(engine.players()["P1"].visited.len(), 1);
    }

    #[test]
    fn test_same_snapshot_twice_is_idempotent() {
        let mut engine = running_engine();
        let update = roster(&[snapshot("P1", 2, 1, false), snapshot("P2", 3, 1, false)]);

        assert_ok!(engine.apply(ServerMessage::GameStateUpdate {
            players: update.clone()
        }));
        let first: Vec<PlayerSnapshot> = engine.players().values().map(|p| p.to_snapshot()).collect();

        assert_ok!(engine.apply(ServerMessage::GameStateUpdate { players: update }));
        let second: Vec<PlayerSnapshot> =
            engine.players().values().map(|p| p.to_snapshot()).collect();

        assert_eq!(first, second);
        assert_eq!(engine.phase(), ClientPhase::Running);
    }

    #[test]
    fn test_winner_then_snapshot_finishes_once() {
        let mut engine = running_engine();

        let events = assert_ok!(engine.apply(ServerMessage::Winner {
            winner_id: "P1".into()
        }));
        assert_eq!(
            events,
            vec![ClientEvent::Finished {
                winner_id: "P1".into(),
                local_won: true
            }]
        );

        let events = assert_ok!(engine.apply(ServerMessage::GameStateUpdate {
            players: roster(&[snapshot("P1", 3, 3, true), snapshot("P2", 1, 1, false)]),
        }));
        assert_eq!(events, vec![ClientEvent::StateUpdated]);

        let events = assert_ok!(engine.apply(ServerMessage::Winner {
            winner_id: "P1".into()
        }));
        assert!(events.is_empty());
        assert_eq!(engine.winner(), Some("P1"));
    }

    #[test]
    fn test_snapshot_then_winner_finishes_once() {
        let mut engine = running_engine();

        let events = assert_ok!(engine.apply(ServerMessage::GameStateUpdate {
            players: roster(&[snapshot("P1", 1, 1, false), snapshot("P2", 3, 3, true)]),
        }));
        assert_eq!(
            events,
            vec![
                ClientEvent::StateUpdated,
                ClientEvent::Finished {
                    winner_id: "P2".into(),
                    local_won: false
                }
            ]
        );

        let events = assert_ok!(engine.apply(ServerMessage::Winner {
            winner_id: "P2".into()
        }));
        assert!(events.is_empty());
        assert_eq!(engine.phase(), ClientPhase::Finished);
        assert!(engine.players()["P2"].is_goal);
    }

    #[test]
    fn test_winner_for_unknown_player_ignored() {
        let mut engine = running_engine();

        let events = assert_ok!(engine.apply(ServerMessage::Winner {
            winner_id: "P9".into()
        }));
        assert!(events.is_empty());
        assert_eq!(engine.phase(), ClientPhase::Running);
        assert_eq!(engine.winner(), None);
        assert!(engine.request_move(Direction::Right).is_some());
    }

    #[test]
    fn test_move_requests_follow_phase_and_walls() {
        let mut engine = running_engine();

        let right = engine.request_move(Direction::Right).unwrap();
        assert_eq!(right.message, ClientMessage::Move { dx: 1, dy: 0 });
        assert!(!right.blocked);

        let down = engine.request_move(Direction::Down).unwrap();
        assert!(down.blocked);

        assert_ok!(engine.apply(ServerMessage::Winner {
            winner_id: "P2".into()
        }));
        assert_eq!(engine.request_move(Direction::Right), None);
    }

    #[test]
    fn test_no_moves_outside_running() {
        let mut engine = ClientSyncEngine::new();
        assert_eq!(engine.request_move(Direction::Up), None);
        engine.begin_connect(Role::Guest);
        assert_eq!(engine.request_move(Direction::Up), None);
    }

    #[test]
    fn test_error_returns_to_disconnected() {
        let mut engine = running_engine();
        let events = assert_ok!(engine.apply(ServerMessage::error("room is full")));
        assert_eq!(
            events,
            vec![ClientEvent::Rejected {
                message: "room is full".into()
            }]
        );
        assert_eq!(engine.phase(), ClientPhase::Disconnected);
        assert_eq!(engine.last_error(), Some("room is full"));
        assert!(engine.players().is_empty());
        assert!(engine.maze().is_none());
    }

    #[test]
    fn test_unexpected_messages_are_protocol_errors() {
        let mut engine = ClientSyncEngine::new();
        let err = assert_err!(engine.apply(ServerMessage::LobbyUpdate {
            players: Roster::new(),
            host_id: None,
        }));
        assert!(matches!(
            err,
            ProtocolError::Unexpected {
                message: "LOBBY_UPDATE",
                state: "disconnected"
            }
        ));

        let mut engine = running_engine();
        assert_err!(engine.apply(ServerMessage::GameStart {
            maze_data: maze_data()
        }));
        assert_err!(engine.apply(ServerMessage::RoomReady {
            your_id: "P9".into(),
            player: snapshot("P9", 1, 1, false),
            host_id: Some("P1".into()),
        }));
    }

    #[test]
    fn test_invalid_maze_payload_rejected() {
        let mut engine = ClientSyncEngine::new();
        engine.begin_connect(Role::Host);
        assert_ok!(engine.apply(ServerMessage::RoomReady {
            your_id: "P1".into(),
            player: snapshot("P1", 1, 1, false),
            host_id: Some("P1".into()),
        }));

        let mut bad = maze_data();
        bad.walls.push(Coord::new(1, 1));
        let err = assert_err!(engine.apply(ServerMessage::GameStart { maze_data: bad }));
        assert!(matches!(err, ProtocolError::InvalidMaze(_)));
        assert_eq!(engine.phase(), ClientPhase::Lobby);
    }

    #[test]
    fn test_transport_close_resets() {
        let mut engine = running_engine();
        assert!(engine.on_transport_closed());
        assert_eq!(engine.phase(), ClientPhase::Disconnected);
        assert!(!engine.on_transport_closed());
    }
}
