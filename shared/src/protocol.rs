//! JSON message schema shared by server and client.
//!
//! Every frame is a JSON object tagged by its `type` field. Unknown tags and
//! malformed payloads surface as [`ProtocolError::Malformed`].

use crate::maze::{Coord, MazeError, MazeModel};
use crate::player::{PlayerId, PlayerSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Roster keyed by player id. Ordered so that encoded snapshots are stable.
pub type Roster = BTreeMap<PlayerId, PlayerSnapshot>;

/// How a failure is handled by whichever side observed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or unexpected message: surfaced, connection torn down
    Protocol,
    /// Illegal request: ignored or low-severity feedback, connection stays open
    Validation,
    /// Socket failure: surfaced, back to disconnected
    Transport,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid maze data: {0}")]
    InvalidMaze(#[from] MazeError),
    #[error("unexpected {message} while {state}")]
    Unexpected {
        message: &'static str,
        state: &'static str,
    },
}

impl ProtocolError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Protocol
    }
}

/// Maze as transmitted in GAME_START: a flat wall list, everything else in bounds is path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazeData {
    pub width: usize,
    pub height: usize,
    pub start: Coord,
    pub goal: Coord,
    pub walls: Vec<Coord>,
}

impl MazeData {
    pub fn from_model(maze: &MazeModel) -> Self {
        Self {
            width: maze.width(),
            height: maze.height(),
            start: maze.start(),
            goal: maze.goal(),
            walls: maze.walls_sorted(),
        }
    }

    pub fn into_model(self) -> Result<MazeModel, MazeError> {
        let walls: HashSet<Coord> = self.walls.into_iter().collect();
        MazeModel::new(self.width, self.height, self.start, self.goal, walls)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    CreateRoom,
    JoinRoom,
    StartGame,
    Move { dx: i32, dy: i32 },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateRoom => "CREATE_ROOM",
            ClientMessage::JoinRoom => "JOIN_ROOM",
            ClientMessage::StartGame => "START_GAME",
            ClientMessage::Move { .. } => "MOVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    RoomReady {
        #[serde(rename = "yourId")]
        your_id: PlayerId,
        /// The joining player's own state
        #[serde(rename = "players")]
        player: PlayerSnapshot,
        /// Player currently allowed to start the race
        #[serde(rename = "hostId", default, skip_serializing_if = "Option::is_none")]
        host_id: Option<PlayerId>,
    },
    LobbyUpdate {
        players: Roster,
        #[serde(rename = "hostId", default, skip_serializing_if = "Option::is_none")]
        host_id: Option<PlayerId>,
    },
    GameStart {
        #[serde(rename = "mazeData")]
        maze_data: MazeData,
    },
    GameStateUpdate {
        players: Roster,
    },
    Winner {
        #[serde(rename = "winnerId")]
        winner_id: PlayerId,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::RoomReady { .. } => "ROOM_READY",
            ServerMessage::LobbyUpdate { .. } => "LOBBY_UPDATE",
            ServerMessage::GameStart { .. } => "GAME_START",
            ServerMessage::GameStateUpdate { .. } => "GAME_STATE_UPDATE",
            ServerMessage::Winner { .. } => "WINNER",
            ServerMessage::Error { .. } => "ERROR",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_client(text: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_server(text: &str) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
