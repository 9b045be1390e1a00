//! Types shared by the maze-race server and client: the maze grid, player state,
//! and the JSON wire protocol.

pub mod maze;
pub mod player;
pub mod protocol;

pub use maze::{Coord, MazeError, MazeModel, MIN_MAZE_SIZE};
pub use player::{Direction, PlayerId, PlayerSnapshot, PlayerState};
pub use protocol::{
    decode_client, decode_server, encode, ClientMessage, ErrorClass, MazeData, ProtocolError,
    Roster, ServerMessage,
};

/// Default side length of a generated maze
pub const DEFAULT_MAZE_SIZE: usize = 65;
/// Side length of the square window each racer sees around themselves
pub const VIEWPORT_SIZE: usize = 5;
/// Client-side minimum spacing between move intents, in milliseconds
pub const MOVE_DELAY_MS: u64 = 150;
pub const DEFAULT_PORT: u16 = 8080;
/// Port implied when a bare secure host is given
pub const DEFAULT_SECURE_PORT: u16 = 443;
pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const MIN_PLAYERS_TO_START: usize = 2;

/// Display colors handed out at join time, first free entry wins
pub const PLAYER_COLORS: [&str; 8] = [
    "#E53935", "#1E88E5", "#43A047", "#FDD835", "#8E24AA", "#FB8C00", "#00ACC1", "#D81B60",
];
