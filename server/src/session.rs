//! Authoritative race session
//!
//! A session owns the roster and, once started, the maze. Every mutating call
//! takes `&mut self`, so the owner (the server event loop) is the single writer
//! and a move's wall check, position update and win detection happen as one step.

use crate::generator::{MazeGenerator, ORIGIN};
use log::{debug, info};
use rand::Rng;
use shared::{
    Coord, Direction, ErrorClass, MazeError, MazeModel, PlayerId, PlayerState, Roster,
    DEFAULT_MAX_PLAYERS, DEFAULT_MAZE_SIZE, MIN_PLAYERS_TO_START, PLAYER_COLORS,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Running,
    Finished,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("room is full ({max} players)")]
    RoomFull { max: usize },
    #[error("player id {0} is already in the room")]
    DuplicateId(PlayerId),
    #[error("room is no longer accepting players")]
    RoomClosed,
    #[error("only the host can start the game")]
    NotHost,
    #[error("{joined} player(s) joined, {required} needed to start")]
    InsufficientPlayers { joined: usize, required: usize },
    #[error("game already started")]
    AlreadyStarted,
    #[error("game is not running")]
    NotRunning,
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("race already finished")]
    AlreadyFinished,
    #[error("illegal move ({dx}, {dy})")]
    InvalidDirection { dx: i32, dy: i32 },
    #[error("maze generation failed: {0}")]
    Maze(#[from] MazeError),
}

impl SessionError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Validation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub maze_width: usize,
    pub maze_height: usize,
    pub max_players: usize,
    pub min_players: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            maze_width: DEFAULT_MAZE_SIZE,
            maze_height: DEFAULT_MAZE_SIZE,
            max_players: DEFAULT_MAX_PLAYERS,
            min_players: MIN_PLAYERS_TO_START,
        }
    }
}

/// Result of a legal-looking move request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Position changed
    Moved(Coord),
    /// Target was a wall; nothing changed
    Blocked,
    /// Position changed onto the goal and this player won the race
    Won(Coord),
}

/// Consistent read-only view of the session for broadcasting
#[derive(Debug)]
pub struct SessionSnapshot<'a> {
    pub phase: Phase,
    pub maze: Option<&'a MazeModel>,
    pub players: Roster,
}

#[derive(Debug)]
pub struct GameSession {
    config: SessionConfig,
    phase: Phase,
    host: Option<PlayerId>,
    join_order: Vec<PlayerId>,
    players: HashMap<PlayerId, PlayerState>,
    maze: Option<MazeModel>,
    winner: Option<PlayerId>,
    joins: usize,
}

impl GameSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            phase: Phase::Lobby,
            host: None,
            join_order: Vec::new(),
            players: HashMap::new(),
            maze: None,
            winner: None,
            joins: 0,
        }
    }

    /// Adds a racer at the start cell. The first player to join becomes host.
    pub fn join(&mut self, player_id: impl Into<PlayerId>) -> Result<PlayerState, SessionError> {
        let player_id = player_id.into();

        if self.phase != Phase::Lobby {
            return Err(SessionError::RoomClosed);
        }
        if self.players.contains_key(&player_id) {
            return Err(SessionError::DuplicateId(player_id));
        }
        if self.players.len() >= self.config.max_players {
            return Err(SessionError::RoomFull {
                max: self.config.max_players,
            });
        }

        let color = self.pick_color();
        let player = PlayerState::new(player_id.clone(), ORIGIN, color);
        self.joins += 1;

        if self.host.is_none() {
            self.host = Some(player_id.clone());
        }
        self.join_order.push(player_id.clone());
        self.players.insert(player_id.clone(), player.clone());

        info!(
            "Player {} joined ({} / {})",
            player_id,
            self.players.len(),
            self.config.max_players
        );
        Ok(player)
    }

    pub fn start(&mut self, requester: &str) -> Result<&MazeModel, SessionError> {
        self.start_with_rng(requester, &mut rand::thread_rng())
    }

    /// Host-only Lobby -> Running transition. The maze is generated here so its
    /// layout can depend on who actually showed up.
    pub fn start_with_rng<R: Rng>(
        &mut self,
        requester: &str,
        rng: &mut R,
    ) -> Result<&MazeModel, SessionError> {
        if self.phase != Phase::Lobby {
            return Err(SessionError::AlreadyStarted);
        }
        if self.host.as_deref() != Some(requester) {
            return Err(SessionError::NotHost);
        }
        if self.players.len() < self.config.min_players {
            return Err(SessionError::InsufficientPlayers {
                joined: self.players.len(),
                required: self.config.min_players,
            });
        }

        let generator = MazeGenerator::new(self.config.maze_width, self.config.maze_height)?;
        let maze = generator.generate_default(rng)?;

        for player in self.players.values_mut() {
            *player = PlayerState::new(player.id.clone(), maze.start(), player.color.clone());
        }

        info!(
            "Race started by {}: {}x{} maze, {} players",
            requester,
            maze.width(),
            maze.height(),
            self.players.len()
        );

        self.phase = Phase::Running;
        let maze: &MazeModel = self.maze.insert(maze);
        Ok(maze)
    }

    /// Applies one unit move. A wall target is a no-op, not an error.
    pub fn move_player(
        &mut self,
        player_id: &str,
        dx: i32,
        dy: i32,
    ) -> Result<MoveOutcome, SessionError> {
        match self.phase {
            Phase::Finished => return Err(SessionError::AlreadyFinished),
            Phase::Lobby => return Err(SessionError::NotRunning),
            Phase::Running => {}
        }

        let maze = self.maze.as_ref().ok_or(SessionError::NotRunning)?;
        let player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| SessionError::UnknownPlayer(player_id.to_string()))?;

        if player.is_goal {
            return Err(SessionError::AlreadyFinished);
        }

        let direction =
            Direction::from_delta(dx, dy).ok_or(SessionError::InvalidDirection { dx, dy })?;
        let target = direction.apply(player.position);

        if maze.is_wall_at(target) {
            debug!("Player {} bumped into wall at ({}, {})", player_id, target.x, target.y);
            return Ok(MoveOutcome::Blocked);
        }

        player.advance_to(target);

        if target == maze.goal() {
            player.is_goal = true;
            self.phase = Phase::Finished;
            self.winner = Some(player.id.clone());
            info!("Player {} reached the goal and wins", player_id);
            return Ok(MoveOutcome::Won(target));
        }

        Ok(MoveOutcome::Moved(target))
    }

    /// Removes a player. Host rights pass to the earliest-joined remaining player.
    pub fn leave(&mut self, player_id: &str) -> Result<PlayerState, SessionError> {
        let player = self
            .players
            .remove(player_id)
            .ok_or_else(|| SessionError::UnknownPlayer(player_id.to_string()))?;

        self.join_order.retain(|id| id != player_id);

        if self.host.as_deref() == Some(player_id) {
            self.host = self.join_order.first().cloned();
            if let Some(host) = &self.host {
                info!("Host {} left, {} is now host", player_id, host);
            }
        }

        info!("Player {} left ({} remaining)", player_id, self.players.len());
        Ok(player)
    }

    pub fn snapshot(&self) -> SessionSnapshot<'_> {
        SessionSnapshot {
            phase: self.phase,
            maze: self.maze.as_ref(),
            players: self.roster(),
        }
    }

    pub fn roster(&self) -> Roster {
        self.players
            .iter()
            .map(|(id, player)| (id.clone(), player.to_snapshot()))
            .collect()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host.as_deref() == Some(player_id)
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn maze(&self) -> Option<&MazeModel> {
        self.maze.as_ref()
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerState> {
        self.players.get(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.config.max_players
    }

    fn pick_color(&self) -> String {
        PLAYER_COLORS
            .iter()
            .find(|color| !self.players.values().any(|p| p.color == **color))
            .unwrap_or(&PLAYER_COLORS[self.joins % PLAYER_COLORS.len()])
            .to_string()
    }
}
