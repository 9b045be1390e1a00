//! Per-participant race state and its wire projection

use crate::maze::Coord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stable per-session label such as `P1`
pub type PlayerId = String;

/// One of the four legal unit moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Accepts exactly one non-zero unit axis
    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn apply(self, from: Coord) -> Coord {
        let (dx, dy) = self.delta();
        from.offset(dx, dy)
    }
}

/// Wire form of a player, as carried by ROOM_READY, LOBBY_UPDATE and GAME_STATE_UPDATE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub x: i32,
    pub y: i32,
    pub color: String,
    #[serde(rename = "isGoal")]
    pub is_goal: bool,
    #[serde(default)]
    pub visited: Vec<Coord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub position: Coord,
    pub color: String,
    pub is_goal: bool,
    pub visited: HashSet<Coord>,
}

impl PlayerState {
    /// A fresh racer standing on `spawn`, which counts as visited
    pub fn new(id: impl Into<PlayerId>, spawn: Coord, color: impl Into<String>) -> Self {
        let mut visited = HashSet::new();
        visited.insert(spawn);
        Self {
            id: id.into(),
            position: spawn,
            color: color.into(),
            is_goal: false,
            visited,
        }
    }

    pub fn from_snapshot(snapshot: &PlayerSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            position: Coord::new(snapshot.x, snapshot.y),
            color: snapshot.color.clone(),
            is_goal: snapshot.is_goal,
            visited: snapshot.visited.iter().copied().collect(),
        }
    }

    /// Overwrites the mutable fields from an authoritative snapshot.
    ///
    /// `visited` is replaced rather than merged; the server's copy is already monotonic.
    pub fn update_from(&mut self, snapshot: &PlayerSnapshot) {
        self.position = Coord::new(snapshot.x, snapshot.y);
        self.is_goal = snapshot.is_goal;
        self.visited = snapshot.visited.iter().copied().collect();
    }

    /// Records an accepted move
    pub fn advance_to(&mut self, target: Coord) {
        self.position = target;
        self.visited.insert(target);
    }

    pub fn to_snapshot(&self) -> PlayerSnapshot {
        let mut visited: Vec<Coord> = self.visited.iter().copied().collect();
        visited.sort_by_key(|c| (c.y, c.x));
        PlayerSnapshot {
            id: self.id.clone(),
            x: self.position.x,
            y: self.position.y,
            color: self.color.clone(),
            is_goal: self.is_goal,
            visited,
        }
    }
}
