//! What each phase should show, independent of how it is drawn

use crate::game::{ClientPhase, ClientSyncEngine};
use shared::{Coord, MazeModel, PlayerId, PlayerState};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Title,
    Connecting,
    Lobby,
    Game,
    Clear,
}

pub fn screen_for(phase: ClientPhase) -> Screen {
    match phase {
        ClientPhase::Disconnected => Screen::Title,
        ClientPhase::Connecting => Screen::Connecting,
        ClientPhase::Lobby => Screen::Lobby,
        ClientPhase::Running => Screen::Game,
        ClientPhase::Finished => Screen::Clear,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Wall,
    Path,
    Start,
    Goal,
}

pub fn cell_kind(maze: &MazeModel, coord: Coord) -> CellKind {
    if maze.is_wall_at(coord) {
        CellKind::Wall
    } else if coord == maze.goal() {
        CellKind::Goal
    } else if coord == maze.start() {
        CellKind::Start
    } else {
        CellKind::Path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCell {
    pub coord: Coord,
    pub kind: CellKind,
    pub occupants: Vec<PlayerId>,
}

/// Square window of cells centred on one position, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub origin: Coord,
    pub size: usize,
    pub cells: Vec<ViewCell>,
}

impl Viewport {
    pub fn build<'a>(
        maze: &MazeModel,
        center: Coord,
        size: usize,
        players: impl IntoIterator<Item = &'a PlayerState>,
    ) -> Self {
        let half = (size / 2) as i32;
        let origin = center.offset(-half, -half);

        let mut occupants: BTreeMap<Coord, Vec<PlayerId>> = BTreeMap::new();
        for player in players {
            occupants
                .entry(player.position)
                .or_default()
                .push(player.id.clone());
        }

        let mut cells = Vec::with_capacity(size * size);
        for row in 0..size as i32 {
            for col in 0..size as i32 {
                let coord = origin.offset(col, row);
                cells.push(ViewCell {
                    coord,
                    kind: cell_kind(maze, coord),
                    occupants: occupants.remove(&coord).unwrap_or_default(),
                });
            }
        }

        Self {
            origin,
            size,
            cells,
        }
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<&ViewCell> {
        if col >= self.size || row >= self.size {
            return None;
        }
        self.cells.get(row * self.size + col)
    }
}

/// Shared fog of war: open cells any racer has stood on
pub fn explored_cells<'a>(
    maze: &MazeModel,
    players: impl IntoIterator<Item = &'a PlayerState>,
) -> HashSet<Coord> {
    players
        .into_iter()
        .flat_map(|p| p.visited.iter().copied())
        .filter(|c| !maze.is_wall_at(*c))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyLine {
    pub id: PlayerId,
    pub color: String,
    pub is_you: bool,
}

pub fn lobby_lines(engine: &ClientSyncEngine) -> Vec<LobbyLine> {
    let me = engine.my_id();
    engine
        .players()
        .values()
        .map(|p| LobbyLine {
            id: p.id.clone(),
            color: p.color.clone(),
            is_you: Some(p.id.as_str()) == me,
        })
        .collect()
}

pub fn lobby_hint(engine: &ClientSyncEngine) -> &'static str {
    if engine.can_start() {
        "Ready! Press Enter to start the race"
    } else if engine.is_host() {
        "Waiting for a second player to join..."
    } else {
        "Waiting for the host to start..."
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub id: PlayerId,
    pub color: String,
    pub label: &'static str,
}

pub fn status_lines(engine: &ClientSyncEngine) -> Vec<StatusLine> {
    engine
        .players()
        .values()
        .map(|p| StatusLine {
            id: p.id.clone(),
            color: p.color.clone(),
            label: if p.is_goal { "goal!" } else { "racing" },
        })
        .collect()
}
