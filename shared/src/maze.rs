//! Immutable maze grid shared by the server session and every client mirror

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Smallest side length the carving lattice supports
pub const MIN_MAZE_SIZE: usize = 5;

/// Grid coordinate. Signed so that neighbour lookups past the border stay representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl From<(i32, i32)> for Coord {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MazeError {
    #[error("maze dimensions {width}x{height} are below the 5x5 minimum")]
    TooSmall { width: usize, height: usize },
    #[error("maze dimensions {width}x{height} must both be odd")]
    EvenDimensions { width: usize, height: usize },
    #[error("{which} ({x}, {y}) is not an open cell")]
    BlockedEndpoint { which: &'static str, x: i32, y: i32 },
    #[error("start and goal are both at ({x}, {y})")]
    SameEndpoints { x: i32, y: i32 },
}

/// A generated maze. Never mutated after construction.
///
/// Walls are stored as a hash set of coordinates so `is_wall` stays O(1) on the
/// render and move-validation hot paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MazeModel {
    width: usize,
    height: usize,
    start: Coord,
    goal: Coord,
    walls: HashSet<Coord>,
}

impl MazeModel {
    /// Builds a maze from its wall set, checking the structural invariants
    pub fn new(
        width: usize,
        height: usize,
        start: Coord,
        goal: Coord,
        walls: HashSet<Coord>,
    ) -> Result<Self, MazeError> {
        if width < MIN_MAZE_SIZE || height < MIN_MAZE_SIZE {
            return Err(MazeError::TooSmall { width, height });
        }
        if width % 2 == 0 || height % 2 == 0 {
            return Err(MazeError::EvenDimensions { width, height });
        }
        if start == goal {
            return Err(MazeError::SameEndpoints {
                x: start.x,
                y: start.y,
            });
        }

        let maze = Self {
            width,
            height,
            start,
            goal,
            walls,
        };

        for (which, point) in [("start", start), ("goal", goal)] {
            if maze.is_wall(point.x, point.y) {
                return Err(MazeError::BlockedEndpoint {
                    which,
                    x: point.x,
                    y: point.y,
                });
            }
        }

        Ok(maze)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn start(&self) -> Coord {
        self.start
    }

    pub fn goal(&self) -> Coord {
        self.goal
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Out-of-bounds coordinates count as walls
    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        !self.in_bounds(x, y) || self.walls.contains(&Coord { x, y })
    }

    pub fn is_wall_at(&self, coord: Coord) -> bool {
        self.is_wall(coord.x, coord.y)
    }

    pub fn wall_count(&self) -> usize {
        self.walls.len()
    }

    /// Walls in row-major order, the order they go out on the wire
    pub fn walls_sorted(&self) -> Vec<Coord> {
        let mut walls: Vec<Coord> = self.walls.iter().copied().collect();
        walls.sort_by_key(|c| (c.y, c.x));
        walls
    }

    /// Every in-bounds coordinate that is not a wall
    pub fn open_cells(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.height as i32).flat_map(move |y| {
            (0..self.width as i32)
                .map(move |x| Coord { x, y })
                .filter(move |c| !self.walls.contains(c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 5x5 with a single corridor from (1,1) across the top and down the right side
    fn corridor_maze() -> MazeModel {
        let open = [(1, 1), (2, 1), (3, 1), (3, 2), (3, 3)];
        let mut walls = HashSet::new();
        for y in 0..5 {
            for x in 0..5 {
                if !open.contains(&(x, y)) {
                    walls.insert(Coord::new(x, y));
                }
            }
        }
        MazeModel::new(5, 5, Coord::new(1, 1), Coord::new(3, 3), walls).unwrap()
    }

    #[test]
    fn test_out_of_bounds_is_wall() {
        let maze = corridor_maze();
        assert!(maze.is_wall(-1, 0));
        assert!(maze.is_wall(0, -1));
        assert!(maze.is_wall(5, 1));
        assert!(maze.is_wall(1, 5));
        assert!(maze.is_wall(i32::MAX, i32::MIN));
    }

    #[test]
    fn test_open_cells_and_walls() {
        let maze = corridor_maze();
        assert!(!maze.is_wall(1, 1));
        assert!(!maze.is_wall(3, 2));
        assert!(maze.is_wall(2, 2));
        assert_eq!(maze.open_cells().count(), 5);
        assert_eq!(maze.wall_count(), 20);
    }

    #[test]
    fn test_walls_sorted_row_major() {
        let maze = corridor_maze();
        let walls = maze.walls_sorted();
        assert_eq!(walls[0], Coord::new(0, 0));
        assert_eq!(walls[1], Coord::new(1, 0));
        assert_eq!(walls.last(), Some(&Coord::new(4, 4)));
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        let err = MazeModel::new(3, 5, Coord::new(1, 1), Coord::new(1, 3), HashSet::new());
        assert_eq!(err, Err(MazeError::TooSmall { width: 3, height: 5 }));

        let err = MazeModel::new(6, 5, Coord::new(1, 1), Coord::new(3, 3), HashSet::new());
        assert_eq!(err, Err(MazeError::EvenDimensions { width: 6, height: 5 }));
    }

    #[test]
    fn test_rejects_blocked_or_equal_endpoints() {
        let mut walls = HashSet::new();
        walls.insert(Coord::new(3, 3));
        let err = MazeModel::new(5, 5, Coord::new(1, 1), Coord::new(3, 3), walls);
        assert!(matches!(err, Err(MazeError::BlockedEndpoint { which: "goal", .. })));

        let err = MazeModel::new(5, 5, Coord::new(1, 1), Coord::new(1, 1), HashSet::new());
        assert_eq!(err, Err(MazeError::SameEndpoints { x: 1, y: 1 }));

        let err = MazeModel::new(5, 5, Coord::new(-1, 1), Coord::new(1, 1), HashSet::new());
        assert!(matches!(err, Err(MazeError::BlockedEndpoint { which: "start", .. })));
    }
}
