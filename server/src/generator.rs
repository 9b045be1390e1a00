//! Randomized spanning-tree maze carving
//!
//! Cells sit at odd/odd coordinates, separators at positions with exactly one even
//! coordinate, and the outer border is always wall. Carving starts from (1,1) and
//! repeatedly opens a uniformly chosen frontier separator whenever it joins a
//! carved cell to an uncarved one. Because a separator between two carved cells
//! is never opened, the carved region is a spanning tree: one path between any
//! two cells.

use log::debug;
use rand::Rng;
use shared::{Coord, MazeError, MazeModel, MIN_MAZE_SIZE};
use std::collections::HashSet;

/// Seed cell every maze is carved from
pub const ORIGIN: Coord = Coord::new(1, 1);

const NEIGHBOUR_OFFSETS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

pub struct MazeGenerator {
    width: usize,
    height: usize,
}

impl MazeGenerator {
    /// Even dimensions are rounded up to the next odd value; anything under the
    /// minimum is rejected.
    pub fn new(width: usize, height: usize) -> Result<Self, MazeError> {
        if width < MIN_MAZE_SIZE || height < MIN_MAZE_SIZE {
            return Err(MazeError::TooSmall { width, height });
        }
        Ok(Self {
            width: round_to_odd(width),
            height: round_to_odd(height),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Start at the origin, goal in the opposite corner cell
    pub fn default_endpoints(&self) -> (Coord, Coord) {
        let goal = Coord::new(self.width as i32 - 2, self.height as i32 - 2);
        (ORIGIN, goal)
    }

    pub fn generate<R: Rng>(
        &self,
        start: Coord,
        goal: Coord,
        rng: &mut R,
    ) -> Result<MazeModel, MazeError> {
        let carved = self.carve(rng);

        let mut walls = HashSet::with_capacity(self.width * self.height - carved.len());
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let coord = Coord::new(x, y);
                if !carved.contains(&coord) {
                    walls.insert(coord);
                }
            }
        }

        debug!(
            "Carved {}x{} maze: {} open, {} walls",
            self.width,
            self.height,
            carved.len(),
            walls.len()
        );

        MazeModel::new(self.width, self.height, start, goal, walls)
    }

    /// Convenience wrapper using the default endpoints
    pub fn generate_default<R: Rng>(&self, rng: &mut R) -> Result<MazeModel, MazeError> {
        let (start, goal) = self.default_endpoints();
        self.generate(start, goal, rng)
    }

    fn carve<R: Rng>(&self, rng: &mut R) -> HashSet<Coord> {
        let (carved, iterations) = self.carve_counted(rng);
        debug!("Frontier drained after {} iterations", iterations);
        carved
    }

    /// Carves the maze and reports how many frontier entries were consumed.
    /// Each separator enters the frontier at most once, so the loop is bounded by
    /// the number of interior positions.
    fn carve_counted<R: Rng>(&self, rng: &mut R) -> (HashSet<Coord>, usize) {
        let mut carved = HashSet::new();
        let mut frontier = Frontier::default();
        let mut iterations = 0;

        carved.insert(ORIGIN);
        self.push_separators(ORIGIN, &carved, &mut frontier);

        while !frontier.is_empty() {
            iterations += 1;
            let candidate = frontier.take_random(rng);

            let Some((first, second)) = separated_cells(candidate) else {
                continue;
            };

            let first_open = carved.contains(&first);
            let second_open = carved.contains(&second);
            if first_open == second_open {
                continue;
            }

            let fresh = if first_open { second } else { first };
            carved.insert(candidate);
            carved.insert(fresh);
            self.push_separators(fresh, &carved, &mut frontier);
        }

        (carved, iterations)
    }

    fn push_separators(&self, cell: Coord, carved: &HashSet<Coord>, frontier: &mut Frontier) {
        for (dx, dy) in NEIGHBOUR_OFFSETS {
            let candidate = cell.offset(dx, dy);
            if self.is_interior(candidate) && !carved.contains(&candidate) {
                frontier.push(candidate);
            }
        }
    }

    fn is_interior(&self, coord: Coord) -> bool {
        coord.x > 0
            && coord.y > 0
            && coord.x < self.width as i32 - 1
            && coord.y < self.height as i32 - 1
    }
}

/// The two cells a separator sits between, or None for a non-separator position
fn separated_cells(wall: Coord) -> Option<(Coord, Coord)> {
    let x_odd = wall.x % 2 == 1;
    let y_odd = wall.y % 2 == 1;
    match (x_odd, y_odd) {
        (true, false) => Some((wall.offset(0, -1), wall.offset(0, 1))),
        (false, true) => Some((wall.offset(-1, 0), wall.offset(1, 0))),
        _ => None,
    }
}

fn round_to_odd(n: usize) -> usize {
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

/// Deduplicated candidate set with O(1) uniform removal
#[derive(Default)]
struct Frontier {
    items: Vec<Coord>,
    members: HashSet<Coord>,
}

impl Frontier {
    fn push(&mut self, coord: Coord) {
        if self.members.insert(coord) {
            self.items.push(coord);
        }
    }

    fn take_random<R: Rng>(&mut self, rng: &mut R) -> Coord {
        let index = rng.gen_range(0..self.items.len());
        let coord = self.items.swap_remove(index);
        self.members.remove(&coord);
        coord
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
