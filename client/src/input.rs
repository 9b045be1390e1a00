//! Keyboard input mapped to client commands, with move throttling

use macroquad::prelude::*;
use shared::Direction;
use std::time::{Duration, Instant};

/// What the player asked for this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Start,
    Create,
    Join,
    Disconnect,
}

/// Enforces a minimum spacing between move intents; extra intents are dropped
#[derive(Debug, Clone)]
pub struct MoveThrottle {
    delay: Duration,
    last_move: Option<Instant>,
}

impl MoveThrottle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_move: None,
        }
    }

    /// True if a move may be sent at `now`, in which case the slot is consumed
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_move {
            Some(last) if now.saturating_duration_since(last) < self.delay => false,
            _ => {
                self.last_move = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_move = None;
    }
}

/// First held direction wins, in up/down/left/right order
pub fn direction_from_keys(up: bool, down: bool, left: bool, right: bool) -> Option<Direction> {
    [
        (up, Direction::Up),
        (down, Direction::Down),
        (left, Direction::Left),
        (right, Direction::Right),
    ]
    .into_iter()
    .find_map(|(held, dir)| held.then_some(dir))
}

/// Samples macroquad's keyboard state once per frame
pub struct InputManager {
    throttle: MoveThrottle,
}

impl InputManager {
    pub fn new(move_delay: Duration) -> Self {
        Self {
            throttle: MoveThrottle::new(move_delay),
        }
    }

    pub fn update(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();

        if is_key_pressed(KeyCode::Escape) {
            commands.push(Command::Disconnect);
        }
        if is_key_pressed(KeyCode::Enter) || is_key_pressed(KeyCode::KpEnter) {
            commands.push(Command::Start);
        }
        if is_key_pressed(KeyCode::C) {
            commands.push(Command::Create);
        }
        if is_key_pressed(KeyCode::J) {
            commands.push(Command::Join);
        }

        // Held keys repeat at the throttle rate
        let held = direction_from_keys(
            is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
        );
        match held {
            Some(direction) => {
                if self.throttle.try_acquire(Instant::now()) {
                    commands.push(Command::Move(direction));
                }
            }
            None => self.throttle.reset(),
        }

        commands
    }
}
