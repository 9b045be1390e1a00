//! Command-line configuration for the race server

use crate::session::SessionConfig;
use clap::Parser;
use shared::{DEFAULT_MAZE_SIZE, DEFAULT_MAX_PLAYERS, MIN_MAZE_SIZE, MIN_PLAYERS_TO_START};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maze must be at least {min}x{min}, got {width}x{height}")]
    MazeTooSmall {
        width: usize,
        height: usize,
        min: usize,
    },
    #[error("min players must be at least {required}, got {min}")]
    TooFewPlayers { min: usize, required: usize },
    #[error("max players ({max}) is below min players ({min})")]
    PlayerBounds { min: usize, max: usize },
    #[error("ping interval must be non-zero")]
    ZeroPingInterval,
    #[error("idle timeout ({timeout}s) must exceed the ping interval ({ping}s)")]
    IdleTimeout { timeout: u64, ping: u64 },
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative server for the multiplayer maze race")]
pub struct ServerConfig {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    pub port: u16,

    /// Maze width in cells, rounded up to odd
    #[arg(long, default_value_t = DEFAULT_MAZE_SIZE)]
    pub maze_width: usize,

    /// Maze height in cells, rounded up to odd
    #[arg(long, default_value_t = DEFAULT_MAZE_SIZE)]
    pub maze_height: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_PLAYERS)]
    pub max_players: usize,

    /// Players required before the host may start
    #[arg(long, default_value_t = MIN_PLAYERS_TO_START)]
    pub min_players: usize,

    /// Full-snapshot resync period while a race runs, 0 disables
    #[arg(long, default_value_t = 1000)]
    pub sync_interval_ms: u64,

    #[arg(long, default_value_t = 10)]
    pub ping_interval_secs: u64,

    /// Connections silent for longer than this are dropped
    #[arg(long, default_value_t = 30)]
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: shared::DEFAULT_PORT,
            maze_width: DEFAULT_MAZE_SIZE,
            maze_height: DEFAULT_MAZE_SIZE,
            max_players: DEFAULT_MAX_PLAYERS,
            min_players: MIN_PLAYERS_TO_START,
            sync_interval_ms: 1000,
            ping_interval_secs: 10,
            idle_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maze_width < MIN_MAZE_SIZE || self.maze_height < MIN_MAZE_SIZE {
            return Err(ConfigError::MazeTooSmall {
                width: self.maze_width,
                height: self.maze_height,
                min: MIN_MAZE_SIZE,
            });
        }
        if self.min_players < MIN_PLAYERS_TO_START {
            return Err(ConfigError::TooFewPlayers {
                min: self.min_players,
                required: MIN_PLAYERS_TO_START,
            });
        }
        if self.max_players < self.min_players {
            return Err(ConfigError::PlayerBounds {
                min: self.min_players,
                max: self.max_players,
            });
        }
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::ZeroPingInterval);
        }
        if self.idle_timeout_secs <= self.ping_interval_secs {
            return Err(ConfigError::IdleTimeout {
                timeout: self.idle_timeout_secs,
                ping: self.ping_interval_secs,
            });
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            maze_width: self.maze_width,
            maze_height: self.maze_height,
            max_players: self.max_players,
            min_players: self.min_players,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_connections(&self) -> usize {
        self.max_players * 4
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_ms > 0).then(|| Duration::from_millis(self.sync_interval_ms))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
