//! # Maze Race Server Library
//!
//! This library provides the authoritative server for the multiplayer maze race.
//! It owns the one open room, generates its maze, validates every move and
//! broadcasts snapshots so all racers see the same state.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Session
//! The server holds the canonical maze and player positions. Clients only send
//! intents (`MOVE { dx, dy }`); the session decides whether a step is legal and
//! who reached the goal first. Exactly one winner is ever declared.
//!
//! ### Maze Generation
//! Each race gets a fresh perfect maze carved by randomized spanning-tree
//! growth, so there is exactly one route between any two open cells.
//!
//! ### Connection Management
//! Handles the lifecycle of WebSocket connections:
//! - Accepting sockets and capping the connection count
//! - Binding a connection to the player it created or joined as
//! - Keepalive pings and idle reaping
//! - Running the leave path when a socket closes
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! Every connection runs in its own task, but those tasks only decode frames and
//! forward them as events. A single loop applies all events to the room in
//! arrival order, so session state needs no locking and each snapshot reflects
//! a consistent point in time.
//!
//! ### JSON Over WebSocket
//! Messages are JSON objects tagged by a `type` field. A frame that cannot be
//! decoded earns an `ERROR` reply and the connection is closed.
//!
//! ## Module Organization
//!
//! ### Generator Module (`generator`)
//! Randomized carving of odd-sized grids into perfect mazes.
//!
//! ### Session Module (`session`)
//! The room's phase machine: join, start, move, leave, snapshot.
//!
//! ### Room Module (`room`)
//! Maps client messages onto session operations and decides which frames go out.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection registry, player binding and outbound delivery.
//!
//! ### Config Module (`config`)
//! Command-line options and their validation.
//!
//! ### Network Module (`network`)
//! Accept loop, per-connection tasks and the main event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 9000,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Validates the config and binds the listener
//!     let server = Server::bind(config).await?;
//!
//!     // Accepts connections and runs the room until the process stops
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod generator;
pub mod network;
pub mod room;
pub mod session;
