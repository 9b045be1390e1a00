//! # Maze Race Client Library
//!
//! This library provides the desktop client for the multiplayer maze race. It
//! mirrors the server's room state, turns key presses into move intents and
//! draws each racer's limited view of the maze.
//!
//! ## Architecture Overview
//!
//! The server is authoritative for every position and for the winner. The client
//! never moves a player on its own; it only mirrors the latest snapshot and
//! gives immediate local feedback (a sound) when a move is sent.
//!
//! ### Snapshot Mirroring
//! Each `GAME_STATE_UPDATE` carries the full roster. Known players are updated
//! in place, new ones are added and missing ones are dropped. Applying the same
//! snapshot twice leaves the mirror unchanged.
//!
//! ### Order-Independent Finish
//! A `WINNER` announcement and a snapshot showing a player on the goal both
//! finish the race. Whichever arrives first wins; the other is a no-op.
//!
//! ### Threading
//! macroquad owns the main thread and its frame loop. The WebSocket runs on a
//! separate thread with its own tokio runtime and is reached only through
//! channels, so a frame never waits on the network.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! `ClientSyncEngine`, the phase machine
//! `Disconnected → Connecting → Lobby → Running → Finished`, and move gating.
//!
//! ### Input Module (`input`)
//! Key mapping and the move throttle.
//!
//! ### View Module (`view`)
//! Pure projections for drawing: phase to screen, the 5×5 viewport and the
//! shared explored map.
//!
//! ### Audio Module (`audio`)
//! Synthesised move, hit and clear tones behind an owned output handle.
//!
//! ### Network Module (`network`)
//! Address to URL rules, the background transport and the frame loop.
//!
//! ### Rendering Module (`rendering`)
//! macroquad drawing for each screen.
//!
//! ## Usage Example
//!
//! ```rust
//! use client::game::{ClientPhase, ClientSyncEngine, Role};
//! use shared::{ClientMessage, PlayerSnapshot, ServerMessage};
//!
//! let mut engine = ClientSyncEngine::new();
//! assert_eq!(engine.begin_connect(Role::Host), ClientMessage::CreateRoom);
//!
//! engine
//!     .apply(ServerMessage::RoomReady {
//!         your_id: "P1".into(),
//!         player: PlayerSnapshot {
//!             id: "P1".into(),
//!             x: 1,
//!             y: 1,
//!             color: "#E53935".into(),
//!             is_goal: false,
//!             visited: vec![],
//!         },
//!         host_id: Some("P1".into()),
//!     })
//!     .unwrap();
//! assert_eq!(engine.phase(), ClientPhase::Lobby);
//! assert!(engine.is_host());
//! ```

pub mod audio;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
pub mod view;
