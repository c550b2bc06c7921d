//! # Quiz Server Library
//!
//! This library provides the authoritative coordinator for the multiplayer
//! news classification quiz. Players are shown the same article and vote on a
//! reliability tag before the round timer runs out. The server owns round
//! timing, the vote tally, individual scores and the shared library health.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Session
//! A single [`session::Session`] holds the lifecycle state, game mode, round
//! counter and library health. Clients never compute outcomes themselves;
//! they render what the server broadcasts.
//!
//! ### Connection Management
//! Handles the lifecycle of client connections including:
//! - Identity assignment on connect
//! - Player registration on `join`
//! - Liveness tracking and timeout cleanup
//! - Isolated per-connection send queues
//!
//! ### Cooperative Scoring
//! Training rounds score players individually. Play rounds resolve the
//! plurality vote and heal or damage the shared library; when its health
//! reaches zero the game is over and the session starts again from the lobby.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All session mutations happen on one task that processes connection events
//! and fired timers strictly one after another. No locks guard the session.
//!
//! ### Cancellable Timers
//! Lobby, countdown and intermission delays are scheduled through a
//! [`timer::Scheduler`]. Every handle is stored and cancelled on reset, and a
//! fired timer whose handle is no longer held is ignored.
//!
//! ### Channel-Based Broadcast
//! The session publishes to per-connection channels; WebSocket writer tasks
//! drain them. The game logic is testable without sockets.
//!
//! ## Module Organization
//!
//! - `aggregator`: per-round tally with vote replacement and plurality
//! - `articles`: article tables for training and play mode
//! - `client_manager`: connection registry and broadcast fan-out
//! - `config`: timing and limit constants
//! - `network`: WebSocket transport and the coordinator loop
//! - `session`: the state machine
//! - `timer`: scheduler abstraction and round countdown
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::articles::ArticleLibrary;
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::network::BoxError> {
//!     let mut server = Server::bind(
//!         "0.0.0.0:3001",
//!         GameConfig::default(),
//!         ArticleLibrary::builtin(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod articles;
pub mod client_manager;
pub mod config;
pub mod network;
pub mod session;
pub mod timer;
