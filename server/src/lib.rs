//! # Arena Relay Library
//!
//! This library provides the relay server for the knight arena. Unlike an
//! authoritative game server it runs no simulation: every gameplay decision
//! (movement, attacks, hit detection, death) is made by the clients. The relay
//! stores one state record per player, answers remote calls and fans state
//! out to everyone in the room.
//!
//! ## Core Responsibilities
//!
//! ### Room State Store
//! A single well-known room (`combat-arena`) holds the membership list and a
//! sparse-updatable record per member. Records are created on `joinGame`,
//! merged on `updatePlayerState` and removed when the player leaves or times
//! out.
//!
//! ### Remote Calls
//! Six fail-soft operations: `joinGame`, `leaveGame`, `updatePlayerState`,
//! `hitPlayer`, `respawnPlayer` and `getAllPlayers`. Handlers never error
//! outward; a failure is logged and answered with `CallReply::Failed`.
//!
//! ### State Feed
//! Whenever any record changed during a tick, the full room listing is pushed
//! to every member as `AllUserStates`. Membership changes additionally push
//! `RoomState` with the ordered account list.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Maps UDP peers to opaque account identifiers, enforces the capacity limit
//! and reports peers that stopped sending heartbeats.
//!
//! ### Room Module (`room`)
//! The membership list and record store, with the dirty flag that drives the
//! state feed.
//!
//! ### Game Module (`game`)
//! The call handlers. Turns a `RemoteCall` into a reply plus the notifications
//! to deliver.
//!
//! ### Network Module (`network`)
//! UDP socket tasks, packet dispatch and the tick that publishes the feed.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The relay uses an event-driven architecture with internal async tasks:
//! - **Network Receiver**: listens for incoming packets
//! - **Network Sender**: drains the outgoing packet queue
//! - **Timeout Checker**: removes peers that went silent
//! - **Main Loop**: handles calls and publishes the state feed every tick

pub mod client_manager;
pub mod game;
pub mod network;
pub mod room;
