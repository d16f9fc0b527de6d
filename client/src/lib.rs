//! # Knight Arena Client
//!
//! Client side of the arena: every knight is simulated here, and the relay
//! server only stores and forwards state.
//!
//! ## Authority
//!
//! Each client is authoritative for its own knight. Movement, attacks and
//! melee detection all happen locally against the positions carried by the
//! most recent relay snapshots. A detected hit is applied immediately and then
//! reported so the relay can update the victim's record and notify them.
//!
//! ## Module Organization
//!
//! - `entity`: the [`entity::CombatEntity`] trait, tick-clock timers and
//!   death bookkeeping shared by both actor kinds.
//! - `local` / `remote`: the controlled knight and the snapshot-driven
//!   mirrors of everyone else.
//! - `collision`: hitbox versus body tests and the per-target hit throttle.
//! - `sync`: [`sync::SyncCoordinator`], which owns all actors and reconciles
//!   them with what the relay delivers.
//! - `relay` / `network`: the non-blocking call boundary and the UDP task
//!   behind it.
//! - `input`, `effects`, `rendering`: the macroquad front end.
//!
//! ## Threading
//!
//! macroquad owns the main thread. The socket lives on a tokio runtime in a
//! background thread, and the two sides talk only through unbounded
//! channels, drained once per frame.

pub mod collision;
pub mod effects;
pub mod entity;
pub mod input;
pub mod local;
pub mod network;
pub mod relay;
pub mod remote;
pub mod rendering;
pub mod sync;
