//! Combat state and its wire form.
//!
//! A [`StateSnapshot`] is a sparse, versioned view of a [`CombatState`]: every
//! field is optional and absent fields leave the receiver's value untouched.
//! Snapshots are validated where they enter reconciliation, so malformed
//! records are dropped instead of being trusted.

use crate::{display_nickname, Vec2, MAX_HEALTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SNAPSHOT_VERSION: u8 = 1;

/// Full combat state carried by every actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub health: u32,
    pub is_attacking: bool,
    pub facing_left: bool,
    /// Tick-clock timestamp (ms) of the most recent attack.
    pub last_attack_time: u64,
}

impl CombatState {
    pub fn spawned_at(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            health: MAX_HEALTH,
            is_attacking: false,
            facing_left: false,
            last_attack_time: 0,
        }
    }
}

impl Default for CombatState {
    fn default() -> Self {
        Self::spawned_at(Vec2::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    #[error("health {0} is outside 0..={}", MAX_HEALTH)]
    HealthOutOfRange(u32),
    #[error("non-finite {0}")]
    NonFinite(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u8,
    pub account: Option<String>,
    pub nickname: Option<String>,
    pub position: Option<Vec2>,
    pub velocity: Option<Vec2>,
    pub health: Option<u32>,
    pub is_attacking: Option<bool>,
    pub facing_left: Option<bool>,
    pub last_attack_time: Option<u64>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            account: None,
            nickname: None,
            position: None,
            velocity: None,
            health: None,
            is_attacking: None,
            facing_left: None,
            last_attack_time: None,
        }
    }
}

impl StateSnapshot {
    /// Snapshot carrying every combat field but no identity. This is what a
    /// client pushes for itself; the relay knows who sent it.
    pub fn from_state(state: &CombatState) -> Self {
        Self {
            position: Some(state.position),
            velocity: Some(state.velocity),
            health: Some(state.health),
            is_attacking: Some(state.is_attacking),
            facing_left: Some(state.facing_left),
            last_attack_time: Some(state.last_attack_time),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, account: &str, nickname: &str) -> Self {
        self.account = Some(account.to_string());
        self.nickname = Some(nickname.to_string());
        self
    }

    /// Checks the snapshot against the current schema.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        if let Some(health) = self.health {
            if health > MAX_HEALTH {
                return Err(SnapshotError::HealthOutOfRange(health));
            }
        }
        if matches!(self.position, Some(p) if !p.is_finite()) {
            return Err(SnapshotError::NonFinite("position"));
        }
        if matches!(self.velocity, Some(v) if !v.is_finite()) {
            return Err(SnapshotError::NonFinite("velocity"));
        }
        Ok(())
    }

    /// Sparse merge into a full state: only fields present here are written.
    pub fn merge_into(&self, state: &mut CombatState) {
        if let Some(position) = self.position {
            state.position = position;
        }
        if let Some(velocity) = self.velocity {
            state.velocity = velocity;
        }
        if let Some(health) = self.health {
            state.health = health;
        }
        if let Some(is_attacking) = self.is_attacking {
            state.is_attacking = is_attacking;
        }
        if let Some(facing_left) = self.facing_left {
            state.facing_left = facing_left;
        }
        if let Some(last_attack_time) = self.last_attack_time {
            state.last_attack_time = last_attack_time;
        }
    }
}

/// Per-player record held by the relay for the lifetime of the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub account: String,
    pub nickname: String,
    pub state: CombatState,
    pub joined_at: u64,
    pub last_updated: u64,
}

impl PlayerRecord {
    pub fn new(account: &str, nickname: &str, position: Vec2, now: u64) -> Self {
        Self {
            account: account.to_string(),
            nickname: display_nickname(account, nickname),
            state: CombatState::spawned_at(position),
            joined_at: now,
            last_updated: now,
        }
    }

    /// Identity fields in the snapshot are ignored: a player cannot rename
    /// or re-key itself through a state update.
    pub fn apply(&mut self, snapshot: &StateSnapshot, now: u64) {
        snapshot.merge_into(&mut self.state);
        self.last_updated = now;
    }

    /// Everything other players may see, velocity included so receivers can
    /// classify movement.
    pub fn to_snapshot(&self) -> StateSnapshot {
        StateSnapshot::from_state(&self.state).with_identity(&self.account, &self.nickname)
    }

    /// The public listing returned by `getAllPlayers`: no velocity.
    pub fn public_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            velocity: None,
            ..self.to_snapshot()
        }
    }
}
