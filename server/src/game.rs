//! Remote-callable arena operations.
//!
//! `GameService` owns the room and turns every [`RemoteCall`] into a
//! [`CallReply`] plus the notifications the relay must deliver. Handlers
//! never fail outward: internal errors are logged and returned as
//! `CallReply::Failed`, so a bad call can't take down the caller or the loop.

use crate::room::Room;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    CallReply, MessagePayload, Notification, PlayerRecord, RemoteCall, SnapshotError,
    StateSnapshot, Vec2, HIT_TOPIC, ROOM_ID, SPAWN_CENTER, SPAWN_SPREAD,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("player {0} has not joined the game")]
    NotJoined(String),
    #[error("target player {0} not found")]
    TargetNotFound(String),
    #[error("invalid state update: {0}")]
    InvalidState(#[from] SnapshotError),
}

/// Where a notification must be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    ToUser {
        account: String,
        notification: Notification,
    },
    ToRoom {
        notification: Notification,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub reply: CallReply,
    pub dispatches: Vec<Dispatch>,
}

type ServiceResult = Result<(CallReply, Vec<Dispatch>), ServiceError>;

pub struct GameService {
    room: Room,
    rng: StdRng,
}

impl GameService {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic spawn positions, for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            room: Room::new(ROOM_ID),
            rng,
        }
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Runs one call on behalf of `sender`.
    pub fn handle_call(&mut self, sender: &str, call: RemoteCall, now: u64) -> CallOutcome {
        let kind = call.kind();
        let result = match call {
            RemoteCall::JoinGame { nickname } => self.join_game(sender, &nickname, now),
            RemoteCall::LeaveGame => Ok(self.leave_game(sender)),
            RemoteCall::UpdatePlayerState { state } => {
                self.update_player_state(sender, &state, now)
            }
            RemoteCall::HitPlayer { target, damage } => {
                self.hit_player(sender, &target, damage, now)
            }
            RemoteCall::RespawnPlayer => self.respawn_player(sender, now),
            RemoteCall::GetAllPlayers => Ok((self.get_all_players(), Vec::new())),
        };

        match result {
            Ok((reply, dispatches)) => CallOutcome { reply, dispatches },
            Err(e) => {
                error!("{:?} from {} failed: {}", kind, sender, e);
                CallOutcome {
                    reply: CallReply::Failed {
                        message: e.to_string(),
                    },
                    dispatches: Vec::new(),
                }
            }
        }
    }

    /// Removes a player that vanished without calling `leaveGame`.
    pub fn disconnect(&mut self, account: &str) -> Vec<Dispatch> {
        self.leave_game(account).1
    }

    /// The all-user-states feed: a full room listing whenever any record
    /// changed since the previous publication.
    pub fn publish_states(&mut self) -> Option<Dispatch> {
        if !self.room.take_dirty() || self.room.is_empty() {
            return None;
        }

        let states = self
            .room
            .get_all_user_states()
            .into_iter()
            .map(PlayerRecord::to_snapshot)
            .collect();

        Some(Dispatch::ToRoom {
            notification: Notification::AllUserStates { states },
        })
    }

    fn join_game(&mut self, sender: &str, nickname: &str, now: u64) -> ServiceResult {
        let (room_id, added) = self.room.join(sender);
        let position = self.spawn_position();

        let record = PlayerRecord::new(sender, nickname, position, now);
        info!(
            "{} ({}) spawned at ({}, {})",
            record.nickname, sender, position.x, position.y
        );
        self.room.put_state(record);

        let mut dispatches = Vec::new();
        if added {
            dispatches.push(Dispatch::ToRoom {
                notification: Notification::UserJoined {
                    account: sender.to_string(),
                },
            });
            dispatches.push(self.roster_dispatch());
        }

        Ok((CallReply::Joined { room_id, position }, dispatches))
    }

    fn leave_game(&mut self, sender: &str) -> (CallReply, Vec<Dispatch>) {
        let mut dispatches = Vec::new();
        if self.room.leave(sender) {
            dispatches.push(Dispatch::ToRoom {
                notification: Notification::UserLeft {
                    account: sender.to_string(),
                },
            });
            dispatches.push(self.roster_dispatch());
        }
        (CallReply::Left, dispatches)
    }

    fn update_player_state(
        &mut self,
        sender: &str,
        state: &StateSnapshot,
        now: u64,
    ) -> ServiceResult {
        state.validate()?;

        if !self.room.update_self_state(sender, state, now) {
            return Err(ServiceError::NotJoined(sender.to_string()));
        }

        Ok((CallReply::StateUpdated, Vec::new()))
    }

    fn hit_player(&mut self, sender: &str, target: &str, damage: u32, now: u64) -> ServiceResult {
        let current_health = self
            .room
            .get_user_state(target)
            .map(|record| record.state.health)
            .ok_or_else(|| ServiceError::TargetNotFound(target.to_string()))?;

        let new_health = current_health.saturating_sub(damage);
        let patch = StateSnapshot {
            health: Some(new_health),
            ..StateSnapshot::default()
        };
        if !self.room.update_user_state(target, &patch, now) {
            return Err(ServiceError::TargetNotFound(target.to_string()));
        }

        debug!(
            "{} hit {} for {} ({} -> {})",
            sender, target, damage, current_health, new_health
        );

        let dispatch = Dispatch::ToUser {
            account: target.to_string(),
            notification: Notification::RoomMessage {
                topic: HIT_TOPIC.to_string(),
                payload: MessagePayload::Hit {
                    damage,
                    attacker: sender.to_string(),
                },
            },
        };

        Ok((CallReply::HitApplied { damage, new_health }, vec![dispatch]))
    }

    fn respawn_player(&mut self, sender: &str, now: u64) -> ServiceResult {
        let position = self.spawn_position();
        if !self.room.respawn(sender, position, now) {
            return Err(ServiceError::NotJoined(sender.to_string()));
        }

        info!("{} respawned at ({}, {})", sender, position.x, position.y);
        Ok((CallReply::Respawned { position }, Vec::new()))
    }

    fn get_all_players(&self) -> CallReply {
        let players: Vec<StateSnapshot> = self
            .room
            .get_all_user_states()
            .into_iter()
            .map(PlayerRecord::public_snapshot)
            .collect();

        if players.iter().any(|player| player.account.is_none()) {
            warn!("Room listing contains a record without an account");
        }

        CallReply::Players { players }
    }

    fn roster_dispatch(&self) -> Dispatch {
        Dispatch::ToRoom {
            notification: Notification::RoomState {
                users: self.room.members().to_vec(),
            },
        }
    }

    fn spawn_position(&mut self) -> Vec2 {
        let x = SPAWN_CENTER + self.rng.gen_range(-SPAWN_SPREAD..SPAWN_SPREAD) as f32;
        let y = SPAWN_CENTER + self.rng.gen_range(-SPAWN_SPREAD..SPAWN_SPREAD) as f32;
        Vec2::new(x, y)
    }
}

impl Default for GameService {
    fn default() -> Self {
        Self::new()
    }
}
