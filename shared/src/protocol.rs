//! Packets exchanged between arena clients and the relay server.

use crate::snapshot::StateSnapshot;
use crate::Vec2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Call {
        request_id: u32,
        call: RemoteCall,
    },
    Heartbeat,
    Disconnect,

    Connected {
        account: String,
    },
    Reply {
        request_id: u32,
        reply: CallReply,
    },
    Notify(Notification),
    Disconnected {
        reason: String,
    },
}

/// Operations a client may invoke on the relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum RemoteCall {
    JoinGame { nickname: String },
    LeaveGame,
    UpdatePlayerState { state: StateSnapshot },
    HitPlayer { target: String, damage: u32 },
    RespawnPlayer,
    GetAllPlayers,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    JoinGame,
    LeaveGame,
    UpdatePlayerState,
    HitPlayer,
    RespawnPlayer,
    GetAllPlayers,
}

impl RemoteCall {
    pub fn kind(&self) -> CallKind {
        match self {
            RemoteCall::JoinGame { .. } => CallKind::JoinGame,
            RemoteCall::LeaveGame => CallKind::LeaveGame,
            RemoteCall::UpdatePlayerState { .. } => CallKind::UpdatePlayerState,
            RemoteCall::HitPlayer { .. } => CallKind::HitPlayer,
            RemoteCall::RespawnPlayer => CallKind::RespawnPlayer,
            RemoteCall::GetAllPlayers => CallKind::GetAllPlayers,
        }
    }
}

/// Result of a remote call. Calls never raise: any failure comes back as
/// [`CallReply::Failed`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum CallReply {
    Joined { room_id: String, position: Vec2 },
    Left,
    StateUpdated,
    HitApplied { damage: u32, new_health: u32 },
    Respawned { position: Vec2 },
    Players { players: Vec<StateSnapshot> },
    Failed { message: String },
}

impl CallReply {
    pub fn is_success(&self) -> bool {
        !matches!(self, CallReply::Failed { .. })
    }
}

/// Push-style deliveries from the relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Notification {
    RoomState { users: Vec<String> },
    AllUserStates { states: Vec<StateSnapshot> },
    UserJoined { account: String },
    UserLeft { account: String },
    RoomMessage {
        topic: String,
        payload: MessagePayload,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum MessagePayload {
    Hit { damage: u32, attacker: String },
}
