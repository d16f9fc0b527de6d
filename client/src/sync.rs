//! Reconciliation loop between the local simulation and the relay.
//!
//! `SyncCoordinator` owns every actor on the client. Each tick it drains the
//! relay events, steps the actors, resolves melee, forwards hit reports and
//! pushes the local state. Room membership lives in an explicit
//! [`RoomSession`] that exists only between the join grant and leaving.

use crate::collision::{CollisionResolver, CombatEvent, ThrottlePolicy};
use crate::effects::Effects;
use crate::entity::CombatEntity;
use crate::input::InputFrame;
use crate::local::LocalActor;
use crate::relay::{RelayEndpoint, RelayEvent};
use crate::remote::RemoteActor;
use log::{debug, info, warn};
use shared::{
    display_nickname, CallKind, CallReply, MessagePayload, Notification, RemoteCall,
    StateSnapshot, Vec2, HIT_TOPIC, STATE_PUSH_INTERVAL_MS,
};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Empty means the relay-side default derived from the account.
    pub nickname: String,
    pub throttle_policy: ThrottlePolicy,
    pub smoothing: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            throttle_policy: ThrottlePolicy::default(),
            smoothing: true,
        }
    }
}

/// Membership in the arena room, from join grant to leave.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSession {
    pub account: String,
    pub room_id: String,
    pub nickname: String,
    pub joined_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Joining,
    Joined,
    Left,
}

/// What happened during a tick, for the shell to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Joined { room_id: String, position: Vec2 },
    PlayerCountChanged(usize),
    RemoteAdded(String),
    RemoteRemoved(String),
    LocalDied,
    Respawned(Vec2),
    Left,
    Disconnected(String),
}

pub struct SyncCoordinator {
    config: SyncConfig,
    phase: SessionPhase,
    account: Option<String>,
    session: Option<RoomSession>,
    local: Option<LocalActor>,
    remotes: BTreeMap<String, RemoteActor>,
    /// Accounts whose death fade completed; not recreated until alive again.
    fallen: HashSet<String>,
    resolver: CollisionResolver,
    effects: Effects,
    last_push: Option<u64>,
    player_count: usize,
    respawn_pending: bool,
    last_rtt_ms: u64,
    events: Vec<SessionEvent>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig) -> Self {
        let resolver = CollisionResolver::new(config.throttle_policy);
        Self {
            config,
            phase: SessionPhase::Connecting,
            account: None,
            session: None,
            local: None,
            remotes: BTreeMap::new(),
            fallen: HashSet::new(),
            resolver,
            effects: Effects::new(),
            last_push: None,
            player_count: 0,
            respawn_pending: false,
            last_rtt_ms: 0,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn session(&self) -> Option<&RoomSession> {
        self.session.as_ref()
    }

    pub fn local(&self) -> Option<&LocalActor> {
        self.local.as_ref()
    }

    pub fn remotes(&self) -> &BTreeMap<String, RemoteActor> {
        &self.remotes
    }

    pub fn remote(&self, account: &str) -> Option<&RemoteActor> {
        self.remotes.get(account)
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    pub fn last_rtt_ms(&self) -> u64 {
        self.last_rtt_ms
    }

    pub fn throttle_policy(&self) -> ThrottlePolicy {
        self.resolver.policy()
    }

    /// True while the local actor is dead and no respawn is in flight.
    pub fn can_respawn(&self) -> bool {
        self.phase == SessionPhase::Joined
            && !self.respawn_pending
            && self.local.as_ref().map_or(false, |local| local.is_dead())
    }

    /// One frame of the client. `now` is the tick clock in ms.
    pub fn tick<R: RelayEndpoint + ?Sized>(
        &mut self,
        relay: &mut R,
        input: &InputFrame,
        now: u64,
        dt_ms: u64,
    ) -> Vec<SessionEvent> {
        self.effects.tick(dt_ms);

        for event in relay.poll() {
            self.handle_event(relay, event, now);
        }

        if input.respawn {
            self.request_respawn(relay);
        }

        if let Some(local) = self.local.as_mut() {
            local.tick(input, now, dt_ms);
        }
        for remote in self.remotes.values_mut() {
            remote.tick(dt_ms);
        }
        self.reap_faded();

        self.resolve_combat(relay, now);
        self.collect_deaths();
        self.push_state(relay, now);

        std::mem::take(&mut self.events)
    }

    pub fn handle_event<R: RelayEndpoint + ?Sized>(
        &mut self,
        relay: &mut R,
        event: RelayEvent,
        now: u64,
    ) {
        match event {
            RelayEvent::Connected { account } => {
                info!("Connected as {}, joining", account);
                self.account = Some(account);
                self.phase = SessionPhase::Joining;
                relay.call(RemoteCall::JoinGame {
                    nickname: self.config.nickname.clone(),
                });
            }
            RelayEvent::Disconnected { reason } => {
                warn!("Disconnected from relay: {}", reason);
                self.teardown();
                self.account = None;
                self.phase = SessionPhase::Connecting;
                self.events.push(SessionEvent::Disconnected(reason));
            }
            RelayEvent::Reply {
                kind,
                reply,
                rtt_ms,
            } => {
                self.last_rtt_ms = rtt_ms;
                self.handle_reply(relay, kind, reply, now);
            }
            RelayEvent::Notify(notification) => {
                self.handle_notification(relay, notification, now);
            }
        }
    }

    fn handle_reply<R: RelayEndpoint + ?Sized>(
        &mut self,
        relay: &mut R,
        kind: CallKind,
        reply: CallReply,
        now: u64,
    ) {
        match reply {
            CallReply::Joined { room_id, position } => {
                let Some(account) = self.account.clone() else {
                    warn!("Join granted before the connection was accepted");
                    return;
                };
                self.start_session(account, room_id, position, now);
                relay.call(RemoteCall::GetAllPlayers);
            }
            CallReply::Players { players } => {
                if self.phase == SessionPhase::Joined {
                    self.reconcile(&players);
                }
            }
            CallReply::Respawned { position } => {
                self.respawn_pending = false;
                if let Some(local) = self.local.as_mut() {
                    local.respawn(position);
                    self.last_push = None;
                    self.events.push(SessionEvent::Respawned(position));
                }
            }
            CallReply::HitApplied { damage, new_health } => {
                debug!("Relay applied {} damage, target now at {}", damage, new_health);
            }
            CallReply::Left | CallReply::StateUpdated => {}
            CallReply::Failed { message } => {
                warn!("{:?} failed: {}", kind, message);
                if kind == CallKind::RespawnPlayer {
                    self.respawn_pending = false;
                }
            }
        }
    }

    fn start_session(&mut self, account: String, room_id: String, position: Vec2, now: u64) {
        let nickname = display_nickname(&account, &self.config.nickname);

        info!(
            "Joined {} as {} at ({}, {})",
            room_id, nickname, position.x, position.y
        );

        self.local = Some(LocalActor::new(&account, &nickname, position));
        self.session = Some(RoomSession {
            account,
            room_id: room_id.clone(),
            nickname,
            joined_at: now,
        });
        self.phase = SessionPhase::Joined;
        self.last_push = None;
        self.events.push(SessionEvent::Joined { room_id, position });
    }

    fn handle_notification<R: RelayEndpoint + ?Sized>(
        &mut self,
        relay: &mut R,
        notification: Notification,
        now: u64,
    ) {
        match notification {
            Notification::RoomState { users } => {
                let count = users.len();
                if count != self.player_count {
                    self.player_count = count;
                    self.events.push(SessionEvent::PlayerCountChanged(count));
                }
                if self.phase == SessionPhase::Joined {
                    relay.call(RemoteCall::GetAllPlayers);
                }
            }
            Notification::AllUserStates { states } => {
                if self.phase == SessionPhase::Joined {
                    self.reconcile(&states);
                }
            }
            Notification::UserJoined { account } => {
                debug!("{} joined the room", account);
            }
            Notification::UserLeft { account } => {
                self.fallen.remove(&account);
                if self.remotes.remove(&account).is_some() {
                    info!("{} left", account);
                    self.events.push(SessionEvent::RemoteRemoved(account));
                }
            }
            Notification::RoomMessage { topic, payload } => {
                if topic != HIT_TOPIC {
                    debug!("Ignoring room message on '{}'", topic);
                    return;
                }
                match payload {
                    MessagePayload::Hit { damage, attacker } => {
                        self.receive_hit(&attacker, damage, now);
                    }
                }
            }
        }
    }

    /// Damage reported by the relay on behalf of another client.
    fn receive_hit(&mut self, attacker: &str, damage: u32, now: u64) {
        let Some(local) = self.local.as_mut() else {
            return;
        };
        if local.is_dead() {
            return;
        }
        if !self.resolver.admit_incoming(attacker, now) {
            debug!("Hit from {} already counted", attacker);
            return;
        }

        let outcome = local.apply_damage(damage);
        debug!("Relayed hit from {}: {:?}", attacker, outcome);
        self.effects.hit(local.position());
    }

    /// Brings the remote actors in line with a full room listing.
    fn reconcile(&mut self, states: &[StateSnapshot]) {
        let own = self.account.as_deref();
        let mut seen = HashSet::new();

        for snapshot in states {
            let Some(account) = snapshot.account.as_deref() else {
                warn!("Skipping player state without an account");
                continue;
            };
            if Some(account) == own {
                continue;
            }
            seen.insert(account.to_string());

            if let Err(e) = snapshot.validate() {
                warn!("Ignoring state for {}: {}", account, e);
                continue;
            }

            if self.fallen.contains(account) {
                match snapshot.health {
                    Some(health) if health > 0 => {
                        self.fallen.remove(account);
                    }
                    _ => continue,
                }
            }

            match self.remotes.get_mut(account) {
                Some(remote) => {
                    remote.apply_snapshot(snapshot);
                }
                None => {
                    let remote = RemoteActor::new(account, snapshot, self.config.smoothing);
                    info!("{} ({}) appeared", remote.nickname(), account);
                    self.remotes.insert(account.to_string(), remote);
                    self.events
                        .push(SessionEvent::RemoteAdded(account.to_string()));
                }
            }
        }

        let gone: Vec<String> = self
            .remotes
            .keys()
            .filter(|account| !seen.contains(*account))
            .cloned()
            .collect();
        for account in gone {
            self.remotes.remove(&account);
            info!("{} is no longer in the room", account);
            self.events.push(SessionEvent::RemoteRemoved(account));
        }

        self.fallen.retain(|account| seen.contains(account));
    }

    fn reap_faded(&mut self) {
        let faded: Vec<String> = self
            .remotes
            .iter()
            .filter(|(_, remote)| remote.is_faded())
            .map(|(account, _)| account.clone())
            .collect();

        for account in faded {
            self.remotes.remove(&account);
            self.fallen.insert(account.clone());
            self.events.push(SessionEvent::RemoteRemoved(account));
        }
    }

    fn resolve_combat<R: RelayEndpoint + ?Sized>(&mut self, relay: &mut R, now: u64) {
        let Some(local) = self.local.as_mut() else {
            return;
        };

        let combat = self.resolver.resolve(local, &mut self.remotes, now);
        let local_position = local.position();

        for event in combat {
            match event {
                CombatEvent::HitDealt {
                    target,
                    damage,
                    position,
                    ..
                } => {
                    self.effects.hit(position);
                    self.effects.damage_number(position, damage);
                    relay.call(RemoteCall::HitPlayer { target, damage });
                }
                CombatEvent::HitTaken { .. } => {
                    self.effects.hit(local_position);
                }
            }
        }
    }

    fn collect_deaths(&mut self) {
        for remote in self.remotes.values_mut() {
            if remote.take_death_notice() {
                self.effects.death_label(remote.position(), remote.nickname());
            }
        }

        if let Some(local) = self.local.as_mut() {
            if local.take_death_notice() {
                self.events.push(SessionEvent::LocalDied);
            }
        }
    }

    fn push_state<R: RelayEndpoint + ?Sized>(&mut self, relay: &mut R, now: u64) {
        if self.phase != SessionPhase::Joined || self.respawn_pending {
            return;
        }
        let Some(local) = self.local.as_ref() else {
            return;
        };
        if let Some(last) = self.last_push {
            if now.saturating_sub(last) < STATE_PUSH_INTERVAL_MS {
                return;
            }
        }

        relay.call(RemoteCall::UpdatePlayerState {
            state: local.snapshot(),
        });
        self.last_push = Some(now);
    }

    pub fn request_respawn<R: RelayEndpoint + ?Sized>(&mut self, relay: &mut R) {
        if !self.can_respawn() {
            return;
        }
        info!("Requesting respawn");
        relay.call(RemoteCall::RespawnPlayer);
        self.respawn_pending = true;
    }

    /// Leaves the room and drops every actor.
    pub fn leave<R: RelayEndpoint + ?Sized>(&mut self, relay: &mut R) {
        if matches!(self.phase, SessionPhase::Joining | SessionPhase::Joined) {
            relay.call(RemoteCall::LeaveGame);
            info!("Left the arena");
        }
        self.teardown();
        self.phase = SessionPhase::Left;
        self.events.push(SessionEvent::Left);
    }

    fn teardown(&mut self) {
        self.session = None;
        self.local = None;
        self.remotes.clear();
        self.fallen.clear();
        self.resolver.reset();
        self.effects.clear();
        self.last_push = None;
        self.player_count = 0;
        self.respawn_pending = false;
    }
}
