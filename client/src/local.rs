//! The locally controlled knight.
//!
//! Movement and attack are simulated here and nowhere else; the relay only
//! ever sees the result through state pushes.

use crate::entity::{AnimationState, CombatEntity, Countdown, DamageOutcome, Vitals};
use crate::input::InputFrame;
use log::{debug, info};
use shared::{
    display_nickname, CombatState, StateSnapshot, Vec2, ATTACK_COOLDOWN_MS, ATTACK_DURATION_MS,
    HITBOX_ACTIVE_MS, PLAYER_SPEED, WORLD_SIZE,
};

pub struct LocalActor {
    account: String,
    nickname: String,
    state: CombatState,
    vitals: Vitals,
    /// Remaining cooldown in ms; the only gate on starting a new attack.
    attack_cooldown: u64,
    attack_timer: Countdown,
    hitbox_timer: Countdown,
    hitbox_enabled: bool,
}

impl LocalActor {
    pub fn new(account: &str, nickname: &str, spawn: Vec2) -> Self {
        Self {
            account: account.to_string(),
            nickname: display_nickname(account, nickname),
            state: CombatState::spawned_at(spawn),
            vitals: Vitals::new(),
            attack_cooldown: 0,
            attack_timer: Countdown::idle(),
            hitbox_timer: Countdown::idle(),
            hitbox_enabled: false,
        }
    }

    pub fn attack_cooldown(&self) -> u64 {
        self.attack_cooldown
    }

    /// One simulation step. `now` is the tick clock, `dt_ms` the time since
    /// the previous tick.
    pub fn tick(&mut self, input: &InputFrame, now: u64, dt_ms: u64) {
        self.attack_cooldown = self.attack_cooldown.saturating_sub(dt_ms);
        self.vitals.tick(dt_ms);

        if self.hitbox_timer.advance(dt_ms) && self.hitbox_enabled {
            self.hitbox_enabled = false;
        }
        if self.attack_timer.advance(dt_ms) && self.state.is_attacking {
            self.state.is_attacking = false;
            self.hitbox_enabled = false;
        }

        if self.vitals.is_dead() {
            self.state.velocity = Vec2::ZERO;
            return;
        }

        if self.state.is_attacking {
            return;
        }

        if input.attack && self.attack_cooldown == 0 {
            self.start_attack(now);
            return;
        }

        self.apply_movement(input, dt_ms);
    }

    fn start_attack(&mut self, now: u64) {
        self.state.is_attacking = true;
        self.state.last_attack_time = now;
        self.state.velocity = Vec2::ZERO;
        self.attack_cooldown = ATTACK_COOLDOWN_MS;
        self.attack_timer.start(ATTACK_DURATION_MS);
        self.hitbox_timer.start(HITBOX_ACTIVE_MS);
        self.hitbox_enabled = true;
        debug!("{} attacks at {}", self.account, now);
    }

    fn apply_movement(&mut self, input: &InputFrame, dt_ms: u64) {
        let x = if input.left {
            -1.0
        } else if input.right {
            1.0
        } else {
            0.0
        };
        let y = if input.up {
            -1.0
        } else if input.down {
            1.0
        } else {
            0.0
        };

        if x != 0.0 {
            self.state.facing_left = x < 0.0;
        }

        self.state.velocity = Vec2::new(x, y).normalize().scale(PLAYER_SPEED);

        let dt = dt_ms as f32 / 1000.0;
        let next = self.state.position.add(&self.state.velocity.scale(dt));
        self.state.position = Vec2::new(
            next.x.clamp(0.0, WORLD_SIZE),
            next.y.clamp(0.0, WORLD_SIZE),
        );
    }

    /// Back to a fresh, idle life at the relay-supplied position.
    pub fn respawn(&mut self, position: Vec2) {
        self.state = CombatState {
            last_attack_time: self.state.last_attack_time,
            facing_left: self.state.facing_left,
            ..CombatState::spawned_at(position)
        };
        self.vitals.revive();
        self.attack_cooldown = 0;
        self.attack_timer.cancel();
        self.hitbox_timer.cancel();
        self.hitbox_enabled = false;
        info!("{} respawned at ({}, {})", self.account, position.x, position.y);
    }

    /// Full state for the outbound push.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::from_state(&self.state)
    }
}

impl CombatEntity for LocalActor {
    fn account(&self) -> &str {
        &self.account
    }

    fn nickname(&self) -> &str {
        &self.nickname
    }

    fn state(&self) -> &CombatState {
        &self.state
    }

    fn vitals(&self) -> &Vitals {
        &self.vitals
    }

    fn hitbox_enabled(&self) -> bool {
        self.hitbox_enabled
    }

    fn animation(&self) -> AnimationState {
        if self.vitals.is_dead() {
            AnimationState::Dead
        } else if self.state.is_attacking {
            AnimationState::Attack
        } else if !self.state.velocity.is_zero() {
            AnimationState::Walk
        } else {
            AnimationState::Idle
        }
    }

    fn apply_damage(&mut self, amount: u32) -> DamageOutcome {
        let outcome = self.vitals.apply_damage(&mut self.state.health, amount);
        if outcome.killed() {
            self.state.velocity = Vec2::ZERO;
            self.state.is_attacking = false;
            self.attack_timer.cancel();
            self.hitbox_timer.cancel();
            self.hitbox_enabled = false;
            info!("{} died", self.account);
        }
        outcome
    }

    fn take_death_notice(&mut self) -> bool {
        self.vitals.take_death_notice()
    }
}
