//! Behaviour shared by every combat participant.
//!
//! Both actor kinds keep their timers as plain [`Countdown`] values advanced
//! by the tick, so an actor that has been dropped has nothing left that could
//! fire against it.

use shared::{
    CombatState, Rect, Vec2, ATTACK_DAMAGE, ATTACK_RANGE, HITBOX_HEIGHT, HITBOX_OFFSET,
    HURT_FLASH_MS,
};

/// A one-shot timer on the tick clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Countdown {
    remaining: Option<u64>,
}

impl Countdown {
    pub fn idle() -> Self {
        Self { remaining: None }
    }

    /// (Re)arms the timer.
    pub fn start(&mut self, duration_ms: u64) {
        self.remaining = Some(duration_ms);
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    pub fn is_running(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// Advances the timer. Returns true exactly once, on the tick it expires.
    pub fn advance(&mut self, dt_ms: u64) -> bool {
        match self.remaining {
            Some(left) if left <= dt_ms => {
                self.remaining = None;
                true
            }
            Some(left) => {
                self.remaining = Some(left - dt_ms);
                false
            }
            None => false,
        }
    }
}

/// Melee hitbox in front of an actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackHitbox {
    pub rect: Rect,
    /// Gates collision tests regardless of what is being drawn.
    pub enabled: bool,
}

impl AttackHitbox {
    pub fn for_actor(position: Vec2, facing_left: bool, enabled: bool) -> Self {
        let offset = if facing_left {
            -HITBOX_OFFSET
        } else {
            HITBOX_OFFSET
        };
        let center = Vec2::new(position.x + offset, position.y);
        Self {
            rect: Rect::new(center, ATTACK_RANGE, HITBOX_HEIGHT),
            enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    Idle,
    Walk,
    Attack,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// The actor was already dead.
    Ignored,
    Damaged { remaining: u32 },
    Killed,
}

impl DamageOutcome {
    pub fn killed(&self) -> bool {
        matches!(self, DamageOutcome::Killed)
    }
}

/// Death bookkeeping and damage feedback.
#[derive(Debug, Clone, Default)]
pub struct Vitals {
    dead: bool,
    death_notice: bool,
    hurt_flash: Countdown,
}

impl Vitals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_flashing(&self) -> bool {
        self.hurt_flash.is_running()
    }

    /// Clamped damage against `health`. The death transition happens at most
    /// once per life.
    pub fn apply_damage(&mut self, health: &mut u32, amount: u32) -> DamageOutcome {
        if self.dead {
            return DamageOutcome::Ignored;
        }

        *health = health.saturating_sub(amount);
        if amount > 0 {
            self.hurt_flash.start(HURT_FLASH_MS);
        }

        if *health == 0 {
            self.die();
            DamageOutcome::Killed
        } else {
            DamageOutcome::Damaged { remaining: *health }
        }
    }

    /// Death driven by an observed health value rather than by damage.
    /// Returns true if this call caused the transition.
    pub fn observe_health(&mut self, health: u32) -> bool {
        if self.dead || health > 0 {
            return false;
        }
        self.die();
        true
    }

    fn die(&mut self) {
        self.dead = true;
        self.death_notice = true;
    }

    /// One-shot: true the first time it is called after dying.
    pub fn take_death_notice(&mut self) -> bool {
        std::mem::replace(&mut self.death_notice, false)
    }

    pub fn revive(&mut self) {
        self.dead = false;
        self.death_notice = false;
        self.hurt_flash.cancel();
    }

    pub fn tick(&mut self, dt_ms: u64) {
        self.hurt_flash.advance(dt_ms);
    }
}

/// Read side and damage contract common to local and remote actors.
pub trait CombatEntity {
    fn account(&self) -> &str;
    fn nickname(&self) -> &str;
    fn state(&self) -> &CombatState;
    fn vitals(&self) -> &Vitals;
    fn hitbox_enabled(&self) -> bool;
    fn animation(&self) -> AnimationState;

    /// Applies clamped damage; a no-op once dead.
    fn apply_damage(&mut self, amount: u32) -> DamageOutcome;

    /// One-shot death notification for collaborators.
    fn take_death_notice(&mut self) -> bool;

    fn position(&self) -> Vec2 {
        self.state().position
    }

    fn health(&self) -> u32 {
        self.state().health
    }

    fn is_attacking(&self) -> bool {
        self.state().is_attacking
    }

    fn facing_left(&self) -> bool {
        self.state().facing_left
    }

    fn last_attack_time(&self) -> u64 {
        self.state().last_attack_time
    }

    fn is_dead(&self) -> bool {
        self.vitals().is_dead()
    }

    fn body(&self) -> Rect {
        Rect::body_at(self.position())
    }

    /// None once dead.
    fn get_attack_hitbox(&self) -> Option<AttackHitbox> {
        if self.is_dead() {
            return None;
        }
        Some(AttackHitbox::for_actor(
            self.position(),
            self.facing_left(),
            self.hitbox_enabled(),
        ))
    }

    fn get_attack_damage(&self) -> u32 {
        ATTACK_DAMAGE
    }
}
