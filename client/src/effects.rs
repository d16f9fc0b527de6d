//! Short-lived visual feedback spawned by combat events.

use crate::entity::Countdown;
use shared::{Vec2, DEATH_FADE_MS};

pub const HIT_EFFECT_MS: u64 = 300;
pub const DAMAGE_NUMBER_MS: u64 = 1000;
/// Damage numbers drift upward this far over their lifetime.
pub const DAMAGE_NUMBER_RISE: f32 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub enum EffectKind {
    Hit,
    DamageNumber(u32),
    DeathLabel(String),
}

#[derive(Debug, Clone)]
pub struct Effect {
    pub kind: EffectKind,
    pub position: Vec2,
    lifetime: u64,
    timer: Countdown,
}

impl Effect {
    fn new(kind: EffectKind, position: Vec2, lifetime: u64) -> Self {
        let mut timer = Countdown::idle();
        timer.start(lifetime);
        Self {
            kind,
            position,
            lifetime,
            timer,
        }
    }

    /// 0.0 when fresh, 1.0 when about to expire.
    pub fn progress(&self) -> f32 {
        match self.timer.remaining() {
            Some(left) => 1.0 - left as f32 / self.lifetime as f32,
            None => 1.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct Effects {
    active: Vec<Effect>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&mut self, position: Vec2) {
        self.active
            .push(Effect::new(EffectKind::Hit, position, HIT_EFFECT_MS));
    }

    pub fn damage_number(&mut self, position: Vec2, damage: u32) {
        self.active.push(Effect::new(
            EffectKind::DamageNumber(damage),
            position,
            DAMAGE_NUMBER_MS,
        ));
    }

    pub fn death_label(&mut self, position: Vec2, nickname: &str) {
        self.active.push(Effect::new(
            EffectKind::DeathLabel(nickname.to_string()),
            position,
            DEATH_FADE_MS,
        ));
    }

    pub fn tick(&mut self, dt_ms: u64) {
        self.active.retain_mut(|effect| !effect.timer.advance(dt_ms));
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.active.iter()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_effects_expire_by_kind() {
        let mut effects = Effects::new();
        effects.hit(Vec2::ZERO);
        effects.damage_number(Vec2::ZERO, 20);
        assert_eq!(effects.len(), 2);

        effects.tick(HIT_EFFECT_MS);
        assert_eq!(effects.len(), 1);
        assert_eq!(
            effects.iter().next().map(|e| e.kind.clone()),
            Some(EffectKind::DamageNumber(20))
        );

        effects.tick(DAMAGE_NUMBER_MS);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_progress() {
        let mut effects = Effects::new();
        effects.death_label(Vec2::ZERO, "Sir");
        effects.tick(DEATH_FADE_MS / 4);
        let effect = effects.iter().next().unwrap();
        assert_approx_eq!(effect.progress(), 0.25, 0.001);
    }
}
