//! Mirror of another player, driven entirely by relayed snapshots.

use crate::entity::{AnimationState, CombatEntity, Countdown, DamageOutcome, Vitals};
use log::info;
use shared::{
    default_nickname, CombatState, StateSnapshot, Vec2, ATTACK_DURATION_MS, DEATH_FADE_MS,
    STATE_PUSH_INTERVAL_MS,
};

/// Render gap beyond which smoothing gives up and jumps to the snapshot.
pub const SNAP_DISTANCE: f32 = 200.0;

pub struct RemoteActor {
    account: String,
    nickname: String,
    state: CombatState,
    vitals: Vitals,
    hitbox_enabled: bool,
    hitbox_timer: Countdown,
    fade: Countdown,
    faded: bool,
    /// Animation classification from the last snapshot that carried velocity.
    moving: bool,
    smoothing: bool,
    render_from: Vec2,
    render_elapsed: u64,
}

impl RemoteActor {
    pub fn new(account: &str, snapshot: &StateSnapshot, smoothing: bool) -> Self {
        let nickname = match snapshot.nickname.as_deref() {
            Some(nickname) if !nickname.is_empty() => nickname.to_string(),
            _ => default_nickname(account),
        };
        let position = snapshot.position.unwrap_or(Vec2::ZERO);

        let mut actor = Self {
            account: account.to_string(),
            nickname,
            state: CombatState::spawned_at(position),
            vitals: Vitals::new(),
            hitbox_enabled: false,
            hitbox_timer: Countdown::idle(),
            fade: Countdown::idle(),
            faded: false,
            moving: false,
            smoothing,
            render_from: position,
            render_elapsed: STATE_PUSH_INTERVAL_MS,
        };
        actor.apply_snapshot(snapshot);
        actor
    }

    /// Sparse merge of a relayed snapshot. Returns false if the actor is dead
    /// and the snapshot was ignored.
    pub fn apply_snapshot(&mut self, snapshot: &StateSnapshot) -> bool {
        if self.vitals.is_dead() {
            return false;
        }

        let was_attacking = self.state.is_attacking;
        let previous_position = self.state.position;
        let rendered = self.render_position();

        snapshot.merge_into(&mut self.state);

        if let Some(nickname) = snapshot.nickname.as_deref() {
            if !nickname.is_empty() {
                self.nickname = nickname.to_string();
            }
        }
        if let Some(velocity) = snapshot.velocity {
            self.moving = !velocity.is_zero();
        }
        if self.state.position != previous_position {
            self.retarget(rendered);
        }

        match (was_attacking, self.state.is_attacking) {
            (false, true) => {
                self.hitbox_enabled = true;
                self.hitbox_timer.start(ATTACK_DURATION_MS);
            }
            (true, false) => {
                self.hitbox_enabled = false;
                self.hitbox_timer.cancel();
            }
            _ => {}
        }

        if self.vitals.observe_health(self.state.health) {
            self.on_death();
        }
        true
    }

    fn retarget(&mut self, rendered: Vec2) {
        self.render_from = if rendered.distance(&self.state.position) > SNAP_DISTANCE {
            self.state.position
        } else {
            rendered
        };
        self.render_elapsed = 0;
    }

    fn on_death(&mut self) {
        self.hitbox_enabled = false;
        self.hitbox_timer.cancel();
        self.moving = false;
        self.fade.start(DEATH_FADE_MS);
        info!("{} ({}) died", self.nickname, self.account);
    }

    pub fn tick(&mut self, dt_ms: u64) {
        self.vitals.tick(dt_ms);
        if self.hitbox_timer.advance(dt_ms) && self.hitbox_enabled {
            self.hitbox_enabled = false;
        }
        if self.fade.advance(dt_ms) {
            self.faded = true;
        }
        self.render_elapsed = (self.render_elapsed + dt_ms).min(STATE_PUSH_INTERVAL_MS);
    }

    /// Where to draw the actor. Collision never uses this.
    pub fn render_position(&self) -> Vec2 {
        if !self.smoothing {
            return self.state.position;
        }
        let t = self.render_elapsed as f32 / STATE_PUSH_INTERVAL_MS as f32;
        self.render_from.lerp(&self.state.position, t)
    }

    pub fn fade_alpha(&self) -> f32 {
        if !self.vitals.is_dead() {
            return 1.0;
        }
        match self.fade.remaining() {
            Some(left) => left as f32 / DEATH_FADE_MS as f32,
            None => 0.0,
        }
    }

    /// True once the death fade has completed and the actor should go.
    pub fn is_faded(&self) -> bool {
        self.faded
    }
}

impl CombatEntity for RemoteActor {
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
        } else if self.moving {
            AnimationState::Walk
        } else {
            AnimationState::Idle
        }
    }

    fn apply_damage(&mut self, amount: u32) -> DamageOutcome {
        let outcome = self.vitals.apply_damage(&mut self.state.health, amount);
        if outcome.killed() {
            self.on_death();
        }
        outcome
    }

    fn take_death_notice(&mut self) -> bool {
        self.vitals.take_death_notice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::MAX_HEALTH;

    fn snapshot_at(x: f32, y: f32) -> StateSnapshot {
        StateSnapshot {
            position: Some(Vec2::new(x, y)),
            ..StateSnapshot::default()
        }
        .with_identity("acc-r", "Lancelot")
    }

    fn remote() -> RemoteActor {
        RemoteActor::new("acc-r", &snapshot_at(1000.0, 1000.0), false)
    }

    #[test]
    fn test_created_from_snapshot() {
        let actor = remote();
        assert_eq!(actor.nickname(), "Lancelot");
        assert_eq!(actor.position(), Vec2::new(1000.0, 1000.0));
        assert_eq!(actor.health(), MAX_HEALTH);
        assert_eq!(actor.animation(), AnimationState::Idle);
    }

    #[test]
    fn test_missing_nickname_uses_default() {
        let snapshot = StateSnapshot::default();
        let actor = RemoteActor::new("xyz12345", &snapshot, false);
        assert_eq!(actor.nickname(), "Knight-xyz12");
    }

    #[test]
    fn test_sparse_merge() {
        let mut actor = remote();
        actor.apply_snapshot(&StateSnapshot {
            health: Some(60),
            facing_left: Some(true),
            ..StateSnapshot::default()
        });

        assert_eq!(actor.health(), 60);
        assert!(actor.facing_left());
        assert_eq!(actor.position(), Vec2::new(1000.0, 1000.0));
    }

    #[test]
    fn test_same_snapshot_twice_is_idempotent() {
        let mut actor = remote();
        let snapshot = StateSnapshot {
            position: Some(Vec2::new(1010.0, 990.0)),
            velocity: Some(Vec2::new(200.0, 0.0)),
            health: Some(70),
            is_attacking: Some(true),
            facing_left: Some(true),
            last_attack_time: Some(1234),
            ..StateSnapshot::default()
        };

        actor.apply_snapshot(&snapshot);
        let first = (
            *actor.state(),
            actor.hitbox_enabled(),
            actor.hitbox_timer,
            actor.animation(),
            actor.render_position(),
        );

        actor.apply_snapshot(&snapshot);
        let second = (
            *actor.state(),
            actor.hitbox_enabled(),
            actor.hitbox_timer,
            actor.animation(),
            actor.render_position(),
        );

        assert_eq!(first, second);
    }

    #[test]
    fn test_attack_flag_drives_hitbox() {
        let mut actor = remote();
        actor.apply_snapshot(&StateSnapshot {
            is_attacking: Some(true),
            ..StateSnapshot::default()
        });
        assert!(actor.get_attack_hitbox().unwrap().enabled);

        actor.tick(ATTACK_DURATION_MS - 1);
        assert!(actor.hitbox_enabled());
        actor.tick(1);
        assert!(!actor.hitbox_enabled());

        // A stale true does not re-arm the hitbox.
        actor.apply_snapshot(&StateSnapshot {
            is_attacking: Some(true),
            ..StateSnapshot::default()
        });
        assert!(!actor.hitbox_enabled());

        actor.apply_snapshot(&StateSnapshot {
            is_attacking: Some(false),
            ..StateSnapshot::default()
        });
        actor.apply_snapshot(&StateSnapshot {
            is_attacking: Some(true),
            ..StateSnapshot::default()
        });
        assert!(actor.hitbox_enabled());
    }

    #[test]
    fn test_attack_end_disables_hitbox() {
        let mut actor = remote();
        actor.apply_snapshot(&StateSnapshot {
            is_attacking: Some(true),
            ..StateSnapshot::default()
        });
        actor.apply_snapshot(&StateSnapshot {
            is_attacking: Some(false),
            ..StateSnapshot::default()
        });
        assert!(!actor.hitbox_enabled());
    }

    #[test]
    fn test_velocity_classifies_movement() {
        let mut actor = remote();
        actor.apply_snapshot(&StateSnapshot {
            velocity: Some(Vec2::new(0.0, -200.0)),
            ..StateSnapshot::default()
        });
        assert_eq!(actor.animation(), AnimationState::Walk);

        // No velocity: classification unchanged.
        actor.apply_snapshot(&snapshot_at(1000.0, 980.0));
        assert_eq!(actor.animation(), AnimationState::Walk);

        actor.apply_snapshot(&StateSnapshot {
            velocity: Some(Vec2::ZERO),
            ..StateSnapshot::default()
        });
        assert_eq!(actor.animation(), AnimationState::Idle);
    }

    #[test]
    fn test_zero_health_snapshot_starts_fade() {
        let mut actor = remote();
        actor.apply_snapshot(&StateSnapshot {
            health: Some(0),
            ..StateSnapshot::default()
        });

        assert!(actor.is_dead());
        assert!(actor.take_death_notice());
        assert_eq!(actor.fade_alpha(), 1.0);
        assert!(actor.get_attack_hitbox().is_none());

        actor.tick(DEATH_FADE_MS / 2);
        assert_approx_eq!(actor.fade_alpha(), 0.5, 0.001);
        assert!(!actor.is_faded());

        actor.tick(DEATH_FADE_MS / 2);
        assert!(actor.is_faded());
        assert_eq!(actor.fade_alpha(), 0.0);
    }

    #[test]
    fn test_dead_actor_ignores_snapshots() {
        let mut actor = remote();
        actor.apply_damage(MAX_HEALTH);
        assert!(actor.is_dead());

        assert!(!actor.apply_snapshot(&StateSnapshot {
            health: Some(MAX_HEALTH),
            position: Some(Vec2::new(0.0, 0.0)),
            ..StateSnapshot::default()
        }));
        assert_eq!(actor.health(), 0);
        assert_eq!(actor.position(), Vec2::new(1000.0, 1000.0));
    }

    #[test]
    fn test_local_damage_kills_once() {
        let mut actor = remote();
        assert_eq!(
            actor.apply_damage(20),
            DamageOutcome::Damaged { remaining: 80 }
        );
        for _ in 0..3 {
            actor.apply_damage(40);
        }
        assert_eq!(actor.health(), 0);
        assert!(actor.take_death_notice());
        assert!(!actor.take_death_notice());
    }

    #[test]
    fn test_smoothing_eases_toward_snapshot() {
        let mut actor = RemoteActor::new("acc-r", &snapshot_at(1000.0, 1000.0), true);
        actor.apply_snapshot(&snapshot_at(1020.0, 1000.0));

        assert_eq!(actor.position(), Vec2::new(1020.0, 1000.0));
        assert_approx_eq!(actor.render_position().x, 1000.0, 0.001);

        actor.tick(STATE_PUSH_INTERVAL_MS / 2);
        assert_approx_eq!(actor.render_position().x, 1010.0, 0.001);

        actor.tick(STATE_PUSH_INTERVAL_MS);
        assert_approx_eq!(actor.render_position().x, 1020.0, 0.001);
    }

    #[test]
    fn test_smoothing_snaps_on_large_gap() {
        let mut actor = RemoteActor::new("acc-r", &snapshot_at(1000.0, 1000.0), true);
        actor.apply_snapshot(&snapshot_at(1500.0, 1000.0));
        assert_eq!(actor.render_position(), Vec2::new(1500.0, 1000.0));
    }

    #[test]
    fn test_collision_body_uses_snapshot_position() {
        let mut actor = RemoteActor::new("acc-r", &snapshot_at(1000.0, 1000.0), true);
        actor.apply_snapshot(&snapshot_at(1050.0, 1000.0));
        assert_eq!(actor.body().center, Vec2::new(1050.0, 1000.0));
        assert_ne!(actor.render_position(), actor.position());
    }
}
