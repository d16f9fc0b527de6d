//! Per-tick melee resolution between the local actor and its remotes.
//!
//! Two passes run in a fixed order: the local swing against every remote,
//! then every remote swing against the local actor. A hit only counts if the
//! throttle admits it, so one overlap window lands at most one hit.

use crate::entity::CombatEntity;
use crate::local::LocalActor;
use crate::remote::RemoteActor;
use log::debug;
use shared::{Vec2, HIT_COOLDOWN_MS};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThrottleKey {
    /// Outgoing hits, one slot per target.
    Target(String),
    /// Shared slot for every hit landing on the local actor.
    LocalPlayer,
    /// Incoming hits keyed by who landed them.
    Attacker(String),
}

/// How incoming hits on the local actor are throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThrottlePolicy {
    /// All remote attackers share one cooldown slot.
    #[default]
    SharedSelfSlot,
    /// Each attacker has its own slot.
    PerAttacker,
}

impl FromStr for ThrottlePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" | "shared-self-slot" => Ok(ThrottlePolicy::SharedSelfSlot),
            "per-attacker" => Ok(ThrottlePolicy::PerAttacker),
            other => Err(format!("unknown throttle policy '{}'", other)),
        }
    }
}

/// Last-hit timestamps. A key never seen before always admits.
#[derive(Debug)]
pub struct HitThrottle {
    cooldown: u64,
    last_hit: HashMap<ThrottleKey, u64>,
}

impl HitThrottle {
    pub fn new(cooldown: u64) -> Self {
        Self {
            cooldown,
            last_hit: HashMap::new(),
        }
    }

    /// Admits and records a hit if the key's cooldown has strictly elapsed.
    pub fn admit(&mut self, key: ThrottleKey, now: u64) -> bool {
        if let Some(&last) = self.last_hit.get(&key) {
            if now.saturating_sub(last) <= self.cooldown {
                return false;
            }
        }
        self.last_hit.insert(key, now);
        true
    }

    pub fn clear(&mut self) {
        self.last_hit.clear();
    }
}

impl Default for HitThrottle {
    fn default() -> Self {
        Self::new(HIT_COOLDOWN_MS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    /// The local swing landed; must be reported to the relay.
    HitDealt {
        target: String,
        damage: u32,
        position: Vec2,
        killed: bool,
    },
    /// A remote swing landed on the local actor.
    HitTaken {
        attacker: String,
        damage: u32,
        killed: bool,
    },
}

#[derive(Debug, Default)]
pub struct CollisionResolver {
    policy: ThrottlePolicy,
    throttle: HitThrottle,
}

impl CollisionResolver {
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            policy,
            throttle: HitThrottle::default(),
        }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Throttle gate for damage arriving at the local actor, whether detected
    /// here or reported by the relay.
    pub fn admit_incoming(&mut self, attacker: &str, now: u64) -> bool {
        let key = match self.policy {
            ThrottlePolicy::SharedSelfSlot => ThrottleKey::LocalPlayer,
            ThrottlePolicy::PerAttacker => ThrottleKey::Attacker(attacker.to_string()),
        };
        self.throttle.admit(key, now)
    }

    pub fn reset(&mut self) {
        self.throttle.clear();
    }

    pub fn resolve(
        &mut self,
        local: &mut LocalActor,
        remotes: &mut BTreeMap<String, RemoteActor>,
        now: u64,
    ) -> Vec<CombatEvent> {
        let mut events = Vec::new();
        self.resolve_outgoing(local, remotes, now, &mut events);
        self.resolve_incoming(local, remotes, now, &mut events);
        events
    }

    fn resolve_outgoing(
        &mut self,
        local: &LocalActor,
        remotes: &mut BTreeMap<String, RemoteActor>,
        now: u64,
        events: &mut Vec<CombatEvent>,
    ) {
        let hitbox = match local.get_attack_hitbox() {
            Some(hitbox) if hitbox.enabled => hitbox,
            _ => return,
        };
        let damage = local.get_attack_damage();

        for (account, remote) in remotes.iter_mut() {
            if remote.is_dead() || !hitbox.rect.overlaps(&remote.body()) {
                continue;
            }
            if !self
                .throttle
                .admit(ThrottleKey::Target(account.clone()), now)
            {
                continue;
            }

            let outcome = remote.apply_damage(damage);
            debug!("Hit {} for {} ({:?})", account, damage, outcome);
            events.push(CombatEvent::HitDealt {
                target: account.clone(),
                damage,
                position: remote.position(),
                killed: outcome.killed(),
            });
        }
    }

    fn resolve_incoming(
        &mut self,
        local: &mut LocalActor,
        remotes: &BTreeMap<String, RemoteActor>,
        now: u64,
        events: &mut Vec<CombatEvent>,
    ) {
        for (account, remote) in remotes.iter() {
            if local.is_dead() {
                break;
            }
            let hitbox = match remote.get_attack_hitbox() {
                Some(hitbox) if hitbox.enabled => hitbox,
                _ => continue,
            };
            if !hitbox.rect.overlaps(&local.body()) || !self.admit_incoming(account, now) {
                continue;
            }

            let damage = remote.get_attack_damage();
            let outcome = local.apply_damage(damage);
            debug!("Took {} from {} ({:?})", damage, account, outcome);
            events.push(CombatEvent::HitTaken {
                attacker: account.clone(),
                damage,
                killed: outcome.killed(),
            });
        }
    }
}
