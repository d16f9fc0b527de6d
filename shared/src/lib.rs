//! Types shared by the arena client and the relay server: gameplay constants,
//! 2D geometry, the combat state model and the wire protocol.

use serde::{Deserialize, Serialize};

pub mod protocol;
pub mod snapshot;

pub use protocol::{CallKind, CallReply, MessagePayload, Notification, Packet, RemoteCall};
pub use snapshot::{CombatState, PlayerRecord, SnapshotError, StateSnapshot, SNAPSHOT_VERSION};

pub const PROTOCOL_VERSION: u32 = 1;
/// Largest UDP payload; receive buffers on both ends use this size.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
/// Nicknames are cut to this many characters when a record is created.
pub const MAX_NICKNAME_CHARS: usize = 32;
pub const ROOM_ID: &str = "combat-arena";
pub const HIT_TOPIC: &str = "hit";

pub const MAX_HEALTH: u32 = 100;
pub const ATTACK_DAMAGE: u32 = 20;
/// Movement speed in world units per second.
pub const PLAYER_SPEED: f32 = 200.0;

pub const BODY_WIDTH: f32 = 48.0;
pub const BODY_HEIGHT: f32 = 64.0;
pub const ATTACK_RANGE: f32 = 60.0;
pub const HITBOX_HEIGHT: f32 = 50.0;
/// Distance from the actor's position to the centre of its attack hitbox.
pub const HITBOX_OFFSET: f32 = ATTACK_RANGE / 2.0 + 10.0;

// Durations in milliseconds of tick-clock time.
pub const ATTACK_COOLDOWN_MS: u64 = 800;
pub const ATTACK_DURATION_MS: u64 = 500;
pub const HITBOX_ACTIVE_MS: u64 = 300;
pub const HIT_COOLDOWN_MS: u64 = 1000;
pub const STATE_PUSH_INTERVAL_MS: u64 = 100;
pub const DEATH_FADE_MS: u64 = 1000;
pub const HURT_FLASH_MS: u64 = 100;

pub const SPAWN_CENTER: f32 = 1000.0;
pub const SPAWN_SPREAD: i32 = 250;
pub const WORLD_SIZE: f32 = 2000.0;

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen space.
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector, or zero for the zero vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn distance(&self, other: &Vec2) -> f32 {
        Vec2::new(other.x - self.x, other.y - self.y).magnitude()
    }

    /// Linear interpolation towards `other`; `t` is clamped to `[0, 1]`.
    pub fn lerp(&self, other: &Vec2, t: f32) -> Vec2 {
        let t = t.clamp(0.0, 1.0);
        Vec2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle described by its centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub center: Vec2,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(center: Vec2, width: f32, height: f32) -> Self {
        Self {
            center,
            width,
            height,
        }
    }

    /// Hurt box of an actor standing at `position`.
    pub fn body_at(position: Vec2) -> Self {
        Self::new(position, BODY_WIDTH, BODY_HEIGHT)
    }

    pub fn left(&self) -> f32 {
        self.center.x - self.width / 2.0
    }

    pub fn right(&self) -> f32 {
        self.center.x + self.width / 2.0
    }

    pub fn top(&self) -> f32 {
        self.center.y - self.height / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.center.y + self.height / 2.0
    }

    /// AABB intersection test. Rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.right() <= other.left()
            || other.right() <= self.left()
            || self.bottom() <= other.top()
            || other.bottom() <= self.top())
    }
}

/// The name shown for a player: the requested one cut to
/// [`MAX_NICKNAME_CHARS`], or a default derived from the account.
pub fn display_nickname(account: &str, requested: &str) -> String {
    if requested.is_empty() {
        default_nickname(account)
    } else {
        requested.chars().take(MAX_NICKNAME_CHARS).collect()
    }
}

/// Display name used when a player joins without one.
pub fn default_nickname(account: &str) -> String {
    let short: String = account.chars().take(5).collect();
    if short.is_empty() {
        "Knight-unknown".to_string()
    } else {
        format!("Knight-{}", short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec2_normalize() {
        let v = Vec2::new(3.0, 4.0).normalize();
        assert_approx_eq!(v.x, 0.6, 0.0001);
        assert_approx_eq!(v.y, 0.8, 0.0001);
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_vec2_diagonal_speed_is_capped() {
        let v = Vec2::new(PLAYER_SPEED, PLAYER_SPEED)
            .normalize()
            .scale(PLAYER_SPEED);
        assert_approx_eq!(v.magnitude(), PLAYER_SPEED, 0.01);
    }

    #[test]
    fn test_vec2_lerp_clamps() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, -10.0);
        assert_eq!(a.lerp(&b, 2.0), b);
        assert_eq!(a.lerp(&b, -1.0), a);
        let mid = a.lerp(&b, 0.5);
        assert_approx_eq!(mid.x, 5.0, 0.0001);
        assert_approx_eq!(mid.y, -5.0, 0.0001);
    }

    #[test]
    fn test_rect_bounds() {
        let rect = Rect::new(Vec2::new(100.0, 200.0), 60.0, 50.0);
        assert_eq!(rect.left(), 70.0);
        assert_eq!(rect.right(), 130.0);
        assert_eq!(rect.top(), 175.0);
        assert_eq!(rect.bottom(), 225.0);
    }

    #[test]
    fn test_rect_overlap() {
        let a = Rect::new(Vec2::new(1040.0, 1000.0), ATTACK_RANGE, HITBOX_HEIGHT);
        let b = Rect::body_at(Vec2::new(1040.0, 1000.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn test_rect_no_overlap() {
        let a = Rect::body_at(Vec2::new(0.0, 0.0));
        let b = Rect::body_at(Vec2::new(500.0, 500.0));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_rect_exact_touch_is_not_overlap() {
        let a = Rect::new(Vec2::new(0.0, 0.0), 10.0, 10.0);
        let b = Rect::new(Vec2::new(10.0, 0.0), 10.0, 10.0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_default_nickname() {
        assert_eq!(default_nickname("a1b2c3d4e5"), "Knight-a1b2c");
        assert_eq!(default_nickname("ab"), "Knight-ab");
        assert_eq!(default_nickname(""), "Knight-unknown");
    }

    #[test]
    fn test_display_nickname_is_capped() {
        assert_eq!(display_nickname("a1b2c3d4e5", ""), "Knight-a1b2c");
        assert_eq!(display_nickname("a1b2c3d4e5", "Sir"), "Sir");

        let long = "é".repeat(250);
        let capped = display_nickname("a1b2c3d4e5", &long);
        assert_eq!(capped.chars().count(), MAX_NICKNAME_CHARS);
        assert!(long.starts_with(&capped));
    }
}
