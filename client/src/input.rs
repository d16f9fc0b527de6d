//! Keyboard sampling with edge detection for one-shot actions

use macroquad::prelude::{is_key_down, KeyCode};

/// Actions for one tick. Movement and attack are held states; the rest fire
/// only on the frame the key goes down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub attack: bool,
    pub respawn: bool,
    pub toggle_debug: bool,
    pub leave: bool,
}

impl InputFrame {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Raw key state for a single frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeySample {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub attack: bool,
    pub respawn: bool,
    pub debug: bool,
    pub escape: bool,
}

impl KeySample {
    pub fn from_keyboard() -> Self {
        Self {
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            up: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            attack: is_key_down(KeyCode::Space),
            respawn: is_key_down(KeyCode::R),
            debug: is_key_down(KeyCode::F1),
            escape: is_key_down(KeyCode::Escape),
        }
    }
}

#[derive(Default)]
pub struct InputManager {
    // Previous frame key states for edge detection
    prev_respawn: bool,
    prev_debug: bool,
    prev_escape: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self) -> InputFrame {
        self.process(KeySample::from_keyboard())
    }

    pub fn process(&mut self, keys: KeySample) -> InputFrame {
        let frame = InputFrame {
            left: keys.left,
            right: keys.right,
            up: keys.up,
            down: keys.down,
            attack: keys.attack,
            respawn: keys.respawn && !self.prev_respawn,
            toggle_debug: keys.debug && !self.prev_debug,
            leave: keys.escape && !self.prev_escape,
        };

        self.prev_respawn = keys.respawn;
        self.prev_debug = keys.debug;
        self.prev_escape = keys.escape;

        frame
    }
}
