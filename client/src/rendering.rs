use crate::effects::{Effect, EffectKind, DAMAGE_NUMBER_RISE};
use crate::entity::{AnimationState, CombatEntity};
use crate::sync::{SessionPhase, SyncCoordinator};
use macroquad::prelude::{
    clear_background, draw_circle_lines, draw_line, draw_rectangle, draw_rectangle_lines,
    draw_text, measure_text, screen_height, screen_width, Color, GREEN, RED, WHITE, YELLOW,
};
use shared::{Rect, Vec2, BODY_HEIGHT, BODY_WIDTH, MAX_HEALTH, WORLD_SIZE};

const GRID_STEP: f32 = 100.0;
const HEALTH_BAR_HEIGHT: f32 = 6.0;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub debug: bool,
    pub fake_ping_ms: u64,
}

/// Everything needed to draw one actor, local or remote.
struct ActorView<'a> {
    nickname: &'a str,
    position: Vec2,
    facing_left: bool,
    animation: AnimationState,
    health: u32,
    alpha: f32,
    flashing: bool,
    is_local: bool,
}

pub struct Renderer {
    camera: Vec2,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            camera: Vec2::new(WORLD_SIZE / 2.0, WORLD_SIZE / 2.0),
        }
    }

    fn to_screen(&self, world: Vec2) -> Vec2 {
        camera_transform(world, self.camera, screen_width(), screen_height())
    }

    pub fn render(&mut self, sync: &SyncCoordinator, config: &RenderConfig) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        if let Some(local) = sync.local() {
            self.camera = local.position();
        }

        self.draw_grid();

        for remote in sync.remotes().values() {
            self.draw_actor(&ActorView {
                nickname: remote.nickname(),
                position: remote.render_position(),
                facing_left: remote.facing_left(),
                animation: remote.animation(),
                health: remote.health(),
                alpha: remote.fade_alpha(),
                flashing: remote.vitals().is_flashing(),
                is_local: false,
            });
            if config.debug {
                self.draw_debug_boxes(remote);
            }
        }

        if let Some(local) = sync.local() {
            self.draw_actor(&ActorView {
                nickname: local.nickname(),
                position: local.position(),
                facing_left: local.facing_left(),
                animation: local.animation(),
                health: local.health(),
                alpha: 1.0,
                flashing: local.vitals().is_flashing(),
                is_local: true,
            });
            if config.debug {
                self.draw_debug_boxes(local);
            }
        }

        for effect in sync.effects().iter() {
            self.draw_effect(effect);
        }

        self.draw_ui(sync, config);
    }

    fn draw_grid(&self) {
        let line_color = Color::from_rgba(45, 45, 45, 255);
        let mut offset = 0.0;
        while offset <= WORLD_SIZE {
            let a = self.to_screen(Vec2::new(offset, 0.0));
            let b = self.to_screen(Vec2::new(offset, WORLD_SIZE));
            draw_line(a.x, a.y, b.x, b.y, 1.0, line_color);

            let a = self.to_screen(Vec2::new(0.0, offset));
            let b = self.to_screen(Vec2::new(WORLD_SIZE, offset));
            draw_line(a.x, a.y, b.x, b.y, 1.0, line_color);

            offset += GRID_STEP;
        }

        let origin = self.to_screen(Vec2::ZERO);
        draw_rectangle_lines(
            origin.x,
            origin.y,
            WORLD_SIZE,
            WORLD_SIZE,
            3.0,
            Color::from_rgba(90, 90, 90, 255),
        );
    }

    fn draw_actor(&self, actor: &ActorView) {
        let center = self.to_screen(actor.position);
        let x = center.x - BODY_WIDTH / 2.0;
        let y = center.y - BODY_HEIGHT / 2.0;

        let base = if actor.is_local {
            Color::from_rgba(80, 160, 255, 255)
        } else {
            Color::from_rgba(255, 68, 68, 255)
        };
        let body_color = match actor.animation {
            _ if actor.flashing => WHITE,
            AnimationState::Dead => Color::from_rgba(90, 90, 90, 255),
            AnimationState::Attack => Color::from_rgba(255, 200, 80, 255),
            AnimationState::Walk | AnimationState::Idle => base,
        };

        draw_rectangle(x, y, BODY_WIDTH, BODY_HEIGHT, with_alpha(body_color, actor.alpha));
        draw_rectangle_lines(
            x,
            y,
            BODY_WIDTH,
            BODY_HEIGHT,
            2.0,
            with_alpha(WHITE, actor.alpha),
        );

        if actor.animation != AnimationState::Dead {
            let dir = if actor.facing_left { -1.0 } else { 1.0 };
            let reach = if actor.animation == AnimationState::Attack {
                BODY_WIDTH
            } else {
                BODY_WIDTH / 2.0 + 6.0
            };
            draw_line(
                center.x,
                center.y,
                center.x + dir * reach,
                center.y,
                3.0,
                with_alpha(Color::from_rgba(220, 220, 220, 255), actor.alpha),
            );
        }

        let bar_y = y - HEALTH_BAR_HEIGHT - 4.0;
        let filled = BODY_WIDTH * actor.health as f32 / MAX_HEALTH as f32;
        draw_rectangle(
            x,
            bar_y,
            BODY_WIDTH,
            HEALTH_BAR_HEIGHT,
            with_alpha(Color::from_rgba(51, 51, 51, 255), actor.alpha),
        );
        draw_rectangle(
            x,
            bar_y,
            filled,
            HEALTH_BAR_HEIGHT,
            with_alpha(health_color(actor.health), actor.alpha),
        );

        let label = measure_text(actor.nickname, None, 16, 1.0);
        draw_text(
            actor.nickname,
            center.x - label.width / 2.0,
            bar_y - 4.0,
            16.0,
            with_alpha(WHITE, actor.alpha),
        );
    }

    fn draw_debug_boxes<E: CombatEntity>(&self, entity: &E) {
        self.draw_rect_outline(&entity.body(), Color::from_rgba(0, 255, 255, 160));
        if let Some(hitbox) = entity.get_attack_hitbox() {
            if hitbox.enabled {
                self.draw_rect_outline(&hitbox.rect, RED);
            }
        }
    }

    fn draw_rect_outline(&self, rect: &Rect, color: Color) {
        let top_left = self.to_screen(Vec2::new(rect.left(), rect.top()));
        draw_rectangle_lines(top_left.x, top_left.y, rect.width, rect.height, 1.0, color);
    }

    fn draw_effect(&self, effect: &Effect) {
        let progress = effect.progress();
        let at = self.to_screen(effect.position);

        match &effect.kind {
            EffectKind::Hit => {
                draw_circle_lines(
                    at.x,
                    at.y,
                    12.0 + 20.0 * progress,
                    2.0,
                    with_alpha(YELLOW, 1.0 - progress),
                );
            }
            EffectKind::DamageNumber(damage) => {
                let text = format!("-{}", damage);
                draw_text(
                    &text,
                    at.x - 10.0,
                    at.y - BODY_HEIGHT / 2.0 - DAMAGE_NUMBER_RISE * progress,
                    22.0,
                    with_alpha(RED, 1.0 - progress),
                );
            }
            EffectKind::DeathLabel(nickname) => {
                let text = format!("{} has fallen", nickname);
                let size = measure_text(&text, None, 18, 1.0);
                draw_text(
                    &text,
                    at.x - size.width / 2.0,
                    at.y + BODY_HEIGHT / 2.0 + 20.0,
                    18.0,
                    with_alpha(WHITE, 1.0 - progress),
                );
            }
        }
    }

    fn draw_ui(&self, sync: &SyncCoordinator, config: &RenderConfig) {
        let y_start = 20.0;

        match sync.phase() {
            SessionPhase::Connecting => {
                draw_text("Connecting...", 10.0, y_start, 20.0, YELLOW);
                return;
            }
            SessionPhase::Joining => {
                draw_text("Joining arena...", 10.0, y_start, 20.0, YELLOW);
                return;
            }
            SessionPhase::Left => {
                draw_text("Left the arena", 10.0, y_start, 20.0, WHITE);
                return;
            }
            SessionPhase::Joined => {}
        }

        if let Some(local) = sync.local() {
            let health_text = format!("HP {}/{}", local.health(), MAX_HEALTH);
            draw_text(&health_text, 10.0, y_start, 20.0, health_color(local.health()));
        }

        let player_text = format!("{} players", sync.player_count());
        draw_text(&player_text, 10.0, y_start + 20.0, 16.0, WHITE);

        let total_ping = sync.last_rtt_ms() + config.fake_ping_ms;
        let ping_text = format!("{}ms", total_ping);
        draw_text(&ping_text, 10.0, y_start + 38.0, 16.0, ping_color(total_ping));

        if sync.can_respawn() {
            let prompt = "You have fallen. Press R to respawn";
            let size = measure_text(prompt, None, 28, 1.0);
            draw_text(
                prompt,
                screen_width() / 2.0 - size.width / 2.0,
                screen_height() / 2.0 - 60.0,
                28.0,
                RED,
            );
        }

        if config.debug {
            self.draw_debug_panel(sync);
        }
    }

    fn draw_debug_panel(&self, sync: &SyncCoordinator) {
        let x = screen_width() - 230.0;
        let mut y = 20.0;
        draw_rectangle(x - 8.0, 4.0, 234.0, 120.0, Color::from_rgba(0, 0, 0, 160));

        let mut lines = Vec::new();
        if let Some(session) = sync.session() {
            lines.push(format!("{} @ {}", session.nickname, session.room_id));
        }
        if let Some(local) = sync.local() {
            let p = local.position();
            let v = local.state().velocity;
            lines.push(format!("pos {:.0}, {:.0}", p.x, p.y));
            lines.push(format!("vel {:.0}, {:.0}", v.x, v.y));
            lines.push(format!("cooldown {}ms", local.attack_cooldown()));
            lines.push(format!("anim {:?}", local.animation()));
        }
        lines.push(format!("remotes {}", sync.remotes().len()));
        lines.push(format!("throttle {:?}", sync.throttle_policy()));

        for line in lines {
            draw_text(&line, x, y, 14.0, GREEN);
            y += 15.0;
        }
    }
}

/// World to screen with `camera` at the centre of the window.
pub fn camera_transform(world: Vec2, camera: Vec2, width: f32, height: f32) -> Vec2 {
    Vec2::new(
        world.x - camera.x + width / 2.0,
        world.y - camera.y + height / 2.0,
    )
}

pub fn health_color(health: u32) -> Color {
    let ratio = health as f32 / MAX_HEALTH as f32;
    if ratio > 0.6 {
        GREEN
    } else if ratio > 0.3 {
        YELLOW
    } else {
        RED
    }
}

pub fn ping_color(ping_ms: u64) -> Color {
    if ping_ms < 50 {
        GREEN
    } else if ping_ms < 100 {
        YELLOW
    } else {
        RED
    }
}

fn with_alpha(color: Color, alpha: f32) -> Color {
    Color::new(color.r, color.g, color.b, color.a * alpha.clamp(0.0, 1.0))
}
