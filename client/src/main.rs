use clap::Parser;
use client::collision::ThrottlePolicy;
use client::input::InputManager;
use client::network::{self, NetworkConfig};
use client::rendering::{RenderConfig, Renderer};
use client::sync::{SessionEvent, SyncConfig, SyncCoordinator};
use log::{error, info, warn};
use macroquad::prelude::{is_quit_requested, next_frame, prevent_quit, Conf};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Knight arena client", long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Display name; defaults to one derived from the account
    #[arg(short = 'n', long, default_value = "")]
    nickname: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "768")]
    height: i32,

    /// Incoming hit throttle: "shared" or "per-attacker"
    #[arg(long, default_value = "shared")]
    throttle: ThrottlePolicy,

    /// Draw remotes exactly at their last snapshot
    #[arg(long)]
    no_smoothing: bool,

    /// Start with hitboxes and the debug panel visible
    #[arg(long)]
    debug: bool,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Knight Arena".to_string(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }
    info!("Controls: WASD/arrows to move, Space to attack, R to respawn, F1 debug, Esc to leave");

    let (mut relay, network_thread) = match network::spawn(NetworkConfig {
        server_addr: args.server,
        fake_ping_ms: args.fake_ping,
    }) {
        Ok(spawned) => spawned,
        Err(e) => {
            error!("Failed to start networking: {}", e);
            return;
        }
    };

    let mut sync = SyncCoordinator::new(SyncConfig {
        nickname: args.nickname.clone(),
        throttle_policy: args.throttle,
        smoothing: !args.no_smoothing,
    });
    let mut input = InputManager::new();
    let mut renderer = Renderer::new();
    let mut render_config = RenderConfig {
        debug: args.debug,
        fake_ping_ms: args.fake_ping,
    };

    prevent_quit();
    let started = Instant::now();
    let mut last_frame = 0u64;

    loop {
        let now = started.elapsed().as_millis() as u64;
        let dt_ms = now - last_frame;
        last_frame = now;

        let frame = input.update();
        if frame.toggle_debug {
            render_config.debug = !render_config.debug;
            info!("Debug overlay: {}", render_config.debug);
        }

        for event in sync.tick(&mut relay, &frame, now, dt_ms) {
            match event {
                SessionEvent::Joined { room_id, .. } => info!("Entered {}", room_id),
                SessionEvent::LocalDied => info!("You have fallen"),
                SessionEvent::Disconnected(reason) => warn!("Lost the relay: {}", reason),
                other => log::debug!("{:?}", other),
            }
        }

        if frame.leave || is_quit_requested() {
            sync.leave(&mut relay);
            break;
        }

        renderer.render(&sync, &render_config);
        next_frame().await;
    }

    relay.shutdown();
    if network_thread.join().is_err() {
        error!("Network thread panicked");
    }
}
