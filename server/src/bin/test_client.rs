//! Headless bot for exercising a running relay.
//!
//! Connects, joins the arena, walks in a circle while pushing its state and
//! logs every notification the relay sends back.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{info, warn};
use shared::{
    CallReply, CombatState, Notification, Packet, RemoteCall, StateSnapshot, Vec2,
    MAX_DATAGRAM_SIZE, PLAYER_SPEED, PROTOCOL_VERSION, STATE_PUSH_INTERVAL_MS,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Headless arena bot")]
struct Args {
    /// Relay address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,
    /// Seconds to stay in the arena
    #[clap(short, long, default_value = "10")]
    duration: u64,
    /// Nickname to join with
    #[clap(short, long, default_value = "Bot")]
    nickname: String,
}

async fn send(
    socket: &UdpSocket,
    addr: SocketAddr,
    packet: &Packet,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&serialize(packet)?, addr).await?;
    Ok(())
}

async fn recv(socket: &UdpSocket, buf: &mut [u8], wait: Duration) -> Option<Packet> {
    match timeout(wait, socket.recv_from(buf)).await {
        Ok(Ok((len, _))) => deserialize::<Packet>(&buf[..len]).ok(),
        _ => None,
    }
}

fn log_packet(packet: &Packet) {
    match packet {
        Packet::Reply { request_id, reply } => match reply {
            CallReply::Failed { message } => warn!("Call {} failed: {}", request_id, message),
            other => info!("Call {} -> {:?}", request_id, other),
        },
        Packet::Notify(Notification::AllUserStates { states }) => {
            for state in states {
                info!(
                    "  {} hp={:?} pos={:?}",
                    state.nickname.as_deref().unwrap_or("?"),
                    state.health,
                    state.position
                );
            }
        }
        Packet::Notify(notification) => info!("Notification: {:?}", notification),
        other => info!("Packet: {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Bot socket bound to {}", socket.local_addr()?);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    send(
        &socket,
        args.server,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
    )
    .await?;

    let account = match recv(&socket, &mut buf, Duration::from_secs(2)).await {
        Some(Packet::Connected { account }) => account,
        other => {
            warn!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };
    info!("Connected as {}", account);

    let mut request_id = 1;
    send(
        &socket,
        args.server,
        &Packet::Call {
            request_id,
            call: RemoteCall::JoinGame {
                nickname: args.nickname.clone(),
            },
        },
    )
    .await?;

    let mut state = CombatState::default();
    while let Some(packet) = recv(&socket, &mut buf, Duration::from_secs(2)).await {
        log_packet(&packet);
        if let Packet::Reply {
            reply: CallReply::Joined { position, .. },
            ..
        } = packet
        {
            state = CombatState::spawned_at(position);
            break;
        }
    }

    let started = Instant::now();
    let step = Duration::from_millis(STATE_PUSH_INTERVAL_MS);
    while started.elapsed() < Duration::from_secs(args.duration) {
        let angle = started.elapsed().as_secs_f32();
        state.velocity = Vec2::new(angle.cos(), angle.sin()).scale(PLAYER_SPEED);
        state.position = state.position.add(&state.velocity.scale(step.as_secs_f32()));
        state.facing_left = state.velocity.x < 0.0;

        request_id += 1;
        send(
            &socket,
            args.server,
            &Packet::Call {
                request_id,
                call: RemoteCall::UpdatePlayerState {
                    state: StateSnapshot::from_state(&state),
                },
            },
        )
        .await?;
        send(&socket, args.server, &Packet::Heartbeat).await?;

        let deadline = Instant::now() + step;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match recv(&socket, &mut buf, remaining).await {
                Some(packet) => log_packet(&packet),
                None => break,
            }
        }
    }

    request_id += 1;
    send(
        &socket,
        args.server,
        &Packet::Call {
            request_id,
            call: RemoteCall::LeaveGame,
        },
    )
    .await?;
    send(&socket, args.server, &Packet::Disconnect).await?;
    info!("Bot finished");

    Ok(())
}
