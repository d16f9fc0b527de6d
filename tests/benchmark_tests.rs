//! Performance benchmarks for the per-tick hot paths

use bincode::{deserialize, serialize};
use client::collision::{CollisionResolver, ThrottlePolicy};
use client::input::InputFrame;
use client::local::LocalActor;
use client::remote::RemoteActor;
use server::game::GameService;
use shared::{
    Notification, Packet, PlayerRecord, Rect, RemoteCall, StateSnapshot, Vec2, ATTACK_RANGE,
    HITBOX_HEIGHT,
};
use std::collections::BTreeMap;
use std::time::Instant;

fn remote_snapshot(i: u32) -> StateSnapshot {
    StateSnapshot {
        position: Some(Vec2::new(900.0 + (i % 10) as f32 * 30.0, 900.0 + (i / 10) as f32 * 30.0)),
        velocity: Some(Vec2::ZERO),
        health: Some(100),
        is_attacking: Some(i % 3 == 0),
        facing_left: Some(i % 2 == 0),
        ..StateSnapshot::default()
    }
    .with_identity(&format!("acc-{}", i), "")
}

/// Benchmarks rectangle overlap tests
#[test]
fn benchmark_hitbox_overlap() {
    let hitbox = Rect::new(Vec2::new(1040.0, 1000.0), ATTACK_RANGE, HITBOX_HEIGHT);
    let body = Rect::body_at(Vec2::new(1060.0, 1010.0));

    let iterations = 100_000;
    let start = Instant::now();

    let mut hits = 0;
    for _ in 0..iterations {
        if hitbox.overlaps(&body) {
            hits += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Hitbox overlap: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(hits, iterations);
    // Should complete in under 100ms for 100k iterations
    assert!(duration.as_millis() < 100);
}

/// Benchmarks a crowded melee: one local actor against 50 remotes
#[test]
fn benchmark_collision_resolution() {
    let mut local = LocalActor::new("me", "Me", Vec2::new(1000.0, 1000.0));
    let mut remotes: BTreeMap<String, RemoteActor> = (0..50)
        .map(|i| {
            let snapshot = remote_snapshot(i);
            let account = snapshot.account.clone().unwrap_or_default();
            let actor = RemoteActor::new(&account, &snapshot, true);
            (account, actor)
        })
        .collect();
    let mut resolver = CollisionResolver::new(ThrottlePolicy::PerAttacker);

    let iterations = 10_000u64;
    let start = Instant::now();

    for frame in 0..iterations {
        resolver.resolve(&mut local, &mut remotes, frame * 16);
    }

    let duration = start.elapsed();
    println!(
        "Collision resolution: {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks local simulation steps
#[test]
fn benchmark_local_simulation() {
    let mut local = LocalActor::new("me", "Me", Vec2::new(1000.0, 1000.0));
    let moves = [
        InputFrame {
            right: true,
            down: true,
            ..InputFrame::idle()
        },
        InputFrame {
            left: true,
            ..InputFrame::idle()
        },
        InputFrame {
            attack: true,
            ..InputFrame::idle()
        },
    ];

    let iterations = 100_000u64;
    let start = Instant::now();

    for frame in 0..iterations {
        local.tick(&moves[(frame % 3) as usize], frame * 16, 16);
    }

    let duration = start.elapsed();
    println!(
        "Local simulation: {} frames in {:?} ({:.2} ns/frame)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks applying relayed snapshots to remote actors
#[test]
fn benchmark_snapshot_merge() {
    let snapshots: Vec<StateSnapshot> = (0..50).map(remote_snapshot).collect();
    let mut remotes: Vec<RemoteActor> = snapshots
        .iter()
        .enumerate()
        .map(|(i, snapshot)| RemoteActor::new(&format!("acc-{}", i), snapshot, true))
        .collect();

    let iterations = 2_000;
    let start = Instant::now();

    for round in 0..iterations {
        for (remote, snapshot) in remotes.iter_mut().zip(&snapshots) {
            let mut moved = snapshot.clone();
            moved.position = snapshot.position.map(|p| Vec2::new(p.x + round as f32, p.y));
            remote.apply_snapshot(&moved);
            remote.tick(16);
        }
    }

    let duration = start.elapsed();
    println!(
        "Snapshot merge: {} players × {} rounds in {:?}",
        remotes.len(),
        iterations,
        duration
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks encoding the all-user-states feed for a full room
#[test]
fn benchmark_state_feed_serialization() {
    let states: Vec<StateSnapshot> = (0..32)
        .map(|i| {
            PlayerRecord::new(&format!("account-{:02}", i), "", Vec2::new(1000.0, 1000.0), 0)
                .to_snapshot()
        })
        .collect();
    let packet = Packet::Notify(Notification::AllUserStates { states });

    let iterations = 10_000;
    let start = Instant::now();

    let mut total_bytes = 0;
    for _ in 0..iterations {
        let data = serialize(&packet).unwrap();
        total_bytes += data.len();
        let _: Packet = deserialize(&data).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "State feed serialization: {} round trips in {:?} ({} bytes/packet)",
        iterations,
        duration,
        total_bytes / iterations
    );

    // A full room must still fit in one datagram buffer
    assert!(total_bytes / iterations < 8192);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Stress test: many players pushing state through the service
#[test]
fn stress_test_state_updates() {
    let mut service = GameService::with_seed(3);
    let accounts: Vec<String> = (0..32).map(|i| format!("acc-{}", i)).collect();
    for account in &accounts {
        service.handle_call(
            account,
            RemoteCall::JoinGame {
                nickname: String::new(),
            },
            0,
        );
    }

    let rounds = 1_000u64;
    let start = Instant::now();

    for round in 1..=rounds {
        for (i, account) in accounts.iter().enumerate() {
            let state = StateSnapshot {
                position: Some(Vec2::new(i as f32 * 10.0, round as f32 % 2000.0)),
                health: Some(100),
                ..StateSnapshot::default()
            };
            service.handle_call(account, RemoteCall::UpdatePlayerState { state }, round * 33);
        }
        assert!(service.publish_states().is_some());
    }

    let duration = start.elapsed();
    println!(
        "State updates: {} players × {} rounds in {:?}",
        accounts.len(),
        rounds,
        duration
    );

    assert_eq!(service.room().len(), 32);
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
