//! UDP connection to the relay, run on its own tokio runtime.
//!
//! The render thread only ever sees the [`RelayHandle`] returned by
//! [`spawn`]; this task owns the socket, numbers the calls, pairs replies
//! with their call kind and measures round-trip time.

use crate::relay::{PushThrottle, RelayCommand, RelayEvent, RelayHandle};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{
    CallKind, Packet, RemoteCall, StateSnapshot, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION,
    STATE_PUSH_INTERVAL_MS,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Calls that never got a reply are forgotten after this long.
const PENDING_CALL_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub server_addr: SocketAddr,
    /// Artificial latency; half is added on send and half on receive.
    pub fake_ping_ms: u64,
}

pub struct RelayClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    fake_ping_ms: u64,
    connected: bool,

    next_request_id: u32,
    pending: HashMap<u32, (CallKind, Instant)>,
    push_throttle: PushThrottle,
    started: Instant,

    commands: mpsc::UnboundedReceiver<RelayCommand>,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayClient {
    pub async fn new(
        config: NetworkConfig,
        commands: mpsc::UnboundedReceiver<RelayCommand>,
        events: mpsc::UnboundedSender<RelayEvent>,
    ) -> Result<Self, ClientError> {
        let bind_addr = if config.server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(RelayClient {
            socket,
            server_addr: config.server_addr,
            fake_ping_ms: config.fake_ping_ms,
            connected: false,
            next_request_id: 1,
            pending: HashMap::new(),
            push_throttle: PushThrottle::new(STATE_PUSH_INTERVAL_MS),
            started: Instant::now(),
            commands,
            events,
        })
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn connect(&self) -> Result<(), ClientError> {
        info!("Connecting to relay at {}...", self.server_addr);
        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await
    }

    async fn send_call(&mut self, call: RemoteCall) -> Result<(), ClientError> {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        self.pending.insert(request_id, (call.kind(), Instant::now()));

        self.send_packet(&Packet::Call { request_id, call }).await
    }

    async fn push_state(&mut self, state: StateSnapshot) -> Result<(), ClientError> {
        self.send_call(RemoteCall::UpdatePlayerState { state }).await
    }

    async fn handle_command(&mut self, command: RelayCommand) -> Result<(), ClientError> {
        match command {
            RelayCommand::Call(call) => {
                if !self.connected {
                    debug!("Not connected, dropping {:?}", call.kind());
                    return Ok(());
                }
                match call {
                    RemoteCall::UpdatePlayerState { state } => {
                        let now = self.now_ms();
                        if let Some(state) = self.push_throttle.offer(state, now) {
                            self.push_state(state).await?;
                        }
                    }
                    RemoteCall::RespawnPlayer => {
                        // A parked push predates the respawn and would overwrite
                        // the fresh record with the dead state.
                        if self.push_throttle.discard() {
                            debug!("Discarded parked state push before respawn");
                        }
                        self.send_call(RemoteCall::RespawnPlayer).await?;
                    }
                    call => self.send_call(call).await?,
                }
            }
            RelayCommand::Shutdown => {}
        }
        Ok(())
    }

    /// Returns false once the tick thread is gone.
    fn handle_packet(&mut self, packet: Packet) -> bool {
        let event = match packet {
            Packet::Connected { account } => {
                info!("Connected! Account: {}", account);
                self.connected = true;
                RelayEvent::Connected { account }
            }
            Packet::Reply { request_id, reply } => {
                let Some((kind, sent_at)) = self.pending.remove(&request_id) else {
                    debug!("Reply for unknown request {}", request_id);
                    return true;
                };
                RelayEvent::Reply {
                    kind,
                    reply,
                    rtt_ms: sent_at.elapsed().as_millis() as u64,
                }
            }
            Packet::Notify(notification) => RelayEvent::Notify(notification),
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.pending.clear();
                RelayEvent::Disconnected { reason }
            }
            other => {
                warn!("Unexpected packet type: {:?}", other);
                return true;
            }
        };

        self.events.send(event).is_ok()
    }

    fn prune_pending(&mut self) {
        let before = self.pending.len();
        self.pending
            .retain(|_, (_, sent_at)| sent_at.elapsed() < PENDING_CALL_TTL);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!("Dropped {} unanswered calls", dropped);
        }
    }

    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.connect().await?;

        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; the connect above covers it.
        heartbeat.tick().await;
        let mut flush = interval(Duration::from_millis(STATE_PUSH_INTERVAL_MS));
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) => {
                            if addr != self.server_addr {
                                debug!("Ignoring datagram from {}", addr);
                                continue;
                            }
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[..len]) {
                                Ok(packet) => {
                                    if !self.handle_packet(packet) {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                command = self.commands.recv() => {
                    match command {
                        Some(RelayCommand::Shutdown) | None => break,
                        Some(command) => {
                            if let Err(e) = self.handle_command(command).await {
                                error!("Error sending call: {}", e);
                            }
                        }
                    }
                },

                _ = heartbeat.tick() => {
                    let result = if self.connected {
                        self.send_packet(&Packet::Heartbeat).await
                    } else {
                        self.connect().await
                    };
                    if let Err(e) = result {
                        error!("Error sending heartbeat: {}", e);
                    }
                    self.prune_pending();
                },

                _ = flush.tick() => {
                    let now = self.now_ms();
                    if let Some(state) = self.push_throttle.flush(now) {
                        if let Err(e) = self.push_state(state).await {
                            error!("Error pushing state: {}", e);
                        }
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
            info!("Disconnected from relay");
        }

        Ok(())
    }
}

/// Starts the relay connection on a background thread with its own runtime.
pub fn spawn(config: NetworkConfig) -> Result<(RelayHandle, JoinHandle<()>), ClientError> {
    let (handle, commands, events) = RelayHandle::channel();

    let thread = std::thread::Builder::new()
        .name("relay".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start network runtime: {}", e);
                    let _ = events.send(RelayEvent::Disconnected {
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            runtime.block_on(async move {
                let result = match RelayClient::new(config, commands, events.clone()).await {
                    Ok(mut client) => client.run().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    error!("Relay connection failed: {}", e);
                    let _ = events.send(RelayEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            });
        })?;

    Ok((handle, thread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{CallReply, Notification};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct FakeRelay {
        socket: UdpSocket,
    }

    impl FakeRelay {
        async fn bind() -> Self {
            Self {
                socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            }
        }

        fn addr(&self) -> SocketAddr {
            self.socket.local_addr().unwrap()
        }

        async fn recv(&self) -> (Packet, SocketAddr) {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
            let (len, addr) = timeout(WAIT, self.socket.recv_from(&mut buffer))
                .await
                .expect("timed out waiting for the client")
                .unwrap();
            (deserialize(&buffer[..len]).unwrap(), addr)
        }

        /// Next packet that is not a heartbeat or a repeated connect.
        async fn recv_call(&self) -> (u32, RemoteCall) {
            loop {
                match self.recv().await.0 {
                    Packet::Call { request_id, call } => return (request_id, call),
                    Packet::Heartbeat | Packet::Connect { .. } => continue,
                    other => panic!("unexpected packet {:?}", other),
                }
            }
        }

        async fn send(&self, packet: &Packet, to: SocketAddr) {
            let data = serialize(packet).unwrap();
            self.socket.send_to(&data, to).await.unwrap();
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<RelayEvent>) -> RelayEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Client task connected to a fake relay, plus the channel ends the tick
    /// thread would hold.
    async fn connected_client() -> (
        FakeRelay,
        SocketAddr,
        mpsc::UnboundedSender<RelayCommand>,
        mpsc::UnboundedReceiver<RelayEvent>,
    ) {
        let relay = FakeRelay::bind().await;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let config = NetworkConfig {
            server_addr: relay.addr(),
            fake_ping_ms: 0,
        };
        let mut client = RelayClient::new(config, command_rx, event_tx)
            .await
            .unwrap();
        tokio::spawn(async move {
            client.run().await.unwrap();
        });

        let (packet, client_addr) = relay.recv().await;
        assert_eq!(
            packet,
            Packet::Connect {
                client_version: PROTOCOL_VERSION
            }
        );
        relay
            .send(
                &Packet::Connected {
                    account: "acc-1".to_string(),
                },
                client_addr,
            )
            .await;
        assert_eq!(
            next_event(&mut event_rx).await,
            RelayEvent::Connected {
                account: "acc-1".to_string()
            }
        );

        (relay, client_addr, command_tx, event_rx)
    }

    #[tokio::test]
    async fn test_reply_carries_call_kind() {
        let (relay, client_addr, commands, mut events) = connected_client().await;

        commands
            .send(RelayCommand::Call(RemoteCall::GetAllPlayers))
            .unwrap();
        let (request_id, call) = relay.recv_call().await;
        assert_eq!(call, RemoteCall::GetAllPlayers);

        relay
            .send(
                &Packet::Reply {
                    request_id,
                    reply: CallReply::Players { players: vec![] },
                },
                client_addr,
            )
            .await;

        match next_event(&mut events).await {
            RelayEvent::Reply { kind, reply, .. } => {
                assert_eq!(kind, CallKind::GetAllPlayers);
                assert_eq!(reply, CallReply::Players { players: vec![] });
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_reply_is_dropped() {
        let (relay, client_addr, _commands, mut events) = connected_client().await;

        relay
            .send(
                &Packet::Reply {
                    request_id: 999,
                    reply: CallReply::Left,
                },
                client_addr,
            )
            .await;
        relay
            .send(
                &Packet::Notify(Notification::UserLeft {
                    account: "acc-2".to_string(),
                }),
                client_addr,
            )
            .await;

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::Notify(Notification::UserLeft {
                account: "acc-2".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_state_pushes_are_coalesced() {
        let (relay, _client_addr, commands, _events) = connected_client().await;

        for health in [100, 90, 80] {
            let state = StateSnapshot {
                health: Some(health),
                ..StateSnapshot::default()
            };
            commands
                .send(RelayCommand::Call(RemoteCall::UpdatePlayerState { state }))
                .unwrap();
        }

        let healths: Vec<Option<u32>> = {
            let mut seen = Vec::new();
            while seen.len() < 2 {
                if let (_, RemoteCall::UpdatePlayerState { state }) = relay.recv_call().await {
                    seen.push(state.health);
                }
            }
            seen
        };
        assert_eq!(healths, vec![Some(100), Some(80)]);
    }

    #[tokio::test]
    async fn test_respawn_discards_parked_dead_push() {
        let (relay, _client_addr, commands, _events) = connected_client().await;

        for health in [20, 0] {
            let state = StateSnapshot {
                health: Some(health),
                ..StateSnapshot::default()
            };
            commands
                .send(RelayCommand::Call(RemoteCall::UpdatePlayerState { state }))
                .unwrap();
        }
        commands
            .send(RelayCommand::Call(RemoteCall::RespawnPlayer))
            .unwrap();

        match relay.recv_call().await {
            (_, RemoteCall::UpdatePlayerState { state }) => assert_eq!(state.health, Some(20)),
            (_, other) => panic!("unexpected call {:?}", other),
        }
        assert_eq!(relay.recv_call().await.1, RemoteCall::RespawnPlayer);

        let late = timeout(
            Duration::from_millis(3 * STATE_PUSH_INTERVAL_MS),
            relay.recv_call(),
        )
        .await;
        assert!(late.is_err(), "dead state pushed after respawn: {:?}", late);
    }

    #[tokio::test]
    async fn test_large_state_feed_is_delivered() {
        let (relay, client_addr, _commands, mut events) = connected_client().await;

        let nickname = "n".repeat(250);
        let states: Vec<StateSnapshot> = (0..32)
            .map(|i| StateSnapshot::default().with_identity(&format!("{:016x}", i), &nickname))
            .collect();
        let feed = Packet::Notify(Notification::AllUserStates {
            states: states.clone(),
        });
        assert!(serialize(&feed).unwrap().len() > 8192);

        relay.send(&feed, client_addr).await;

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::Notify(Notification::AllUserStates { states })
        );
    }

    #[tokio::test]
    async fn test_shutdown_sends_disconnect() {
        let (relay, _client_addr, commands, _events) = connected_client().await;

        commands.send(RelayCommand::Shutdown).unwrap();

        loop {
            match relay.recv().await.0 {
                Packet::Disconnect => break,
                Packet::Heartbeat => continue,
                other => panic!("unexpected packet {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_relay_disconnect_is_reported() {
        let (relay, client_addr, _commands, mut events) = connected_client().await;

        relay
            .send(
                &Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                client_addr,
            )
            .await;

        assert_eq!(
            next_event(&mut events).await,
            RelayEvent::Disconnected {
                reason: "Server full".to_string()
            }
        );
    }
}
