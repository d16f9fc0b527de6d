//! Relay network layer: UDP transport, call dispatch and the state feed.

use crate::client_manager::ClientManager;
use crate::game::{Dispatch, GameService};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{CallReply, Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),
}

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { account: String },
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    SendToMany { packet: Packet, addrs: Vec<SocketAddr> },
}

pub struct ServerConfig {
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(33),
            max_clients: 32,
            client_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    service: GameService,
    tick_duration: Duration,
    started: Instant,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Relay listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            service: GameService::new(),
            tick_duration: config.tick_duration,
            started: Instant::now(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Milliseconds since the relay started.
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToMany { packet, addrs } => {
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast: {}", e);
                                continue;
                            }
                        };
                        if data.len() > MAX_DATAGRAM_SIZE {
                            error!(
                                "Broadcast of {} bytes exceeds the datagram limit, dropping",
                                data.len()
                            );
                            continue;
                        }
                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for account in timed_out {
                    warn!("Client {} timed out", account);
                    if server_tx
                        .send(ServerMessage::ClientTimeout { account })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Resolves a dispatch to concrete addresses and queues it.
    async fn route(&self, dispatch: Dispatch) {
        let clients = self.clients.read().await;
        match dispatch {
            Dispatch::ToUser {
                account,
                notification,
            } => match clients.addr_of(&account) {
                Some(addr) => self.send_packet(Packet::Notify(notification), addr),
                None => debug!("Dropping notification for offline {}", account),
            },
            Dispatch::ToRoom { notification } => {
                let addrs: Vec<SocketAddr> = self
                    .service
                    .room()
                    .members()
                    .iter()
                    .filter_map(|member| clients.addr_of(member))
                    .collect();
                if addrs.is_empty() {
                    return;
                }
                if let Err(e) = self.game_tx.send(GameMessage::SendToMany {
                    packet: Packet::Notify(notification),
                    addrs,
                }) {
                    error!("Failed to queue room notification: {}", e);
                }
            }
        }
    }

    async fn route_all(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            self.route(dispatch).await;
        }
    }

    async fn drop_account(&mut self, account: &str) {
        let dispatches = self.service.disconnect(account);
        self.route_all(dispatches).await;
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!("Client connecting from {} (version: {})", addr, client_version);

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let existing = {
                    let clients = self.clients.read().await;
                    clients.find_account_by_addr(addr)
                };
                if let Some(account) = existing {
                    info!("Replacing existing session {} from {}", account, addr);
                    self.clients.write().await.remove_client(&account);
                    self.drop_account(&account).await;
                }

                let account = self.clients.write().await.add_client(addr);
                let response = match account {
                    Some(account) => Packet::Connected { account },
                    None => Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_packet(response, addr);
            }

            Packet::Call { request_id, call } => {
                let account = self.clients.write().await.touch(addr);
                let Some(account) = account else {
                    self.send_packet(
                        Packet::Reply {
                            request_id,
                            reply: CallReply::Failed {
                                message: "not connected".to_string(),
                            },
                        },
                        addr,
                    );
                    return;
                };

                let now = self.now_ms();
                let outcome = self.service.handle_call(&account, call, now);
                self.send_packet(
                    Packet::Reply {
                        request_id,
                        reply: outcome.reply,
                    },
                    addr,
                );
                self.route_all(outcome.dispatches).await;
            }

            Packet::Heartbeat => {
                self.clients.write().await.touch(addr);
            }

            Packet::Disconnect => {
                let account = {
                    let clients = self.clients.read().await;
                    clients.find_account_by_addr(addr)
                };
                if let Some(account) = account {
                    self.drop_account(&account).await;
                    self.clients.write().await.remove_client(&account);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn publish_states(&mut self) {
        if let Some(dispatch) = self.service.publish_states() {
            self.route(dispatch).await;
        }
    }

    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        info!("Relay started");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(ServerMessage::ClientTimeout { account }) => {
                            self.drop_account(&account).await;
                        }
                        None => {
                            info!("Relay shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    tick += 1;
                    self.publish_states().await;

                    if tick % 300 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} in room",
                                tick,
                                client_count,
                                self.service.room().len()
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Notification, RemoteCall};
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    async fn test_server() -> Server {
        tokio_test::assert_ok!(Server::new("127.0.0.1:0", ServerConfig::default()).await)
    }

    fn notification_of(message: &GameMessage) -> Option<&Notification> {
        let packet = match message {
            GameMessage::SendPacket { packet, .. } => packet,
            GameMessage::SendToMany { packet, .. } => packet,
        };
        match packet {
            Packet::Notify(notification) => Some(notification),
            _ => None,
        }
    }

    fn drain(server: &mut Server) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    async fn connect(server: &mut Server, addr: SocketAddr) -> String {
        server
            .handle_packet(
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                },
                addr,
            )
            .await;
        match drain(server).pop() {
            Some(GameMessage::SendPacket {
                packet: Packet::Connected { account },
                ..
            }) => account,
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_issues_account() {
        let mut server = test_server().await;
        let account = connect(&mut server, peer(9001)).await;
        assert!(!account.is_empty());
        assert_eq!(server.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_wrong_version() {
        let mut server = test_server().await;
        server
            .handle_packet(Packet::Connect { client_version: 999 }, peer(9001))
            .await;

        match drain(&mut server).pop() {
            Some(GameMessage::SendPacket {
                packet: Packet::Disconnected { reason },
                ..
            }) => assert!(reason.contains("version")),
            other => panic!("Unexpected message: {:?}", other),
        }
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_call_without_connect_fails_soft() {
        let mut server = test_server().await;
        server
            .handle_packet(
                Packet::Call {
                    request_id: 3,
                    call: RemoteCall::GetAllPlayers,
                },
                peer(9001),
            )
            .await;

        match drain(&mut server).pop() {
            Some(GameMessage::SendPacket {
                packet: Packet::Reply { request_id, reply },
                ..
            }) => {
                assert_eq!(request_id, 3);
                assert!(!reply.is_success());
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_replies_and_notifies_room() {
        let mut server = test_server().await;
        let addr = peer(9001);
        connect(&mut server, addr).await;

        server
            .handle_packet(
                Packet::Call {
                    request_id: 1,
                    call: RemoteCall::JoinGame {
                        nickname: "Sir".to_string(),
                    },
                },
                addr,
            )
            .await;

        let messages = drain(&mut server);
        assert!(matches!(
            messages.first(),
            Some(GameMessage::SendPacket {
                packet: Packet::Reply {
                    request_id: 1,
                    reply: CallReply::Joined { .. }
                },
                ..
            })
        ));
        assert!(messages
            .iter()
            .filter_map(notification_of)
            .any(|n| matches!(n, Notification::RoomState { users } if users.len() == 1)));

        server.publish_states().await;
        let feed = drain(&mut server);
        assert!(matches!(
            feed.first().and_then(notification_of),
            Some(Notification::AllUserStates { .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_leaves_room() {
        let mut server = test_server().await;
        let addr = peer(9001);
        connect(&mut server, addr).await;
        server
            .handle_packet(
                Packet::Call {
                    request_id: 1,
                    call: RemoteCall::JoinGame {
                        nickname: String::new(),
                    },
                },
                addr,
            )
            .await;
        drain(&mut server);

        server.handle_packet(Packet::Disconnect, addr).await;

        assert!(server.service.room().is_empty());
        assert!(server.clients.read().await.is_empty());
    }
}
