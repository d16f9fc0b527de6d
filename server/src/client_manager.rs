//! Connection bookkeeping for the relay.
//!
//! Every UDP peer that completes the `Connect` handshake is issued an opaque
//! account identifier. The manager maps accounts to addresses, enforces the
//! capacity limit and reports peers that went silent.

use log::info;
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const ACCOUNT_LEN: usize = 16;

/// A connected peer.
#[derive(Debug)]
pub struct Client {
    pub account: String,
    pub addr: SocketAddr,
    /// Last time any packet arrived from this peer.
    pub last_seen: Instant,
}

impl Client {
    pub fn new(account: String, addr: SocketAddr) -> Self {
        Self {
            account,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct ClientManager {
    clients: HashMap<String, Client>,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            timeout,
        }
    }

    /// Registers a peer and issues its account. Returns None when full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<String> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let account = loop {
            let candidate = generate_account();
            if !self.clients.contains_key(&candidate) {
                break candidate;
            }
        };

        info!("Client {} connected from {}", account, addr);
        self.clients
            .insert(account.clone(), Client::new(account.clone(), addr));
        Some(account)
    }

    pub fn remove_client(&mut self, account: &str) -> bool {
        if let Some(client) = self.clients.remove(account) {
            info!("Client {} disconnected", client.account);
            true
        } else {
            false
        }
    }

    pub fn find_account_by_addr(&self, addr: SocketAddr) -> Option<String> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.account.clone())
    }

    pub fn addr_of(&self, account: &str) -> Option<SocketAddr> {
        self.clients.get(account).map(|client| client.addr)
    }

    /// Marks the peer at `addr` as alive. Returns its account if known.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<String> {
        let client = self.clients.values_mut().find(|client| client.addr == addr)?;
        client.touch();
        Some(client.account.clone())
    }

    /// Removes every peer that has been silent longer than the timeout and
    /// returns their accounts.
    pub fn check_timeouts(&mut self) -> Vec<String> {
        let timeout = self.timeout;
        let timed_out: Vec<String> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.account.clone())
            .collect();

        for account in &timed_out {
            self.remove_client(account);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn generate_account() -> String {
    let mut rng = rand::thread_rng();
    (0..ACCOUNT_LEN)
        .map(|_| format!("{:x}", rng.gen_range(0..16u8)))
        .collect()
}
