//! Boundary between the tick thread and the relay connection.
//!
//! The tick never blocks on the network: calls go out through an unbounded
//! channel and everything the relay sends comes back as [`RelayEvent`]s,
//! drained at the start of the next tick in arrival order.

use log::warn;
use shared::{CallKind, CallReply, Notification, RemoteCall, StateSnapshot};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connected {
        account: String,
    },
    Disconnected {
        reason: String,
    },
    Reply {
        kind: CallKind,
        reply: CallReply,
        rtt_ms: u64,
    },
    Notify(Notification),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayCommand {
    Call(RemoteCall),
    Shutdown,
}

/// What the sync layer needs from a relay connection.
pub trait RelayEndpoint {
    /// Fire-and-forget call; the reply arrives later as a [`RelayEvent`].
    fn call(&mut self, call: RemoteCall);

    /// Everything received since the last poll, oldest first.
    fn poll(&mut self) -> Vec<RelayEvent>;
}

/// Channel pair owned by the tick thread.
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<RelayCommand>,
    events: mpsc::UnboundedReceiver<RelayEvent>,
}

impl RelayHandle {
    /// Creates the handle plus the ends the network task keeps.
    pub fn channel() -> (
        Self,
        mpsc::UnboundedReceiver<RelayCommand>,
        mpsc::UnboundedSender<RelayEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: command_tx,
                events: event_rx,
            },
            command_rx,
            event_tx,
        )
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(RelayCommand::Shutdown);
    }
}

impl RelayEndpoint for RelayHandle {
    fn call(&mut self, call: RemoteCall) {
        if let Err(e) = self.commands.send(RelayCommand::Call(call)) {
            warn!("Relay task is gone, dropping {:?}", e.0);
        }
    }

    fn poll(&mut self) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Rate limit for state pushes at the transport boundary. Pushes arriving
/// inside the interval are coalesced; only the newest is kept.
#[derive(Debug)]
pub struct PushThrottle {
    interval_ms: u64,
    last_sent: Option<u64>,
    pending: Option<StateSnapshot>,
}

impl PushThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sent: None,
            pending: None,
        }
    }

    fn ready(&self, now: u64) -> bool {
        match self.last_sent {
            Some(last) => now.saturating_sub(last) >= self.interval_ms,
            None => true,
        }
    }

    /// Returns the snapshot if it may go out now, otherwise parks it.
    pub fn offer(&mut self, snapshot: StateSnapshot, now: u64) -> Option<StateSnapshot> {
        if self.ready(now) {
            self.last_sent = Some(now);
            self.pending = None;
            Some(snapshot)
        } else {
            self.pending = Some(snapshot);
            None
        }
    }

    /// Releases the parked snapshot once the interval has passed.
    pub fn flush(&mut self, now: u64) -> Option<StateSnapshot> {
        if self.pending.is_some() && self.ready(now) {
            self.last_sent = Some(now);
            return self.pending.take();
        }
        None
    }

    /// Drops the parked snapshot without sending it.
    pub fn discard(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
