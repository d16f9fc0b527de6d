//! Room state store for the relay.
//!
//! A room is a membership list plus one [`PlayerRecord`] per member. The
//! store only keeps and hands out state; all gameplay decisions stay with the
//! clients and the call handlers in `game`.

use log::{debug, info};
use shared::{PlayerRecord, StateSnapshot, Vec2};
use std::collections::HashMap;

pub struct Room {
    id: String,
    /// Members in join order.
    members: Vec<String>,
    records: HashMap<String, PlayerRecord>,
    /// Set whenever a record changes; cleared when the state feed is published.
    dirty: bool,
}

impl Room {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            members: Vec::new(),
            records: HashMap::new(),
            dirty: false,
        }
    }

    /// Grants membership. Joining twice is harmless and returns the same id.
    /// Returns whether the account was newly added alongside the room id.
    pub fn join(&mut self, account: &str) -> (String, bool) {
        let added = if self.is_member(account) {
            false
        } else {
            self.members.push(account.to_string());
            info!("{} joined room {}", account, self.id);
            true
        };
        (self.id.clone(), added)
    }

    /// Drops membership and the stored record. Returns false if the account
    /// was not a member.
    pub fn leave(&mut self, account: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != account);
        if self.records.remove(account).is_some() {
            self.dirty = true;
        }

        let removed = self.members.len() != before;
        if removed {
            info!("{} left room {}", account, self.id);
        }
        removed
    }

    pub fn is_member(&self, account: &str) -> bool {
        self.members.iter().any(|member| member == account)
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Creates or replaces the caller's record wholesale.
    pub fn put_state(&mut self, record: PlayerRecord) {
        self.records.insert(record.account.clone(), record);
        self.dirty = true;
    }

    /// Sparse upsert of the caller's own state. Returns false when the caller
    /// has no record to merge into.
    pub fn update_self_state(&mut self, account: &str, snapshot: &StateSnapshot, now: u64) -> bool {
        match self.records.get_mut(account) {
            Some(record) => {
                record.apply(snapshot, now);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Sparse update of another member's record, used to deliver damage.
    pub fn update_user_state(&mut self, account: &str, patch: &StateSnapshot, now: u64) -> bool {
        let updated = self.update_self_state(account, patch, now);
        if updated {
            debug!("Patched state of {}", account);
        }
        updated
    }

    pub fn get_user_state(&self, account: &str) -> Option<&PlayerRecord> {
        self.records.get(account)
    }

    /// All records of current members, in join order.
    pub fn get_all_user_states(&self) -> Vec<&PlayerRecord> {
        self.members
            .iter()
            .filter_map(|member| self.records.get(member))
            .collect()
    }

    pub fn respawn(&mut self, account: &str, position: Vec2, now: u64) -> bool {
        let patch = StateSnapshot {
            health: Some(shared::MAX_HEALTH),
            position: Some(position),
            is_attacking: Some(false),
            ..StateSnapshot::default()
        };
        self.update_self_state(account, &patch, now)
    }

    /// Returns whether anything changed since the last call and resets the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
