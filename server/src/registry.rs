//! Directory of currently connected players.
//!
//! A `Player` exists from successful login to disconnect and carries the
//! ephemeral state the protocol needs between messages: the outbound message
//! channel standing in for the socket, the live bio, the privacy flag, the
//! concurrent-session counter, and the bounded pending challenge and friend
//! request lists that gate accept/refuse actions.

use log::{info, warn};
use shared::Message;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// Outbound channel to one connection's writer task.
pub type Outbound = UnboundedSender<Message>;

/// One connected player.
#[derive(Debug)]
pub struct Player {
    pub name: String,
    pub conn_id: u32,
    pub sender: Outbound,
    pub bio: String,
    pub private: bool,
    /// Number of sessions this player is currently part of. A player may be
    /// challenged into several games at once, so this is a counter rather
    /// than a flag.
    pub session_count: u32,
    pending_challenges: Vec<String>,
    pending_friend_requests: Vec<String>,
}

impl Player {
    fn new(name: &str, conn_id: u32, sender: Outbound, bio: &str) -> Self {
        Self {
            name: name.to_string(),
            conn_id,
            sender,
            bio: bio.to_string(),
            private: false,
            session_count: 0,
            pending_challenges: Vec::new(),
            pending_friend_requests: Vec::new(),
        }
    }

    /// Queues a message for this player's connection. A closed channel means
    /// the writer task is gone; the read side will report the disconnect, so
    /// the failure is only logged here.
    pub fn send(&self, message: Message) {
        if self.sender.send(message).is_err() {
            warn!("Dropping message for '{}': connection gone", self.name);
        }
    }

    pub fn pending_challenges(&self) -> &[String] {
        &self.pending_challenges
    }

    pub fn pending_friend_requests(&self) -> &[String] {
        &self.pending_friend_requests
    }
}

/// Inserts `from` into a bounded, deduplicated pending list. An entry past
/// the cap is dropped silently, as is a duplicate.
fn record_pending(list: &mut Vec<String>, from: &str, cap: usize) -> bool {
    if list.iter().any(|entry| entry == from) {
        return false;
    }
    if list.len() >= cap {
        return false;
    }
    list.push(from.to_string());
    true
}

fn take_pending(list: &mut Vec<String>, from: &str) -> bool {
    match list.iter().position(|entry| entry == from) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

/// All connected players, keyed by their unique display name.
pub struct PlayerRegistry {
    players: HashMap<String, Player>,
    names_by_conn: HashMap<u32, String>,
    max_pending: usize,
}

impl PlayerRegistry {
    /// Creates a registry whose pending request lists cap at `max_pending`
    /// entries each.
    pub fn new(max_pending: usize) -> Self {
        Self {
            players: HashMap::new(),
            names_by_conn: HashMap::new(),
            max_pending,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    /// Registers a freshly logged-in player. Returns false (and changes
    /// nothing) when a player with that name is already connected.
    pub fn add(&mut self, name: &str, conn_id: u32, sender: Outbound, bio: &str) -> bool {
        if self.players.contains_key(name) {
            return false;
        }

        info!("Player '{}' joined (connection {})", name, conn_id);
        self.players
            .insert(name.to_string(), Player::new(name, conn_id, sender, bio));
        self.names_by_conn.insert(conn_id, name.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.get_mut(name)
    }

    pub fn name_of_conn(&self, conn_id: u32) -> Option<&str> {
        self.names_by_conn.get(&conn_id).map(String::as_str)
    }

    /// Deregisters a player, returning their final state so the caller can
    /// clean up sessions and pending references.
    pub fn remove(&mut self, name: &str) -> Option<Player> {
        let player = self.players.remove(name)?;
        self.names_by_conn.remove(&player.conn_id);
        info!("Player '{}' left", name);
        Some(player)
    }

    /// Connected player names in a stable order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.players.keys().cloned().collect();
        names.sort();
        names
    }

    /// Records a challenge from `from` on `target`'s pending list.
    pub fn record_challenge(&mut self, target: &str, from: &str) -> bool {
        let cap = self.max_pending;
        self.players
            .get_mut(target)
            .map(|p| record_pending(&mut p.pending_challenges, from, cap))
            .unwrap_or(false)
    }

    /// Consumes the pending challenge from `from` on `owner`'s list. This is
    /// the authorization gate for accepting or refusing a challenge: false
    /// means no matching entry existed and nothing changed.
    pub fn take_challenge(&mut self, owner: &str, from: &str) -> bool {
        self.players
            .get_mut(owner)
            .map(|p| take_pending(&mut p.pending_challenges, from))
            .unwrap_or(false)
    }

    /// Records a friend request from `from` on `target`'s pending list.
    pub fn record_friend_request(&mut self, target: &str, from: &str) -> bool {
        let cap = self.max_pending;
        self.players
            .get_mut(target)
            .map(|p| record_pending(&mut p.pending_friend_requests, from, cap))
            .unwrap_or(false)
    }

    /// Consumes the pending friend request from `from` on `owner`'s list.
    pub fn take_friend_request(&mut self, owner: &str, from: &str) -> bool {
        self.players
            .get_mut(owner)
            .map(|p| take_pending(&mut p.pending_friend_requests, from))
            .unwrap_or(false)
    }

    /// Drops every pending entry naming `departed` from every other player's
    /// lists. Run on disconnect so stale invitations cannot be accepted.
    pub fn purge_pending_from(&mut self, departed: &str) {
        for player in self.players.values_mut() {
            player.pending_challenges.retain(|name| name != departed);
            player
                .pending_friend_requests
                .retain(|name| name != departed);
        }
    }
}
