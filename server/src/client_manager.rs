//! Connection registry for the quiz server
//!
//! This module tracks every open connection, including:
//! - Identity assignment for new connections
//! - The player record attached once a connection joins
//! - Liveness tracking and timeout cleanup
//! - Best-effort fan-out of server messages to every connection
//!
//! Each connection owns a bounded outbox drained by its own writer task, so a
//! slow or dead client only ever loses its own messages.

use log::{debug, error, info, warn};
use rand::Rng;
use shared::{Player, PlayerId, ServerMessage, Tag};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LENGTH: usize = 9;
/// Give up on finding a free identity after this many collisions
const MAX_ID_ATTEMPTS: usize = 64;

/// Outbound queue of serialized frames for one connection
pub type Outbox = mpsc::Sender<String>;

/// Generates a random 9-character base-36 identity.
pub fn random_player_id() -> PlayerId {
    let mut rng = rand::thread_rng();
    let id: String = (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    PlayerId(id)
}

/// One open connection and, once it has joined, its player record
#[derive(Debug)]
pub struct Client {
    pub id: PlayerId,
    /// Last time we received any frame from this connection
    pub last_seen: Instant,
    pub outbox: Outbox,
    pub player: Option<Player>,
    /// Position in join order, used to keep the player list stable
    join_seq: u64,
}

impl Client {
    pub fn new(id: PlayerId, outbox: Outbox) -> Self {
        Self {
            id,
            last_seen: Instant::now(),
            outbox,
            player: None,
            join_seq: 0,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.player.is_some()
    }

    /// Returns true if nothing was heard from this connection within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Queues a frame without waiting. Returns false if it was dropped.
    fn deliver(&self, frame: String) -> bool {
        match self.outbox.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(
                    "Send queue full for client {}, dropping {} byte message",
                    self.id,
                    frame.len()
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Client {} outbox closed", self.id);
                false
            }
        }
    }
}

/// Manages all open connections and their player records
pub struct ClientManager {
    clients: HashMap<PlayerId, Client>,
    next_join_seq: u64,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_join_seq: 1,
            max_clients,
        }
    }

    /// Registers a connection under a fresh random identity.
    ///
    /// Returns None if the server is at capacity.
    pub fn register(&mut self, outbox: Outbox) -> Option<PlayerId> {
        self.register_with(outbox, random_player_id)
    }

    /// Registers a connection, drawing identities from `generate` until one
    /// is not held by another connection.
    pub fn register_with<F>(&mut self, outbox: Outbox, mut generate: F) -> Option<PlayerId>
    where
        F: FnMut() -> PlayerId,
    {
        if self.clients.len() >= self.max_clients {
            warn!("Rejecting connection, server full ({} clients)", self.max_clients);
            return None;
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate();
            if self.clients.contains_key(&id) {
                debug!("Identity {} already taken, drawing another", id);
                continue;
            }

            info!("Client {} connected", id);
            self.clients.insert(id.clone(), Client::new(id.clone(), outbox));
            return Some(id);
        }

        error!("No free identity after {} attempts", MAX_ID_ATTEMPTS);
        None
    }

    /// Attaches a player record to a connection.
    ///
    /// A second join from the same connection renames the player and keeps
    /// their score. Returns Some(true) on first join, Some(false) on rename,
    /// None for an unknown connection.
    pub fn join(&mut self, id: &PlayerId, name: &str) -> Option<bool> {
        let client = self.clients.get_mut(id)?;
        client.last_seen = Instant::now();

        match client.player.as_mut() {
            Some(player) => {
                info!("Player {} renamed from {:?} to {:?}", id, player.name, name);
                player.name = name.to_string();
                Some(false)
            }
            None => {
                info!("Player {} joined as {:?}", id, name);
                client.player = Some(Player::new(id.clone(), name));
                client.join_seq = self.next_join_seq;
                self.next_join_seq += 1;
                Some(true)
            }
        }
    }

    /// Removes a connection, returning it if it existed.
    pub fn remove(&mut self, id: &PlayerId) -> Option<Client> {
        let client = self.clients.remove(id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Refreshes the liveness timestamp of a connection
    pub fn touch(&mut self, id: &PlayerId) {
        if let Some(client) = self.clients.get_mut(id) {
            client.last_seen = Instant::now();
        }
    }

    /// Removes connections silent for longer than `timeout` and returns them.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        timed_out
            .iter()
            .filter_map(|id| {
                info!("Client {} timed out", id);
                self.remove(id)
            })
            .collect()
    }

    pub fn is_joined(&self, id: &PlayerId) -> bool {
        self.clients.get(id).is_some_and(Client::is_joined)
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.clients.get(id).and_then(|client| client.player.as_ref())
    }

    /// Joined players in join order
    pub fn snapshot(&self) -> Vec<Player> {
        let mut joined: Vec<&Client> = self.clients.values().filter(|c| c.is_joined()).collect();
        joined.sort_by_key(|client| client.join_seq);
        joined
            .into_iter()
            .filter_map(|client| client.player.clone())
            .collect()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.clients
            .values_mut()
            .filter_map(|client| client.player.as_mut())
    }

    pub fn set_answer(&mut self, id: &PlayerId, tag: Tag) {
        if let Some(player) = self.clients.get_mut(id).and_then(|c| c.player.as_mut()) {
            player.answer = Some(tag);
        }
    }

    pub fn clear_answers(&mut self) {
        for player in self.players_mut() {
            player.answer = None;
        }
    }

    /// Sends a message to one connection
    pub fn send_to(&self, id: &PlayerId, message: &ServerMessage) -> bool {
        let Some(client) = self.clients.get(id) else {
            return false;
        };
        match serde_json::to_string(message) {
            Ok(frame) => client.deliver(frame),
            Err(e) => {
                error!("Failed to serialize {} message: {}", message.kind(), e);
                false
            }
        }
    }

    /// Sends a message to every connection, joined or not.
    ///
    /// Returns the number of connections the message was queued for.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {} message: {}", message.kind(), e);
                return 0;
            }
        };

        let delivered = self
            .clients
            .values()
            .filter(|client| client.deliver(frame.clone()))
            .count();
        debug!(
            "Broadcast {} to {}/{} clients",
            message.kind(),
            delivered,
            self.clients.len()
        );
        delivered
    }

    /// Number of open connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of connections that have joined as players
    pub fn player_count(&self) -> usize {
        self.clients.values().filter(|c| c.is_joined()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> (Outbox, mpsc::Receiver<String>) {
        mpsc::channel(8)
    }

    fn sequence(ids: &[&str]) -> impl FnMut() -> PlayerId {
        let mut ids: Vec<PlayerId> = ids.iter().map(|id| PlayerId::from(*id)).collect();
        ids.reverse();
        move || ids.pop().expect("generator exhausted")
    }

    #[test]
    fn test_random_player_id_shape() {
        let id = random_player_id();
        assert_eq!(id.0.len(), 9);
        assert!(id
            .0
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_register_client() {
        let mut manager = ClientManager::new(2);
        let (tx, _rx) = outbox();

        let id = manager.register(tx).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.player_count(), 0);
        assert!(!manager.is_joined(&id));
    }

    #[test]
    fn test_register_skips_taken_identity() {
        let mut manager = ClientManager::new(4);
        let (tx1, _rx1) = outbox();
        let (tx2, _rx2) = outbox();

        let first = manager.register_with(tx1, sequence(&["dup"])).unwrap();
        let second = manager
            .register_with(tx2, sequence(&["dup", "dup", "fresh"]))
            .unwrap();

        assert_eq!(first, PlayerId::from("dup"));
        assert_eq!(second, PlayerId::from("fresh"));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_register_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx1, _rx1) = outbox();
        let (tx2, _rx2) = outbox();

        assert!(manager.register(tx1).is_some());
        assert!(manager.register(tx2).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_join_and_rename() {
        let mut manager = ClientManager::new(2);
        let (tx, _rx) = outbox();
        let id = manager.register(tx).unwrap();

        assert_eq!(manager.join(&id, "Ada"), Some(true));
        manager.players_mut().for_each(|p| p.score = 4);
        assert_eq!(manager.join(&id, "Grace"), Some(false));

        let player = manager.player(&id).unwrap();
        assert_eq!(player.name, "Grace");
        assert_eq!(player.score, 4);
        assert_eq!(manager.join(&PlayerId::from("ghost"), "Nobody"), None);
    }

    #[test]
    fn test_snapshot_in_join_order() {
        let mut manager = ClientManager::new(4);
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = outbox();
            ids.push(manager.register(tx).unwrap());
            receivers.push(rx);
        }

        manager.join(&ids[2], "third-connected");
        manager.join(&ids[0], "first-connected");

        let names: Vec<String> = manager.snapshot().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["third-connected", "first-connected"]);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let (tx, _rx) = outbox();
        let id = manager.register(tx).unwrap();
        manager.join(&id, "Ada");

        let removed = manager.remove(&id).unwrap();
        assert!(removed.is_joined());
        assert!(manager.is_empty());
        assert!(manager.remove(&id).is_none());
    }

    #[test]
    fn test_answers_set_and_cleared() {
        let mut manager = ClientManager::new(2);
        let (tx, _rx) = outbox();
        let id = manager.register(tx).unwrap();
        manager.join(&id, "Ada");

        manager.set_answer(&id, Tag::Truth);
        assert_eq!(manager.player(&id).unwrap().answer, Some(Tag::Truth));

        manager.clear_answers();
        assert_eq!(manager.player(&id).unwrap().answer, None);
    }

    #[test]
    fn test_check_timeouts() {
        let mut manager = ClientManager::new(2);
        let (tx1, _rx1) = outbox();
        let (tx2, _rx2) = outbox();
        let stale = manager.register(tx1).unwrap();
        let fresh = manager.register(tx2).unwrap();

        manager.clients.get_mut(&stale).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        let removed = manager.check_timeouts(Duration::from_secs(5));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, stale);
        assert_eq!(manager.len(), 1);

        manager.touch(&fresh);
        assert!(manager.check_timeouts(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_connection() {
        let mut manager = ClientManager::new(4);
        let (tx1, mut rx1) = outbox();
        let (tx2, mut rx2) = outbox();
        let joined = manager.register(tx1).unwrap();
        manager.register(tx2).unwrap();
        manager.join(&joined, "Ada");

        let delivered = manager.broadcast(&ServerMessage::TimeUpdate { time_left: 7 });
        assert_eq!(delivered, 2);

        for rx in [&mut rx1, &mut rx2] {
            let frame = rx.try_recv().unwrap();
            assert_eq!(frame, r#"{"type":"timeUpdate","timeLeft":7}"#);
        }
    }

    #[test]
    fn test_broadcast_isolates_slow_and_dead_clients() {
        let mut manager = ClientManager::new(4);
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (dead_tx, dead_rx) = outbox();
        let (ok_tx, mut ok_rx) = outbox();
        manager.register(slow_tx).unwrap();
        manager.register(dead_tx).unwrap();
        manager.register(ok_tx).unwrap();
        drop(dead_rx);

        let first = manager.broadcast(&ServerMessage::TimeUpdate { time_left: 2 });
        let second = manager.broadcast(&ServerMessage::TimeUpdate { time_left: 1 });

        assert_eq!(first, 2);
        assert_eq!(second, 1);
        assert!(ok_rx.try_recv().is_ok());
        assert!(ok_rx.try_recv().is_ok());
    }

    #[test]
    fn test_send_to_single_client() {
        let mut manager = ClientManager::new(2);
        let (tx1, mut rx1) = outbox();
        let (tx2, mut rx2) = outbox();
        let target = manager.register(tx1).unwrap();
        manager.register(tx2).unwrap();

        assert!(manager.send_to(&target, &ServerMessage::GameOver { library_health: 0 }));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert!(!manager.send_to(
            &PlayerId::from("ghost"),
            &ServerMessage::GameOver { library_health: 0 }
        ));
    }
}
