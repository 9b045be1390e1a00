//! Connection registry for the race server
//!
//! This module tracks every open WebSocket connection, including:
//! - Connection lifecycle (register, activity, removal)
//! - Binding a connection to the player it created or joined as
//! - Outbound delivery through each connection's writer channel
//! - Capacity limits and idle detection
//!
//! Each connection owns an unbounded writer channel; dropping the registry entry
//! drops the sender, which ends the connection's writer task.

use log::{debug, info, warn};
use shared::{encode, PlayerId, ServerMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Server-internal identifier of one socket
pub type ConnectionId = u32;

/// Writer half of a connection
pub type FrameSender = mpsc::UnboundedSender<Message>;

/// Represents one connected socket
#[derive(Debug)]
pub struct Client {
    /// Identifier assigned at accept time
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Last time any frame arrived from this connection
    pub last_seen: Instant,
    /// Player this connection controls once it created or joined the room
    pub player_id: Option<PlayerId>,
    sender: FrameSender,
}

impl Client {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: FrameSender) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            player_id: None,
            sender,
        }
    }

    /// Queues a frame; false once the writer task has gone away
    pub fn send(&self, frame: Message) -> bool {
        self.sender.send(frame).is_ok()
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all open connections and their player bindings
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    max_clients: usize,
    next_player_number: u32,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            next_player_number: 1,
        }
    }

    /// Registers a connection. Returns false if the server is at capacity.
    pub fn add_client(&mut self, id: ConnectionId, addr: SocketAddr, sender: FrameSender) -> bool {
        if self.clients.len() >= self.max_clients {
            warn!("Rejecting connection {} from {}: server full", id, addr);
            return false;
        }

        info!("Connection {} opened from {}", id, addr);
        self.clients.insert(id, Client::new(id, addr, sender));
        true
    }

    /// Removes a connection, returning it so the caller can run the player's leave path
    pub fn remove_client(&mut self, id: &ConnectionId) -> Option<Client> {
        let client = self.clients.remove(id)?;
        info!("Connection {} from {} closed", client.id, client.addr);
        Some(client)
    }

    /// Next sequential player label: P1, P2, ...
    pub fn allocate_player_id(&mut self) -> PlayerId {
        let id = format!("P{}", self.next_player_number);
        self.next_player_number += 1;
        id
    }

    pub fn bind_player(&mut self, id: ConnectionId, player_id: PlayerId) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) => {
                client.player_id = Some(player_id);
                true
            }
            None => false,
        }
    }

    /// Detaches every connection from its player. Returns how many were bound.
    pub fn unbind_all(&mut self) -> usize {
        self.clients
            .values_mut()
            .filter_map(|c| c.player_id.take())
            .count()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn player_of(&self, id: ConnectionId) -> Option<&PlayerId> {
        self.clients.get(&id).and_then(|c| c.player_id.as_ref())
    }

    pub fn touch(&mut self, id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.last_seen = Instant::now();
        }
    }

    pub fn send_to(&self, id: ConnectionId, message: &ServerMessage) -> bool {
        let Some(client) = self.clients.get(&id) else {
            return false;
        };
        match encode(message) {
            Ok(text) => client.send(Message::Text(text)),
            Err(e) => {
                warn!("Failed to encode {}: {}", message.kind(), e);
                false
            }
        }
    }

    /// Sends to every connection bound to a player
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let text = match encode(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {}: {}", message.kind(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        for client in self.clients.values().filter(|c| c.player_id.is_some()) {
            if client.send(Message::Text(text.clone())) {
                delivered += 1;
            } else {
                debug!("Connection {} writer gone, skipping", client.id);
            }
        }
        delivered
    }

    /// Asks the connection's writer to send a close frame and stop
    pub fn close(&self, id: ConnectionId) {
        if let Some(client) = self.clients.get(&id) {
            client.send(Message::Close(None));
        }
    }

    pub fn ping_all(&self) {
        for client in self.clients.values() {
            client.send(Message::Ping(Vec::new()));
        }
    }

    /// Connections that have been silent longer than `timeout`
    pub fn idle_clients(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.clients
            .values()
            .filter(|c| c.is_timed_out(timeout))
            .map(|c| c.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::decode_server;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn connect(
        manager: &mut ClientManager,
        id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(manager.add_client(id, test_addr(), tx));
        rx
    }

    fn next_text(rx: &mut mpsc::UnboundedReceiver<Message>) -> ServerMessage {
        match rx.try_recv().expect("a queued frame") {
            Message::Text(text) => decode_server(&text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_capacity_limit() {
        let mut manager = ClientManager::new(1);
        let _rx = connect(&mut manager, 1);

        let (tx, _rx2) = mpsc::unbounded_channel();
        assert!(!manager.add_client(2, test_addr(), tx));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_player_ids_are_sequential() {
        let mut manager = ClientManager::new(4);
        assert_eq!(manager.allocate_player_id(), "P1");
        assert_eq!(manager.allocate_player_id(), "P2");
        assert_eq!(manager.allocate_player_id(), "P3");
    }

    #[test]
    fn test_bind_and_remove() {
        let mut manager = ClientManager::new(4);
        let _rx = connect(&mut manager, 7);

        assert!(manager.contains(7));
        assert_eq!(manager.player_of(7), None);
        assert!(manager.bind_player(7, "P1".into()));
        assert_eq!(manager.player_of(7).map(String::as_str), Some("P1"));
        assert!(!manager.bind_player(8, "P2".into()));

        let removed = manager.remove_client(&7).unwrap();
        assert_eq!(removed.player_id.as_deref(), Some("P1"));
        assert!(manager.is_empty());
        assert!(manager.remove_client(&7).is_none());
    }

    #[test]
    fn test_unbind_all_keeps_connections() {
        let mut manager = ClientManager::new(4);
        let _a = connect(&mut manager, 1);
        let _b = connect(&mut manager, 2);
        let _c = connect(&mut manager, 3);
        manager.bind_player(1, "P1".into());
        manager.bind_player(2, "P2".into());

        assert_eq!(manager.unbind_all(), 2);
        assert_eq!(manager.player_of(1), None);
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.broadcast(&ServerMessage::error("x")), 0);
    }

    #[test]
    fn test_broadcast_reaches_only_bound_connections() {
        let mut manager = ClientManager::new(4);
        let mut bound = connect(&mut manager, 1);
        let mut unbound = connect(&mut manager, 2);
        manager.bind_player(1, "P1".into());

        let delivered = manager.broadcast(&ServerMessage::Winner {
            winner_id: "P1".into(),
        });
        assert_eq!(delivered, 1);
        assert_eq!(
            next_text(&mut bound),
            ServerMessage::Winner {
                winner_id: "P1".into()
            }
        );
        assert!(unbound.try_recv().is_err());
    }

    #[test]
    fn test_send_to_and_close() {
        let mut manager = ClientManager::new(4);
        let mut rx = connect(&mut manager, 3);

        assert!(manager.send_to(3, &ServerMessage::error("nope")));
        manager.close(3);

        assert_eq!(next_text(&mut rx), ServerMessage::error("nope"));
        assert!(matches!(rx.try_recv(), Ok(Message::Close(None))));
        assert!(!manager.send_to(99, &ServerMessage::error("nobody")));
    }

    #[test]
    fn test_dropped_writer_fails_send() {
        let mut manager = ClientManager::new(4);
        let rx = connect(&mut manager, 5);
        drop(rx);
        assert!(!manager.send_to(5, &ServerMessage::error("gone")));
    }

    #[test]
    fn test_idle_detection() {
        let mut manager = ClientManager::new(4);
        let _rx = connect(&mut manager, 1);
        assert!(manager.idle_clients(Duration::from_secs(1)).is_empty());

        manager.clients.get_mut(&1).unwrap().last_seen =
            Instant::now() - Duration::from_secs(2);
        assert_eq!(manager.idle_clients(Duration::from_secs(1)), vec![1]);

        manager.touch(1);
        assert!(manager.idle_clients(Duration::from_secs(1)).is_empty());
    }
}
