use std::collections::HashSet;

use braid_core::ids::{ConnId, ConversationId, MessageId, UserId};
use braid_protocol::ServerFrame;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::{Result, RoomError};

/// A single live room/connection registry, transport-neutral (§4.6): a
/// connection is anything that can be handed a serialized server frame, so
/// this crate carries no WebSocket or HTTP dependency.
#[derive(Debug, Default)]
pub struct RoomManager {
    connections: DashMap<ConnId, UnboundedSender<String>>,
    connections_by_room: DashMap<ConversationId, DashSet<ConnId>>,
    presence: DashMap<ConversationId, DashMap<UserId, HashSet<ConnId>>>,
    generation_slots: DashMap<ConversationId, MessageId>,
    ping_pending: DashMap<ConnId, bool>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's outbound sink. The connection is not in any
    /// room until [`RoomManager::join`] is called.
    pub fn register(&self, conn_id: ConnId, sink: UnboundedSender<String>) {
        self.ping_pending.insert(conn_id.clone(), false);
        self.connections.insert(conn_id, sink);
    }

    /// Removes a connection from every room it was a member of and drops its
    /// sink. Idempotent.
    pub fn unregister(&self, conn_id: &ConnId) {
        self.connections.remove(conn_id);
        self.ping_pending.remove(conn_id);
        for room in self.connections_by_room.iter() {
            room.value().remove(conn_id);
        }
        for room in self.presence.iter() {
            for mut entry in room.value().iter_mut() {
                entry.value_mut().remove(conn_id);
            }
        }
    }

    /// Adds `conn_id` to `conversation_id`'s room on behalf of `user_id`.
    /// Broadcasts `user_joined` only the first time this user has any
    /// connection present in the room (dedup per (conversation, user)).
    pub fn join(&self, conversation_id: &ConversationId, conn_id: &ConnId, user_id: &UserId) -> Result<()> {
        if !self.connections.contains_key(conn_id) {
            return Err(RoomError::UnknownConnection(conn_id.to_string()));
        }
        self.connections_by_room
            .entry(conversation_id.clone())
            .or_default()
            .insert(conn_id.clone());

        let users = self.presence.entry(conversation_id.clone()).or_default();
        let is_first_connection_for_user = {
            let mut conns = users.entry(user_id.clone()).or_default();
            let was_empty = conns.is_empty();
            conns.insert(conn_id.clone());
            was_empty
        };
        drop(users);

        if is_first_connection_for_user {
            self.broadcast(
                conversation_id,
                &ServerFrame::UserJoined { user_id: user_id.to_string() },
                None,
            );
        }
        Ok(())
    }

    /// Removes `conn_id` from `conversation_id`'s room. Broadcasts
    /// `user_left` only once the user's last connection in the room departs.
    pub fn leave(&self, conversation_id: &ConversationId, conn_id: &ConnId, user_id: &UserId) {
        if let Some(room) = self.connections_by_room.get(conversation_id) {
            room.remove(conn_id);
        }
        let is_last_connection_for_user = match self.presence.get(conversation_id) {
            Some(users) => match users.get_mut(user_id) {
                Some(mut conns) => {
                    conns.remove(conn_id);
                    conns.is_empty()
                }
                None => false,
            },
            None => false,
        };
        if is_last_connection_for_user {
            if let Some(users) = self.presence.get(conversation_id) {
                users.remove(user_id);
            }
            self.broadcast(
                conversation_id,
                &ServerFrame::UserLeft { user_id: user_id.to_string() },
                None,
            );
        }
    }

    /// Sends `frame` to every connection currently in `conversation_id`'s
    /// room, skipping `except` (typically the frame's originator) and
    /// silently dropping connections whose receiver has gone away — cleanup
    /// happens on the next [`RoomManager::unregister`], not here.
    pub fn broadcast(&self, conversation_id: &ConversationId, frame: &ServerFrame, except: Option<&ConnId>) {
        let Some(room) = self.connections_by_room.get(conversation_id) else {
            return;
        };
        let payload = match serde_json::to_string(frame) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "failed to serialize server frame, dropping broadcast");
                return;
            }
        };
        for conn_id in room.iter() {
            if Some(conn_id.key()) == except {
                continue;
            }
            if let Some(sink) = self.connections.get(conn_id.key()) {
                let _ = sink.send(payload.clone());
            }
        }
    }

    /// Attempts to acquire the generation slot for `conversation_id` (I7: at
    /// most one in-flight generation per conversation). Returns `false` if
    /// another generation already holds the slot.
    pub fn start_generation(&self, conversation_id: &ConversationId, message_id: &MessageId) -> bool {
        self.generation_slots
            .insert(conversation_id.clone(), message_id.clone())
            .is_none()
    }

    /// Releases the generation slot for `conversation_id`, if held.
    pub fn end_generation(&self, conversation_id: &ConversationId) {
        self.generation_slots.remove(conversation_id);
    }

    pub fn is_generating(&self, conversation_id: &ConversationId) -> bool {
        self.generation_slots.contains_key(conversation_id)
    }

    /// Marks every registered connection as owing a pong, then returns the
    /// set of connections that still had a pong outstanding from the
    /// previous sweep (these should be disconnected by the caller).
    pub fn heartbeat_sweep(&self) -> Vec<ConnId> {
        let mut stale = Vec::new();
        for mut entry in self.ping_pending.iter_mut() {
            if *entry.value() {
                stale.push(entry.key().clone());
            }
            *entry.value_mut() = true;
        }
        stale
    }

    /// Clears the pending-pong flag for `conn_id` in response to a pong.
    pub fn record_pong(&self, conn_id: &ConnId) {
        if let Some(mut pending) = self.ping_pending.get_mut(conn_id) {
            *pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn registered(rooms: &RoomManager) -> (ConnId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = ConnId::new();
        rooms.register(conn_id.clone(), tx);
        (conn_id, rx)
    }

    #[test]
    fn join_leave_join_round_trips_presence_and_broadcasts_once_per_edge() {
        let rooms = RoomManager::new();
        let conv = ConversationId::new();
        let user = UserId::new();
        let bystander = UserId::new();
        let (conn_a, mut rx_a) = registered(&rooms);
        let (conn_b, mut rx_b) = registered(&rooms);
        let (conn_watch, mut rx_watch) = registered(&rooms);
        rooms.join(&conv, &conn_watch, &bystander).unwrap();
        let _ = rx_watch.try_recv();

        rooms.join(&conv, &conn_a, &user).unwrap();
        assert!(rx_watch.try_recv().unwrap().contains("user_joined"));

        rooms.join(&conv, &conn_b, &user).unwrap();
        // second connection for the same user must not re-broadcast user_joined
        assert!(rx_watch.try_recv().is_err());
        assert!(rx_a.try_recv().is_err());

        rooms.leave(&conv, &conn_a, &user);
        assert!(rx_watch.try_recv().is_err(), "user still present via conn_b");

        rooms.leave(&conv, &conn_b, &user);
        assert!(rx_watch.try_recv().is_ok(), "last connection leaving fires user_left");

        rooms.join(&conv, &conn_a, &user).unwrap();
        assert!(rx_watch.try_recv().is_ok(), "rejoin after full departure fires user_joined again");
    }

    #[test]
    fn unknown_connection_cannot_join() {
        let rooms = RoomManager::new();
        let conv = ConversationId::new();
        let user = UserId::new();
        let bogus = ConnId::new();
        assert!(rooms.join(&conv, &bogus, &user).is_err());
    }

    #[test]
    fn broadcast_skips_excepted_connection() {
        let rooms = RoomManager::new();
        let conv = ConversationId::new();
        let user_a = UserId::new();
        let user_b = UserId::new();
        let (conn_a, mut rx_a) = registered(&rooms);
        let (conn_b, mut rx_b) = registered(&rooms);
        rooms.join(&conv, &conn_a, &user_a).unwrap();
        rooms.join(&conv, &conn_b, &user_b).unwrap();
        let _ = rx_a.try_recv();
        let _ = rx_b.try_recv();

        rooms.broadcast(
            &conv,
            &ServerFrame::AiFinished { message_id: "m1".to_string() },
            Some(&conn_a),
        );
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn generation_slot_is_exclusive_per_conversation() {
        let rooms = RoomManager::new();
        let conv = ConversationId::new();
        let msg_a = MessageId::new();
        let msg_b = MessageId::new();

        assert!(rooms.start_generation(&conv, &msg_a));
        assert!(!rooms.start_generation(&conv, &msg_b));

        rooms.end_generation(&conv);
        assert!(rooms.start_generation(&conv, &msg_b));
    }

    #[test]
    fn heartbeat_sweep_flags_then_reports_unanswered_connections() {
        let rooms = RoomManager::new();
        let (conn_a, _rx_a) = registered(&rooms);

        let stale_first = rooms.heartbeat_sweep();
        assert!(stale_first.is_empty(), "first sweep only arms the flag");

        rooms.record_pong(&conn_a);
        let stale_second = rooms.heartbeat_sweep();
        assert!(stale_second.is_empty(), "pong answered before second sweep");

        let stale_third = rooms.heartbeat_sweep();
        assert_eq!(stale_third, vec![conn_a]);
    }

    #[test]
    fn unregister_removes_from_all_rooms_and_presence() {
        let rooms = RoomManager::new();
        let conv = ConversationId::new();
        let user = UserId::new();
        let (conn_a, _rx_a) = registered(&rooms);
        rooms.join(&conv, &conn_a, &user).unwrap();

        rooms.unregister(&conn_a);
        assert!(rooms.join(&conv, &conn_a, &user).is_err());
    }
}
