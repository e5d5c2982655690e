//! Inbound-event dispatcher for the live-session chat relay.
//!
//! One `ChatRelay` is constructed per process and injected into the socket
//! handler through `AppState`. Every handler takes the single write lock,
//! mutates the registry and room index together, and fans out while still
//! holding the lock, so room members observe broadcasts in dispatch order.
//! Sends go over unbounded channels and never block inside the lock.

use crate::websocket::message_types::{InboundEvent, OutboundEvent, RejectReason};
use crate::websocket::registry::{ConnectionId, ConnectionRegistry, Identity, RoomIndex};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct RelayState {
    registry: ConnectionRegistry,
    rooms: RoomIndex,
}

/// The chat relay core: connection registry + room index behind one lock.
#[derive(Clone, Default)]
pub struct ChatRelay {
    inner: Arc<RwLock<RelayState>>,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ChatRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one inbound text frame from `conn`.
    ///
    /// `outbound` is the connection's own frame channel; it is retained by the
    /// registry on `join` and used directly for rejection frames, which must
    /// reach senders that never joined.
    pub async fn handle_frame(
        &self,
        conn: ConnectionId,
        outbound: &UnboundedSender<String>,
        text: &str,
    ) {
        match serde_json::from_str::<InboundEvent>(text) {
            Ok(InboundEvent::Join {
                session_id,
                user_id,
                user_name,
            }) => {
                self.join(
                    conn,
                    outbound,
                    Identity {
                        session_id,
                        user_id,
                        user_name,
                    },
                )
                .await;
            }
            Ok(InboundEvent::Message {
                session_id,
                message,
            }) => {
                self.message(conn, outbound, &session_id, message).await;
            }
            Ok(InboundEvent::Leave) => {
                self.leave(conn).await;
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed chat frame");
                let frame = OutboundEvent::Error {
                    code: RejectReason::MalformedFrame,
                    message: "invalid event payload".into(),
                }
                .to_frame();
                let _ = outbound.send(frame);
            }
        }
    }

    /// Register the connection, add it to the session's room and announce it
    /// to everyone else already there. The joining connection itself never
    /// receives its own `user_joined`.
    ///
    /// A connection may belong to one room at a time: joining a different
    /// session first runs the full leave path for the old room.
    async fn join(
        &self,
        conn: ConnectionId,
        outbound: &UnboundedSender<String>,
        identity: Identity,
    ) {
        let mut state = self.inner.write().await;

        let switching = state
            .registry
            .lookup(conn)
            .is_some_and(|c| c.identity.session_id != identity.session_id);
        if switching {
            Self::cleanup_locked(&mut state, conn);
        }

        state
            .registry
            .register(conn, identity.clone(), outbound.clone());
        state.rooms.join(&identity.session_id, conn);
        info!(
            session_id = %identity.session_id,
            user_id = %identity.user_id,
            "participant joined session chat"
        );

        let frame = OutboundEvent::UserJoined {
            user_name: identity.user_name.clone(),
            timestamp: now_iso(),
        }
        .to_frame();
        Self::broadcast_locked(&state, &identity.session_id, &frame, Some(conn));
    }

    /// Relay a chat message to every member of the payload session's room,
    /// sender included (clients reconcile the self-echo by message id). The
    /// broadcast scope comes from the payload, not from registry state; the
    /// sender identity comes from the registry.
    async fn message(
        &self,
        conn: ConnectionId,
        outbound: &UnboundedSender<String>,
        session_id: &str,
        message: String,
    ) {
        let state = self.inner.write().await;

        let Some(connection) = state.registry.lookup(conn) else {
            warn!(%session_id, "chat message from a connection that never joined");
            let frame = OutboundEvent::Error {
                code: RejectReason::NotJoined,
                message: "join a session before sending messages".into(),
            }
            .to_frame();
            let _ = outbound.send(frame);
            return;
        };

        let identity = &connection.identity;
        let frame = OutboundEvent::Message {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            user_id: identity.user_id.clone(),
            user_name: identity.user_name.clone(),
            message,
            timestamp: now_iso(),
        }
        .to_frame();
        Self::broadcast_locked(&state, session_id, &frame, None);
    }

    /// Explicit leave event. Unknown connections are a no-op.
    pub async fn leave(&self, conn: ConnectionId) {
        let mut state = self.inner.write().await;
        if let Some(identity) = Self::cleanup_locked(&mut state, conn) {
            info!(
                session_id = %identity.session_id,
                user_id = %identity.user_id,
                "participant left session chat"
            );
        }
    }

    /// Transport-level close or error. Same side effects as an explicit leave,
    /// only the trigger differs.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let mut state = self.inner.write().await;
        if let Some(identity) = Self::cleanup_locked(&mut state, conn) {
            debug!(
                session_id = %identity.session_id,
                user_id = %identity.user_id,
                "socket closed, chat membership cleaned up"
            );
        }
    }

    /// Current member count for a session's room (debugging/metrics).
    pub async fn member_count(&self, session_id: &str) -> usize {
        self.inner.read().await.rooms.member_count(session_id)
    }

    /// Number of live rooms (debugging/metrics).
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.room_count()
    }

    /// Remove `conn` from both maps and tell the remaining room members.
    /// Registry and room index are only ever mutated here and in `join`, both
    /// under the write lock, which keeps the two maps mutually consistent.
    fn cleanup_locked(state: &mut RelayState, conn: ConnectionId) -> Option<Identity> {
        let connection = state.registry.unregister(conn)?;
        let identity = connection.identity;
        state.rooms.leave(&identity.session_id, conn);

        let frame = OutboundEvent::UserLeft {
            user_name: identity.user_name.clone(),
            timestamp: now_iso(),
        }
        .to_frame();
        Self::broadcast_locked(state, &identity.session_id, &frame, None);
        Some(identity)
    }

    fn broadcast_locked(
        state: &RelayState,
        session_id: &str,
        frame: &str,
        skip: Option<ConnectionId>,
    ) {
        for member in state.rooms.members_of(session_id) {
            if Some(member) == skip {
                continue;
            }
            if let Some(connection) = state.registry.lookup(member) {
                // Fire and forget: a dead peer's socket task runs the
                // disconnect path itself, which prunes both maps.
                let _ = connection.sender.send(frame.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    async fn join(
        relay: &ChatRelay,
        conn: ConnectionId,
        tx: &UnboundedSender<String>,
        session: &str,
        user: &str,
        name: &str,
    ) {
        let frame = format!(
            r#"{{"type":"join","sessionId":"{session}","userId":"{user}","userName":"{name}"}}"#
        );
        relay.handle_frame(conn, tx, &frame).await;
    }

    async fn send_message(
        relay: &ChatRelay,
        conn: ConnectionId,
        tx: &UnboundedSender<String>,
        session: &str,
        text: &str,
    ) {
        let frame = format!(r#"{{"type":"message","sessionId":"{session}","message":"{text}"}}"#);
        relay.handle_frame(conn, tx, &frame).await;
    }

    #[tokio::test]
    async fn join_notifies_existing_members_only() {
        let relay = ChatRelay::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();

        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        assert!(drain(&mut rx_a).is_empty(), "no one to notify yet");

        join(&relay, b, &tx_b, "s1", "u2", "Bob").await;
        let seen_by_a = drain(&mut rx_a);
        assert_eq!(seen_by_a.len(), 1);
        match &seen_by_a[0] {
            OutboundEvent::UserJoined { user_name, .. } => assert_eq!(user_name, "Bob"),
            other => panic!("expected user_joined, got {other:?}"),
        }
        assert!(drain(&mut rx_b).is_empty(), "join must not echo to the joiner");
        assert_eq!(relay.member_count("s1").await, 2);
    }

    #[tokio::test]
    async fn message_echoes_to_sender_and_reaches_the_room() {
        let relay = ChatRelay::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        join(&relay, b, &tx_b, "s1", "u2", "Bob").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        send_message(&relay, a, &tx_a, "s1", "hi").await;

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                OutboundEvent::Message {
                    session_id,
                    user_id,
                    user_name,
                    message,
                    timestamp,
                    ..
                } => {
                    assert_eq!(session_id, "s1");
                    assert_eq!(user_id, "u1");
                    assert_eq!(user_name, "Alice");
                    assert_eq!(message, "hi");
                    assert!(!timestamp.is_empty());
                }
                other => panic!("expected message, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn message_before_join_is_rejected() {
        let relay = ChatRelay::new();
        let (a, stranger) = (ConnectionId::new(), ConnectionId::new());
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_s, mut rx_s) = unbounded_channel();
        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;

        send_message(&relay, stranger, &tx_s, "s1", "hi").await;

        let events = drain(&mut rx_s);
        assert_eq!(events.len(), 1);
        match &events[0] {
            OutboundEvent::Error { code, .. } => assert_eq!(*code, RejectReason::NotJoined),
            other => panic!("expected error frame, got {other:?}"),
        }
        assert!(drain(&mut rx_a).is_empty(), "rejected message must not broadcast");
        assert_eq!(relay.member_count("s1").await, 1);
    }

    #[tokio::test]
    async fn leave_notifies_remaining_members_and_drops_empty_room() {
        let relay = ChatRelay::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        join(&relay, b, &tx_b, "s1", "u2", "Bob").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        relay.handle_frame(b, &tx_b, r#"{"type":"leave"}"#).await;
        let seen_by_a = drain(&mut rx_a);
        assert_eq!(seen_by_a.len(), 1);
        match &seen_by_a[0] {
            OutboundEvent::UserLeft { user_name, .. } => assert_eq!(user_name, "Bob"),
            other => panic!("expected user_left, got {other:?}"),
        }
        assert_eq!(relay.member_count("s1").await, 1);

        relay.leave(a).await;
        assert_eq!(relay.room_count().await, 0);
        assert_eq!(relay.member_count("s1").await, 0);
    }

    #[tokio::test]
    async fn abrupt_disconnect_matches_explicit_leave() {
        let relay = ChatRelay::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, _rx_b) = unbounded_channel();
        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        join(&relay, b, &tx_b, "s1", "u2", "Bob").await;
        drain(&mut rx_a);

        relay.disconnect(b).await;
        let seen_by_a = drain(&mut rx_a);
        assert!(matches!(
            seen_by_a.as_slice(),
            [OutboundEvent::UserLeft { user_name, .. }] if user_name == "Bob"
        ));
        assert_eq!(relay.member_count("s1").await, 1);

        // repeating the cleanup is a no-op
        relay.disconnect(b).await;
        assert_eq!(relay.member_count("s1").await, 1);
    }

    #[tokio::test]
    async fn rejoining_the_same_session_does_not_duplicate_membership() {
        let relay = ChatRelay::new();
        let a = ConnectionId::new();
        let (tx_a, mut rx_a) = unbounded_channel();
        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        assert_eq!(relay.member_count("s1").await, 1);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn joining_another_session_implicitly_leaves_the_first() {
        let relay = ChatRelay::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        let (tx_a, _rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        join(&relay, b, &tx_b, "s1", "u2", "Bob").await;
        drain(&mut rx_b);

        join(&relay, a, &tx_a, "s2", "u1", "Alice").await;

        let seen_by_b = drain(&mut rx_b);
        assert!(matches!(
            seen_by_b.as_slice(),
            [OutboundEvent::UserLeft { user_name, .. }] if user_name == "Alice"
        ));
        assert_eq!(relay.member_count("s1").await, 1);
        assert_eq!(relay.member_count("s2").await, 1);
    }

    #[tokio::test]
    async fn malformed_frame_keeps_the_connection_usable() {
        let relay = ChatRelay::new();
        let a = ConnectionId::new();
        let (tx_a, mut rx_a) = unbounded_channel();

        relay.handle_frame(a, &tx_a, "not json at all").await;
        relay
            .handle_frame(a, &tx_a, r#"{"type":"join","sessionId":"s1"}"#)
            .await;
        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 2);
        for event in &events {
            assert!(matches!(
                event,
                OutboundEvent::Error {
                    code: RejectReason::MalformedFrame,
                    ..
                }
            ));
        }

        join(&relay, a, &tx_a, "s1", "u1", "Alice").await;
        assert_eq!(relay.member_count("s1").await, 1);
    }
}
