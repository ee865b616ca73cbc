#[cfg(test)]
mod tests {
    use rmcs_core::Payload;
    use rmcs_runtime::session::{MessageKind, SessionManager, SessionMessage};
    use rmcs_runtime::transport::memory;
    use serde_json::json;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn manager() -> (SessionManager, memory::Peer) {
        let (conn, peer) = memory::pair();
        (SessionManager::new(conn.sink), peer)
    }

    fn response(body: serde_json::Value) -> SessionMessage {
        SessionMessage {
            kind: MessageKind::Response,
            name: None,
            body,
            local_timestamp: None,
        }
    }

    // ── Creation / closing ─────────────────────────────────────

    #[tokio::test]
    async fn test_create_session_is_idempotent() {
        let (sessions, _peer) = manager();
        let a = sessions.create_session("s1");
        let b = sessions.create_session("s1");
        assert!(a.same_as(&b));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_create_after_close_is_distinct() {
        let (sessions, _peer) = manager();
        let first = sessions.create_session("s1");
        assert!(sessions.close_session("s1"));
        let second = sessions.create_session("s1");
        assert!(!first.same_as(&second));
        assert!(first.is_closed());
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn test_close_unknown_session() {
        let (sessions, _peer) = manager();
        assert!(!sessions.close_session("missing"));
    }

    #[tokio::test]
    async fn test_open_session_assigns_fresh_id() {
        let (sessions, _peer) = manager();
        let a = sessions.open_session();
        let b = sessions.open_session();
        assert_ne!(a.id(), b.id());
        assert!(sessions.get_session(a.id()).is_some());
    }

    #[tokio::test]
    async fn test_close_all() {
        let (sessions, _peer) = manager();
        let a = sessions.create_session("a");
        let _b = sessions.create_session("b");
        sessions.close_all();
        assert!(sessions.is_empty());
        assert!(a.is_closed());
        assert!(a.recv().await.is_none());
    }

    // ── Delivery ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_deliver_to_unknown_session_is_noop() {
        let (sessions, _peer) = manager();
        sessions.deliver("nobody", response(json!({"x": 1})));
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_then_recv() {
        let (sessions, _peer) = manager();
        let session = sessions.create_session("s1");
        sessions.deliver("s1", response(json!({"answer": 42})));
        let msg = session.recv().await.unwrap();
        assert_eq!(msg.kind, MessageKind::Response);
        assert_eq!(msg.body, json!({"answer": 42}));
    }

    #[tokio::test]
    async fn test_recv_preserves_order() {
        let (sessions, _peer) = manager();
        let session = sessions.create_session("s1");
        for i in 0..5 {
            sessions.deliver("s1", response(json!(i)));
        }
        for i in 0..5 {
            assert_eq!(session.recv().await.unwrap().body, json!(i));
        }
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_receiver() {
        let (sessions, _peer) = manager();
        let session = sessions.create_session("s1");
        let waiter = tokio::spawn(async move { session.recv().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        sessions.close_session("s1");

        let got = tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_without_error() {
        let (sessions, _peer) = manager();
        let session = sessions.create_session("s1");
        for i in 0..(rmcs_runtime::session::MAILBOX_CAPACITY + 10) {
            sessions.deliver("s1", response(json!(i)));
        }
        assert_eq!(session.recv().await.unwrap().body, json!(0));
    }

    // ── Sending ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_session_send_carries_session_id() {
        let (sessions, peer) = manager();
        let session = sessions.create_session("conv-7");
        session.send_instruction("ask", json!({"q": 1})).await.unwrap();
        session.send_event("progress", json!({"pct": 50})).await.unwrap();

        let first = peer.recv_envelope(WAIT).await.unwrap();
        assert_eq!(first.session_id.as_deref(), Some("conv-7"));
        assert_eq!(
            first.payload,
            Payload::Instruction {
                instruction: "ask".into(),
                message: json!({"q": 1}),
            }
        );

        let second = peer.recv_envelope(WAIT).await.unwrap();
        assert_eq!(second.session_id.as_deref(), Some("conv-7"));
        assert_eq!(second.payload.kind(), "event");
    }
}
