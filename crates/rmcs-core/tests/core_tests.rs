#[cfg(test)]
mod tests {
    use rmcs_core::*;
    use serde_json::{Value, json};

    // ── Decode tests ───────────────────────────────────────────

    #[test]
    fn test_decode_instruction() {
        let raw = r#"{"session_id":"s1","local_timestamp":1.5,
            "payload":{"type":"instruction","instruction":"echo","message":{"x":1}}}"#;
        let env = Envelope::decode(raw).unwrap();
        assert_eq!(env.session_id.as_deref(), Some("s1"));
        assert_eq!(env.local_timestamp, Some(1.5));
        assert_eq!(
            env.payload,
            Payload::Instruction {
                instruction: "echo".into(),
                message: json!({"x": 1}),
            }
        );
    }

    #[test]
    fn test_decode_missing_type_is_event() {
        let env = Envelope::decode(r#"{"session_id":"s1","payload":{"event":"ping"}}"#).unwrap();
        assert_eq!(env.payload.kind(), "event");
        assert_eq!(env.payload.name(), Some("ping"));
        assert_eq!(env.payload.body(), &json!({}));
    }

    #[test]
    fn test_decode_unknown_type_is_event() {
        let env =
            Envelope::decode(r#"{"payload":{"type":"telemetry","detail":{"a":2}}}"#).unwrap();
        assert_eq!(env.payload.kind(), "event");
        assert_eq!(env.payload.body(), &json!({"a": 2}));
        assert!(env.session_id.is_none());
    }

    #[test]
    fn test_decode_missing_payload_is_empty_event() {
        let env = Envelope::decode(r#"{"session_id":"s9"}"#).unwrap();
        assert_eq!(
            env.payload,
            Payload::Event {
                event: String::new(),
                detail: json!({}),
            }
        );
    }

    #[test]
    fn test_decode_missing_message_defaults_to_object() {
        let env = Envelope::decode(r#"{"payload":{"type":"response"}}"#).unwrap();
        assert_eq!(env.payload, Payload::Response { message: json!({}) });
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = Envelope::decode("{not json").unwrap_err();
        assert!(matches!(err, RmcsError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(Envelope::decode("[1,2,3]"), Err(RmcsError::Decode(_))));
        assert!(matches!(
            Envelope::decode(r#"{"payload": "nope"}"#),
            Err(RmcsError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_bytes_rejects_invalid_utf8() {
        let err = Envelope::decode_bytes(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, RmcsError::Decode(_)));
    }

    // ── Encode tests ───────────────────────────────────────────

    #[test]
    fn test_encode_assigns_session_id_and_timestamp() {
        let env = Envelope::event(None, "heartbeat", json!({}));
        let text = env.encode().unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        let sid = doc["session_id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(sid).is_ok());
        assert!(doc["local_timestamp"].as_f64().unwrap() > 1_600_000_000.0);
        assert_eq!(doc["payload"], json!({"type": "event", "event": "heartbeat", "detail": {}}));
    }

    #[test]
    fn test_encode_decode_preserves_fields() {
        let raw = r#"{"session_id":"abc","payload":{"type":"instruction","instruction":"move","message":{"speed":3}}}"#;
        let first = Envelope::decode(raw).unwrap();
        let again = Envelope::decode(&first.encode().unwrap()).unwrap();
        assert_eq!(again.session_id, first.session_id);
        assert_eq!(again.payload, first.payload);
    }

    #[test]
    fn test_response_wire_shape() {
        let text = Envelope::response("s1", json!({"x": 1})).encode().unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["session_id"], "s1");
        assert_eq!(doc["payload"], json!({"type": "response", "message": {"x": 1}}));
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_display() {
        let err = RmcsError::Handler {
            name: "echo".into(),
            reason: "boom".into(),
        };
        let s = err.to_string();
        assert!(s.contains("echo"));
        assert!(s.contains("boom"));
    }

    #[test]
    fn test_connection_lost_classification() {
        assert!(RmcsError::ConnectionClosed.is_connection_lost());
        assert!(!RmcsError::Transport("reset".into()).is_connection_lost());
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RmcsError = io.into();
        assert!(matches!(err, RmcsError::Io(_)));
    }
}
