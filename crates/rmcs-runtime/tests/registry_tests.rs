#[cfg(test)]
mod tests {
    use rmcs_runtime::{HandlerRegistry, Session, event_fn, instruction_fn};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn constant(reply: Value) -> Arc<dyn rmcs_runtime::InstructionHandler> {
        instruction_fn(move |_m: Value, _s: Option<Session>| {
            let reply = reply.clone();
            async move { Ok(Some(reply)) }
        })
    }

    #[tokio::test]
    async fn test_register_lookup_unregister() {
        let registry = HandlerRegistry::new();
        registry.register_instruction("a", constant(json!(1)));
        registry.register_event("tick", event_fn(|_d: Value| async { Ok(()) }));

        let handler = registry.instruction("a").unwrap();
        assert_eq!(handler.handle(json!({}), None).await.unwrap(), Some(json!(1)));
        assert!(registry.event("tick").is_some());
        assert_eq!(registry.event_names(), vec!["tick".to_string()]);

        assert!(registry.unregister_instruction("a"));
        assert!(!registry.unregister_instruction("a"));
        assert!(registry.instruction("a").is_none());
        assert!(registry.unregister_event("tick"));
    }

    #[tokio::test]
    async fn test_register_replaces_existing() {
        let registry = HandlerRegistry::new();
        registry.register_instruction("a", constant(json!("old")));
        registry.register_instruction("a", constant(json!("new")));
        let reply = registry.instruction("a").unwrap().handle(json!({}), None).await.unwrap();
        assert_eq!(reply, Some(json!("new")));
    }

    #[test]
    fn test_concurrent_registration_and_lookup() {
        let registry = Arc::new(HandlerRegistry::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        registry.register_instruction(format!("h{t}-{i}"), constant(json!(i)));
                        let _ = registry.instruction(&format!("h{t}-{}", i / 2));
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(registry.instruction_names().len(), 200);
    }
}
