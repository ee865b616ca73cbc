#[cfg(test)]
mod tests {
    use rmcs_config::ConfigLoader;
    use rmcs_config::schema::*;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.ping_interval(), Duration::from_secs(20));
        assert_eq!(config.ping_timeout(), Duration::from_secs(10));
        assert_eq!(config.initial_retry_delay(), Duration::from_secs(5));
        assert_eq!(config.max_retry_delay(), Duration::from_secs(60));
        assert_eq!(config.outbound_timeout(), Duration::from_secs(5));
        assert_eq!(config.inbound_timeout(), Duration::from_secs(30));
        assert_eq!(config.identify_timeout(), Duration::from_secs(10));
        assert!(!config.reset_backoff_on_connect);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
        assert!(config.directory.is_none());
    }

    #[test]
    fn test_storage_defaults_under_rmcs_home() {
        let config = StorageConfig::default();
        assert!(config.directory.starts_with(rmcs_home()));
    }

    #[test]
    fn test_default_config_validates() {
        let warnings = BotConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    // ── URL tests ──────────────────────────────────────────────

    #[test]
    fn test_robot_url() {
        let server = ServerConfig {
            http: "http://example.com".into(),
            websocket: "wss://example.com/".into(),
        };
        assert_eq!(server.robot_url("r-42"), "wss://example.com/ws/r-42");
    }

    // ── TOML parsing tests ─────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = BotConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.server.websocket, config.server.websocket);
        assert_eq!(
            restored.connection.heartbeat_interval_secs,
            config.connection.heartbeat_interval_secs
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
[server]
websocket = "wss://fleet.example.org"

[connection]
max_retry_delay_secs = 120
"#;
        let config = ConfigLoader::parse(raw, Path::new("inline.toml")).unwrap();
        assert_eq!(config.server.websocket, "wss://fleet.example.org");
        assert_eq!(config.server.http, "http://127.0.0.1:8000");
        assert_eq!(config.connection.max_retry_delay_secs, 120);
        assert_eq!(config.connection.initial_retry_delay_secs, 5);
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = ConfigLoader::parse("[server\nhttp=", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[storage]\ndirectory = \"/var/lib/rmcs\"").unwrap();
        writeln!(f, "[logging]\nformat = \"json\"").unwrap();
        drop(f);

        let loader = ConfigLoader::load(Some(&path)).unwrap();
        let config = loader.get();
        assert_eq!(config.logging.format, "json");
        assert_eq!(loader.path(), path.as_path());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loader.get().connection.heartbeat_interval_secs, 30);
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.toml");
        std::fs::write(&path, "[connection]\nheartbeat_interval_secs = 15\n").unwrap();
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().connection.heartbeat_interval_secs, 15);

        std::fs::write(&path, "[connection]\nheartbeat_interval_secs = 45\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().connection.heartbeat_interval_secs, 45);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let mut config = BotConfig::default();
        config.server.websocket = "http://example.com".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("server.websocket"));
    }

    #[test]
    fn test_validate_rejects_zero_heartbeat() {
        let mut config = BotConfig::default();
        config.connection.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = BotConfig::default();
        config.connection.initial_retry_delay_secs = 90;
        let err = config.validate().unwrap_err();
        assert!(err.contains("max_retry_delay_secs"));
    }

    #[test]
    fn test_validate_warns_on_unknown_level() {
        let mut config = BotConfig::default();
        config.logging.level = "loud".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "logging.level"));
    }

    #[test]
    fn test_warning_display() {
        let w = ConfigWarning {
            field: "server.http".into(),
            message: "URL is empty".into(),
            severity: WarningSeverity::Error,
            hint: Some("set it".into()),
        };
        let s = w.to_string();
        assert!(s.contains("server.http"));
        assert!(s.contains("set it"));
    }
}
