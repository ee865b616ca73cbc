#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use rmcs_cli::Cli;
    use rmcs_cli::logging::{LOG_FILE, init_tracing};

    // ── Argument parsing ───────────────────────────────────────

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        for args in [
            vec!["rmcs-bot", "run"],
            vec!["rmcs-bot", "identify"],
            vec!["rmcs-bot", "identify", "--refresh"],
            vec!["rmcs-bot", "forget"],
            vec!["rmcs-bot", "network"],
            vec!["rmcs-bot", "config", "--json"],
            vec!["rmcs-bot", "version"],
        ] {
            assert!(Cli::try_parse_from(&args).is_ok(), "failed to parse {args:?}");
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let parsed = Cli::try_parse_from([
            "rmcs-bot", "run", "--config", "/tmp/bot.toml", "--log-level", "trace",
        ]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["rmcs-bot", "-v", "-q", "run"]).is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["rmcs-bot"]).is_err());
        assert!(Cli::try_parse_from(["rmcs-bot", "dance"]).is_err());
    }

    // ── Logging ────────────────────────────────────────────────

    #[test]
    fn test_file_layer_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        init_tracing("info", "compact", Some(logs.as_path())).unwrap();

        tracing::info!(robot_id = "r-42", "file layer smoke test");

        let written = std::fs::read_to_string(logs.join(LOG_FILE)).unwrap();
        assert!(written.contains("file layer smoke test"));
        assert!(written.contains("r-42"));
        assert!(!written.contains("\u{1b}["), "file output must not carry ANSI colours");

        // Only one global subscriber per process.
        assert!(init_tracing("info", "pretty", None).is_err());
    }
}
