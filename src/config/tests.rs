use super::*;

#[test]
fn defaults_resolve() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.cache.memory_ttl_seconds, 300);
    assert_eq!(settings.cache.persistent_ttl_seconds, 1800);
    assert_eq!(settings.notify.broadcast_channel, "bizdash_cache_invalidation");
    assert_eq!(settings.notify.change_channel, "bizdash_table_changes");
    assert!(settings.notify.listen_table_changes);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.database.url = Some("postgres://file".to_string());

    let overrides = GlobalOverrides {
        log_level: Some("debug".to_string()),
        database_url: Some("postgres://cli".to_string()),
        memory_only: true,
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.database.url.as_deref(), Some("postgres://cli"));
    assert!(!settings.cache.enable_persistent_tier);
    assert!(settings.cache.enable_memory_tier);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_database_url_is_none() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.memory_ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.memory_ttl_seconds",
            ..
        }
    ));
}

#[test]
fn ttl_beyond_one_year_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.persistent_ttl_seconds = Some(1_000_000_000_000);

    let err = Settings::from_raw(raw).expect_err("oversized ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.persistent_ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.memory_ttl_seconds = Some(365 * 24 * 60 * 60);
    assert!(Settings::from_raw(raw).is_ok());
}

#[test]
fn zero_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.memory_capacity = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());
    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn channel_names_are_validated() {
    let mut raw = RawSettings::default();
    raw.notify.broadcast_channel = Some(String::new());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.notify.change_channel = Some("Table-Changes".to_string());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.notify.change_channel = Some("bizdash_cache_invalidation".to_string());
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_command_is_none() {
    let args = CliArgs::parse_from(["bizdash"]);
    assert!(args.command.is_none());
}

#[test]
fn parse_stats_arguments() {
    let args = CliArgs::parse_from(["bizdash", "stats", "--year", "2024", "--month", "3"]);
    match args.command.expect("stats command") {
        Command::Stats(stats) => {
            assert_eq!(stats.year, 2024);
            assert_eq!(stats.month, "3");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_orders_defaults() {
    let args = CliArgs::parse_from(["bizdash", "orders", "--year", "2023"]);
    match args.command.expect("orders command") {
        Command::Orders(orders) => {
            assert_eq!(orders.page, 1);
            assert_eq!(orders.page_size, DEFAULT_ORDERS_PAGE_SIZE);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_invalidate_arguments() {
    let args = CliArgs::parse_from(["bizdash", "invalidate", "client", "--id", "c-42"]);
    match args.command.expect("invalidate command") {
        Command::Invalidate(invalidate) => {
            assert_eq!(invalidate.entity, EntityType::Client);
            assert_eq!(invalidate.id.as_deref(), Some("c-42"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn invalidate_rejects_unknown_entity() {
    let result = CliArgs::try_parse_from(["bizdash", "invalidate", "teams"]);
    assert!(result.is_err());
}

#[test]
fn global_flags_after_subcommand() {
    let args = CliArgs::parse_from([
        "bizdash",
        "top-clients",
        "--year",
        "2024",
        "--memory-only",
        "--database-url",
        "postgres://example",
    ]);

    assert!(args.overrides.memory_only);
    assert_eq!(
        args.overrides.database_url.as_deref(),
        Some("postgres://example")
    );
    assert!(matches!(args.command, Some(Command::TopClients(_))));
}
