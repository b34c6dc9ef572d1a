use super::*;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.cache.ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.capacity.get(), 10_000);
    assert_eq!(settings.acquisition.timeout, Duration::from_secs(45));
    assert_eq!(settings.acquisition.mode, AcquisitionMode::Http);
    assert!(settings.database.url.is_none());
    assert!(settings.summary.api_key.is_none());
    assert_eq!(settings.summary.model, "llama-3.3-70b-versatile");
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        shared: SharedOverrides {
            log_level: Some("debug".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        shared: SharedOverrides {
            log_json: Some(true),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_cache_ttl_is_rejected_with_key() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));
}

#[test]
fn unknown_acquisition_mode_is_rejected() {
    let mut raw = RawSettings::default();
    raw.acquisition.mode = Some("browser".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown mode");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "acquisition.mode",
            ..
        }
    ));
}

#[test]
fn base_url_gains_trailing_slash() {
    let mut raw = RawSettings::default();
    raw.acquisition.base_url = Some("https://pages.example.test/company".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.acquisition.base_url.as_str(),
        "https://pages.example.test/company/"
    );
}

#[test]
fn blank_database_url_selects_memory_store() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["pagelens"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_resolve_arguments() {
    let args = CliArgs::parse_from([
        "pagelens",
        "resolve",
        "--acquisition-mode",
        "fixture",
        "acme",
    ]);

    match args.command.expect("resolve command") {
        Command::Resolve(resolve) => {
            assert_eq!(resolve.page_id, "acme");
            assert_eq!(
                resolve.overrides.acquisition_mode.as_deref(),
                Some("fixture")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "pagelens",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.shared.database_url.as_deref(),
                Some("postgres://override")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
