//! # Terminal Binary Tests
//!
//! Argument parsing, option layering and mounting, without a runtime.

use std::io;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use clap::Parser;
use counter_clock_lib::config::{Config, DisplayConfig, EventStrategy};
use counter_clock_lib::{EventKind, Flow, OptionValue, Options, State};

use crate::{build_options, mount, rendered, Args};

fn args(list: &[&str]) -> Result<Args, clap::Error> {
    Args::try_parse_from(std::iter::once("counter-clock").chain(list.iter().copied()))
}

/// Log output collected in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn parses_every_flag() {
    let parsed = args(&[
        "--config",
        "clock.toml",
        "--target",
        "2027-01-01T00:00:00Z",
        "--options",
        r#"{"interval": 500}"#,
        "--once",
    ])
    .unwrap();

    assert_eq!(parsed.config.as_deref(), Some(std::path::Path::new("clock.toml")));
    assert_eq!(parsed.target.as_deref(), Some("2027-01-01T00:00:00Z"));
    assert_eq!(parsed.options.as_deref(), Some(r#"{"interval": 500}"#));
    assert!(parsed.once);

    assert_eq!(args(&[]).unwrap(), Args::default());
}

#[test]
fn rejects_bad_arguments() {
    assert!(args(&["--target"]).is_err());
    assert!(args(&["--stdout"]).is_err());
    assert!(args(&["--once", "extra"]).is_err());
}

#[test]
fn command_line_overrides_config() {
    let mut config = Config::default();
    config.counter.insert(
        "target".to_string(),
        toml::Value::String("2026-01-01T00:00:00Z".to_string()),
    );
    config
        .counter
        .insert("interval".to_string(), toml::Value::Integer(500));

    let layered = build_options(&config, &Args::default()).unwrap();
    assert_eq!(
        layered.get("timestamp"),
        Some(&OptionValue::Integer(1_767_225_600_000))
    );
    assert_eq!(layered.get("interval"), Some(&OptionValue::Integer(500)));
    assert_eq!(layered.get("autostart"), Some(&OptionValue::Flag(true)));

    let cli = Args {
        target: Some("2027-01-01T00:00:00Z".to_string()),
        options: Some(r#"{"interval": 250, "autostart": false}"#.to_string()),
        ..Args::default()
    };
    let layered = build_options(&config, &cli).unwrap();
    assert_eq!(
        layered.get("timestamp"),
        Some(&OptionValue::Integer(1_798_761_600_000))
    );
    assert_eq!(layered.get("interval"), Some(&OptionValue::Integer(250)));
    assert_eq!(layered.get("autostart"), Some(&OptionValue::Flag(false)));
}

#[test]
fn bad_command_line_values_are_errors() {
    let config = Config::default();
    let bad_target = Args {
        target: Some("tomorrow".to_string()),
        ..Args::default()
    };
    assert!(build_options(&config, &bad_target).is_err());

    let bad_json = Args {
        options: Some("[1, 2]".to_string()),
        ..Args::default()
    };
    assert!(build_options(&config, &bad_json).is_err());
}

#[test]
fn mounts_and_renders_terminal_layout() {
    let since = Utc::now().timestamp_millis() - 93_784_000;
    let options = build_options(&Config::default(), &Args::default())
        .unwrap()
        .extend(Options::new().timestamp(since));

    let mut counter = mount(&Config::default(), options).unwrap();
    assert_eq!(counter.state(), State::Running);
    assert_eq!(rendered(&counter), "001:02:03:04");

    counter.stop();
    assert_eq!(counter.state(), State::Idle);
}

#[test]
fn bubbling_mount_announces_from_the_page() {
    let config = Config {
        display: DisplayConfig {
            mount: "#app".to_string(),
            events: EventStrategy::Bubbling,
        },
        ..Config::default()
    };
    let options = build_options(&config, &Args::default()).unwrap();
    let mut counter = mount(&config, options).unwrap();

    let app = counter.surface().query("#app")[0];
    assert_eq!(counter.surface().parent(counter.root().unwrap()), Some(app));
    counter.stop();
    assert_eq!(counter.state(), State::Idle);
}

#[test]
fn missing_mount_point_leaves_counter_detached() {
    let config = Config {
        display: DisplayConfig {
            mount: "#nowhere".to_string(),
            events: EventStrategy::Local,
        },
        ..Config::default()
    };
    let options = build_options(&config, &Args::default())
        .unwrap()
        .extend(Options::new().autostart(false));
    let counter = mount(&config, options).unwrap();

    let root = counter.root().unwrap();
    assert!(!counter.surface().is_attached(root));
    assert_eq!(counter.state(), State::Idle);
    assert_eq!(rendered(&counter).len(), "000:00:00:00".len());
}

/// The mount-point listener logs the request; an outer listener can still veto.
#[test]
fn stop_announcement_precedes_the_stop() {
    let config = Config {
        display: DisplayConfig {
            mount: "#app".to_string(),
            events: EventStrategy::Bubbling,
        },
        ..Config::default()
    };
    let logs = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    let state = tracing::subscriber::with_default(subscriber, || {
        let options = build_options(&config, &Args::default()).unwrap();
        let mut counter = mount(&config, options).unwrap();
        let body = counter.surface().body();
        counter.on_node(body, EventKind::Stop, |_, _| Flow::Prevent);
        counter.stop();
        counter.state()
    });

    assert_eq!(state, State::Running);
    let text = logs.text();
    assert!(text.contains("stop requested"), "{text}");
    assert!(!text.contains("counter stopped"), "{text}");
}
