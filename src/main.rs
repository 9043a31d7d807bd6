//! # Counter Clock Terminal Entry Point
//!
//! Mounts a counter into an in-memory document and prints the rendered
//! text every time it ticks.
//!
//! ```text
//! counter-clock [--config PATH] [--target RFC3339] [--options JSON] [--once]
//! ```
//!
//! Options are layered: the terminal template and `autostart`, then the
//! `[counter]` table of the config file, then `--target`, then `--options`.
//! Logging goes to stderr, filtered by `COUNTER_LOG` (default `warn`).

// Test modules
#[cfg(test)]
mod tests;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use counter_clock_lib::config::{self, Config, EventStrategy};
use counter_clock_lib::{
    ticker, BubblingBus, Counter, Document, Event, EventKind, Flow, NodeId, Options, Target,
};

/// `DDD:HH:MM:SS` with literal separators, for plain text output.
const TERMINAL_TEMPLATE: &str = concat!(
    r#"<div class="counter">"#,
    r#"<span class="digit day char3">0</span>"#,
    r#"<span class="digit day char2">0</span>"#,
    r#"<span class="digit day char1">0</span>:"#,
    r#"<span class="digit hrs char2">0</span>"#,
    r#"<span class="digit hrs char1">0</span>:"#,
    r#"<span class="digit min char2">0</span>"#,
    r#"<span class="digit min char1">0</span>:"#,
    r#"<span class="digit sec char2">0</span>"#,
    r#"<span class="digit sec char1">0</span>"#,
    r#"</div>"#,
);

/// Page the counter is mounted into.
const PAGE: &str = r#"<main id="app"></main>"#;

/// Print a countdown or count-up clock to the terminal.
#[derive(Parser, Debug, Default, PartialEq)]
#[command(name = "counter-clock", version, about)]
struct Args {
    /// Config file (default `counter-config.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Moment to count towards or from, RFC 3339.
    #[arg(long, value_name = "RFC3339")]
    target: Option<String>,

    /// Option overrides as a JSON object.
    #[arg(long, value_name = "JSON")]
    options: Option<String>,

    /// Print the current value once and exit.
    #[arg(long)]
    once: bool,
}

/// Terminal defaults, then the config file, then the command line.
fn build_options(config: &Config, args: &Args) -> anyhow::Result<Options> {
    let mut options = Options::new()
        .template(TERMINAL_TEMPLATE)
        .autostart(true)
        .extend(config.options()?);
    if let Some(target) = &args.target {
        options = options.timestamp(config::parse_target(target)?);
    }
    if let Some(json) = &args.options {
        let overrides = Options::from_json(json).context("--options must be a JSON object")?;
        options = options.extend(overrides);
    }
    Ok(options)
}

fn mount(config: &Config, options: Options) -> anyhow::Result<Counter<Document>> {
    let page = Document::parse(PAGE);
    let target = Target::selector(config.display.mount.as_str());
    if target.resolve(&page).is_none() {
        warn!(mount = %config.display.mount, "mount point not found, counter stays detached");
    }

    let builder = Counter::builder(page).options(options);
    let mut counter = match config.display.events {
        EventStrategy::Local => builder.mount(target)?,
        EventStrategy::Bubbling => builder
            .bus(BubblingBus::<Counter<Document>, NodeId>::new())
            .mount(target)?,
    };

    let announce = |_: &mut Counter<Document>, event: &Event| {
        info!(event = %event.name, offset = event.offset.signed_seconds, "stop requested");
        Flow::Continue
    };
    let mount_point = counter
        .root()
        .and_then(|root| counter.surface().parent(root));
    match (config.display.events, mount_point) {
        (EventStrategy::Bubbling, Some(node)) => {
            counter.on_node(node, EventKind::Stop, announce);
        }
        _ => {
            counter.on(EventKind::Stop, announce);
        }
    }
    Ok(counter)
}

fn rendered(counter: &Counter<Document>) -> String {
    counter
        .root()
        .map(|root| counter.surface().text_content(root))
        .unwrap_or_default()
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("COUNTER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // a subscriber may already be installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let options = build_options(&config, &args)?;
    let mut counter = mount(&config, options).context("failed to mount counter")?;

    println!("{}", rendered(&counter));
    if args.once {
        return Ok(());
    }

    // The counter is !Send; a current-thread runtime keeps it on this thread
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        tokio::select! {
            _ = ticker::drive_with(&mut counter, |counter| println!("{}", rendered(counter))) => {
                info!("counter stopped");
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("interrupted");
            }
        }
        anyhow::Ok(())
    })?;

    counter.destroy();
    Ok(())
}
