//! Ping Bot Demo
//!
//! Wires the manifests under `handlers/` to an in-process [`EventBus`] and
//! fires a few events at them.
//!
//! ```text
//! handlers/
//! ├── greetings/          run(): each file declares its own event
//! │   ├── boot.toml       once "ready"
//! │   └── hello.toml      on "join"
//! └── ping/               on("ping")
//!     ├── pong.toml       bare `fn = "code"`
//!     └── stats.toml      record with a `code` field
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package ping-bot -- --pings 3
//! SPINDLE_LOGGING__LEVEL=debug cargo run --package ping-bot
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use clap::Parser;
use serde_json::{Value, json};
use spindle::prelude::*;
use spindle::runtime::logging;
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Fire demo events at handler manifests")]
struct Args {
    /// Directory holding the `ping` and `greetings` handler folders.
    #[arg(long, default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/handlers"))]
    handlers: PathBuf,

    /// Configuration file; defaults to searching for `spindle.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// How many `ping` events to fire.
    #[arg(long, default_value_t = 2)]
    pings: u64,
}

// ============================================================================
// Handler Functions
// ============================================================================

fn registry() -> FunctionRegistry {
    let pings = Arc::new(AtomicU64::new(0));

    FunctionRegistry::new()
        .with(
            "code",
            into_code(|args| async move {
                info!(?args, "pong");
                Ok(())
            }),
        )
        .with(
            "stats",
            sync_code(move |_| {
                let total = pings.fetch_add(1, Ordering::Relaxed) + 1;
                info!(total, "ping counted");
                Ok(())
            }),
        )
        .with(
            "greet",
            sync_code(|args| {
                let who = args.first().and_then(Value::as_str).unwrap_or("stranger");
                info!("hello, {who}!");
                Ok(())
            }),
        )
        .with(
            "boot",
            sync_code(|_| {
                info!("bot is ready");
                Ok(())
            }),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ConfigLoader::new().file(path).load()?,
        None => ConfigLoader::new()
            .search_path(env!("CARGO_MANIFEST_DIR"))
            .load()?,
    };
    logging::init_from_config(&config.logging);

    let bus = Arc::new(EventBus::new());
    let mut app = Application::from_config(Arc::clone(&bus), ManifestLoader::new(registry()), &config)?;

    let sequence = Arc::new(AtomicU64::new(0));
    app.on(
        "ping",
        args.handlers.join("ping"),
        Some(callback(move |firing| {
            let seq = sequence.fetch_add(1, Ordering::Relaxed);
            firing.set([json!({ "seq": seq })]);
        })),
    )?;
    let routes = app.run(None, args.handlers.join("greetings"), None, None)?;
    info!(routes = routes.len(), "Greeting handlers registered");

    bus.emit("ready", vec![]).await?;
    bus.emit("join", vec![json!("ann")]).await?;
    for _ in 0..args.pings {
        bus.emit("ping", vec![json!("hello")]).await?;
    }
    // once-routes are gone after the first firing
    bus.emit("ready", vec![]).await?;

    Ok(())
}
