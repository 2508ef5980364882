//! feedcheck: change stream consistency harness
//!
//! ```text
//! feedcheck [URI]
//! ```
//!
//! Connects, reads `feedcheck.toml` from the working directory if present and
//! runs passes until `max_passes` is reached (forever by default). Fatal
//! errors end the process with a non-zero status.

mod commands;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use feedcheck_harness::{HarnessConfig, Orchestrator};
use feedcheck_store::MongoStore;

use commands::build_cli;

#[tokio::main]
async fn main() {
    init_tracing();

    let matches = build_cli().get_matches();
    let uri = commands::uri(&matches).to_string();

    if let Err(e) = run(&uri).await {
        error!(target: "feedcheck::pass", "{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mongodb=warn".into()),
        )
        .init();
}

async fn run(uri: &str) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let config = HarnessConfig::load_or_default(&cwd)?;
    let collection = config.collection_name(chrono::Utc::now());

    let store = Arc::new(
        MongoStore::connect(uri, &collection)
            .await
            .with_context(|| format!("cannot connect to {}", uri))?,
    );

    let mut orchestrator = Orchestrator::new(store.clone(), config)?;
    let outcome = orchestrator.run().await;
    drop(orchestrator);

    if let Ok(store) = Arc::try_unwrap(store) {
        store.shutdown().await;
    }

    let totals = outcome?;
    info!(
        target: "feedcheck::pass",
        passes = totals.passes,
        total_errors = totals.inconsistencies,
        "Run finished"
    );
    Ok(())
}
