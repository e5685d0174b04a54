use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use rosterline_engine::config::{self, EngineConfig};
use rosterline_engine::remote::UreqAdminGateway;
use rosterline_engine::Orchestrator;
use rosterline_state::SqliteIdentityStore;
use rosterline_types::request::RawRequest;

/// Execute the `run` command: load a batch file, process it, and print
/// one verdict JSON object per line.
pub async fn execute(batch_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => config::parse_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let content = std::fs::read_to_string(batch_path)
        .with_context(|| format!("Failed to read batch file: {}", batch_path.display()))?;
    let batch: Vec<RawRequest> =
        serde_json::from_str(&content).context("Batch file is not a JSON array of requests")?;

    tracing::info!(
        items = batch.len(),
        store = config.store.path,
        remote = config.remote.endpoint,
        "Processing batch"
    );

    let store = Arc::new(
        SqliteIdentityStore::open(Path::new(&config.store.path))
            .with_context(|| format!("Failed to open identity store: {}", config.store.path))?,
    );
    let gateway = Arc::new(UreqAdminGateway::new(
        config.remote.endpoint.clone(),
        config.remote_timeout(),
    ));
    let orchestrator = Orchestrator::new(store, gateway, config);

    let outcome = orchestrator.process_batch(batch).await;
    for response in &outcome.responses {
        println!("{}", serde_json::to_string(response)?);
    }

    eprintln!(
        "{} verdict(s): {} succeeded, {} failed",
        outcome.responses.len(),
        outcome.succeeded(),
        outcome.failed()
    );
    if outcome.failed() > 0 {
        anyhow::bail!("{} item(s) failed", outcome.failed());
    }
    Ok(())
}
