use std::path::Path;

use anyhow::{Context, Result};

use rosterline_engine::config;
use rosterline_state::SqliteIdentityStore;

/// Execute the `check` command: validate config and the identity store.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = config::parse_config(config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
    println!("Config structure:  OK");
    println!("  chunk_cap:       {}", config.chunk_cap);
    println!("  concurrency:     {}", config.dispatch_concurrency);
    println!("  remote endpoint: {}", config.remote.endpoint);

    match SqliteIdentityStore::open(Path::new(&config.store.path)) {
        Ok(_) => println!("Identity store:    OK ({})", config.store.path),
        Err(e) => {
            println!("Identity store:    FAILED");
            return Err(e).with_context(|| {
                format!("Failed to open identity store: {}", config.store.path)
            });
        }
    }

    println!("\nAll checks passed.");
    Ok(())
}
