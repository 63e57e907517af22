//! `canopy grow load` — Import grow records and sensor snapshots.

use std::path::Path;

use canopy_config::AppConfig;
use canopy_core::grow::{Grow, Snapshot};
use serde::Deserialize;

use super::runtime;

/// Import file layout.
#[derive(Debug, Deserialize)]
struct GrowFile {
    #[serde(default)]
    grows: Vec<Grow>,
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

fn parse(content: &str) -> Result<GrowFile, serde_json::Error> {
    serde_json::from_str(content)
}

pub async fn load(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let file = parse(&content).map_err(|e| format!("Invalid grow file {}: {e}", path.display()))?;

    let backends = runtime::open_backends(&config).await?;
    let Some(store) = backends.sqlite else {
        return Err(format!(
            "Storage backend '{}' does not persist grows; set storage.backend = \"sqlite\"",
            config.storage.backend
        )
        .into());
    };

    for grow in &file.grows {
        store.upsert_grow(grow).await?;
    }
    for snapshot in &file.snapshots {
        store.record_snapshot(snapshot).await?;
    }

    println!(
        "  ✅ Loaded {} grow(s) and {} snapshot(s) into {}",
        file.grows.len(),
        file.snapshots.len(),
        config.storage.resolved_path().display()
    );
    Ok(())
}
