use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::IoResult;

/// Save a layer configuration (`SimilarityConfig` or `MexConfig`) as pretty
/// JSON using the attribute names.
pub fn save_config<C: Serialize>(config: &C, path: impl AsRef<Path>) -> IoResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    debug!(path = %path.display(), "saved layer config");
    Ok(())
}

/// Load a layer configuration; runs the same validation as its builder.
pub fn load_config<C: DeserializeOwned>(path: impl AsRef<Path>) -> IoResult<C> {
    let json = fs::read_to_string(path.as_ref())?;
    let config: C = serde_json::from_str(&json)?;
    Ok(config)
}
