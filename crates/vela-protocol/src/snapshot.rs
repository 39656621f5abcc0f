//! Snapshot persistence.
//!
//! A snapshot is the bincode encoding (standard config, serde integration)
//! of a format version followed by the full host state.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use vela_core::error::VelaError;

/// Bumped whenever the encoded layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Encode `state` with the version header.
pub fn encode<T: Serialize>(state: &T) -> Result<Vec<u8>, VelaError> {
    bincode::serde::encode_to_vec((SNAPSHOT_VERSION, state), bincode::config::standard())
        .map_err(|e| VelaError::Snapshot(e.to_string()))
}

/// Decode a state written by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, VelaError> {
    let ((version, state), read): ((u32, T), usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| VelaError::Snapshot(e.to_string()))?;
    if version != SNAPSHOT_VERSION {
        return Err(VelaError::Snapshot(format!(
            "unsupported snapshot version {version}, expected {SNAPSHOT_VERSION}"
        )));
    }
    if read != bytes.len() {
        return Err(VelaError::Snapshot(format!("{} trailing bytes", bytes.len() - read)));
    }
    Ok(state)
}

/// Write `state` to `path`, replacing any existing file.
pub fn write<T: Serialize>(path: impl AsRef<Path>, state: &T) -> Result<(), VelaError> {
    let bytes = encode(state)?;
    std::fs::write(path.as_ref(), &bytes).map_err(|e| VelaError::Snapshot(e.to_string()))?;
    debug!(path = %path.as_ref().display(), bytes = bytes.len(), "snapshot written");
    Ok(())
}

/// Read a state from `path`.
pub fn read<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, VelaError> {
    let bytes = std::fs::read(path.as_ref()).map_err(|e| VelaError::Snapshot(e.to_string()))?;
    decode(&bytes)
}
