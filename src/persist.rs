//! Small JSON state files.
//!
//! Conversation history and the overlay window placement are persisted as
//! pretty-printed JSON under the platform data directory. A missing file
//! reads as the default value; parent directories are created on save.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Read a JSON state file, returning `T::default()` when it does not exist.
///
/// # Errors
///
/// Returns an error for unreadable or unparseable files (not for absent
/// ones).
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> crate::Result<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => {
            return Err(crate::CompanionError::Persist(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| {
        crate::CompanionError::Persist(format!("cannot parse {}: {e}", path.display()))
    })
}

/// Write a JSON state file, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error when the directory cannot be created or the file
/// cannot be written.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            crate::CompanionError::Persist(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| crate::CompanionError::Persist(format!("cannot serialize state: {e}")))?;
    std::fs::write(path, json).map_err(|e| {
        crate::CompanionError::Persist(format!("cannot write {}: {e}", path.display()))
    })
}

/// Base directory for persisted companion state.
#[must_use]
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cricket")
}

/// Last known overlay window position, saved so the companion reappears
/// where the user left it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WindowPlacement {
    pub x: i32,
    pub y: i32,
}

impl WindowPlacement {
    /// Default placement file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        default_state_dir().join("overlay_position.json")
    }

    /// Load the placement, defaulting to the origin when absent.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable or unparseable files.
    pub fn load(path: &Path) -> crate::Result<Self> {
        load_json(path)
    }

    /// Save the placement.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        save_json(path, self)
    }
}
