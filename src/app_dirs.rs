//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! - `COACHLINE_DATA_DIR` overrides [`data_dir`]
//! - `COACHLINE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the SQLite record store and the local blob bucket directory.
/// Resolves to `dirs::data_dir()/coachline/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("COACHLINE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("coachline"))
        .unwrap_or_else(|| PathBuf::from("/tmp/coachline-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/coachline/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("COACHLINE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("coachline"))
        .unwrap_or_else(|| PathBuf::from("/tmp/coachline-config"))
}

/// Path to `config.toml` inside [`config_dir`].
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Path to the SQLite database inside [`data_dir`].
#[must_use]
pub fn database_file() -> PathBuf {
    data_dir().join("coachline.db")
}

/// Local blob storage root inside [`data_dir`].
#[must_use]
pub fn blob_dir() -> PathBuf {
    data_dir().join("blobs")
}
