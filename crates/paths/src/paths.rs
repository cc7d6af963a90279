//! Centralized path management for termsurface.
//!
//! Directories are lazily initialized and cached.

use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();
static IMAGES_DIR: OnceLock<PathBuf> = OnceLock::new();

/// ~/.config/termsurface (or platform equivalent)
pub fn config_dir() -> &'static PathBuf {
    CONFIG_DIR.get_or_init(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termsurface")
    })
}

/// ~/.cache/termsurface/images (or platform equivalent)
///
/// Suggested location for decoded inline images when the config names none.
pub fn images_dir() -> &'static PathBuf {
    IMAGES_DIR.get_or_init(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("termsurface")
            .join("images")
    })
}

/// Config file path: config_dir()/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
