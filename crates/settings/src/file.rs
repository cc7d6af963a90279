//! TOML config file support.
//!
//! Config location: `~/.config/termsurface/config.toml`

use crate::constants::{scrollback, session, settings as limits};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Program run when a session names no command. Falls back to `SHELL`.
    pub shell: Option<String>,
    /// Value exported to the child as `TERM`.
    pub term: String,
    /// Maximum number of scrollback lines.
    pub scrollback_lines: usize,
    /// Rows used until the surface has been laid out.
    pub default_rows: u16,
    /// Columns used until the surface has been laid out.
    pub default_columns: u16,
    /// Renderer frame period in milliseconds.
    pub render_interval_ms: u64,
    /// Attachment/resize probe period in milliseconds.
    pub probe_interval_ms: u64,
    /// Largest chunk read from the child at once.
    pub read_chunk_size: usize,
    /// Extra environment for every session.
    pub env: BTreeMap<String, String>,
    /// Directory for decoded inline images.
    pub image_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            term: session::DEFAULT_TERM.to_string(),
            scrollback_lines: scrollback::DEFAULT_LINES,
            default_rows: session::DEFAULT_ROWS,
            default_columns: session::DEFAULT_COLUMNS,
            render_interval_ms: session::RENDER_INTERVAL.as_millis() as u64,
            probe_interval_ms: session::PROBE_INTERVAL.as_millis() as u64,
            read_chunk_size: session::READ_CHUNK_SIZE,
            env: BTreeMap::new(),
            image_dir: None,
        }
    }
}

impl Config {
    /// Clamp out-of-range values back into something a session can use.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.scrollback_lines > scrollback::MAX_LINES {
            tracing::warn!(
                "scrollback-lines {} exceeds {}, clamping",
                self.scrollback_lines,
                scrollback::MAX_LINES
            );
            self.scrollback_lines = scrollback::MAX_LINES;
        }
        if self.default_rows == 0 || self.default_columns == 0 {
            tracing::warn!("Default size must be non-zero, using defaults");
            self.default_rows = defaults.default_rows;
            self.default_columns = defaults.default_columns;
        }
        if self.render_interval_ms == 0 {
            self.render_interval_ms = defaults.render_interval_ms;
        }
        if self.probe_interval_ms == 0 {
            self.probe_interval_ms = defaults.probe_interval_ms;
        }
        if self.read_chunk_size == 0 {
            self.read_chunk_size = defaults.read_chunk_size;
        }
        if self.term.is_empty() || self.term.len() > limits::MAX_STRING_LENGTH {
            tracing::warn!("Invalid term value, using {}", defaults.term);
            self.term = defaults.term;
        }
        if self
            .shell
            .as_ref()
            .is_some_and(|shell| shell.is_empty() || shell.len() > limits::MAX_STRING_LENGTH)
        {
            tracing::warn!("Invalid shell value, ignoring");
            self.shell = None;
        }
        self
    }
}

const DEFAULT_CONFIG: &str = r#"# termsurface configuration

# Program started when no command is given (defaults to $SHELL)
# shell = "/bin/bash"

# Value exported to the child as TERM
term = "xterm-256color"

# Maximum scrollback buffer size (lines)
scrollback-lines = 10000

# Size used until the surface has been laid out
default-rows = 24
default-columns = 80

# Renderer frame period and attachment/resize probe period (milliseconds)
# render-interval-ms = 30
# probe-interval-ms = 1000

# Largest chunk read from the child at once (bytes)
# read-chunk-size = 1024

# Directory for decoded inline images (defaults to the user cache dir)
# image-dir = "/tmp/termsurface"

# Extra environment for every session
# [env]
# LANG = "en_US.UTF-8"
"#;

/// Return the config file path.
pub fn config_path() -> PathBuf {
    termsurface_paths::config_file()
}

/// Write the commented default config if none exists yet.
pub fn ensure_config_file() -> Option<PathBuf> {
    let path = config_path();
    if !path.exists() {
        let parent = path.parent()?;
        std::fs::create_dir_all(parent).ok()?;
        std::fs::write(&path, DEFAULT_CONFIG).ok()?;
        tracing::info!("Created default config at {:?}", path);
    }
    Some(path)
}

/// Load the user's config, falling back to defaults on any problem.
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load a config file, falling back to defaults on any problem.
pub fn load_config_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config: {}", e);
            }
            return Config::default();
        }
    };

    // Size guard
    if content.len() > limits::MAX_FILE_SIZE as usize {
        tracing::warn!(
            "Config file too large ({} bytes), using defaults",
            content.len()
        );
        return Config::default();
    }

    match toml::from_str::<Config>(&content) {
        Ok(cfg) => cfg.validated(),
        Err(e) => {
            tracing::warn!("Failed to parse config.toml: {}", e);
            Config::default()
        }
    }
}
