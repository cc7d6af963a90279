//! Centralized configuration constants for termsurface.
//!
//! Compile-time defaults, organized by component. Every value here can be
//! overridden from the config file unless noted otherwise.

/// Session pacing and sizing.
pub mod session {
    use std::time::Duration;

    /// Rows used while the surface has not been laid out.
    pub const DEFAULT_ROWS: u16 = 24;
    /// Columns used while the surface has not been laid out.
    pub const DEFAULT_COLUMNS: u16 = 80;
    /// Largest chunk the reader pulls from the child at once.
    pub const READ_CHUNK_SIZE: usize = 1024;
    /// Renderer frame period.
    pub const RENDER_INTERVAL: Duration = Duration::from_millis(30);
    /// Minimum time between attachment and resize probes.
    pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);
    /// Value exported to the child as `TERM`.
    pub const DEFAULT_TERM: &str = "xterm-256color";
}

/// Scrollback buffer configuration.
pub mod scrollback {
    /// Default scrollback buffer size in lines.
    pub const DEFAULT_LINES: usize = 10_000;
    /// Maximum allowed scrollback buffer size in lines.
    pub const MAX_LINES: usize = 100_000;
}

/// Settings file validation limits.
pub mod settings {
    /// Maximum settings file size in bytes (64 KB).
    /// Settings files should be tiny; anything larger is suspicious.
    pub const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Maximum length for string fields (shell path, TERM value).
    pub const MAX_STRING_LENGTH: usize = 256;
}
