//! Child-process endpoint seam.

use anyhow::Result;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

/// Opaque I/O endpoint of a child process running on a pseudo-terminal.
///
/// `read` blocks on the reader thread while `write` may be called from any
/// other thread concurrently; implementations must not serialise the two.
#[cfg_attr(test, mockall::automock)]
pub trait Process: Send + Sync {
    /// Blocking read of at most `max_bytes`. `None` signals end of stream.
    fn read(&self, max_bytes: usize) -> Option<Vec<u8>>;

    fn write(&self, data: &str) -> Result<()>;

    fn set_window_size(&self, rows: u16, cols: u16) -> Result<()>;

    /// Stop the child. `force` escalates to an unconditional kill and reaps it.
    fn terminate(&self, force: bool) -> Result<()>;

    fn is_alive(&self) -> bool;

    /// Exit code once the child has been reaped.
    fn exit_status(&self) -> Option<i32>;
}

/// What to run inside a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program followed by its arguments. Empty means the user's shell.
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Owning handle that force-terminates the child when dropped.
///
/// Other components may hold clones of the inner `Arc` (the screen writes
/// query responses through one), but only the guard decides the child's
/// lifetime.
pub struct ProcessGuard {
    process: Arc<dyn Process>,
}

impl ProcessGuard {
    pub fn new(process: Arc<dyn Process>) -> Self {
        Self { process }
    }
}

impl Deref for ProcessGuard {
    type Target = dyn Process;

    fn deref(&self) -> &Self::Target {
        self.process.as_ref()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Err(e) = self.process.terminate(true) {
            tracing::debug!("Force terminate: {}", e);
        }

        if self.process.is_alive() {
            tracing::debug!("Process becomes orphaned");
        } else {
            tracing::debug!("Process is terminated");
        }
    }
}
