//! Factory for the two pluggable halves of a session.

use crate::process::{CommandSpec, Process};
use crate::pty_handler::PtyProcess;
use crate::screen::Screen;
use crate::types::TermSize;
use crate::vt_screen::VtScreen;
use anyhow::Result;
use std::sync::Arc;

/// Creates the child process and the screen that interprets its output.
pub trait Backend {
    fn spawn(&self, command: &CommandSpec, size: TermSize) -> Result<Arc<dyn Process>>;

    /// `process` receives the screen's replies to terminal queries.
    fn screen(
        &self,
        size: TermSize,
        scrollback_lines: usize,
        process: Arc<dyn Process>,
    ) -> Box<dyn Screen>;
}

/// Native PTY plus alacritty's interpreter.
#[derive(Clone, Debug)]
pub struct NativeBackend {
    /// Value exported to the child as `TERM`.
    pub term: String,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self {
            term: settings::constants::session::DEFAULT_TERM.to_string(),
        }
    }
}

impl NativeBackend {
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into() }
    }
}

impl Backend for NativeBackend {
    fn spawn(&self, command: &CommandSpec, size: TermSize) -> Result<Arc<dyn Process>> {
        Ok(Arc::new(PtyProcess::spawn(command, size, &self.term)?))
    }

    fn screen(
        &self,
        size: TermSize,
        scrollback_lines: usize,
        process: Arc<dyn Process>,
    ) -> Box<dyn Screen> {
        Box::new(VtScreen::new(size, scrollback_lines, Some(process)))
    }
}
