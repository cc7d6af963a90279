//! Host surface seam and the main-thread task queue.
//!
//! The host editor is single-thread affine. Background session threads may
//! query a [`Surface`] (geometry, attachment, text points) but every mutation
//! is wrapped in a task and posted to [`MainThread`]; the host drains those
//! tasks on its UI thread through [`MainLoop`].

use crate::geometry::SurfaceMetrics;
use crate::overlay::{ImageOverlay, OverlayDismiss};
use crate::types::SurfaceId;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// A visible editor surface hosting one terminal session.
///
/// Query methods may be called from any thread. Mutating methods (`render`
/// and everything after it) are only invoked from tasks executed by
/// [`MainLoop`].
pub trait Surface: Send + Sync + 'static {
    fn id(&self) -> SurfaceId;

    /// Current pixel metrics of the viewport.
    fn metrics(&self) -> SurfaceMetrics;

    /// Whether the surface still belongs to a window.
    fn has_window(&self) -> bool;

    /// Surface currently shown in the named output panel, if any.
    fn find_panel(&self, name: &str) -> Option<SurfaceId>;

    /// Cheap touch of the host from the reader thread.
    ///
    /// Hosts that starve their UI loop under heavy output use this as a
    /// yield point.
    fn ping(&self) {}

    /// Text offset of a (row, column) position in the surface buffer.
    fn text_point(&self, row: usize, col: usize) -> usize;

    /// Redraw the surface from the session's screen.
    fn render(&self);

    fn append_text(&self, text: &str);

    fn set_read_only(&self, read_only: bool);

    fn set_name(&self, name: &str);

    /// Show an inline overlay. `on_dismiss` is invoked by the host when the
    /// user dismisses it.
    fn add_overlay(&self, overlay: ImageOverlay, on_dismiss: OverlayDismiss);

    fn erase_overlay(&self, key: &str);

    /// Tear down the output panel with the given name.
    fn destroy_panel(&self, name: &str);

    /// Focus the hosting view and close it.
    fn close(&self);
}

/// Unit of work executed on the host thread.
pub type MainTask = Box<dyn FnOnce() + Send + 'static>;

/// Create a connected task sender and host-side executor.
pub fn main_thread() -> (MainThread, MainLoop) {
    let (tx, rx) = mpsc::channel();
    (MainThread { tx }, MainLoop { rx })
}

/// Sending half of the main-thread queue. Cheap to clone.
#[derive(Clone)]
pub struct MainThread {
    tx: Sender<MainTask>,
}

impl MainThread {
    /// Schedule `task` on the host thread.
    ///
    /// Tasks posted after the [`MainLoop`] is gone are dropped.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(task)).is_err() {
            tracing::debug!("Main loop is gone, dropping task");
        }
    }
}

/// Host-side executor for tasks posted through [`MainThread`].
pub struct MainLoop {
    rx: Receiver<MainTask>,
}

impl MainLoop {
    /// Run every task queued so far without waiting. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for a task, then drain the queue.
    ///
    /// Returns how many tasks ran; zero means the wait timed out or every
    /// sender has been dropped.
    pub fn run_for(&self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                1 + self.run_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Keep running tasks until `done` holds or `timeout` passes.
    ///
    /// Returns whether `done` was reached.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return done();
            }
            let wait = (deadline - now).min(Duration::from_millis(10));
            self.run_for(wait);
        }
    }
}
