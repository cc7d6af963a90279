//! A host surface with fixed geometry and no UI.
//!
//! Renders are counted, appended text is collected for printing at exit and
//! image overlays are logged.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use terminal::{ImageOverlay, OverlayDismiss, Surface, SurfaceId, SurfaceMetrics, TermSize};
use tracing::{debug, info};

/// Pixel size of one cell.
const CELL_WIDTH: f64 = 8.0;
const CELL_HEIGHT: f64 = 16.0;
/// Columns the geometry mapper reserves for the gutter.
const GUTTER: u16 = 3;

pub struct HeadlessSurface {
    id: SurfaceId,
    size: TermSize,
    closed: AtomicBool,
    read_only: AtomicBool,
    renders: AtomicUsize,
    appended: Mutex<String>,
    overlays: Mutex<Vec<ImageOverlay>>,
}

impl HeadlessSurface {
    pub fn new(id: SurfaceId, size: TermSize) -> Self {
        Self {
            id,
            size,
            closed: AtomicBool::new(false),
            read_only: AtomicBool::new(false),
            renders: AtomicUsize::new(0),
            appended: Mutex::new(String::new()),
            overlays: Mutex::new(Vec::new()),
        }
    }

    /// The session has finished and marked the surface read-only.
    pub fn is_finished(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn appended_text(&self) -> String {
        self.appended.lock().clone()
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.lock().len()
    }
}

impl Surface for HeadlessSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn metrics(&self) -> SurfaceMetrics {
        SurfaceMetrics {
            viewport_width: f64::from(u32::from(self.size.cols) + u32::from(GUTTER)) * CELL_WIDTH,
            viewport_height: f64::from(self.size.rows) * CELL_HEIGHT,
            line_height: CELL_HEIGHT,
            em_width: CELL_WIDTH,
        }
    }

    fn has_window(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn find_panel(&self, _name: &str) -> Option<SurfaceId> {
        None
    }

    fn text_point(&self, row: usize, col: usize) -> usize {
        row * (self.size.cols as usize + 1) + col
    }

    fn render(&self) {
        let n = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(renders = n, "Render");
    }

    fn append_text(&self, text: &str) {
        self.appended.lock().push_str(text);
    }

    fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn set_name(&self, name: &str) {
        info!("Title: {}", name);
    }

    fn add_overlay(&self, overlay: ImageOverlay, _on_dismiss: OverlayDismiss) {
        info!(
            key = %overlay.key,
            path = %overlay.path.display(),
            "Inline image {}x{} at offset {}",
            overlay.size.0,
            overlay.size.1,
            overlay.anchor
        );
        self.overlays.lock().push(overlay);
    }

    fn erase_overlay(&self, key: &str) {
        self.overlays.lock().retain(|overlay| overlay.key != key);
    }

    fn destroy_panel(&self, _name: &str) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
