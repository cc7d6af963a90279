//! Test doubles for driving a session without a PTY or a real host.

#![allow(dead_code)]

use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use terminal::{
    Backend, CommandSpec, Cursor, ImageHandler, ImageOverlay, OverlayDismiss, Process, Screen,
    SessionOptions, Surface, SurfaceId, SurfaceMetrics, TermModes, TermSize, VtScreen,
};

/// Pixel size of one cell on the recording surface.
pub const CELL_WIDTH: f64 = 10.0;
pub const CELL_HEIGHT: f64 = 20.0;

/// Options with fast loops so tests finish quickly.
pub fn fast_options() -> SessionOptions {
    SessionOptions {
        render_interval: Duration::from_millis(5),
        probe_interval: Duration::from_millis(10),
        ..SessionOptions::default()
    }
}

// ==================== Process ====================

/// Child process fed from the test through a channel.
pub struct FakeProcess {
    output: Mutex<Receiver<Option<Vec<u8>>>>,
    feeder: Sender<Option<Vec<u8>>>,
    written: Mutex<Vec<String>>,
    window_sizes: Mutex<Vec<(u16, u16)>>,
    terminations: Mutex<Vec<bool>>,
    alive: AtomicBool,
    status_on_exit: Option<i32>,
    status: Mutex<Option<i32>>,
}

impl FakeProcess {
    /// `status_on_exit` becomes the exit status once the output ends.
    pub fn new(status_on_exit: Option<i32>) -> Arc<Self> {
        let (feeder, output) = mpsc::channel();
        Arc::new(Self {
            output: Mutex::new(output),
            feeder,
            written: Mutex::new(Vec::new()),
            window_sizes: Mutex::new(Vec::new()),
            terminations: Mutex::new(Vec::new()),
            alive: AtomicBool::new(true),
            status_on_exit,
            status: Mutex::new(None),
        })
    }

    /// Queue a chunk of child output.
    pub fn emit(&self, data: impl AsRef<[u8]>) {
        let _ = self.feeder.send(Some(data.as_ref().to_vec()));
    }

    /// End the child's output stream.
    pub fn exit(&self) {
        let _ = self.feeder.send(None);
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    pub fn window_sizes(&self) -> Vec<(u16, u16)> {
        self.window_sizes.lock().clone()
    }

    pub fn terminations(&self) -> Vec<bool> {
        self.terminations.lock().clone()
    }

    fn reap(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            *self.status.lock() = self.status_on_exit;
        }
    }
}

impl Process for FakeProcess {
    fn read(&self, _max_bytes: usize) -> Option<Vec<u8>> {
        let next = self.output.lock().recv().ok().flatten();
        if next.is_none() {
            self.reap();
        }
        next
    }

    fn write(&self, data: &str) -> Result<()> {
        if !self.alive.load(Ordering::SeqCst) {
            bail!("process has exited");
        }
        self.written.lock().push(data.to_string());
        Ok(())
    }

    fn set_window_size(&self, rows: u16, cols: u16) -> Result<()> {
        self.window_sizes.lock().push((rows, cols));
        Ok(())
    }

    fn terminate(&self, force: bool) -> Result<()> {
        self.terminations.lock().push(force);
        self.reap();
        self.exit();
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn exit_status(&self) -> Option<i32> {
        *self.status.lock()
    }
}

// ==================== Screen ====================

/// State shared between a [`FakeScreen`] and the test.
#[derive(Default)]
pub struct ScreenState {
    pub feeds: Vec<Vec<u8>>,
    pub resizes: Vec<TermSize>,
    pub modes: TermModes,
    pub finished: bool,
}

/// Screen that records what the session does to it.
pub struct FakeScreen {
    state: Arc<Mutex<ScreenState>>,
    size: TermSize,
    dirty: bool,
    cursor: Cursor,
}

impl FakeScreen {
    pub fn new(size: TermSize, state: Arc<Mutex<ScreenState>>) -> Self {
        Self {
            state,
            size,
            dirty: false,
            cursor: Cursor::default(),
        }
    }
}

impl Screen for FakeScreen {
    fn feed(&mut self, bytes: &[u8]) {
        self.state.lock().feeds.push(bytes.to_vec());
        self.cursor.x += bytes.len();
        self.dirty = true;
    }

    fn finish(&mut self) {
        self.state.lock().finished = true;
    }

    fn resize(&mut self, size: TermSize) {
        self.state.lock().resizes.push(size);
        self.size = size;
        self.dirty = true;
    }

    fn size(&self) -> TermSize {
        self.size
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn cursor(&self) -> Cursor {
        self.cursor
    }

    fn modes(&self) -> TermModes {
        self.state.lock().modes
    }

    fn set_image_handler(&mut self, _handler: ImageHandler) {}

    fn index(&mut self) {
        self.cursor.y += 1;
    }

    fn display_lines(&self) -> Vec<String> {
        let state = self.state.lock();
        let text: Vec<u8> = state.feeds.concat();
        vec![String::from_utf8_lossy(&text).into_owned()]
    }
}

// ==================== Backend ====================

/// Which screen a [`FakeBackend`] builds.
pub enum ScreenKind {
    Recording(Arc<Mutex<ScreenState>>),
    Vt,
}

pub struct FakeBackend {
    pub process: Arc<FakeProcess>,
    screen: ScreenKind,
    pub spawned: Mutex<Vec<(CommandSpec, TermSize)>>,
}

impl FakeBackend {
    /// Backend with a recording screen. Returns the screen state too.
    pub fn recording(process: Arc<FakeProcess>) -> (Self, Arc<Mutex<ScreenState>>) {
        let state = Arc::new(Mutex::new(ScreenState::default()));
        let backend = Self {
            process,
            screen: ScreenKind::Recording(state.clone()),
            spawned: Mutex::new(Vec::new()),
        };
        (backend, state)
    }

    /// Backend with the real VT screen on top of the fake process.
    pub fn vt(process: Arc<FakeProcess>) -> Self {
        Self {
            process,
            screen: ScreenKind::Vt,
            spawned: Mutex::new(Vec::new()),
        }
    }
}

impl Backend for FakeBackend {
    fn spawn(&self, command: &CommandSpec, size: TermSize) -> Result<Arc<dyn Process>> {
        self.spawned.lock().push((command.clone(), size));
        Ok(self.process.clone())
    }

    fn screen(
        &self,
        size: TermSize,
        scrollback_lines: usize,
        process: Arc<dyn Process>,
    ) -> Box<dyn Screen> {
        match &self.screen {
            ScreenKind::Recording(state) => Box::new(FakeScreen::new(size, state.clone())),
            ScreenKind::Vt => Box::new(VtScreen::new(size, scrollback_lines, Some(process))),
        }
    }
}

/// Backend whose spawn always fails.
pub struct FailingBackend;

impl Backend for FailingBackend {
    fn spawn(&self, _command: &CommandSpec, _size: TermSize) -> Result<Arc<dyn Process>> {
        bail!("no such program")
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

// ==================== Surface ====================

/// Host-side effect observed by [`RecordingSurface`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Render,
    Append(String),
    ReadOnly(bool),
    Name(String),
    Overlay(String),
    Erase(String),
    DestroyPanel(String),
    Close,
}

pub struct RecordingSurface {
    id: SurfaceId,
    metrics: Mutex<SurfaceMetrics>,
    window: AtomicBool,
    panels: Mutex<HashMap<String, SurfaceId>>,
    events: Mutex<Vec<HostEvent>>,
    overlays: Mutex<Vec<ImageOverlay>>,
    main_thread: Mutex<Option<std::thread::ThreadId>>,
    off_thread_mutation: AtomicBool,
}

impl RecordingSurface {
    /// Surface laid out for `size` cells, attached to a window.
    pub fn new(id: u64, size: TermSize) -> Arc<Self> {
        let surface = Arc::new(Self {
            id: SurfaceId(id),
            metrics: Mutex::new(SurfaceMetrics::default()),
            window: AtomicBool::new(true),
            panels: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            overlays: Mutex::new(Vec::new()),
            main_thread: Mutex::new(Some(std::thread::current().id())),
            off_thread_mutation: AtomicBool::new(false),
        });
        surface.lay_out(size);
        surface
    }

    /// Change the viewport so it maps to `size`.
    pub fn lay_out(&self, size: TermSize) {
        *self.metrics.lock() = SurfaceMetrics {
            viewport_width: (f64::from(size.cols) + 3.0) * CELL_WIDTH,
            viewport_height: f64::from(size.rows) * CELL_HEIGHT,
            line_height: CELL_HEIGHT,
            em_width: CELL_WIDTH,
        };
    }

    /// Forget the layout, as a host does before the first paint.
    pub fn unlay(&self) {
        *self.metrics.lock() = SurfaceMetrics::default();
    }

    pub fn detach(&self) {
        self.window.store(false, Ordering::SeqCst);
    }

    pub fn show_in_panel(&self, name: &str, id: SurfaceId) {
        self.panels.lock().insert(name.to_string(), id);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn overlays(&self) -> Vec<ImageOverlay> {
        self.overlays.lock().clone()
    }

    pub fn is_read_only(&self) -> bool {
        self.events().contains(&HostEvent::ReadOnly(true))
    }

    pub fn appended(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Append(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Whether any mutation ran on a thread other than the one that built the surface.
    pub fn mutated_off_main_thread(&self) -> bool {
        self.off_thread_mutation.load(Ordering::SeqCst)
    }

    fn record(&self, event: HostEvent) {
        if *self.main_thread.lock() != Some(std::thread::current().id()) {
            self.off_thread_mutation.store(true, Ordering::SeqCst);
        }
        self.events.lock().push(event);
    }
}

impl Surface for RecordingSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn metrics(&self) -> SurfaceMetrics {
        *self.metrics.lock()
    }

    fn has_window(&self) -> bool {
        self.window.load(Ordering::SeqCst)
    }

    fn find_panel(&self, name: &str) -> Option<SurfaceId> {
        self.panels.lock().get(name).copied()
    }

    fn text_point(&self, row: usize, col: usize) -> usize {
        row * 1000 + col
    }

    fn render(&self) {
        self.record(HostEvent::Render);
    }

    fn append_text(&self, text: &str) {
        self.record(HostEvent::Append(text.to_string()));
    }

    fn set_read_only(&self, read_only: bool) {
        self.record(HostEvent::ReadOnly(read_only));
    }

    fn set_name(&self, name: &str) {
        self.record(HostEvent::Name(name.to_string()));
    }

    fn add_overlay(&self, overlay: ImageOverlay, _on_dismiss: OverlayDismiss) {
        self.record(HostEvent::Overlay(overlay.key.clone()));
        self.overlays.lock().push(overlay);
    }

    fn erase_overlay(&self, key: &str) {
        self.record(HostEvent::Erase(key.to_string()));
        self.overlays.lock().retain(|overlay| overlay.key != key);
    }

    fn destroy_panel(&self, name: &str) {
        self.record(HostEvent::DestroyPanel(name.to_string()));
    }

    fn close(&self) {
        self.record(HostEvent::Close);
    }
}
