//! A terminal session bound to one host surface.
//!
//! Each session runs two background threads. The reader pulls bytes from
//! the child into an [`OutputBuffer`]; the renderer drains that buffer into
//! the [`Screen`] every frame, reconciles the terminal size with the surface
//! geometry and asks the host to redraw. When either side sees end of stream
//! or loses its surface, the renderer schedules cleanup on the main thread.

use crate::backend::Backend;
use crate::geometry::view_size;
use crate::host::{MainThread, Surface};
use crate::output::OutputBuffer;
use crate::overlay::OverlayHandler;
use crate::process::{CommandSpec, Process, ProcessGuard};
use crate::registry::Registry;
use crate::schedule::{Intermission, Responsive};
use crate::screen::Screen;
use crate::types::{Cursor, KeyModes, SurfaceId, TermModes, TermSize};
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use settings::constants::{scrollback, session as defaults};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// How to open a session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub command: CommandSpec,
    /// Surface name, applied on open.
    pub title: Option<String>,
    /// Surface row the terminal's first line is rendered at.
    pub row_offset: usize,
    /// Output panel hosting the surface. `None` for a regular view.
    pub panel_name: Option<String>,
    /// Free-form label for [`Session::from_tag`]. Not unique.
    pub tag: Option<String>,
    pub scrollback_lines: usize,
    /// Size used while the surface has not been laid out.
    pub default_size: TermSize,
    /// Renderer frame period.
    pub render_interval: Duration,
    /// Minimum time between attachment and resize probes.
    pub probe_interval: Duration,
    /// Largest chunk the reader pulls from the child at once.
    pub read_chunk_size: usize,
    /// Where decoded inline images are written. `None` uses the system temp dir.
    pub image_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            command: CommandSpec::default(),
            title: None,
            row_offset: 0,
            panel_name: None,
            tag: None,
            scrollback_lines: scrollback::DEFAULT_LINES,
            default_size: TermSize::default(),
            render_interval: defaults::RENDER_INTERVAL,
            probe_interval: defaults::PROBE_INTERVAL,
            read_chunk_size: defaults::READ_CHUNK_SIZE,
            image_dir: None,
        }
    }
}

impl SessionOptions {
    /// Options seeded from the user's config file.
    ///
    /// An empty `argv` in `command` resolves to the configured shell.
    pub fn from_config(config: &settings::Config, command: CommandSpec) -> Self {
        let mut command = command;
        if command.argv.is_empty() {
            if let Some(shell) = &config.shell {
                command.argv = vec![shell.clone()];
            }
        }
        for (key, value) in &config.env {
            command.env.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Self {
            command,
            scrollback_lines: config.scrollback_lines,
            default_size: TermSize::new(config.default_rows, config.default_columns),
            render_interval: Duration::from_millis(config.render_interval_ms),
            probe_interval: Duration::from_millis(config.probe_interval_ms),
            read_chunk_size: config.read_chunk_size,
            image_dir: config.image_dir.clone(),
            ..Self::default()
        }
    }
}

pub struct Session {
    id: SurfaceId,
    tag: Option<String>,
    panel_name: Option<String>,
    surface: Arc<dyn Surface>,
    main: MainThread,
    registry: Weak<Registry>,
    process: Mutex<Option<ProcessGuard>>,
    /// Kept after close so the exit status stays readable.
    process_handle: Arc<dyn Process>,
    screen: Mutex<Box<dyn Screen>>,
    output: OutputBuffer,
    image_count: Arc<AtomicU64>,
    probe_interval: Duration,
    render_interval: Duration,
    read_chunk_size: usize,
}

impl Session {
    /// Spawn the command, build its screen and start the reader and
    /// renderer threads.
    pub fn open(
        surface: Arc<dyn Surface>,
        backend: &dyn Backend,
        main: MainThread,
        registry: &Arc<Registry>,
        options: SessionOptions,
    ) -> Result<Arc<Self>> {
        let id = surface.id();

        if let Some(title) = options.title.clone() {
            let target = surface.clone();
            main.post(move || target.set_name(&title));
        }

        let size = initial_size(surface.as_ref(), options.default_size);
        tracing::debug!(surface = %id, size = %size, "Opening session");

        let process = backend
            .spawn(&options.command, size)
            .with_context(|| format!("Failed to open session on {}", id))?;
        let mut screen = backend.screen(size, options.scrollback_lines, process.clone());

        let image_count = Arc::new(AtomicU64::new(0));
        let overlays = OverlayHandler::new(
            surface.clone(),
            main.clone(),
            options.row_offset,
            image_count.clone(),
            options.image_dir.clone(),
        );
        screen.set_image_handler(overlays.into_image_handler());

        let session = Arc::new(Self {
            id,
            tag: options.tag,
            panel_name: options.panel_name,
            surface,
            main,
            registry: Arc::downgrade(registry),
            process: Mutex::new(Some(ProcessGuard::new(process.clone()))),
            process_handle: process.clone(),
            screen: Mutex::new(screen),
            output: OutputBuffer::default(),
            image_count,
            probe_interval: options.probe_interval,
            render_interval: options.render_interval,
            read_chunk_size: options.read_chunk_size,
        });

        if let Some(previous) = registry.insert(session.clone()) {
            previous.close();
            util::debug_panic!("{} already had a session", id);
        }

        if let Err(e) = session.start(process) {
            session.close();
            return Err(e);
        }
        Ok(session)
    }

    fn start(self: &Arc<Self>, process: Arc<dyn Process>) -> Result<()> {
        let reader = self.clone();
        thread::Builder::new()
            .name(format!("termsurface-reader-{}", self.id.0))
            .spawn(move || reader.reader_loop(process))
            .context("Failed to spawn reader thread")?;

        let renderer = self.clone();
        thread::Builder::new()
            .name(format!("termsurface-renderer-{}", self.id.0))
            .spawn(move || renderer.renderer_loop())
            .context("Failed to spawn renderer thread")?;
        Ok(())
    }

    /// Look up a live session in the global registry.
    pub fn from_id(id: SurfaceId) -> Option<Arc<Self>> {
        Registry::global().get(id)
    }

    pub fn from_tag(tag: &str) -> Option<Arc<Self>> {
        Registry::global().find_by_tag(tag)
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn panel_name(&self) -> Option<&str> {
        self.panel_name.as_deref()
    }

    /// Number of inline images shown so far.
    pub fn image_count(&self) -> u64 {
        self.image_count.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> TermSize {
        self.screen.lock().size()
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.process_handle.exit_status()
    }

    pub fn is_closed(&self) -> bool {
        self.process.lock().is_none()
    }

    /// Run `f` against the screen under the screen lock.
    pub fn with_screen<R>(&self, f: impl FnOnce(&mut dyn Screen) -> R) -> R {
        let mut screen = self.screen.lock();
        f(screen.as_mut())
    }

    /// Rename the surface.
    pub fn set_title(&self, title: &str) {
        let surface = self.surface.clone();
        let title = title.to_string();
        self.main.post(move || surface.set_name(&title));
    }

    /// Whether the surface is still where the session renders.
    ///
    /// Panel sessions are attached while their panel still shows this
    /// surface; view sessions while the surface has a window.
    pub fn is_attached(&self) -> bool {
        match &self.panel_name {
            Some(name) => self.surface.find_panel(name) == Some(self.id),
            None => self.surface.has_window(),
        }
    }

    /// Whether the surface geometry implies a different size than the screen has.
    pub fn needs_resize(&self) -> bool {
        let size = view_size(&self.surface.metrics());
        size.is_ready() && size != self.screen.lock().size()
    }

    /// Resize the child and the screen to the current surface geometry.
    ///
    /// Does nothing while the surface has not been laid out.
    pub fn handle_resize(&self) {
        let size = view_size(&self.surface.metrics());
        if !size.is_ready() {
            return;
        }

        let mut screen = self.screen.lock();
        let current = screen.size();
        if current == size {
            return;
        }
        tracing::debug!(surface = %self.id, "Resize {} -> {}", current, size);

        if let Some(process) = self.process.lock().as_ref() {
            if let Err(e) = process.set_window_size(size.rows, size.cols) {
                tracing::warn!(surface = %self.id, "Failed to resize process: {:#}", e);
            }
        }
        screen.resize(size);
    }

    /// Write input to the child.
    ///
    /// With `normalized`, CRLF and LF become CR, or CRLF when the terminal is
    /// in newline mode.
    pub fn send_string(&self, text: &str, normalized: bool) -> Result<()> {
        if normalized {
            let text = normalize_newlines(text, self.new_line_mode_enabled());
            self.write(&text)
        } else {
            self.write(text)
        }
    }

    /// Encode a key press against the current modes and send it verbatim.
    pub fn send_key(&self, encode: impl FnOnce(KeyModes) -> String) -> Result<()> {
        let modes = KeyModes::from(self.modes());
        self.write(&encode(modes))
    }

    fn write(&self, data: &str) -> Result<()> {
        tracing::debug!(surface = %self.id, "Sent {:?}", data);
        match self.process.lock().as_ref() {
            Some(process) => process.write(data),
            None => bail!("Session on {} is closed", self.id),
        }
    }

    fn modes(&self) -> TermModes {
        self.screen.lock().modes()
    }

    pub fn bracketed_paste_mode_enabled(&self) -> bool {
        self.modes().contains(TermModes::BRACKETED_PASTE)
    }

    pub fn new_line_mode_enabled(&self) -> bool {
        self.modes().contains(TermModes::NEW_LINE)
    }

    pub fn application_mode_enabled(&self) -> bool {
        self.modes().contains(TermModes::APPLICATION)
    }

    /// Unregister the session and terminate its child. Idempotent.
    pub fn close(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }
        self.output.finish();

        let guard = self.process.lock().take();
        if let Some(guard) = guard {
            if let Err(e) = guard.terminate(false) {
                tracing::debug!("Terminate: {}", e);
            }
            // Dropping the guard force-terminates whatever is left.
            drop(guard);
        }
    }

    fn reader_loop(&self, process: Arc<dyn Process>) {
        let mut attached = Responsive::new(self.probe_interval, true, || self.is_attached());

        loop {
            self.surface.ping();

            let Some(data) = process.read(self.read_chunk_size) else {
                tracing::debug!(surface = %self.id, "Process output ended");
                break;
            };
            let done = self.output.append(&data);

            if done || !attached.check() {
                break;
            }
        }

        self.output.finish();
    }

    fn renderer_loop(self: Arc<Self>) {
        let mut attached = Responsive::new(self.probe_interval, true, || self.is_attached());
        let mut resized = Responsive::new(self.probe_interval, false, || self.needs_resize());
        let mut cached_cursor = Cursor {
            x: 0,
            y: 0,
            hidden: true,
        };

        loop {
            let _pace = Intermission::begin(self.render_interval);

            self.output.flush_into(&self.screen);

            if resized.check() {
                self.handle_resize();
            }

            if self.need_to_render(&mut cached_cursor) {
                let surface = self.surface.clone();
                self.main.post(move || surface.render());
            }

            if self.output.is_done() || !attached.check() {
                break;
            }
        }

        self.output.flush_into(&self.screen);
        self.output.finish();
        self.screen.lock().finish();

        let session = self.clone();
        self.main.post(move || session.cleanup());
    }

    /// Consume the dirty flag and compare the cursor against the cached one.
    fn need_to_render(&self, cached: &mut Cursor) -> bool {
        let mut screen = self.screen.lock();
        let dirty = screen.is_dirty();
        screen.clear_dirty();
        let cursor = screen.cursor();
        drop(screen);

        render_needed(dirty, cursor, cached)
    }

    /// Runs on the main thread once the renderer has stopped.
    fn cleanup(&self) {
        self.surface.render();

        // The child may still be running if only the surface went away.
        self.close();

        let status = self.exit_status();
        tracing::debug!(surface = %self.id, ?status, "Session finished");
        self.surface.append_text(&exit_message(status));
        self.surface.set_read_only(true);

        // A surface that went away must not be torn down a second time.
        if status == Some(0) && self.is_attached() {
            match &self.panel_name {
                Some(name) => self.surface.destroy_panel(name),
                None => self.surface.close(),
            }
        }
    }
}

fn initial_size(surface: &dyn Surface, default_size: TermSize) -> TermSize {
    let size = view_size(&surface.metrics());
    if !size.is_ready() || size == TermSize::new(1, 1) {
        default_size
    } else {
        size
    }
}

/// A frame is due when the screen changed or the cursor moved, appeared or
/// disappeared. Updates `cached` to `cursor`.
fn render_needed(dirty: bool, cursor: Cursor, cached: &mut Cursor) -> bool {
    let changed = dirty || cursor != *cached;
    *cached = cursor;
    changed
}

pub(crate) fn normalize_newlines(text: &str, new_line_mode: bool) -> String {
    let eol = if new_line_mode { "\r\n" } else { "\r" };
    text.replace("\r\n", "\n").replace('\n', eol)
}

pub(crate) fn exit_message(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("\nprocess is terminated with return code {}.", code),
        None => "\nprocess is terminated with return code unknown.".to_string(),
    }
}
