//! Inline image overlays.
//!
//! When the screen parses an inline image directive, the payload is decoded
//! into a temp file, sized against the surface, and registered with the host
//! as an overlay anchored at the cursor. The cursor then moves one line down
//! so following output does not land under the image.

use crate::geometry::GUTTER_COLUMNS;
use crate::host::{MainThread, Surface};
use crate::image::{image_resize, sniff_dimensions, ImageFormat};
use crate::screen::{ImageDirective, ImageHandler, Screen};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Key prefix of every image overlay. Keys are `<prefix>#<n>`.
pub const OVERLAY_PREFIX: &str = "termsurface_image";

/// Called by the host when the user dismisses an overlay.
pub type OverlayDismiss = Box<dyn FnOnce() + Send + 'static>;

/// An image registered with the host surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageOverlay {
    /// Unique per session, `termsurface_image#<n>`.
    pub key: String,
    /// Text offset the overlay is attached to.
    pub anchor: usize,
    /// Decoded image on disk. Left in place when the overlay goes away.
    pub path: PathBuf,
    pub natural_size: (u32, u32),
    /// Display size in pixels.
    pub size: (u32, u32),
}

impl ImageOverlay {
    /// HTML fragment hosts can use to display the overlay.
    pub fn html(&self) -> String {
        format!(
            "<style>\nbody {{\n    margin: 0px;\n}}\ndiv {{\n    margin: 0px;\n}}\n</style>\n\
             <div>\n<img src=\"file://{}\" width=\"{}\" height=\"{}\"/>\n</div>\n",
            self.path.display(),
            self.size.0,
            self.size.1
        )
    }
}

pub(crate) fn overlay_key(n: u64) -> String {
    format!("{}#{}", OVERLAY_PREFIX, n)
}

/// Turns image directives into host overlays for one session.
pub(crate) struct OverlayHandler {
    surface: Arc<dyn Surface>,
    main: MainThread,
    row_offset: usize,
    counter: Arc<AtomicU64>,
    image_dir: Option<PathBuf>,
}

impl OverlayHandler {
    /// `counter` is shared with the session and numbers its overlays.
    pub fn new(
        surface: Arc<dyn Surface>,
        main: MainThread,
        row_offset: usize,
        counter: Arc<AtomicU64>,
        image_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            surface,
            main,
            row_offset,
            counter,
            image_dir,
        }
    }

    pub fn into_image_handler(self) -> ImageHandler {
        Box::new(move |screen, directive| self.show_image(screen, directive))
    }

    /// Display one directive. Download requests (non-inline) are ignored.
    pub fn show_image(&self, screen: &mut dyn Screen, directive: ImageDirective) {
        if !directive.args.inline {
            tracing::debug!("Ignoring non-inline image directive");
            return;
        }

        // Emitters wrap long base64 output; the tty turns each break into CRLF.
        let payload: String = directive
            .payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let data = match STANDARD.decode(payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Invalid image payload: {}", e);
                return;
            }
        };

        let Some(natural_size) = sniff_dimensions(&data) else {
            tracing::error!("cannot get image size");
            return;
        };

        let path = match persist(&data, self.image_dir.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Failed to store image: {:#}", e);
                return;
            }
        };

        let metrics = self.surface.metrics();
        let max_width = metrics.viewport_width - GUTTER_COLUMNS as f64 * metrics.em_width;
        let size = image_resize(
            natural_size,
            directive.args.width.as_deref(),
            directive.args.height.as_deref(),
            metrics.em_width,
            max_width,
            directive.args.preserve_aspect_ratio,
        );

        let cursor = screen.cursor();
        let anchor = self.surface.text_point(self.row_offset + cursor.y, cursor.x);
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        let overlay = ImageOverlay {
            key: overlay_key(n),
            anchor,
            path,
            natural_size,
            size,
        };
        tracing::debug!(key = %overlay.key, ?natural_size, ?size, "Showing inline image");

        let dismiss = dismiss_callback(Arc::downgrade(&self.surface), overlay.key.clone());
        let surface = self.surface.clone();
        self.main.post(move || surface.add_overlay(overlay, dismiss));

        screen.index();
    }
}

fn dismiss_callback(surface: Weak<dyn Surface>, key: String) -> OverlayDismiss {
    Box::new(move || {
        if let Some(surface) = surface.upgrade() {
            surface.erase_overlay(&key);
        }
    })
}

/// Write the decoded image to a uniquely named file that outlives the handle.
fn persist(data: &[u8], dir: Option<&Path>) -> Result<PathBuf> {
    let suffix = ImageFormat::detect(data)
        .map(|format| format!(".{}", format.extension()))
        .unwrap_or_default();

    let mut builder = tempfile::Builder::new();
    builder.prefix("termsurface-").suffix(&suffix);
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .context("Failed to create image file")?;

    file.write_all(data).context("Failed to write image file")?;
    let (_, path) = file.keep().context("Failed to keep image file")?;
    Ok(path)
}
