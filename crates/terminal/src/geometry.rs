//! Surface pixel metrics to terminal grid size.

use crate::types::TermSize;

/// Columns held back from the viewport for the scrollbar and gutter.
pub const GUTTER_COLUMNS: i64 = 3;

/// Pixel metrics of a visible surface, as reported by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SurfaceMetrics {
    /// Viewport width in pixels.
    pub viewport_width: f64,
    /// Viewport height in pixels.
    pub viewport_height: f64,
    /// Height of one text line in pixels.
    pub line_height: f64,
    /// Average character width in pixels.
    pub em_width: f64,
}

/// Map surface metrics to a terminal size.
///
/// Returns [`TermSize::NOT_READY`] when the surface has not been laid out
/// (zero line height or zero character width). Callers must treat that as
/// "try again later", never as a real size.
pub fn view_size(metrics: &SurfaceMetrics) -> TermSize {
    if metrics.line_height == 0.0 || metrics.em_width == 0.0 {
        return TermSize::NOT_READY;
    }

    let columns = ((metrics.viewport_width / metrics.em_width) as i64 - GUTTER_COLUMNS).max(1);
    let rows = ((metrics.viewport_height / metrics.line_height) as i64).max(1);

    TermSize::new(clamp_u16(rows), clamp_u16(columns))
}

fn clamp_u16(value: i64) -> u16 {
    value.clamp(1, u16::MAX as i64) as u16
}
