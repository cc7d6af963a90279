//! Terminal state-machine seam and the inline image directive.

use crate::types::{Cursor, TermModes, TermSize};
use std::ops::Range;

/// Callback invoked by a [`Screen`] when it parses an inline image directive.
///
/// Receives the screen itself so the handler can read the cursor and advance
/// it past the overlay.
pub type ImageHandler = Box<dyn FnMut(&mut dyn Screen, ImageDirective) + Send>;

/// VT interpreter plus screen buffer.
///
/// Only the renderer thread mutates a screen; hosts read it under the
/// session's screen lock while rendering.
pub trait Screen: Send {
    /// Interpret a chunk of the child's output.
    fn feed(&mut self, bytes: &[u8]);

    /// End of stream. Interpret anything held back waiting for more bytes.
    fn finish(&mut self);

    fn resize(&mut self, size: TermSize);

    /// Current (rows, columns).
    fn size(&self) -> TermSize;

    /// Whether the buffer changed since the flag was last cleared.
    fn is_dirty(&self) -> bool;

    fn clear_dirty(&mut self);

    fn cursor(&self) -> Cursor;

    fn modes(&self) -> TermModes;

    fn set_image_handler(&mut self, handler: ImageHandler);

    /// Move the cursor down one line, scrolling at the bottom margin.
    fn index(&mut self);

    /// Visible lines with trailing blanks trimmed.
    fn display_lines(&self) -> Vec<String>;
}

/// Arguments of an inline image directive.
///
/// Unknown keys are ignored. Defaults: not inline, natural width and
/// height, aspect ratio preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageArgs {
    /// Display inline in the surface. Anything else is a download request
    /// and is ignored.
    pub inline: bool,
    /// Requested width: cells (`"40"`), percent (`"50%"`), pixels (`"120px"`) or `"auto"`.
    pub width: Option<String>,
    pub height: Option<String>,
    pub preserve_aspect_ratio: bool,
    /// Decoded file name, when supplied.
    pub name: Option<String>,
    /// Declared payload size in bytes.
    pub size: Option<usize>,
}

impl Default for ImageArgs {
    fn default() -> Self {
        Self {
            inline: false,
            width: None,
            height: None,
            preserve_aspect_ratio: true,
            name: None,
            size: None,
        }
    }
}

impl ImageArgs {
    /// Parse `key=value` pairs separated by `;`.
    pub fn parse(params: &str) -> Self {
        use base64::Engine;

        let mut args = Self::default();
        for pair in params.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "inline" => args.inline = flag(value),
                "width" => args.width = Some(value.to_string()),
                "height" => args.height = Some(value.to_string()),
                "preserveAspectRatio" => args.preserve_aspect_ratio = flag(value),
                "name" => {
                    args.name = base64::engine::general_purpose::STANDARD
                        .decode(value)
                        .ok()
                        .and_then(|bytes| String::from_utf8(bytes).ok());
                }
                "size" => args.size = value.parse().ok(),
                _ => {}
            }
        }
        args
    }
}

fn flag(value: &str) -> bool {
    matches!(value, "1" | "true")
}

/// A parsed `OSC 1337 ; File=` directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageDirective {
    /// Base64 payload, still encoded.
    pub payload: String,
    pub args: ImageArgs,
}

impl ImageDirective {
    /// Parse the directive body between `File=` and the string terminator.
    ///
    /// The payload follows the first `:`. Some emitters separate it with a
    /// final `;` instead, which is accepted when no `:` is present.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(body).ok()?;
        let (params, payload) = match text.split_once(':') {
            Some(split) => split,
            None => text.rsplit_once(';').unwrap_or(("", text)),
        };
        Some(Self {
            payload: payload.trim().to_string(),
            args: ImageArgs::parse(params),
        })
    }
}

pub(crate) const DIRECTIVE_PREFIX: &[u8] = b"\x1b]1337;File=";

/// Where the next image directive sits in a byte buffer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DirectiveScan {
    /// No directive. `tail` is where a possibly split prefix starts at the
    /// very end of the buffer.
    Absent { tail: Option<usize> },
    /// A directive starts at `start` but its terminator has not arrived yet.
    Partial { start: usize },
    /// A full directive spanning `start..end`, body at `body`.
    Complete {
        start: usize,
        body: Range<usize>,
        end: usize,
    },
}

/// Locate the first image directive in `buffer`.
pub(crate) fn scan_directive(buffer: &[u8]) -> DirectiveScan {
    let Some(start) = find_prefix(buffer, DIRECTIVE_PREFIX) else {
        return DirectiveScan::Absent {
            tail: split_prefix_tail(buffer, DIRECTIVE_PREFIX),
        };
    };

    let body_start = start + DIRECTIVE_PREFIX.len();
    match find_osc_terminator(&buffer[body_start..]) {
        Some((past, body_len)) => DirectiveScan::Complete {
            start,
            body: body_start..body_start + body_len,
            end: body_start + past,
        },
        None => DirectiveScan::Partial { start },
    }
}

/// Continue scanning a buffer that starts with a directive whose first
/// `scanned` body bytes are already known to hold no terminator.
pub(crate) fn resume_directive(buffer: &[u8], scanned: usize) -> DirectiveScan {
    let body_start = DIRECTIVE_PREFIX.len();
    // A trailing ESC may still pair with a backslash that arrives later.
    let from = body_start + scanned.saturating_sub(1);
    if !buffer.starts_with(DIRECTIVE_PREFIX) || from > buffer.len() {
        return scan_directive(buffer);
    }

    match find_osc_terminator(&buffer[from..]) {
        Some((past, body_len)) => DirectiveScan::Complete {
            start: 0,
            body: body_start..from + body_len,
            end: from + past,
        },
        None => DirectiveScan::Partial { start: 0 },
    }
}

/// Find the prefix in a byte slice (simple linear scan).
fn find_prefix(haystack: &[u8], prefix: &[u8]) -> Option<usize> {
    haystack.windows(prefix.len()).position(|w| w == prefix)
}

/// Start of a trailing fragment that could grow into `prefix`.
fn split_prefix_tail(buffer: &[u8], prefix: &[u8]) -> Option<usize> {
    let longest = prefix.len().saturating_sub(1).min(buffer.len());
    (1..=longest)
        .rev()
        .find(|&len| buffer.ends_with(&prefix[..len]))
        .map(|len| buffer.len() - len)
}

/// Find the OSC string terminator (BEL or ST).
///
/// Returns (offset past terminator, payload length).
fn find_osc_terminator(data: &[u8]) -> Option<(usize, usize)> {
    for (i, &byte) in data.iter().enumerate() {
        if byte == 0x07 {
            return Some((i + 1, i));
        }
        if byte == 0x1b && data.get(i + 1) == Some(&b'\\') {
            return Some((i + 2, i));
        }
    }
    None
}
