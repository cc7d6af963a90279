//! [`Screen`] backed by alacritty's VT interpreter.
//!
//! Inline image directives (`OSC 1337 ; File=`) are not something alacritty
//! understands, so they are cut out of the byte stream before it reaches the
//! parser and handed to the installed [`ImageHandler`]. A directive split
//! across two reads is carried over until its terminator arrives.

use crate::process::Process;
use crate::screen::{
    resume_directive, scan_directive, DirectiveScan, ImageDirective, ImageHandler, Screen,
    DIRECTIVE_PREFIX,
};
use crate::types::{Cursor, TermModes, TermSize};
use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::cell::Flags as CellFlags;
use alacritty_terminal::term::{Config, Term, TermMode};
use alacritty_terminal::vte::ansi::{Handler, Processor, Rgb};
use std::sync::Arc;

/// Directives longer than this are passed to the parser, which drops them.
const MAX_DIRECTIVE_LEN: usize = 16 * 1024 * 1024;

/// Routes terminal replies (cursor reports, color queries) back to the child.
#[derive(Clone)]
pub(crate) struct Listener {
    responder: Option<Arc<dyn Process>>,
}

impl Listener {
    fn reply(&self, data: &str) {
        if let Some(process) = &self.responder {
            if let Err(e) = process.write(data) {
                tracing::warn!(error = %e, "Terminal reply failed");
            }
        }
    }
}

impl EventListener for Listener {
    fn send_event(&self, event: Event) {
        match event {
            Event::PtyWrite(text) => self.reply(&text),
            Event::ColorRequest(_index, formatter) => {
                self.reply(&formatter(Rgb { r: 0, g: 0, b: 0 }));
            }
            _ => {}
        }
    }
}

pub struct VtScreen {
    term: Term<Listener>,
    processor: Processor,
    size: TermSize,
    dirty: bool,
    carry: Vec<u8>,
    /// Body bytes of a partial directive in `carry` already searched for a terminator.
    carry_scanned: Option<usize>,
    image_handler: Option<ImageHandler>,
}

impl VtScreen {
    /// `responder` receives the terminal's replies to queries from the child.
    pub fn new(size: TermSize, scrollback_lines: usize, responder: Option<Arc<dyn Process>>) -> Self {
        let config = Config {
            scrolling_history: scrollback_lines,
            ..Config::default()
        };
        Self {
            term: Term::new(config, &size, Listener { responder }),
            processor: Processor::new(),
            size,
            dirty: true,
            carry: Vec::new(),
            carry_scanned: None,
            image_handler: None,
        }
    }

    fn advance(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.processor.advance(&mut self.term, bytes);
        }
    }

    fn dispatch(&mut self, directive: ImageDirective) {
        let Some(mut handler) = self.image_handler.take() else {
            tracing::debug!("Image directive without handler, ignoring");
            return;
        };
        handler(self, directive);
        if self.image_handler.is_none() {
            self.image_handler = Some(handler);
        }
    }
}

impl Screen for VtScreen {
    fn feed(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.dirty = true;

        let mut pending = std::mem::take(&mut self.carry);
        pending.extend_from_slice(bytes);

        let mut resume = self.carry_scanned.take();
        let mut rest: &[u8] = &pending;
        let keep_from = loop {
            let scan = match resume.take() {
                Some(scanned) => resume_directive(rest, scanned),
                None => scan_directive(rest),
            };
            let offset = pending.len() - rest.len();
            match scan {
                DirectiveScan::Absent { tail } => {
                    let split = tail.unwrap_or(rest.len());
                    self.advance(&rest[..split]);
                    break offset + split;
                }
                DirectiveScan::Partial { start } => {
                    self.advance(&rest[..start]);
                    let partial = rest.len() - start;
                    if partial > MAX_DIRECTIVE_LEN {
                        tracing::warn!("Image directive exceeds {} bytes, dropping", MAX_DIRECTIVE_LEN);
                        self.advance(&rest[start..]);
                        break pending.len();
                    }
                    self.carry_scanned = Some(partial - DIRECTIVE_PREFIX.len());
                    break offset + start;
                }
                DirectiveScan::Complete { start, body, end } => {
                    self.advance(&rest[..start]);
                    match ImageDirective::parse(&rest[body]) {
                        Some(directive) => self.dispatch(directive),
                        None => tracing::warn!("Malformed image directive"),
                    }
                    rest = &rest[end..];
                }
            }
        };

        // Reuse the allocation so a long directive is not copied on every feed.
        pending.drain(..keep_from);
        self.carry = pending;
    }

    fn finish(&mut self) {
        let held = std::mem::take(&mut self.carry);
        self.carry_scanned = None;
        if !held.is_empty() {
            tracing::debug!("Feeding {} held-back bytes at end of stream", held.len());
            self.advance(&held);
            self.dirty = true;
        }
    }

    fn resize(&mut self, size: TermSize) {
        if !size.is_ready() || size == self.size {
            return;
        }
        self.term.resize(size);
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
        let point = self.term.grid().cursor.point;
        Cursor {
            x: point.column.0,
            y: point.line.0.max(0) as usize,
            hidden: !self.term.mode().contains(TermMode::SHOW_CURSOR),
        }
    }

    fn modes(&self) -> TermModes {
        let mode = self.term.mode();
        let mut modes = TermModes::empty();
        modes.set(TermModes::APPLICATION, mode.contains(TermMode::APP_CURSOR));
        modes.set(TermModes::BRACKETED_PASTE, mode.contains(TermMode::BRACKETED_PASTE));
        modes.set(TermModes::NEW_LINE, mode.contains(TermMode::LINE_FEED_NEW_LINE));
        modes
    }

    fn set_image_handler(&mut self, handler: ImageHandler) {
        self.image_handler = Some(handler);
    }

    fn index(&mut self) {
        self.term.linefeed();
        self.dirty = true;
    }

    fn display_lines(&self) -> Vec<String> {
        let grid = self.term.grid();
        (0..self.size.rows as i32)
            .map(|line| {
                let row = &grid[Line(line)];
                let text: String = (0..self.size.cols as usize)
                    .map(|col| &row[Column(col)])
                    .filter(|cell| !cell.flags.contains(CellFlags::WIDE_CHAR_SPACER))
                    .map(|cell| cell.c)
                    .collect();
                text.trim_end().to_string()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcess;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn screen() -> VtScreen {
        VtScreen::new(TermSize::new(5, 20), 100, None)
    }

    fn recording_handler(screen: &mut VtScreen) -> Arc<Mutex<Vec<ImageDirective>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        screen.set_image_handler(Box::new(move |_screen, directive| {
            sink.lock().push(directive);
        }));
        seen
    }

    // ==================== Text Tests ====================

    #[test]
    fn feeds_plain_text() {
        let mut screen = screen();
        screen.feed(b"hello\r\nworld");
        let lines = screen.display_lines();
        assert_eq!(lines[0], "hello");
        assert_eq!(lines[1], "world");
        assert_eq!(screen.cursor().x, 5);
        assert_eq!(screen.cursor().y, 1);
    }

    #[test]
    fn dirty_flag_tracks_feeds() {
        let mut screen = screen();
        screen.clear_dirty();
        assert!(!screen.is_dirty());
        screen.feed(b"");
        assert!(!screen.is_dirty());
        screen.feed(b"x");
        assert!(screen.is_dirty());
    }

    #[test]
    fn resize_changes_size() {
        let mut screen = screen();
        screen.clear_dirty();
        screen.resize(TermSize::new(10, 40));
        assert_eq!(screen.size(), TermSize::new(10, 40));
        assert_eq!(screen.display_lines().len(), 10);
        assert!(screen.is_dirty());
    }

    #[test]
    fn resize_ignores_not_ready() {
        let mut screen = screen();
        screen.resize(TermSize::NOT_READY);
        assert_eq!(screen.size(), TermSize::new(5, 20));
    }

    #[test]
    fn index_moves_cursor_down() {
        let mut screen = screen();
        screen.feed(b"ab");
        screen.index();
        assert_eq!(screen.cursor(), Cursor { x: 2, y: 1, hidden: false });
    }

    #[test]
    fn index_scrolls_at_bottom() {
        let mut screen = screen();
        screen.feed(b"top\r\n2\r\n3\r\n4\r\n5");
        screen.index();
        let lines = screen.display_lines();
        assert_eq!(lines[0], "2");
        assert_eq!(screen.cursor().y, 4);
    }

    // ==================== Mode Tests ====================

    #[test]
    fn reports_modes() {
        let mut screen = screen();
        assert_eq!(screen.modes(), TermModes::empty());

        screen.feed(b"\x1b[?1h");
        assert!(screen.modes().contains(TermModes::APPLICATION));

        screen.feed(b"\x1b[?2004h");
        assert!(screen.modes().contains(TermModes::BRACKETED_PASTE));

        screen.feed(b"\x1b[20h");
        assert!(screen.modes().contains(TermModes::NEW_LINE));

        screen.feed(b"\x1b[?1l\x1b[?2004l\x1b[20l");
        assert_eq!(screen.modes(), TermModes::empty());
    }

    #[test]
    fn hidden_cursor_is_reported() {
        let mut screen = screen();
        screen.feed(b"\x1b[?25l");
        assert!(screen.cursor().hidden);
    }

    #[test]
    fn replies_go_to_responder() {
        let mut process = MockProcess::new();
        process
            .expect_write()
            .withf(|data| data == "\x1b[1;1R")
            .times(1)
            .returning(|_| Ok(()));
        let mut screen = VtScreen::new(TermSize::new(5, 20), 0, Some(Arc::new(process)));
        screen.feed(b"\x1b[6n");
    }

    // ==================== Image Directive Tests ====================

    #[test]
    fn directive_is_dispatched_and_removed_from_text() {
        let mut screen = screen();
        let seen = recording_handler(&mut screen);

        screen.feed(b"before\x1b]1337;File=inline=1:QUJD\x07after");

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload, "QUJD");
        assert!(seen[0].args.inline);
        assert_eq!(screen.display_lines()[0], "beforeafter");
    }

    #[test]
    fn split_directive_is_reassembled() {
        let mut screen = screen();
        let seen = recording_handler(&mut screen);

        screen.feed(b"x\x1b]13");
        screen.feed(b"37;File=inline=1;wid");
        assert!(seen.lock().is_empty());
        screen.feed(b"th=4:QUJD\x1b\\y");

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].args.width.as_deref(), Some("4"));
        assert_eq!(screen.display_lines()[0], "xy");
    }

    #[test]
    fn multiple_directives_in_one_chunk() {
        let mut screen = screen();
        let seen = recording_handler(&mut screen);

        screen.feed(b"\x1b]1337;File=inline=1:QQ==\x07\x1b]1337;File=inline=1:Qg==\x07");

        let payloads: Vec<_> = seen.lock().iter().map(|d| d.payload.clone()).collect();
        assert_eq!(payloads, vec!["QQ==".to_string(), "Qg==".to_string()]);
    }

    #[test]
    fn handler_can_advance_cursor() {
        let mut screen = screen();
        screen.set_image_handler(Box::new(|screen, _directive| screen.index()));

        screen.feed(b"\x1b]1337;File=inline=1:QQ==\x07");
        assert_eq!(screen.cursor().y, 1);
    }

    #[test]
    fn partial_directive_resumes_where_scanning_stopped() {
        let mut screen = screen();
        let seen = recording_handler(&mut screen);

        screen.feed(b"\x1b]1337;File=inline=1:QU");
        assert_eq!(screen.carry_scanned, Some(11));
        screen.feed(b"JD\x1b");
        assert_eq!(screen.carry_scanned, Some(14));
        screen.feed(b"\\z");

        assert_eq!(seen.lock()[0].payload, "QUJD");
        assert!(screen.carry.is_empty());
        assert_eq!(screen.carry_scanned, None);
        assert_eq!(screen.display_lines()[0], "z");
    }

    // ==================== End Of Stream Tests ====================

    #[test]
    fn finish_feeds_held_back_escape() {
        let mut screen = screen();
        screen.feed(b"ab\x1b");
        assert_eq!(screen.carry, b"\x1b".to_vec());

        screen.clear_dirty();
        screen.finish();
        assert!(screen.carry.is_empty());
        assert!(screen.is_dirty());

        // The escape reached the parser, so this completes a cursor-forward.
        screen.feed(b"[Cx");
        assert_eq!(screen.display_lines()[0], "ab x");
    }

    #[test]
    fn finish_flushes_unterminated_directive() {
        let mut screen = screen();
        let seen = recording_handler(&mut screen);

        screen.feed(b"a\x1b]1337;File=inline=1:QQ");
        screen.finish();

        assert!(seen.lock().is_empty());
        assert!(screen.carry.is_empty());
        assert_eq!(screen.carry_scanned, None);
        assert_eq!(screen.display_lines()[0], "a");
    }

    #[test]
    fn finish_without_held_bytes_is_quiet() {
        let mut screen = screen();
        screen.feed(b"done");
        screen.clear_dirty();
        screen.finish();
        assert!(!screen.is_dirty());
    }

    #[test]
    fn directive_without_handler_is_dropped() {
        let mut screen = screen();
        screen.feed(b"a\x1b]1337;File=inline=1:QQ==\x07b");
        assert_eq!(screen.display_lines()[0], "ab");
    }
}
