//! Terminal data types.
//!
//! Plain data shared by the session pipeline and its collaborators. Nothing
//! in here touches a process, a thread or a host surface.

use alacritty_terminal::grid::Dimensions;
use bitflags::bitflags;
use std::fmt;

/// Identity of one visible editor surface.
///
/// Unique per surface for the lifetime of the host; the registry keys
/// sessions by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Terminal dimensions in rows and columns.
///
/// Implements `Dimensions` trait for alacritty compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermSize {
    pub rows: u16,
    pub cols: u16,
}

impl TermSize {
    /// Sentinel returned by geometry mapping while the surface has no layout yet.
    pub const NOT_READY: Self = Self { rows: 0, cols: 0 };

    pub const fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// True when both dimensions are usable for a resize.
    pub fn is_ready(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self::new(
            settings::constants::session::DEFAULT_ROWS,
            settings::constants::session::DEFAULT_COLUMNS,
        )
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.rows as usize
    }

    fn screen_lines(&self) -> usize {
        self.rows as usize
    }

    fn columns(&self) -> usize {
        self.cols as usize
    }
}

/// Cursor state reported by the state machine.
///
/// `x` is the column and `y` the row within the visible screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
    pub hidden: bool,
}

bitflags! {
    /// Terminal modes the session cares about when encoding input.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TermModes: u8 {
        /// DECCKM, private mode 1: cursor keys send application sequences.
        const APPLICATION = 1 << 0;
        /// Private mode 2004: pasted text is wrapped in bracket markers.
        const BRACKETED_PASTE = 1 << 1;
        /// LNM, ANSI mode 20: line feed implies carriage return.
        const NEW_LINE = 1 << 2;
    }
}

/// Mode snapshot handed to key encoders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyModes {
    pub application_mode: bool,
    pub new_line_mode: bool,
}

impl From<TermModes> for KeyModes {
    fn from(modes: TermModes) -> Self {
        Self {
            application_mode: modes.contains(TermModes::APPLICATION),
            new_line_mode: modes.contains(TermModes::NEW_LINE),
        }
    }
}
