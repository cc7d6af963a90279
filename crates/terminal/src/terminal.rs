//! Terminal session core.
//!
//! Spawns a child process on a pseudo-terminal, feeds its output into a VT
//! state machine from a pair of background threads, and reconciles the
//! result with a host editing surface. Host-surface mutations are always
//! routed through the [`MainThread`] task queue.
//!
//! The PTY, the VT interpreter and the host surface are collaborators behind
//! the [`Process`], [`Screen`] and [`Surface`] traits. [`NativeBackend`]
//! wires the production adapters (`portable-pty` and `alacritty_terminal`).

mod backend;
pub mod geometry;
pub mod host;
pub mod image;
mod output;
pub mod overlay;
pub mod process;
mod pty_handler;
pub mod registry;
pub mod schedule;
pub mod screen;
pub mod session;
pub mod types;
mod vt_screen;

pub use backend::{Backend, NativeBackend};
pub use geometry::{view_size, SurfaceMetrics};
pub use host::{main_thread, MainLoop, MainThread, Surface};
pub use overlay::{ImageOverlay, OverlayDismiss};
pub use process::{CommandSpec, Process, ProcessGuard};
pub use pty_handler::PtyProcess;
pub use registry::Registry;
pub use screen::{ImageArgs, ImageDirective, ImageHandler, Screen};
pub use session::{Session, SessionOptions};
pub use types::*;
pub use vt_screen::VtScreen;
