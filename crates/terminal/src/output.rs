//! Hand-off buffer between the reader and renderer threads.

use crate::screen::Screen;
use parking_lot::Mutex;

#[derive(Default)]
struct Pending {
    data: Vec<u8>,
    done: bool,
}

/// Bytes read from the child and not yet interpreted.
///
/// The reader appends, the renderer drains. Draining feeds everything
/// accumulated so far to the screen in one call, so output reaches the
/// screen in exactly the order it was read.
#[derive(Default)]
pub(crate) struct OutputBuffer {
    pending: Mutex<Pending>,
}

impl OutputBuffer {
    /// Queue a chunk. Returns whether the stream has been marked finished.
    pub fn append(&self, bytes: &[u8]) -> bool {
        let mut pending = self.pending.lock();
        pending.data.extend_from_slice(bytes);
        pending.done
    }

    /// Feed all queued bytes to `screen`. Returns whether anything was fed.
    pub fn flush_into(&self, screen: &Mutex<Box<dyn Screen>>) -> bool {
        let data = {
            let mut pending = self.pending.lock();
            if pending.data.is_empty() {
                return false;
            }
            std::mem::take(&mut pending.data)
        };
        screen.lock().feed(&data);
        true
    }

    /// Mark the stream finished. Bytes already queued can still be flushed.
    pub fn finish(&self) {
        self.pending.lock().done = true;
    }

    pub fn is_done(&self) -> bool {
        self.pending.lock().done
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.lock().data.is_empty()
    }
}
