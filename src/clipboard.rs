//! Primary-selection publishing.
//!
//! The document only knows the [`ClipboardSink`] trait. Hosts that own a real
//! selection (X11 primary, OSC 52, ...) implement it; [`MemoryClipboard`] is
//! an in-process implementation.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receiver of the current selection text.
///
/// `lock_clipboard`/`unlock_clipboard` bracket every read or write of the
/// selection so an implementation backed by another thread can serialize
/// access. Callers use [`ClipboardLock`] rather than calling them directly.
pub trait ClipboardSink {
    /// Publish `text` as the primary selection, or clear it with `None`.
    fn set_primary(&self, text: Option<String>);

    fn lock_clipboard(&self);

    fn unlock_clipboard(&self);
}

/// Scoped clipboard lock: acquired on construction, released on drop.
pub struct ClipboardLock<'a> {
    sink: &'a dyn ClipboardSink,
}

impl<'a> ClipboardLock<'a> {
    #[must_use]
    pub fn new(sink: &'a dyn ClipboardSink) -> Self {
        sink.lock_clipboard();
        Self { sink }
    }
}

impl Drop for ClipboardLock<'_> {
    fn drop(&mut self) {
        self.sink.unlock_clipboard();
    }
}

/// Clipboard kept in memory.
///
/// Tracks the lock depth so callers can check that every lock was released.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    primary: Mutex<Option<String>>,
    depth: AtomicUsize,
    publishes: AtomicUsize,
}

impl MemoryClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current primary selection.
    #[must_use]
    pub fn primary(&self) -> Option<String> {
        self.primary.lock().ok().and_then(|guard| guard.clone())
    }

    /// Number of locks currently held.
    #[must_use]
    pub fn lock_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Number of `set_primary` calls so far.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }
}

impl ClipboardSink for MemoryClipboard {
    fn set_primary(&self, text: Option<String>) {
        debug_assert!(self.lock_depth() > 0, "selection published without the clipboard lock");
        if let Ok(mut guard) = self.primary.lock() {
            *guard = text;
        }
        self.publishes.fetch_add(1, Ordering::SeqCst);
    }

    fn lock_clipboard(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    fn unlock_clipboard(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
