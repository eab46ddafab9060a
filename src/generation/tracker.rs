//! Live-instance counting for [`GenerationOutput`](super::GenerationOutput).
//!
//! Backends attach a [`LiveToken`] to every output they hand out; the token
//! decrements the count when the output is dropped. The peak is what bounds the
//! pipeline's memory: it must never exceed one batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Counts {
    live: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

/// Shared counter of live generation outputs.
#[derive(Debug, Clone, Default)]
pub struct OutputTracker {
    counts: Arc<Counts>,
}

impl OutputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self) -> LiveToken {
        let live = self.counts.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counts.peak.fetch_max(live, Ordering::SeqCst);
        self.counts.total.fetch_add(1, Ordering::SeqCst);
        LiveToken {
            counts: Arc::clone(&self.counts),
        }
    }

    /// Outputs currently alive.
    pub fn live(&self) -> usize {
        self.counts.live.load(Ordering::SeqCst)
    }

    /// Highest number of outputs alive at once.
    pub fn peak(&self) -> usize {
        self.counts.peak.load(Ordering::SeqCst)
    }

    /// Outputs ever registered.
    pub fn total(&self) -> usize {
        self.counts.total.load(Ordering::SeqCst)
    }
}

/// Held by a tracked output; releases its slot on drop.
#[derive(Debug)]
pub struct LiveToken {
    counts: Arc<Counts>,
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.counts.live.fetch_sub(1, Ordering::SeqCst);
    }
}
