//! Progress-callback trait for indexing events.
//!
//! Inject an [`Arc<dyn IndexingProgressCallback>`] via
//! [`crate::config::SessionConfigBuilder::progress_callback`] to observe the
//! one-off indexing run that follows an upload: extraction, chunking and the
//! batched embedding calls.
//!
//! # Example
//!
//! ```rust
//! use docubot::{IndexingProgressCallback, SessionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct BatchCounter {
//!     batches: AtomicUsize,
//! }
//!
//! impl IndexingProgressCallback for BatchCounter {
//!     fn on_batch_embedded(&self, embedded: usize, total_chunks: usize) {
//!         self.batches.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{embedded}/{total_chunks} chunks embedded");
//!     }
//! }
//!
//! let config = SessionConfig::builder()
//!     .progress_callback(Arc::new(BatchCounter { batches: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the session while it indexes an uploaded document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait IndexingProgressCallback: Send + Sync {
    /// Called once the document has been persisted, before extraction.
    fn on_indexing_start(&self, document: &str) {
        let _ = document;
    }

    /// Called after text extraction.
    ///
    /// # Arguments
    /// * `pages_with_text`: pages that produced a non-empty segment
    /// * `total_pages`    : pages in the document
    fn on_text_extracted(&self, pages_with_text: usize, total_pages: usize) {
        let _ = (pages_with_text, total_pages);
    }

    /// Called after chunking with the number of chunks to embed.
    fn on_chunked(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called after each embedding batch returns.
    ///
    /// # Arguments
    /// * `embedded`    : chunks embedded so far
    /// * `total_chunks`: chunks in the document
    fn on_batch_embedded(&self, embedded: usize, total_chunks: usize) {
        let _ = (embedded, total_chunks);
    }

    /// Called once when the index is ready.
    fn on_indexing_complete(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called once when indexing aborts; the session is empty again.
    fn on_indexing_failed(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IndexingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SessionConfig`].
pub type ProgressCallback = Arc<dyn IndexingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        batches: AtomicUsize,
        last_embedded: AtomicUsize,
        completed: AtomicUsize,
    }

    impl IndexingProgressCallback for TrackingCallback {
        fn on_batch_embedded(&self, embedded: usize, _total_chunks: usize) {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.last_embedded.store(embedded, Ordering::SeqCst);
        }

        fn on_indexing_complete(&self, total_chunks: usize) {
            self.completed.store(total_chunks, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_indexing_start("doc.pdf");
        cb.on_text_extracted(2, 3);
        cb.on_chunked(7);
        cb.on_batch_embedded(7, 7);
        cb.on_indexing_complete(7);
        cb.on_indexing_failed("boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_embedded(32, 40);
        tracker.on_batch_embedded(40, 40);
        tracker.on_indexing_complete(40);

        assert_eq!(tracker.batches.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.last_embedded.load(Ordering::SeqCst), 40);
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 40);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_chunked(3);
    }
}
