//! Progress-callback trait for per-section generation events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to follow a
//! run section by section, e.g. to drive a terminal progress bar.
//!
//! # Example
//!
//! ```rust
//! use market_report::{GenerationConfig, ReportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ReportProgressCallback for Counter {
//!     fn on_section_complete(&self, _index: usize, _total: usize, _name: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the assembler as it works through the planned sections.
///
/// Sections run one at a time, so calls never overlap within one run, but
/// the trait is `Send + Sync` because the run itself may move between
/// threads. Every method defaults to a no-op.
pub trait ReportProgressCallback: Send + Sync {
    /// Called once the section plan is known.
    ///
    /// # Arguments
    /// * `total_sections`: number of sections that will be emitted
    fn on_generation_start(&self, total_sections: usize) {
        let _ = total_sections;
    }

    /// Called before a section places any content.
    ///
    /// # Arguments
    /// * `index`: 1-indexed section position
    /// * `total`: total sections
    /// * `name` : human-readable section name, e.g. `"Kale (Curly) trend"`
    fn on_section_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a section finished, whether or not it degraded.
    fn on_section_complete(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called for every non-fatal degradation inside a section.
    ///
    /// # Arguments
    /// * `warning`: display form of the [`crate::error::SectionError`]
    fn on_section_warning(&self, index: usize, name: &str, warning: &str) {
        let _ = (index, name, warning);
    }

    /// Called after the PDF bytes have been produced.
    ///
    /// # Arguments
    /// * `page_count`   : pages in the finished document
    /// * `warning_count`: non-fatal degradations recorded during the run
    fn on_generation_complete(&self, page_count: usize, warning_count: usize) {
        let _ = (page_count, warning_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        planned: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        warnings: Mutex<Vec<String>>,
        pages: AtomicUsize,
    }

    impl ReportProgressCallback for TrackingCallback {
        fn on_generation_start(&self, total_sections: usize) {
            self.planned.store(total_sections, Ordering::SeqCst);
        }

        fn on_section_start(&self, _index: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_complete(&self, _index: usize, _total: usize, _name: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_warning(&self, _index: usize, name: &str, warning: &str) {
            self.warnings.lock().unwrap().push(format!("{name}: {warning}"));
        }

        fn on_generation_complete(&self, page_count: usize, _warning_count: usize) {
            self.pages.store(page_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_generation_start(4);
        cb.on_section_start(1, 4, "Summary");
        cb.on_section_warning(1, "Summary", "something");
        cb.on_section_complete(1, 4, "Summary");
        cb.on_generation_complete(3, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_generation_start(2);
        tracker.on_section_start(1, 2, "Summary");
        tracker.on_section_complete(1, 2, "Summary");
        tracker.on_section_start(2, 2, "Kale trend");
        tracker.on_section_warning(2, "Kale trend", "no data");
        tracker.on_section_complete(2, 2, "Kale trend");
        tracker.on_generation_complete(2, 1);

        assert_eq!(tracker.planned.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.warnings.lock().unwrap().as_slice(), ["Kale trend: no data"]);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_generation_start(1);
    }
}
