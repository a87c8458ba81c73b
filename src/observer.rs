//! Observer trait for conversion lifecycle events.
//!
//! Inject an [`Arc<dyn ConversionObserver>`] via
//! [`crate::config::ClientConfigBuilder::observer`] to receive events as the
//! controller moves a conversion request through its states.
//!
//! Events are delivered after the controller has released its internal lock,
//! so an observer may query the controller from inside a callback.
//!
//! # Example
//!
//! ```rust
//! use ocr2md::{ClientConfig, ConversionObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     uploads: AtomicUsize,
//! }
//!
//! impl ConversionObserver for CountingObserver {
//!     fn on_upload_start(&self, _attempt: u64, _document: &str, _size: u64) {
//!         self.uploads.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { uploads: AtomicUsize::new(0) });
//! let config = ClientConfig::builder()
//!     .observer(observer as Arc<dyn ConversionObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::{RequestError, ValidationError};
use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::controller::ConversionController`] on lifecycle events.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about. Implementations must be `Send + Sync`:
/// `cancel` may be called from a different task than `submit`.
pub trait ConversionObserver: Send + Sync {
    /// A submission arrived while another request was in flight and was ignored.
    fn on_submit_ignored(&self) {}

    /// Submission was blocked by validation; no network call was made.
    fn on_validation_failed(&self, attempt: u64, error: &ValidationError) {
        let _ = (attempt, error);
    }

    /// The upload is about to be sent.
    ///
    /// # Arguments
    /// * `attempt`  — attempt number, unique per controller
    /// * `document` — name of the uploaded document
    /// * `size`     — payload size in bytes
    fn on_upload_start(&self, attempt: u64, document: &str, size: u64) {
        let _ = (attempt, document, size);
    }

    /// The attempt succeeded.
    ///
    /// # Arguments
    /// * `markdown_len` — byte length of the returned Markdown
    /// * `artifact`     — where the result was saved, if saving succeeded
    fn on_succeeded(&self, attempt: u64, markdown_len: usize, artifact: Option<&Path>) {
        let _ = (attempt, markdown_len, artifact);
    }

    /// The attempt failed with a transport error.
    fn on_failed(&self, attempt: u64, error: &RequestError) {
        let _ = (attempt, error);
    }

    /// The attempt was cancelled by the user.
    fn on_cancelled(&self, attempt: u64) {
        let _ = attempt;
    }
}

/// A no-op observer. This is the behaviour when none is configured.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type SharedObserver = Arc<dyn ConversionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        uploads: AtomicUsize,
        successes: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl ConversionObserver for Tracking {
        fn on_upload_start(&self, _attempt: u64, _document: &str, _size: u64) {
            self.uploads.fetch_add(1, Ordering::SeqCst);
        }

        fn on_succeeded(&self, _attempt: u64, _len: usize, _artifact: Option<&Path>) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cancelled(&self, _attempt: u64) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_submit_ignored();
        o.on_validation_failed(1, &ValidationError::MissingModel);
        o.on_upload_start(1, "a.pdf", 10);
        o.on_succeeded(1, 42, None);
        o.on_failed(1, &RequestError::UserCancelled);
        o.on_cancelled(1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let t = Tracking::default();
        t.on_upload_start(1, "a.pdf", 10);
        t.on_succeeded(1, 5, Some(Path::new("/tmp/a_converted.md")));
        t.on_upload_start(2, "a.pdf", 10);
        t.on_cancelled(2);
        assert_eq!(t.uploads.load(Ordering::SeqCst), 2);
        assert_eq!(t.successes.load(Ordering::SeqCst), 1);
        assert_eq!(t.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shared_observer_is_object_safe() {
        let o: SharedObserver = Arc::new(NoopObserver);
        o.on_submit_ignored();
    }
}
