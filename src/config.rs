//! Configuration types for the conversion client.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. The configuration surface is deliberately small:
//! where the service lives, how large a document may be, and how long
//! transient success flags stay visible.

use crate::error::Ocr2MdError;
use crate::observer::ConversionObserver;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum document size: 100 MiB.
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 100 * 1024 * 1024;

/// Default base URL of the conversion service.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Configuration for the conversion client.
///
/// Built via [`ClientConfig::builder()`] or using [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use ocr2md::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .base_url("http://localhost:8000")
///     .max_document_mb(50)
///     .success_window(Duration::from_secs(3))
///     .build()
///     .unwrap();
/// assert_eq!(config.max_document_bytes, 50 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the conversion service. Default: `http://127.0.0.1:8000`.
    ///
    /// `/api/models` and `/api/convert` are resolved against it.
    pub base_url: String,

    /// Documents larger than this are rejected before upload. Default: 100 MiB.
    pub max_document_bytes: u64,

    /// How long the "just converted" flag stays raised after a successful
    /// conversion. Default: 5 s.
    pub success_window: Duration,

    /// How long the export success flag stays raised after a copy or
    /// download. Default: 2 s.
    pub export_success_window: Duration,

    /// Optional observer notified of lifecycle events.
    pub observer: Option<Arc<dyn ConversionObserver>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            success_window: Duration::from_secs(5),
            export_success_window: Duration::from_secs(2),
            observer: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("success_window", &self.success_window)
            .field("export_success_window", &self.export_success_window)
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn ConversionObserver>"),
            )
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn max_document_bytes(mut self, bytes: u64) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn max_document_mb(mut self, mb: u64) -> Self {
        self.config.max_document_bytes = mb.saturating_mul(1024 * 1024);
        self
    }

    pub fn success_window(mut self, window: Duration) -> Self {
        self.config.success_window = window;
        self
    }

    pub fn export_success_window(mut self, window: Duration) -> Self {
        self.config.export_success_window = window;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, Ocr2MdError> {
        let c = &self.config;
        let url = reqwest::Url::parse(&c.base_url).map_err(|e| {
            Ocr2MdError::InvalidConfig(format!("base URL '{}' is invalid: {}", c.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Ocr2MdError::InvalidConfig(format!(
                "base URL must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.max_document_bytes == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "Maximum document size must be > 0".into(),
            ));
        }
        if c.success_window.is_zero() || c.export_success_window.is_zero() {
            return Err(Ocr2MdError::InvalidConfig(
                "Success display windows must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// The pages a valid page selector refers to.
///
/// Produced by [`crate::validation::parse_page_selector`]; the raw selector
/// string is what travels to the service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageSelection {
    /// Convert all pages (empty selector).
    #[default]
    All,
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, in the order given).
    Set(Vec<usize>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = ClientConfig::builder().build().expect("defaults are valid");
        assert_eq!(config.max_document_bytes, DEFAULT_MAX_DOCUMENT_BYTES);
        assert_eq!(config.success_window, Duration::from_secs(5));
        assert_eq!(config.export_success_window, Duration::from_secs(2));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = ClientConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, Ocr2MdError::InvalidConfig(_)), "got: {err:?}");
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(ClientConfig::builder().base_url("not a url").build().is_err());
    }

    #[test]
    fn rejects_zero_size_limit() {
        assert!(ClientConfig::builder().max_document_bytes(0).build().is_err());
    }

    #[test]
    fn rejects_zero_window() {
        assert!(ClientConfig::builder()
            .export_success_window(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_observer() {
        let config = ClientConfig::builder()
            .observer(Arc::new(crate::observer::NoopObserver))
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("<dyn ConversionObserver>"), "got: {dbg}");
    }
}
