//! Error types for the ocr2md library.
//!
//! Errors are split by who has to react to them:
//!
//! * [`ValidationError`] — the user's input is incomplete or malformed.
//!   Blocks submission, never reaches the network.
//!
//! * [`TransportError`] — the conversion call itself went wrong (non-success
//!   status, empty payload, no connectivity).
//!
//! * [`RequestError`] — the terminal error of one conversion attempt. Wraps
//!   the two families above plus [`RequestError::UserCancelled`].
//!
//! * [`ExportError`] and [`PreviewError`] — side-channel failures. They are
//!   reported to the caller but never alter the state of a conversion request.
//!
//! * [`CatalogError`] — the model list could not be loaded.
//!
//! * [`Ocr2MdError`] — fatal library errors: bad configuration, unreadable
//!   input file, HTTP client construction.
//!
//! The `Display` text of every user-facing variant is the message shown to
//! the user, so callers can surface `err.to_string()` as-is.

use std::path::PathBuf;
use thiserror::Error;

/// Fixed message recorded when the user stops an in-flight conversion.
pub const CONVERSION_STOPPED: &str = "Conversion stopped";

/// Fallback message when the service fails without a usable error payload.
pub const CONVERSION_FAILED: &str = "Conversion failed";

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No document has been selected.
    #[error("Please select a file")]
    MissingDocument,

    /// The selected document is larger than the configured maximum.
    #[error("File size exceeds {} limit", size_label(.max_bytes))]
    DocumentTooLarge { size: u64, max_bytes: u64 },

    /// No model has been selected.
    #[error("Please select a model")]
    MissingModel,

    /// A `start-end` page selector that does not describe a valid range.
    #[error("Invalid page range format (e.g., use 1-5)")]
    InvalidPageRange,

    /// A comma-separated page list with a non-positive or non-integer entry.
    #[error("Invalid page format (e.g., use 1,2,3)")]
    InvalidPageList,
}

/// `100MB`, `0.5MB`, or plain bytes for limits too small to show in MB.
fn size_label(bytes: &u64) -> String {
    let bytes = *bytes;
    const MIB: u64 = 1024 * 1024;
    if bytes % MIB == 0 {
        return format!("{}MB", bytes / MIB);
    }
    let mb = format!("{:.2}", bytes as f64 / MIB as f64);
    let mb = mb.trim_end_matches('0').trim_end_matches('.');
    if mb == "0" {
        format!("{bytes} bytes")
    } else {
        format!("{mb}MB")
    }
}

/// Failure of the remote conversion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The service answered with a non-success status.
    ///
    /// `message` is the `detail` field of the error payload, or
    /// [`CONVERSION_FAILED`] when the payload could not be read.
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    /// The service answered 2xx with an empty body.
    #[error("Conversion failed: empty result")]
    EmptyResult,

    /// The request never produced a response.
    #[error("Could not reach the conversion service: {0}")]
    Connectivity(String),
}

/// Terminal error of a single conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The cancellation token was signalled while the upload was in flight.
    #[error("Conversion stopped")]
    UserCancelled,
}

/// Failure of an export action. Never changes the conversion state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("Copy failed, please try again")]
    ClipboardWriteFailed { detail: String },

    #[error("Failed to save '{filename}': {detail}")]
    SaveFailed { filename: String, detail: String },

    #[error("Document export failed: {message}")]
    ExportConversionFailed { message: String },
}

/// Failure of the page preview. Never changes the conversion state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    #[error("Cannot render PDF page")]
    RenderFailed { detail: String },
}

impl PreviewError {
    pub(crate) fn render(detail: impl Into<String>) -> Self {
        PreviewError::RenderFailed {
            detail: detail.into(),
        }
    }
}

/// The model list could not be loaded. Surfaced once, at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Non-success status; `message` is the payload `detail` or a fallback.
    #[error("{message}")]
    Request { status: u16, message: String },

    /// The payload did not contain a `vendors` list.
    #[error("Invalid model data format")]
    InvalidPayload,

    /// The payload was well-formed but listed no models.
    #[error("No AI models available")]
    Empty,

    #[error("Could not reach the conversion service: {0}")]
    Connectivity(String),
}

/// Fatal errors returned by the ocr2md library.
#[derive(Debug, Error)]
pub enum Ocr2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Reading the file failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── HTTP client errors ────────────────────────────────────────────────
    /// The HTTP client could not be constructed.
    #[error("Failed to initialise HTTP client: {0}")]
    HttpClient(String),
}
