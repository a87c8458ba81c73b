//! # ocr2md
//!
//! Client-side workflow for converting documents to Markdown through a
//! model-backed conversion service.
//!
//! The service does the heavy lifting (OCR, layout analysis, the model call).
//! This crate owns everything around it: validating what the user picked,
//! running exactly one upload at a time with cancellation, interpreting the
//! response, previewing the source document, and exporting the result.
//!
//! ## Workflow Overview
//!
//! ```text
//! document + model + pages
//!  │
//!  ├─ 1. Validate  document present and ≤ limit, model chosen, page selector well-formed
//!  ├─ 2. Upload    multipart POST /api/convert, cancellable, one in flight
//!  ├─ 3. Settle    Succeeded / Failed / Cancelled, late outcomes discarded
//!  ├─ 4. Save      <base>_converted.md via the platform file service
//!  └─ 5. Export    clipboard, Markdown file, or Word document
//!
//! alongside: page preview of the selected PDF (pdfium)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr2md::{
//!     ClientConfig, ConversionController, Document, DownloadsFileService,
//!     HttpConversionService, SubmitOutcome,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder().base_url("http://127.0.0.1:8000").build()?;
//!     let service = HttpConversionService::new(&config)?;
//!     let files = Arc::new(DownloadsFileService::user_downloads());
//!     let controller = ConversionController::new(service, files, config);
//!
//!     let limit = controller.config().max_document_bytes;
//!     controller.select_document(Some(Document::from_path("scan.pdf", limit).await?));
//!     controller.select_model("gpt-4o");
//!     controller.set_pages("1-3");
//!
//!     if let SubmitOutcome::Finished(status) = controller.submit().await {
//!         println!("{status:?}: {:?}", controller.message());
//!     }
//!     if let Some(result) = controller.result() {
//!         println!("{}", result.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `ocr2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `clipboard` | on      | System clipboard for the copy export (arboard) |
//!
//! Disable both when embedding the library:
//! ```toml
//! ocr2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod flash;
pub mod input;
pub mod lifecycle;
pub mod observer;
pub mod platform;
pub mod preview;
pub mod service;
pub mod validation;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder, PageSelection};
pub use controller::{ConversionController, SubmitOutcome};
pub use error::{
    CatalogError, ExportError, Ocr2MdError, PreviewError, RequestError, TransportError,
    ValidationError,
};
pub use export::markdown::{GfmRenderer, MarkdownRenderer};
pub use export::{DismissEvents, DismissSignal, ExportAction, ExportCoordinator};
pub use input::{converted_file_name, Document, InputState};
pub use lifecycle::{
    CancellationToken, ConversionRequest, ConversionResult, ConversionStatus, RequestLifecycle,
};
pub use observer::{ConversionObserver, NoopObserver};
pub use platform::{DownloadsFileService, FileService};
pub use preview::pdfium::{PdfiumRenderer, RenderedPage};
pub use preview::{DocumentRenderer, PreviewController, Viewport};
pub use service::http::HttpConversionService;
pub use service::{ConversionService, ConversionUpload, ModelCatalog};
pub use validation::{parse_page_selector, ValidationState};
