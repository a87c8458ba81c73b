//! [`DocumentRenderer`] backed by pdfium.
//!
//! pdfium is not safe to drive from async worker threads, so every call runs
//! inside `tokio::task::spawn_blocking`. `PdfDocument` borrows its `Pdfium`
//! instance, which rules out keeping documents open between calls; a handle
//! therefore maps to the shared payload and each call re-opens it.
//!
//! The library is located through `PDFIUM_LIB_PATH` (a directory holding
//! the platform library, or the library file itself) and falls back to the
//! system library search path.

use super::{DocumentHandle, DocumentRenderer, OpenedDocument};
use crate::error::PreviewError;
use bytes::Bytes;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Environment variable naming the pdfium library location.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// One rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_number: usize,
    pub image: DynamicImage,
}

/// Renders PDF pages with pdfium.
#[derive(Debug)]
pub struct PdfiumRenderer {
    library: Option<PathBuf>,
    documents: Mutex<HashMap<DocumentHandle, Bytes>>,
    next_handle: AtomicU64,
}

impl Default for PdfiumRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfiumRenderer {
    /// Use `PDFIUM_LIB_PATH` if set, otherwise the system library.
    pub fn new() -> Self {
        Self::with_library(std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from))
    }

    pub fn with_library(library: Option<PathBuf>) -> Self {
        Self {
            library,
            documents: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Number of documents currently open.
    pub fn open_documents(&self) -> usize {
        self.documents().len()
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<DocumentHandle, Bytes>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn payload(&self, handle: DocumentHandle) -> Result<Bytes, PreviewError> {
        self.documents()
            .get(&handle)
            .cloned()
            .ok_or_else(|| PreviewError::render(format!("unknown document handle {}", handle.id())))
    }

    /// Run `f` against the page on a blocking thread.
    async fn with_page<T, F>(
        &self,
        handle: DocumentHandle,
        page: usize,
        f: F,
    ) -> Result<T, PreviewError>
    where
        T: Send + 'static,
        F: FnOnce(&PdfPage) -> Result<T, PreviewError> + Send + 'static,
    {
        let payload = self.payload(handle)?;
        let library = self.library.clone();
        tokio::task::spawn_blocking(move || {
            let pdfium = bind(library.as_deref())?;
            let document = load(&pdfium, &payload)?;
            let index = page
                .checked_sub(1)
                .ok_or_else(|| PreviewError::render("pages are 1-indexed"))?;
            let pdf_page = document
                .pages()
                .get(index as u16)
                .map_err(|e| PreviewError::render(format!("page {}: {:?}", page, e)))?;
            f(&pdf_page)
        })
        .await
        .map_err(|e| PreviewError::render(format!("render task panicked: {}", e)))?
    }
}

impl DocumentRenderer for PdfiumRenderer {
    type Surface = RenderedPage;

    async fn open(&self, payload: Bytes) -> Result<OpenedDocument, PreviewError> {
        let library = self.library.clone();
        let bytes = payload.clone();
        let page_count = tokio::task::spawn_blocking(move || {
            let pdfium = bind(library.as_deref())?;
            let document = load(&pdfium, &bytes)?;
            Ok::<_, PreviewError>(document.pages().len() as usize)
        })
        .await
        .map_err(|e| PreviewError::render(format!("open task panicked: {}", e)))??;

        let handle = DocumentHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.documents().insert(handle, payload);
        info!("PDF loaded for preview: {} pages", page_count);
        Ok(OpenedDocument { handle, page_count })
    }

    async fn page_width(&self, handle: DocumentHandle, page: usize) -> Result<f32, PreviewError> {
        self.with_page(handle, page, |p| Ok(p.width().value)).await
    }

    async fn render_page(
        &self,
        handle: DocumentHandle,
        page: usize,
        target_width: u32,
    ) -> Result<RenderedPage, PreviewError> {
        let image = self
            .with_page(handle, page, move |p| {
                let config = PdfRenderConfig::new().set_target_width(target_width as i32);
                let bitmap = p
                    .render_with_config(&config)
                    .map_err(|e| PreviewError::render(format!("page {}: {:?}", page, e)))?;
                Ok(bitmap.as_image())
            })
            .await?;
        debug!(
            "Rendered page {} → {}x{} px",
            page,
            image.width(),
            image.height()
        );
        Ok(RenderedPage {
            page_number: page,
            image,
        })
    }

    fn release(&self, handle: DocumentHandle) {
        if self.documents().remove(&handle).is_some() {
            debug!("Released preview document {}", handle.id());
        }
    }
}

fn bind(library: Option<&Path>) -> Result<Pdfium, PreviewError> {
    let bindings = match library {
        Some(path) if path.is_file() => Pdfium::bind_to_library(path),
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| PreviewError::render(format!("pdfium library unavailable: {:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn load<'a>(pdfium: &'a Pdfium, payload: &'a [u8]) -> Result<PdfDocument<'a>, PreviewError> {
    pdfium
        .load_pdf_from_byte_slice(payload, None)
        .map_err(|e| PreviewError::render(format!("cannot open PDF: {:?}", e)))
}
