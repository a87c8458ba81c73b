//! Page preview for the selected document.
//!
//! [`PreviewController`] tracks the current and total page numbers of one
//! open document and asks a [`DocumentRenderer`] to draw the current page
//! whenever the page or the viewport changes. Only PDF documents are
//! previewable; selecting anything else leaves no preview state behind.
//!
//! The rendered page always fills the container: the scale is the available
//! width divided by the page's native width at scale 1.
//!
//! Render failures are recorded in [`PreviewController::last_error`] and
//! returned, but they never touch the conversion request.

pub mod encode;
pub mod pdfium;

use crate::error::PreviewError;
use crate::input::Document;
use bytes::Bytes;
use std::future::Future;
use tracing::{debug, warn};

/// Opaque handle to a document opened by a [`DocumentRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// What [`DocumentRenderer::open`] reports about a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedDocument {
    pub handle: DocumentHandle,
    pub page_count: usize,
}

/// The document-rendering service. Pages are 1-indexed.
pub trait DocumentRenderer: Send + Sync {
    /// Whatever a rendered page is drawn onto.
    type Surface: Send;

    fn open(&self, payload: Bytes)
        -> impl Future<Output = Result<OpenedDocument, PreviewError>> + Send;

    /// Native width of `page` at scale 1, in points.
    fn page_width(
        &self,
        handle: DocumentHandle,
        page: usize,
    ) -> impl Future<Output = Result<f32, PreviewError>> + Send;

    fn render_page(
        &self,
        handle: DocumentHandle,
        page: usize,
        target_width: u32,
    ) -> impl Future<Output = Result<Self::Surface, PreviewError>> + Send;

    /// Free the document. Handles are not reused afterwards.
    fn release(&self, handle: DocumentHandle);
}

/// The preview container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub container_width: f32,
    /// Horizontal padding on each side of the page.
    pub padding: f32,
}

impl Viewport {
    pub const DEFAULT_PADDING: f32 = 16.0;

    pub fn new(container_width: f32) -> Self {
        Self {
            container_width,
            padding: Self::DEFAULT_PADDING,
        }
    }

    /// Width left for the page once padding is removed. Never below 1.
    pub fn available_width(&self) -> f32 {
        (self.container_width - 2.0 * self.padding).max(1.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800.0)
    }
}

/// Paging state of the open document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewState {
    handle: DocumentHandle,
    current_page: usize,
    total_pages: usize,
    scale: f32,
}

impl PreviewState {
    pub fn handle(&self) -> DocumentHandle {
        self.handle
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Scale of the last successful render.
    pub fn scale(&self) -> f32 {
        self.scale
    }
}

/// Owns at most one open document handle.
pub struct PreviewController<R: DocumentRenderer> {
    renderer: R,
    viewport: Viewport,
    state: Option<PreviewState>,
    surface: Option<R::Surface>,
    last_error: Option<PreviewError>,
}

impl<R: DocumentRenderer> PreviewController<R> {
    pub fn new(renderer: R, viewport: Viewport) -> Self {
        Self {
            renderer,
            viewport,
            state: None,
            surface: None,
            last_error: None,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn state(&self) -> Option<&PreviewState> {
        self.state.as_ref()
    }

    /// The last rendered page, if any.
    pub fn surface(&self) -> Option<&R::Surface> {
        self.surface.as_ref()
    }

    pub fn last_error(&self) -> Option<&PreviewError> {
        self.last_error.as_ref()
    }

    /// Replace the previewed document.
    ///
    /// The previous handle is released first. A document that is not
    /// previewable leaves the controller empty.
    pub async fn load(&mut self, document: &Document) -> Result<(), PreviewError> {
        self.unload();
        if !document.is_previewable() {
            debug!("'{}' is not previewable ({})", document.name(), document.media_type());
            return Ok(());
        }

        let opened = match self.renderer.open(document.payload().clone()).await {
            Ok(opened) => opened,
            Err(e) => return Err(self.record(e)),
        };
        debug!(
            "Opened '{}' for preview: {} pages",
            document.name(),
            opened.page_count
        );
        self.state = Some(PreviewState {
            handle: opened.handle,
            current_page: 1,
            total_pages: opened.page_count,
            scale: 1.0,
        });
        self.render_current().await
    }

    /// Release the open document, if any.
    pub fn unload(&mut self) {
        if let Some(state) = self.state.take() {
            self.renderer.release(state.handle);
        }
        self.surface = None;
        self.last_error = None;
    }

    /// Advance one page. No-op on the last page.
    pub async fn next_page(&mut self) -> Result<(), PreviewError> {
        match self.state {
            Some(s) if s.current_page < s.total_pages => self.go_to_page(s.current_page + 1).await,
            _ => Ok(()),
        }
    }

    /// Go back one page. No-op on the first page.
    pub async fn prev_page(&mut self) -> Result<(), PreviewError> {
        match self.state {
            Some(s) if s.current_page > 1 => self.go_to_page(s.current_page - 1).await,
            _ => Ok(()),
        }
    }

    /// Jump to `page`. Pages outside `1..=total_pages` are ignored.
    ///
    /// The page number changes even if the render then fails.
    pub async fn go_to_page(&mut self, page: usize) -> Result<(), PreviewError> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        if page < 1 || page > state.total_pages || page == state.current_page {
            return Ok(());
        }
        state.current_page = page;
        self.render_current().await
    }

    /// Re-render the current page for a new container width.
    pub async fn resize(&mut self, container_width: f32) -> Result<(), PreviewError> {
        self.viewport.container_width = container_width;
        self.render_current().await
    }

    async fn render_current(&mut self) -> Result<(), PreviewError> {
        let Some(state) = self.state else {
            return Ok(());
        };
        let available = self.viewport.available_width();
        let renderer = &self.renderer;

        let rendered = async {
            let native = renderer.page_width(state.handle, state.current_page).await?;
            if !native.is_finite() || native <= 0.0 {
                return Err(PreviewError::render(format!(
                    "page {} has no width",
                    state.current_page
                )));
            }
            let surface = renderer
                .render_page(state.handle, state.current_page, available.round() as u32)
                .await?;
            Ok((available / native, surface))
        }
        .await;

        match rendered {
            Ok((scale, surface)) => {
                debug!(
                    "Rendered page {}/{} at scale {:.3}",
                    state.current_page, state.total_pages, scale
                );
                if let Some(s) = self.state.as_mut() {
                    s.scale = scale;
                }
                self.surface = Some(surface);
                self.last_error = None;
                Ok(())
            }
            Err(e) => Err(self.record(e)),
        }
    }

    fn record(&mut self, error: PreviewError) -> PreviewError {
        warn!("Preview render failed: {:?}", error);
        self.last_error = Some(error.clone());
        error
    }
}

impl<R: DocumentRenderer> Drop for PreviewController<R> {
    fn drop(&mut self) {
        self.unload();
    }
}
