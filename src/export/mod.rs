//! Export of a finished conversion: clipboard, Markdown file, Word document.
//!
//! [`ExportCoordinator`] works on a [`ConversionResult`], which only exists
//! once a request has succeeded. Export failures are returned to the caller
//! and never touch the conversion request.
//!
//! ## Menu dismissal
//!
//! The export menu closes on an outside click or escape. Those signals come
//! from a [`DismissEvents`] source; the coordinator subscribes while the menu
//! is open and drops its subscription as soon as the menu closes.

pub mod markdown;

use crate::error::ExportError;
use crate::flash::FlashFlag;
use crate::input::{base_name, converted_file_name};
use crate::lifecycle::ConversionResult;
use crate::platform::FileService;
use bytes::Bytes;
use markdown::{document_shell, MarkdownRenderer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

/// Extension of the exported Word document.
pub const DOCUMENT_EXTENSION: &str = "doc";

/// Why the export menu should close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissSignal {
    OutsideClick,
    Escape,
}

/// Source of menu dismissal signals.
#[derive(Debug, Clone)]
pub struct DismissEvents {
    tx: broadcast::Sender<DismissSignal>,
}

impl Default for DismissEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl DismissEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Deliver a signal. Returns how many subscribers received it.
    pub fn send(&self, signal: DismissSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DismissSignal> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One export menu entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAction {
    Copy,
    Markdown,
    Document,
}

/// Turns a successful result into export artifacts.
pub struct ExportCoordinator<M, F> {
    markdown: M,
    files: Arc<F>,
    dismiss: Option<broadcast::Receiver<DismissSignal>>,
    succeeded: FlashFlag,
    copied: FlashFlag,
}

impl<M: MarkdownRenderer, F: FileService> ExportCoordinator<M, F> {
    /// `window` is how long the success flags stay raised.
    pub fn new(markdown: M, files: Arc<F>, window: Duration) -> Self {
        Self {
            markdown,
            files,
            dismiss: None,
            succeeded: FlashFlag::new(window),
            copied: FlashFlag::new(window),
        }
    }

    pub fn markdown(&self) -> &M {
        &self.markdown
    }

    // ── Menu ─────────────────────────────────────────────────────────────

    pub fn is_menu_open(&self) -> bool {
        self.dismiss.is_some()
    }

    pub fn open_menu(&mut self, events: &DismissEvents) {
        if self.dismiss.is_none() {
            self.dismiss = Some(events.subscribe());
        }
    }

    /// Close the menu and drop the dismiss subscription.
    pub fn close_menu(&mut self) {
        self.dismiss = None;
    }

    pub fn toggle_menu(&mut self, events: &DismissEvents) {
        if self.is_menu_open() {
            self.close_menu();
        } else {
            self.open_menu(events);
        }
    }

    /// Apply any pending dismiss signal. Returns `true` if the menu closed.
    pub fn handle_dismiss(&mut self) -> bool {
        let Some(rx) = self.dismiss.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) | Err(TryRecvError::Closed) => {
                self.close_menu();
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Wait for the next dismiss signal and close the menu.
    ///
    /// Returns the signal, or `None` if the menu was not open or the event
    /// source went away.
    pub async fn wait_for_dismiss(&mut self) -> Option<DismissSignal> {
        let rx = self.dismiss.as_mut()?;
        let signal = loop {
            match rx.recv().await {
                Ok(signal) => break Some(signal),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break None,
            }
        };
        self.close_menu();
        signal
    }

    // ── Flags ────────────────────────────────────────────────────────────

    /// Raised for a short window after any successful export.
    pub fn just_succeeded(&self) -> bool {
        self.succeeded.is_raised()
    }

    /// Raised for a short window after a successful copy.
    pub fn just_copied(&self) -> bool {
        self.copied.is_raised()
    }

    // ── Actions ──────────────────────────────────────────────────────────

    /// Run a menu action. Returns where a file was saved, if any.
    pub async fn perform(
        &mut self,
        action: ExportAction,
        result: &ConversionResult,
    ) -> Result<Option<PathBuf>, ExportError> {
        match action {
            ExportAction::Copy => self.copy(result).await.map(|()| None),
            ExportAction::Markdown => self.download_markdown(result).await.map(Some),
            ExportAction::Document => self.download_document(result).await.map(Some),
        }
    }

    /// Put the Markdown on the clipboard.
    pub async fn copy(&mut self, result: &ConversionResult) -> Result<(), ExportError> {
        self.close_menu();
        if let Err(e) = self.files.write_clipboard(&result.content).await {
            warn!("Clipboard write failed: {}", e);
            return Err(ExportError::ClipboardWriteFailed {
                detail: e.to_string(),
            });
        }
        debug!("Copied {} bytes of Markdown", result.content.len());
        self.succeeded.raise();
        self.copied.raise();
        Ok(())
    }

    /// Save the Markdown as `<base>_converted.md`.
    pub async fn download_markdown(
        &mut self,
        result: &ConversionResult,
    ) -> Result<PathBuf, ExportError> {
        self.close_menu();
        let filename = converted_file_name(&result.source_name, "md");
        let path = self
            .files
            .save(Bytes::from(result.content.clone()), &filename)
            .await
            .map_err(|e| ExportError::SaveFailed {
                filename: filename.clone(),
                detail: e.to_string(),
            })?;
        info!("Saved Markdown to {}", path.display());
        self.succeeded.raise();
        Ok(path)
    }

    /// Render the Markdown to HTML and save it as a Word document,
    /// `<base>_converted.doc`.
    pub async fn download_document(
        &mut self,
        result: &ConversionResult,
    ) -> Result<PathBuf, ExportError> {
        self.close_menu();
        let failed = |message: String| {
            warn!("Document export failed: {}", message);
            ExportError::ExportConversionFailed { message }
        };

        let html = self
            .markdown
            .to_html(&result.content)
            .map_err(|e| failed(e.to_string()))?;
        let document = document_shell(base_name(&result.source_name), &html);
        let filename = converted_file_name(&result.source_name, DOCUMENT_EXTENSION);
        let path = self
            .files
            .save(Bytes::from(document), &filename)
            .await
            .map_err(|e| failed(e.to_string()))?;

        info!("Saved document to {}", path.display());
        self.succeeded.raise();
        Ok(path)
    }
}
