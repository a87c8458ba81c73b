//! Conversion workflow controller.
//!
//! [`ConversionController`] owns the session: the user's input, the arming
//! flag, the single user-visible message, and the [`RequestLifecycle`]. It is
//! cheap to clone; clones share state, so one task can await
//! [`ConversionController::submit`] while another calls
//! [`ConversionController::cancel`].
//!
//! The internal lock is never held across an await point. Observer callbacks
//! run after it is released.

use crate::config::ClientConfig;
use crate::error::{
    CatalogError, RequestError, TransportError, ValidationError, CONVERSION_STOPPED,
};
use crate::flash::FlashFlag;
use crate::input::{converted_file_name, Document, InputState};
use crate::lifecycle::{
    AttemptId, CancellationToken, ConversionRequest, ConversionResult, ConversionStatus,
    RequestLifecycle,
};
use crate::observer::{NoopObserver, SharedObserver};
use crate::platform::FileService;
use crate::service::{ConversionService, ConversionUpload, ModelCatalog};
use crate::validation::{self, ValidationState};
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// What a call to [`ConversionController::submit`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Another request was in flight; nothing happened.
    Ignored,
    /// The attempt reached this terminal status.
    Finished(ConversionStatus),
}

/// Drives conversion requests against a [`ConversionService`].
pub struct ConversionController<S, F> {
    shared: Arc<Shared<S, F>>,
}

impl<S, F> Clone for ConversionController<S, F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<S, F> {
    service: S,
    files: Arc<F>,
    config: ClientConfig,
    observer: SharedObserver,
    state: Mutex<SessionState>,
}

struct SessionState {
    input: InputState,
    armed: bool,
    validation: ValidationState,
    message: Option<String>,
    lifecycle: RequestLifecycle,
    converted: FlashFlag,
    catalog: Option<ModelCatalog>,
}

impl SessionState {
    /// Recompute validation from the current input. Errors reach the
    /// message only once armed.
    fn revalidate(&mut self, max_document_bytes: u64) {
        self.validation = validation::validate(&self.input, max_document_bytes);
        if self.armed {
            self.message = self.validation.first_error().map(ToString::to_string);
        }
    }

    fn upload(&self) -> Result<ConversionUpload, ValidationError> {
        if let Some(error) = self.validation.first_error() {
            return Err(error.clone());
        }
        let document = self
            .input
            .document
            .clone()
            .ok_or(ValidationError::MissingDocument)?;
        Ok(ConversionUpload {
            document,
            model_id: self.input.model_id.clone(),
            pages: self.input.pages().map(str::to_string),
        })
    }
}

/// Result of the synchronous half of `submit`.
enum Prepared {
    Ignored,
    Rejected(AttemptId, ValidationError),
    Ready(AttemptId, CancellationToken, ConversionUpload),
}

impl<S: ConversionService, F: FileService> ConversionController<S, F> {
    pub fn new(service: S, files: Arc<F>, config: ClientConfig) -> Self {
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));
        let mut state = SessionState {
            input: InputState::new(),
            armed: false,
            validation: ValidationState::default(),
            message: None,
            lifecycle: RequestLifecycle::new(),
            converted: FlashFlag::new(config.success_window),
            catalog: None,
        };
        state.revalidate(config.max_document_bytes);

        Self {
            shared: Arc::new(Shared {
                service,
                files,
                config,
                observer,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn service(&self) -> &S {
        &self.shared.service
    }

    pub fn files(&self) -> Arc<F> {
        Arc::clone(&self.shared.files)
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// Select (or clear) the document. Lowers the "just converted" flag.
    pub fn select_document(&self, document: Option<Document>) {
        self.edit(|s| {
            s.input.document = document;
            s.converted.clear();
        });
    }

    pub fn select_model(&self, model_id: impl Into<String>) {
        let model_id = model_id.into();
        self.edit(|s| s.input.model_id = model_id);
    }

    pub fn set_pages(&self, selector: impl Into<String>) {
        let selector = selector.into();
        self.edit(|s| s.input.page_selector = selector);
    }

    fn edit(&self, f: impl FnOnce(&mut SessionState)) {
        let mut s = self.lock();
        f(&mut s);
        s.revalidate(self.shared.config.max_document_bytes);
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn input(&self) -> InputState {
        self.lock().input.clone()
    }

    /// Field errors as displayed: empty until validation has been armed.
    pub fn validation(&self) -> ValidationState {
        let s = self.lock();
        if s.armed {
            s.validation.clone()
        } else {
            ValidationState::default()
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// The single user-visible status or error message.
    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    pub fn can_submit(&self) -> bool {
        let s = self.lock();
        validation::can_submit(
            &s.input,
            &s.validation,
            s.lifecycle.is_in_flight(),
            self.shared.config.max_document_bytes,
        )
    }

    pub fn status(&self) -> ConversionStatus {
        self.lock().lifecycle.status()
    }

    pub fn request(&self) -> ConversionRequest {
        self.lock().lifecycle.current().clone()
    }

    /// The Markdown of the last successful conversion, until the next submit.
    pub fn result(&self) -> Option<ConversionResult> {
        self.lock().lifecycle.current().result().cloned()
    }

    /// Raised for a short window after a successful conversion.
    pub fn just_succeeded(&self) -> bool {
        self.lock().converted.is_raised()
    }

    pub fn catalog(&self) -> Option<ModelCatalog> {
        self.lock().catalog.clone()
    }

    // ── Actions ──────────────────────────────────────────────────────────

    /// Fetch the model catalog. A failure is surfaced once as the message.
    pub async fn load_models(&self) -> Result<ModelCatalog, CatalogError> {
        let result = self.shared.service.list_models().await;
        let mut s = self.lock();
        match result {
            Ok(catalog) => {
                s.catalog = Some(catalog.clone());
                Ok(catalog)
            }
            Err(e) => {
                warn!("Failed to load models: {}", e);
                s.message = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop the in-flight conversion. Returns `false` if nothing was in flight.
    pub fn cancel(&self) -> bool {
        let cancelled = {
            let mut s = self.lock();
            let attempt = s.lifecycle.cancel();
            if attempt.is_some() {
                s.message = Some(CONVERSION_STOPPED.to_string());
            }
            attempt
        };
        match cancelled {
            Some(attempt) => {
                info!("Attempt {}: stopped by user", attempt);
                self.shared.observer.on_cancelled(attempt);
                true
            }
            None => false,
        }
    }

    /// Validate the current input and, if it passes, upload it.
    ///
    /// Resolves once the attempt is terminal. Returns
    /// [`SubmitOutcome::Ignored`] while another request is in flight. If this
    /// future is dropped before the upload completes, the attempt is settled
    /// as cancelled.
    pub async fn submit(&self) -> SubmitOutcome {
        let observer = &self.shared.observer;
        let (attempt, token, upload) = match self.prepare() {
            Prepared::Ignored => {
                debug!("Submit ignored: a conversion is already in flight");
                observer.on_submit_ignored();
                return SubmitOutcome::Ignored;
            }
            Prepared::Rejected(attempt, error) => {
                info!("Attempt {}: {}", attempt, error);
                observer.on_validation_failed(attempt, &error);
                return SubmitOutcome::Finished(ConversionStatus::Failed);
            }
            Prepared::Ready(attempt, token, upload) => (attempt, token, upload),
        };

        let source_name = upload.document.name().to_string();
        observer.on_upload_start(attempt, &source_name, upload.document.size());

        let mut guard = AttemptGuard {
            shared: &self.shared,
            attempt,
            settled: false,
        };
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RequestError::UserCancelled),
            result = self.shared.service.convert(upload, token.clone()) => result,
        };
        guard.settled = true;

        self.settle(attempt, source_name, outcome).await
    }

    fn prepare(&self) -> Prepared {
        let mut s = self.lock();
        let Some(attempt) = s.lifecycle.begin() else {
            return Prepared::Ignored;
        };
        s.armed = true;
        s.revalidate(self.shared.config.max_document_bytes);

        match s.upload() {
            Err(error) => {
                s.lifecycle.reject(attempt, error.clone());
                s.message = Some(error.to_string());
                Prepared::Rejected(attempt, error)
            }
            Ok(upload) => match s.lifecycle.launch(attempt) {
                Some(token) => {
                    s.message = None;
                    s.converted.clear();
                    Prepared::Ready(attempt, token, upload)
                }
                None => Prepared::Ignored,
            },
        }
    }

    async fn settle(
        &self,
        attempt: AttemptId,
        source_name: String,
        outcome: Result<Bytes, RequestError>,
    ) -> SubmitOutcome {
        let outcome = outcome.and_then(|payload| {
            if payload.is_empty() {
                Err(TransportError::EmptyResult.into())
            } else {
                Ok(payload)
            }
        });
        let observer = &self.shared.observer;

        let payload = {
            let mut s = self.lock();
            if !s.lifecycle.is_live(attempt) {
                debug!("Attempt {}: outcome arrived after cancellation", attempt);
                return SubmitOutcome::Finished(ConversionStatus::Cancelled);
            }
            match outcome {
                Ok(payload) => {
                    let result = ConversionResult {
                        source_name: source_name.clone(),
                        content: String::from_utf8_lossy(&payload).into_owned(),
                        artifact: None,
                    };
                    s.lifecycle.succeed(attempt, result);
                    s.armed = false;
                    s.message = None;
                    s.converted.raise();
                    payload
                }
                Err(error) => {
                    s.message = Some(error.to_string());
                    s.lifecycle.fail(attempt, error.clone());
                    let status = s.lifecycle.status();
                    drop(s);
                    match error {
                        RequestError::UserCancelled => observer.on_cancelled(attempt),
                        ref e => {
                            warn!("Attempt {}: conversion failed: {}", attempt, e);
                            observer.on_failed(attempt, e);
                        }
                    }
                    return SubmitOutcome::Finished(status);
                }
            }
        };

        let artifact = self.save_artifact(&source_name, payload.clone()).await;
        if let Some(path) = &artifact {
            self.lock().lifecycle.set_artifact(attempt, path.clone());
        }
        info!(
            "Attempt {}: converted '{}' ({} bytes of Markdown)",
            attempt,
            source_name,
            payload.len()
        );
        observer.on_succeeded(attempt, payload.len(), artifact.as_deref());
        SubmitOutcome::Finished(ConversionStatus::Succeeded)
    }

    /// Persist the Markdown as `<base>_converted.md`. A save failure does
    /// not fail the conversion.
    async fn save_artifact(&self, source_name: &str, payload: Bytes) -> Option<PathBuf> {
        let filename = converted_file_name(source_name, "md");
        match self.shared.files.save(payload, &filename).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not save '{}': {}", filename, e);
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.shared.lock()
    }
}

impl<S, F> Shared<S, F> {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles the attempt as cancelled if `submit` is dropped mid-flight.
struct AttemptGuard<'a, S, F> {
    shared: &'a Shared<S, F>,
    attempt: AttemptId,
    settled: bool,
}

impl<S, F> Drop for AttemptGuard<'_, S, F> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let cancelled = {
            let mut s = self.shared.lock();
            let live = s.lifecycle.is_live(self.attempt);
            if live {
                if let Some(token) = s.lifecycle.current().token() {
                    token.cancel();
                }
                s.lifecycle.fail(self.attempt, RequestError::UserCancelled);
                s.message = Some(CONVERSION_STOPPED.to_string());
            }
            live
        };
        if cancelled {
            debug!("Attempt {}: submit dropped while in flight", self.attempt);
            self.shared.observer.on_cancelled(self.attempt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PDF_MEDIA_TYPE;
    use std::future::Future;
    use std::io;
    use std::time::Duration;

    /// Answers every upload with `payload`; never answers if `None`.
    struct StaticService {
        payload: Option<&'static str>,
    }

    impl ConversionService for StaticService {
        async fn list_models(&self) -> Result<ModelCatalog, CatalogError> {
            Err(CatalogError::Empty)
        }

        async fn convert(
            &self,
            _upload: ConversionUpload,
            _cancel: CancellationToken,
        ) -> Result<Bytes, RequestError> {
            match self.payload {
                Some(p) => Ok(Bytes::from_static(p.as_bytes())),
                None => std::future::pending().await,
            }
        }
    }

    struct NoFiles;

    impl FileService for NoFiles {
        async fn save(&self, _contents: Bytes, _filename: &str) -> io::Result<PathBuf> {
            Err(io::Error::other("read-only"))
        }

        fn write_clipboard(&self, _text: &str) -> impl Future<Output = io::Result<()>> + Send {
            async { Ok(()) }
        }
    }

    fn controller(payload: Option<&'static str>) -> ConversionController<StaticService, NoFiles> {
        ConversionController::new(
            StaticService { payload },
            Arc::new(NoFiles),
            ClientConfig::default(),
        )
    }

    fn pdf() -> Document {
        Document::new("doc.pdf", PDF_MEDIA_TYPE, &b"%PDF-1.7"[..])
    }

    #[test]
    fn errors_hidden_until_armed() {
        let c = controller(Some("# ok"));
        c.set_pages("9-2");
        assert_eq!(c.message(), None);
        assert!(!c.validation().has_errors());
        assert!(!c.can_submit());
    }

    #[tokio::test]
    async fn edits_after_arming_update_message() {
        let c = controller(Some("# ok"));
        assert_eq!(
            c.submit().await,
            SubmitOutcome::Finished(ConversionStatus::Failed)
        );
        assert_eq!(c.message().as_deref(), Some("Please select a file"));

        c.select_document(Some(pdf()));
        assert_eq!(c.message().as_deref(), Some("Please select a model"));
        c.select_model("m1");
        assert_eq!(c.message(), None);
        c.set_pages("1,x");
        assert_eq!(c.message().as_deref(), Some("Invalid page format (e.g., use 1,2,3)"));
    }

    #[tokio::test]
    async fn save_failure_does_not_fail_conversion() {
        let c = controller(Some("# Title"));
        c.select_document(Some(pdf()));
        c.select_model("m1");

        assert_eq!(
            c.submit().await,
            SubmitOutcome::Finished(ConversionStatus::Succeeded)
        );
        let result = c.result().expect("result published");
        assert_eq!(result.content, "# Title");
        assert_eq!(result.artifact, None);
        assert!(!c.is_armed());
    }

    #[tokio::test]
    async fn dropped_submit_settles_as_cancelled() {
        let c = controller(None);
        c.select_document(Some(pdf()));
        c.select_model("m1");

        let pending = tokio::time::timeout(Duration::from_millis(20), c.submit()).await;
        assert!(pending.is_err(), "upload never answers");
        assert_eq!(c.status(), ConversionStatus::Cancelled);
        assert_eq!(c.message().as_deref(), Some(CONVERSION_STOPPED));
        assert!(c.request().token().is_none());
    }

    #[tokio::test]
    async fn catalog_failure_sets_message_once() {
        let c = controller(None);
        assert_eq!(c.load_models().await, Err(CatalogError::Empty));
        assert_eq!(c.message().as_deref(), Some("No AI models available"));
        assert!(c.catalog().is_none());
    }
}
