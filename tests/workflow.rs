//! Integration tests for the conversion workflow.
//!
//! The conversion service and the platform file service are replaced by
//! in-memory fakes, so these run offline and deterministically. Uploads can
//! be held open with a [`Notify`] gate to exercise cancellation and the
//! one-in-flight rule.

use bytes::Bytes;
use ocr2md::{
    CancellationToken, CatalogError, ClientConfig, ConversionController, ConversionObserver,
    ConversionService, ConversionStatus, ConversionUpload, Document, ExportCoordinator,
    FileService, GfmRenderer, ModelCatalog, RequestError, SubmitOutcome, TransportError,
    ValidationError,
};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const MIB: usize = 1024 * 1024;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Records every upload and answers with a fixed reply, optionally only
/// after its gate is released.
struct FakeService {
    calls: AtomicUsize,
    uploads: Mutex<Vec<ConversionUpload>>,
    reply: Result<Bytes, RequestError>,
    gate: Option<Arc<Notify>>,
}

impl FakeService {
    fn replying(markdown: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
            reply: Ok(Bytes::from_static(markdown.as_bytes())),
            gate: None,
        }
    }

    fn failing(error: RequestError) -> Self {
        Self {
            reply: Err(error),
            ..Self::replying("")
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_upload(&self) -> Option<ConversionUpload> {
        self.uploads.lock().unwrap().last().cloned()
    }
}

impl ConversionService for FakeService {
    async fn list_models(&self) -> Result<ModelCatalog, CatalogError> {
        ocr2md::service::parse_catalog(
            br#"{"vendors":[{"name":"OpenAI","models":[{"name":"GPT-4o","model_id":"gpt-4o"}]}]}"#,
        )
    }

    async fn convert(
        &self,
        upload: ConversionUpload,
        _cancel: CancellationToken,
    ) -> Result<Bytes, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.uploads.lock().unwrap().push(upload);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply.clone()
    }
}

/// Keeps saved files and clipboard text in memory.
#[derive(Default)]
struct MemoryFiles {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
    clipboard: Mutex<Option<String>>,
}

impl MemoryFiles {
    fn saved(&self, filename: &str) -> Option<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
    }

    fn count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

impl FileService for MemoryFiles {
    async fn save(&self, contents: Bytes, filename: &str) -> io::Result<PathBuf> {
        self.saved
            .lock()
            .unwrap()
            .push((filename.to_string(), contents.to_vec()));
        Ok(Path::new("/downloads").join(filename))
    }

    fn write_clipboard(&self, text: &str) -> impl Future<Output = io::Result<()>> + Send {
        *self.clipboard.lock().unwrap() = Some(text.to_string());
        async { Ok(()) }
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConversionObserver for RecordingObserver {
    fn on_submit_ignored(&self) {
        self.push("ignored".into());
    }

    fn on_validation_failed(&self, attempt: u64, error: &ValidationError) {
        self.push(format!("{attempt}: invalid: {error}"));
    }

    fn on_upload_start(&self, attempt: u64, document: &str, size: u64) {
        self.push(format!("{attempt}: upload {document} {size}"));
    }

    fn on_succeeded(&self, attempt: u64, markdown_len: usize, artifact: Option<&Path>) {
        let artifact = artifact.map(|p| p.display().to_string()).unwrap_or_default();
        self.push(format!("{attempt}: ok {markdown_len} {artifact}"));
    }

    fn on_failed(&self, attempt: u64, error: &RequestError) {
        self.push(format!("{attempt}: failed: {error}"));
    }

    fn on_cancelled(&self, attempt: u64) {
        self.push(format!("{attempt}: cancelled"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

type Controller = ConversionController<FakeService, MemoryFiles>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn controller_with(service: FakeService, config: ClientConfig) -> (Controller, Arc<MemoryFiles>) {
    init_tracing();
    let files = Arc::new(MemoryFiles::default());
    let controller = ConversionController::new(service, Arc::clone(&files), config);
    (controller, files)
}

fn controller(service: FakeService) -> (Controller, Arc<MemoryFiles>) {
    controller_with(service, ClientConfig::default())
}

fn pdf(name: &str, size: usize) -> Document {
    Document::new(name, "application/pdf", vec![b'x'; size])
}

fn fill(c: &Controller, pages: &str) {
    c.select_document(Some(pdf("scan.pdf", 16)));
    c.select_model("gpt-4o");
    c.set_pages(pages);
}

async fn wait_in_flight(c: &Controller) {
    while c.status() != ConversionStatus::InFlight {
        tokio::task::yield_now().await;
    }
}

// ── Submission ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_conversion_saves_artifact() {
    let (c, files) = controller(FakeService::replying("# Title\n\nBody"));
    c.select_document(Some(pdf("scan.pdf", 10 * MIB)));
    c.select_model("gpt-4o");
    c.set_pages("1-3");

    let outcome = c.submit().await;
    assert_eq!(outcome, SubmitOutcome::Finished(ConversionStatus::Succeeded));

    let upload = c.service().last_upload().expect("one upload");
    assert_eq!(upload.document.name(), "scan.pdf");
    assert_eq!(upload.document.size(), (10 * MIB) as u64);
    assert_eq!(upload.model_id, "gpt-4o");
    assert_eq!(upload.pages.as_deref(), Some("1-3"));

    let result = c.result().expect("result published");
    assert_eq!(result.source_name, "scan.pdf");
    assert_eq!(result.content, "# Title\n\nBody");
    assert_eq!(
        result.artifact.as_deref(),
        Some(Path::new("/downloads/scan_converted.md"))
    );
    assert_eq!(
        files.saved("scan_converted.md").as_deref(),
        Some("# Title\n\nBody")
    );
    assert_eq!(c.message(), None);
    assert!(c.just_succeeded());
    assert!(!c.is_armed());
}

#[tokio::test]
async fn empty_selector_sends_no_pages_field() {
    let (c, _) = controller(FakeService::replying("ok"));
    fill(&c, "");
    c.submit().await;
    assert_eq!(c.service().last_upload().unwrap().pages, None);
}

#[tokio::test]
async fn missing_document_fails_without_network() {
    let (c, files) = controller(FakeService::replying("ok"));
    c.select_model("gpt-4o");

    let outcome = c.submit().await;
    assert_eq!(outcome, SubmitOutcome::Finished(ConversionStatus::Failed));
    assert_eq!(c.service().calls(), 0);
    assert_eq!(files.count(), 0);
    assert_eq!(c.message().as_deref(), Some("Please select a file"));
    assert_eq!(
        c.request().error(),
        Some(&RequestError::Validation(ValidationError::MissingDocument))
    );
}

#[tokio::test]
async fn reversed_range_is_rejected() {
    let (c, _) = controller(FakeService::replying("ok"));
    fill(&c, "3-1");

    c.submit().await;
    assert_eq!(c.service().calls(), 0);
    assert_eq!(
        c.message().as_deref(),
        Some("Invalid page range format (e.g., use 1-5)")
    );
    assert_eq!(
        c.validation().first_error(),
        Some(&ValidationError::InvalidPageRange)
    );
}

#[tokio::test]
async fn oversized_document_is_rejected() {
    let config = ClientConfig::builder().max_document_mb(1).build().unwrap();
    let (c, _) = controller_with(FakeService::replying("ok"), config);
    c.select_document(Some(pdf("big.pdf", MIB + 1)));
    c.select_model("gpt-4o");

    c.submit().await;
    assert_eq!(c.service().calls(), 0);
    assert_eq!(c.message().as_deref(), Some("File size exceeds 1MB limit"));
}

#[tokio::test]
async fn document_exactly_at_limit_is_accepted() {
    let config = ClientConfig::builder().max_document_mb(1).build().unwrap();
    let (c, _) = controller_with(FakeService::replying("ok"), config);
    c.select_document(Some(pdf("edge.pdf", MIB)));
    c.select_model("gpt-4o");

    assert!(c.can_submit());
    assert_eq!(
        c.submit().await,
        SubmitOutcome::Finished(ConversionStatus::Succeeded)
    );
}

#[tokio::test]
async fn service_error_detail_becomes_message() {
    let error = RequestError::Transport(TransportError::RequestFailed {
        status: 500,
        message: "Model overloaded".into(),
    });
    let (c, files) = controller(FakeService::failing(error.clone()));
    fill(&c, "");

    let outcome = c.submit().await;
    assert_eq!(outcome, SubmitOutcome::Finished(ConversionStatus::Failed));
    assert_eq!(c.message().as_deref(), Some("Model overloaded"));
    assert_eq!(c.request().error(), Some(&error));
    assert!(c.result().is_none());
    assert_eq!(files.count(), 0);

    // A failed attempt does not block the next one.
    c.submit().await;
    assert_eq!(c.service().calls(), 2);
}

#[tokio::test]
async fn empty_payload_fails() {
    let (c, _) = controller(FakeService::replying(""));
    fill(&c, "");

    let outcome = c.submit().await;
    assert_eq!(outcome, SubmitOutcome::Finished(ConversionStatus::Failed));
    assert_eq!(
        c.message().as_deref(),
        Some("Conversion failed: empty result")
    );
}

// ── Cancellation and concurrency ─────────────────────────────────────────────

#[tokio::test]
async fn cancel_settles_attempt_and_discards_late_reply() {
    let gate = Arc::new(Notify::new());
    let (c, files) = controller(FakeService::replying("late").gated(Arc::clone(&gate)));
    fill(&c, "");

    let task = tokio::spawn({
        let c = c.clone();
        async move { c.submit().await }
    });
    wait_in_flight(&c).await;
    assert!(c.request().token().is_some());

    assert!(c.cancel());
    assert_eq!(c.status(), ConversionStatus::Cancelled);
    assert_eq!(c.message().as_deref(), Some("Conversion stopped"));

    let outcome = task.await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Finished(ConversionStatus::Cancelled));

    gate.notify_one();
    tokio::task::yield_now().await;
    assert_eq!(c.status(), ConversionStatus::Cancelled);
    assert!(c.result().is_none());
    assert_eq!(files.count(), 0);
    assert_eq!(c.request().error(), Some(&RequestError::UserCancelled));
}

#[tokio::test]
async fn cancel_when_idle_is_a_no_op() {
    let (c, _) = controller(FakeService::replying("ok"));
    assert!(!c.cancel());
    assert_eq!(c.status(), ConversionStatus::Idle);
    assert_eq!(c.message(), None);
}

#[tokio::test]
async fn rapid_double_submit_makes_one_call() {
    let gate = Arc::new(Notify::new());
    let (c, _) = controller(FakeService::replying("# once").gated(Arc::clone(&gate)));
    fill(&c, "");

    let first = tokio::spawn({
        let c = c.clone();
        async move { c.submit().await }
    });
    wait_in_flight(&c).await;

    assert_eq!(c.submit().await, SubmitOutcome::Ignored);
    assert!(!c.can_submit());

    gate.notify_one();
    assert_eq!(
        first.await.unwrap(),
        SubmitOutcome::Finished(ConversionStatus::Succeeded)
    );
    assert_eq!(c.service().calls(), 1);
}

#[tokio::test]
async fn resubmit_after_cancel_starts_fresh_attempt() {
    let gate = Arc::new(Notify::new());
    let (c, _) = controller(FakeService::replying("# second").gated(Arc::clone(&gate)));
    fill(&c, "");

    let first = tokio::spawn({
        let c = c.clone();
        async move { c.submit().await }
    });
    wait_in_flight(&c).await;
    let first_attempt = c.request().attempt();
    c.cancel();
    first.await.unwrap();

    let second = tokio::spawn({
        let c = c.clone();
        async move { c.submit().await }
    });
    wait_in_flight(&c).await;
    assert!(c.request().attempt() > first_attempt);
    assert_eq!(c.message(), None);

    gate.notify_one();
    assert_eq!(
        second.await.unwrap(),
        SubmitOutcome::Finished(ConversionStatus::Succeeded)
    );
    assert_eq!(c.result().unwrap().content, "# second");
}

// ── Transient state ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn success_flag_clears_after_window() {
    let (c, _) = controller(FakeService::replying("ok"));
    fill(&c, "");
    c.submit().await;
    assert!(c.just_succeeded());

    tokio::time::advance(Duration::from_millis(4_900)).await;
    assert!(c.just_succeeded());
    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(!c.just_succeeded());
}

#[tokio::test]
async fn new_document_clears_success_flag() {
    let (c, _) = controller(FakeService::replying("ok"));
    fill(&c, "");
    c.submit().await;
    assert!(c.just_succeeded());

    c.select_document(Some(pdf("next.pdf", 8)));
    assert!(!c.just_succeeded());
    assert!(c.result().is_some(), "previous result stays until the next success");
}

#[tokio::test]
async fn edits_while_armed_track_first_error() {
    let (c, _) = controller(FakeService::replying("ok"));
    c.set_pages("0,2");
    assert_eq!(c.message(), None, "not armed yet");

    c.submit().await;
    assert_eq!(c.message().as_deref(), Some("Please select a file"));

    c.select_document(Some(pdf("a.pdf", 4)));
    assert_eq!(c.message().as_deref(), Some("Please select a model"));

    c.select_model("gpt-4o");
    assert_eq!(
        c.message().as_deref(),
        Some("Invalid page format (e.g., use 1,2,3)")
    );

    c.set_pages("2");
    assert_eq!(c.message(), None);
    assert!(c.can_submit());
}

// ── Observer and catalog ─────────────────────────────────────────────────────

#[tokio::test]
async fn observer_sees_lifecycle_events() {
    let observer = Arc::new(RecordingObserver::default());
    let config = ClientConfig::builder()
        .observer(Arc::clone(&observer) as Arc<dyn ConversionObserver>)
        .build()
        .unwrap();
    let (c, _) = controller_with(FakeService::replying("# hi"), config);

    c.submit().await;
    fill(&c, "");
    c.submit().await;

    assert_eq!(
        observer.events(),
        vec![
            "1: invalid: Please select a file".to_string(),
            "2: upload scan.pdf 16".to_string(),
            "2: ok 4 /downloads/scan_converted.md".to_string(),
        ]
    );
}

#[tokio::test]
async fn catalog_is_cached() {
    let (c, _) = controller(FakeService::replying("ok"));
    assert!(c.catalog().is_none());

    let catalog = c.load_models().await.unwrap();
    assert_eq!(catalog.model_count(), 1);
    assert_eq!(catalog.find("gpt-4o").map(|m| m.name.as_str()), Some("GPT-4o"));
    assert_eq!(c.catalog(), Some(catalog));
}

// ── Export ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_after_success() {
    let (c, files) = controller(FakeService::replying("# Report\n\n| a | b |\n|---|---|\n| 1 | 2 |"));
    fill(&c, "");
    c.submit().await;
    let result = c.result().unwrap();

    let mut export = ExportCoordinator::new(GfmRenderer, c.files(), Duration::from_secs(2));

    let doc = export.download_document(&result).await.unwrap();
    assert_eq!(doc, Path::new("/downloads/scan_converted.doc"));
    let html = files.saved("scan_converted.doc").unwrap();
    assert!(html.contains("<title>scan</title>"), "got: {html}");
    assert!(html.contains("<h1>Report</h1>"), "got: {html}");
    assert!(html.contains("<table>"), "got: {html}");

    export.copy(&result).await.unwrap();
    assert_eq!(
        files.clipboard.lock().unwrap().as_deref(),
        Some(result.content.as_str())
    );
    assert!(export.just_copied());
    assert_eq!(c.status(), ConversionStatus::Succeeded);
}
