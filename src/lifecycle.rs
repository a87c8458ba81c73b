//! Conversion request lifecycle: the state machine behind one submission.
//!
//! ```text
//!            submit                 upload issued
//!   Idle ──────────────▶ Validating ─────────────▶ InFlight
//!    ▲                      │                     │   │   │
//!    │                      │ invalid input       │   │   │ cancel()
//!    │                      ▼                     │   │   ▼
//!    │                    Failed ◀────────────────┘   │ Cancelled
//!    │                      ▲     transport error     │
//!    │                      │                         ▼
//!    └── (any terminal state re-enters Validating) Succeeded
//! ```
//!
//! [`RequestLifecycle`] is synchronous and owns exactly one
//! [`ConversionRequest`] at a time. It enforces the two invariants the async
//! controller relies on:
//!
//! * at most one request is `InFlight`; [`RequestLifecycle::begin`] refuses
//!   to start another until the current one is terminal;
//! * a terminal state is final. Outcomes for an attempt that is no longer
//!   the live one (superseded or already cancelled) are discarded.
//!
//! Every exit from `InFlight` releases the cancellation token.

use crate::error::{RequestError, ValidationError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Monotonic attempt number, unique per lifecycle.
pub type AttemptId = u64;

// ── Cancellation token ───────────────────────────────────────────────────

/// Cooperative cancellation flag shared between the controller and the
/// in-flight upload.
///
/// Clones share state. Once cancelled a token stays cancelled.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every task waiting in [`Self::cancelled`].
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`Self::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel()
            // cannot slip between the check and the wait.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ── Request ──────────────────────────────────────────────────────────────

/// Status of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionStatus {
    #[default]
    Idle,
    Validating,
    InFlight,
    Succeeded,
    Failed,
    Cancelled,
}

impl ConversionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConversionStatus::Succeeded | ConversionStatus::Failed | ConversionStatus::Cancelled
        )
    }
}

/// The outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    /// Name of the document that was converted.
    pub source_name: String,
    /// The Markdown returned by the service.
    pub content: String,
    /// Where the downloadable artifact was saved, if saving succeeded.
    pub artifact: Option<PathBuf>,
}

/// One conversion attempt.
///
/// `result` is present only when `Succeeded`; `error` only when `Failed` or
/// `Cancelled`; `token` only while `InFlight`.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    attempt: AttemptId,
    status: ConversionStatus,
    token: Option<CancellationToken>,
    result: Option<ConversionResult>,
    error: Option<RequestError>,
}

impl ConversionRequest {
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn status(&self) -> ConversionStatus {
        self.status
    }

    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }
}

// ── State machine ────────────────────────────────────────────────────────

/// Owner of the single current [`ConversionRequest`].
#[derive(Debug, Default)]
pub struct RequestLifecycle {
    current: ConversionRequest,
    last_attempt: AttemptId,
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &ConversionRequest {
        &self.current
    }

    pub fn status(&self) -> ConversionStatus {
        self.current.status
    }

    pub fn is_in_flight(&self) -> bool {
        self.current.status == ConversionStatus::InFlight
    }

    /// Whether `attempt` is the current request and still in flight.
    pub fn is_live(&self, attempt: AttemptId) -> bool {
        self.current.attempt == attempt && self.is_in_flight()
    }

    /// Start a new attempt in `Validating`, discarding the previous request.
    ///
    /// Returns `None` while a request is in flight.
    pub fn begin(&mut self) -> Option<AttemptId> {
        if matches!(
            self.current.status,
            ConversionStatus::InFlight | ConversionStatus::Validating
        ) {
            return None;
        }
        self.last_attempt += 1;
        self.current = ConversionRequest {
            attempt: self.last_attempt,
            status: ConversionStatus::Validating,
            ..ConversionRequest::default()
        };
        debug!("Attempt {}: validating", self.last_attempt);
        Some(self.last_attempt)
    }

    /// `Validating → Failed` on invalid input.
    pub fn reject(&mut self, attempt: AttemptId, error: ValidationError) -> bool {
        if !self.is_validating(attempt) {
            return false;
        }
        debug!("Attempt {}: rejected ({})", attempt, error);
        self.current.status = ConversionStatus::Failed;
        self.current.error = Some(error.into());
        true
    }

    /// `Validating → InFlight` with a fresh cancellation token.
    pub fn launch(&mut self, attempt: AttemptId) -> Option<CancellationToken> {
        if !self.is_validating(attempt) {
            return None;
        }
        let token = CancellationToken::new();
        self.current.status = ConversionStatus::InFlight;
        self.current.token = Some(token.clone());
        debug!("Attempt {}: in flight", attempt);
        Some(token)
    }

    /// `InFlight → Cancelled`. Signals the token so the upload aborts.
    ///
    /// Returns the cancelled attempt, or `None` if nothing was in flight.
    pub fn cancel(&mut self) -> Option<AttemptId> {
        if !self.is_in_flight() {
            return None;
        }
        if let Some(token) = &self.current.token {
            token.cancel();
        }
        let attempt = self.current.attempt;
        self.finish(ConversionStatus::Cancelled);
        self.current.error = Some(RequestError::UserCancelled);
        Some(attempt)
    }

    /// `InFlight → Succeeded`. Ignored unless `attempt` is live.
    pub fn succeed(&mut self, attempt: AttemptId, result: ConversionResult) -> bool {
        if !self.is_live(attempt) {
            debug!("Attempt {}: discarding late success", attempt);
            return false;
        }
        self.finish(ConversionStatus::Succeeded);
        self.current.result = Some(result);
        true
    }

    /// `InFlight → Failed`, or `Cancelled` for [`RequestError::UserCancelled`].
    /// Ignored unless `attempt` is live.
    pub fn fail(&mut self, attempt: AttemptId, error: RequestError) -> bool {
        if !self.is_live(attempt) {
            debug!("Attempt {}: discarding late failure ({})", attempt, error);
            return false;
        }
        let status = match error {
            RequestError::UserCancelled => ConversionStatus::Cancelled,
            _ => ConversionStatus::Failed,
        };
        self.finish(status);
        self.current.error = Some(error);
        true
    }

    /// Record the artifact location on the current successful result.
    pub(crate) fn set_artifact(&mut self, attempt: AttemptId, artifact: PathBuf) {
        if self.current.attempt != attempt {
            return;
        }
        if let Some(result) = self.current.result.as_mut() {
            result.artifact = Some(artifact);
        }
    }

    fn is_validating(&self, attempt: AttemptId) -> bool {
        self.current.attempt == attempt && self.current.status == ConversionStatus::Validating
    }

    /// Exit side effects shared by every terminal transition.
    fn finish(&mut self, status: ConversionStatus) {
        debug!("Attempt {}: {:?}", self.current.attempt, status);
        self.current.status = status;
        self.current.token = None;
    }
}
