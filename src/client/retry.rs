use crate::{
    client::GenerationBackend,
    error::{Result, RetryClass, GENERIC_FAILURE},
    models::{GenerationRequest, GenerationResult},
};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const MAX_RETRIES_MESSAGE: &str =
    "Model overloaded. Maximum retries reached. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Wait before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Result of a single backend attempt, as the controller sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(GenerationResult),
    RetryableFailure,
    FatalFailure(Option<String>),
    Cancelled,
}

impl From<Result<GenerationResult>> for GenerationOutcome {
    fn from(result: Result<GenerationResult>) -> Self {
        match result {
            Ok(generation) => GenerationOutcome::Success(generation),
            Err(err) => match err.retry_class() {
                RetryClass::Retryable => GenerationOutcome::RetryableFailure,
                RetryClass::Cancelled => GenerationOutcome::Cancelled,
                RetryClass::Fatal => GenerationOutcome::FatalFailure(err.user_message()),
            },
        }
    }
}

/// Observable controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSnapshot {
    pub loading: bool,
    pub error: Option<String>,
    pub result: Option<GenerationResult>,
    pub attempts: u32,
}

struct ActiveSession {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    view: ControllerSnapshot,
    session: Option<ActiveSession>,
    last_session_id: u64,
}

/// Drives generate calls against a backend with bounded exponential-backoff
/// retries on overload.
///
/// At most one session is active. Starting a new `generate` cancels the
/// previous one, and a session only writes state while it is still the
/// active one.
pub struct RetryController<B> {
    backend: B,
    policy: RetryPolicy,
    inner: Mutex<Inner>,
    updates: watch::Sender<ControllerSnapshot>,
}

impl<B: GenerationBackend> RetryController<B> {
    pub fn new(backend: B) -> Self {
        let (updates, _) = watch::channel(ControllerSnapshot::default());
        Self {
            backend,
            policy: RetryPolicy::default(),
            inner: Mutex::new(Inner {
                view: ControllerSnapshot::default(),
                session: None,
                last_session_id: 0,
            }),
            updates,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.lock().view.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.updates.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().view.loading
    }

    /// Runs one logical generation. Returns the result on success; every
    /// other ending (terminal failure, abort, supersession) returns `None`
    /// and leaves any message in the snapshot.
    pub async fn generate(&self, request: GenerationRequest) -> Option<GenerationResult> {
        let (session_id, token) = self.begin();
        let _guard = SessionGuard {
            controller: self,
            id: session_id,
            token: token.clone(),
        };
        let mut retries = 0u32;

        loop {
            if token.is_cancelled() {
                log::debug!("Session {} cancelled before attempt", session_id);
                return None;
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => GenerationOutcome::Cancelled,
                result = self.backend.submit(&request, &token) => GenerationOutcome::from(result),
            };

            match outcome {
                GenerationOutcome::Cancelled => {
                    log::debug!("Session {} cancelled during attempt", session_id);
                    self.apply(session_id, true, |_| {});
                    return None;
                }
                GenerationOutcome::Success(result) => {
                    let current = self.apply(session_id, true, |view| {
                        view.result = Some(result.clone());
                        view.error = None;
                        view.attempts = 0;
                    });
                    if !current {
                        log::debug!("Discarding result of superseded session {}", session_id);
                        return None;
                    }
                    return Some(result);
                }
                GenerationOutcome::RetryableFailure if retries < self.policy.max_retries => {
                    retries += 1;
                    let delay = self.policy.backoff(retries);
                    log::warn!(
                        "🔁 Model overloaded, retry {}/{} in {}ms",
                        retries,
                        self.policy.max_retries,
                        delay.as_millis()
                    );

                    let max = self.policy.max_retries;
                    let current = self.apply(session_id, false, |view| {
                        view.attempts = retries;
                        view.error = Some(format!(
                            "Model overloaded. Retrying... ({}/{})",
                            retries, max
                        ));
                    });
                    if !current {
                        return None;
                    }

                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            log::debug!("Session {} cancelled during backoff", session_id);
                            return None;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    self.apply(session_id, false, |view| view.error = None);
                }
                GenerationOutcome::RetryableFailure => {
                    log::error!(
                        "❌ Model still overloaded after {} retries",
                        self.policy.max_retries
                    );
                    self.apply(session_id, true, |view| {
                        view.error = Some(MAX_RETRIES_MESSAGE.to_string());
                        view.attempts = 0;
                    });
                    return None;
                }
                GenerationOutcome::FatalFailure(message) => {
                    let message = message.unwrap_or_else(|| GENERIC_FAILURE.to_string());
                    log::error!("❌ Generation failed: {}", message);
                    self.apply(session_id, true, |view| {
                        view.error = Some(message);
                        view.attempts = 0;
                    });
                    return None;
                }
            }
        }
    }

    /// Cancels the active session, if any, and clears the busy flag and message.
    pub fn abort(&self) {
        let mut inner = self.lock();
        if let Some(session) = inner.session.take() {
            log::debug!("Aborting session {}", session.id);
            session.token.cancel();
            inner.view.loading = false;
            inner.view.error = None;
            self.updates.send_replace(inner.view.clone());
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.view.attempts = 0;
        inner.view.error = None;
        inner.view.result = None;
        self.updates.send_replace(inner.view.clone());
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut inner = self.lock();
        inner.last_session_id += 1;
        let id = inner.last_session_id;

        if let Some(previous) = inner.session.replace(ActiveSession {
            id,
            token: token.clone(),
        }) {
            log::debug!("Session {} superseded by {}", previous.id, id);
            previous.token.cancel();
        }

        inner.view.loading = true;
        inner.view.error = None;
        inner.view.attempts = 0;
        self.updates.send_replace(inner.view.clone());
        (id, token)
    }
}

impl<B> RetryController<B> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `change` only while `session_id` is the active session.
    /// `finish` also ends the session and clears the busy flag.
    fn apply(
        &self,
        session_id: u64,
        finish: bool,
        change: impl FnOnce(&mut ControllerSnapshot),
    ) -> bool {
        let mut inner = self.lock();
        if inner.session.as_ref().map(|s| s.id) != Some(session_id) {
            return false;
        }

        change(&mut inner.view);
        if finish {
            inner.view.loading = false;
            inner.session = None;
        }
        self.updates.send_replace(inner.view.clone());
        true
    }
}

/// Ends a session when its `generate` future goes away, whether it returned
/// or was dropped mid-call.
struct SessionGuard<'a, B> {
    controller: &'a RetryController<B>,
    id: u64,
    token: CancellationToken,
}

impl<B> Drop for SessionGuard<'_, B> {
    fn drop(&mut self) {
        self.token.cancel();
        if self.controller.apply(self.id, true, |_| {}) {
            log::debug!("Session {} dropped before completion", self.id);
        }
    }
}

impl<B> Drop for RetryController<B> {
    fn drop(&mut self) {
        if let Some(session) = self.lock().session.take() {
            session.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StudioError;
    use crate::models::GenerationStatus;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Clone)]
    enum Scripted {
        Overload,
        Succeed,
        Fail(Option<String>),
    }

    #[derive(Clone)]
    struct Step {
        delay: Duration,
        outcome: Scripted,
    }

    fn step(outcome: Scripted) -> Step {
        Step {
            delay: Duration::ZERO,
            outcome,
        }
    }

    fn slow(delay: Duration, outcome: Scripted) -> Step {
        Step { delay, outcome }
    }

    struct ScriptedBackend {
        script: Mutex<VecDeque<Step>>,
        fallback: Step,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn always(outcome: Scripted) -> Self {
            Self::sequence(vec![], step(outcome))
        }

        fn sequence(steps: Vec<Step>, fallback: Step) -> Self {
            Self {
                script: Mutex::new(steps.into()),
                fallback,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn submit(
            &self,
            request: &GenerationRequest,
            cancel: &CancellationToken,
        ) -> Result<GenerationResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());

            tokio::select! {
                _ = cancel.cancelled() => return Err(StudioError::Cancelled),
                _ = tokio::time::sleep(step.delay) => {}
            }

            match step.outcome {
                Scripted::Overload => Err(StudioError::Overloaded),
                Scripted::Succeed => Ok(GenerationResult {
                    id: call as i64,
                    image_url: format!("https://picsum.photos/512/512?random={}", call),
                    prompt: request.prompt.clone(),
                    style: request.style.clone(),
                    status: GenerationStatus::Completed,
                    created_at: chrono::Utc::now(),
                    original_image_url: None,
                }),
                Scripted::Fail(Some(message)) => Err(StudioError::Validation(message)),
                Scripted::Fail(None) => Err(StudioError::Internal("boom".to_string())),
            }
        }
    }

    fn sunset() -> GenerationRequest {
        GenerationRequest::new("A beautiful sunset", "Realistic")
    }

    fn controller(backend: ScriptedBackend) -> Arc<RetryController<Arc<ScriptedBackend>>> {
        Arc::new(RetryController::new(Arc::new(backend)))
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(
            GenerationOutcome::from(Err(StudioError::Overloaded)),
            GenerationOutcome::RetryableFailure
        );
        assert_eq!(
            GenerationOutcome::from(Err(StudioError::Cancelled)),
            GenerationOutcome::Cancelled
        );
        assert_eq!(
            GenerationOutcome::from(Err(StudioError::Forbidden(
                "Invalid or expired token".to_string()
            ))),
            GenerationOutcome::FatalFailure(Some("Invalid or expired token".to_string()))
        );
        assert_eq!(
            GenerationOutcome::from(Err(StudioError::Internal("db".to_string()))),
            GenerationOutcome::FatalFailure(None)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_overload_exhausts_retries() {
        let controller = controller(ScriptedBackend::always(Scripted::Overload));
        let started = Instant::now();

        let result = controller.generate(sunset()).await;

        assert!(result.is_none());
        assert_eq!(controller.backend().calls(), 4);
        assert!(started.elapsed() >= Duration::from_secs(7));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some(MAX_RETRIES_MESSAGE));
        assert_eq!(snapshot.attempts, 0);
        assert!(!snapshot.loading);
        assert!(snapshot.result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overload_then_success() {
        let backend = ScriptedBackend::sequence(
            vec![step(Scripted::Overload)],
            step(Scripted::Succeed),
        );
        let controller = controller(backend);
        let updates = controller.subscribe();
        let started = Instant::now();

        let result = controller.generate(sunset()).await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
        assert_eq!(controller.backend().calls(), 2);
        assert_eq!(result.id, 2);
        assert_eq!(result.prompt, "A beautiful sunset");
        assert_eq!(result.style, "Realistic");

        let snapshot = updates.borrow().clone();
        assert_eq!(snapshot.result, Some(result));
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.attempts, 0);
        assert!(!snapshot.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_message_is_surfaced_while_waiting() {
        let controller = controller(ScriptedBackend::always(Scripted::Overload));
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.generate(sunset()).await }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = controller.snapshot();
        assert!(snapshot.loading);
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Model overloaded. Retrying... (1/3)")
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Model overloaded. Retrying... (2/3)")
        );

        controller.abort();
        assert!(task.await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_backoff() {
        let controller = controller(ScriptedBackend::always(Scripted::Overload));
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.generate(sunset()).await }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        controller.abort();

        let snapshot = controller.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error, None);

        assert!(task.await.unwrap().is_none());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(controller.backend().calls(), 2);
        assert_eq!(controller.snapshot().result, None);
        assert!(!controller.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_call() {
        let controller = controller(ScriptedBackend::sequence(
            vec![slow(Duration::from_secs(5), Scripted::Succeed)],
            step(Scripted::Succeed),
        ));
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.generate(sunset()).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(controller.is_loading());
        controller.abort();

        assert!(task.await.unwrap().is_none());
        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = controller.snapshot();
        assert_eq!(controller.backend().calls(), 1);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.result, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_generate_supersedes_older() {
        let backend = ScriptedBackend::sequence(
            vec![
                slow(Duration::from_secs(2), Scripted::Succeed),
                slow(Duration::from_millis(500), Scripted::Succeed),
            ],
            step(Scripted::Overload),
        );
        let controller = controller(backend);
        let first = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .generate(GenerationRequest::new("A", "Realistic"))
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = controller
            .generate(GenerationRequest::new("B", "Realistic"))
            .await
            .unwrap();
        assert_eq!(second.prompt, "B");

        assert!(first.await.unwrap().is_none());
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.result.map(|r| r.prompt), Some("B".to_string()));
        assert!(!snapshot.loading);
        assert_eq!(controller.backend().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_generate_during_backoff_supersedes_older() {
        let backend = ScriptedBackend::sequence(
            vec![
                step(Scripted::Overload),
                slow(Duration::from_millis(200), Scripted::Succeed),
            ],
            step(Scripted::Overload),
        );
        let controller = controller(backend);
        let first = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .generate(GenerationRequest::new("A", "Realistic"))
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(controller.snapshot().attempts, 1);

        let second = controller
            .generate(GenerationRequest::new("B", "Realistic"))
            .await
            .unwrap();
        assert_eq!(second.prompt, "B");
        assert!(first.await.unwrap().is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.result.map(|r| r.prompt), Some("B".to_string()));
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(controller.backend().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_generate_clears_busy_flag() {
        let controller = RetryController::new(Arc::new(ScriptedBackend::sequence(
            vec![slow(Duration::from_secs(1), Scripted::Succeed)],
            step(Scripted::Succeed),
        )));

        let timed_out =
            tokio::time::timeout(Duration::from_millis(300), controller.generate(sunset()))
                .await;
        assert!(timed_out.is_err());

        let snapshot = controller.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.result, None);

        // The dropped session no longer blocks later calls.
        let result = controller.generate(sunset()).await.unwrap();
        assert_eq!(result.prompt, "A beautiful sunset");
        assert!(!controller.is_loading());
        assert_eq!(controller.backend().calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_session_cannot_write() {
        let controller = controller(ScriptedBackend::always(Scripted::Succeed));
        let (old_id, old_token) = controller.begin();
        let (new_id, _) = controller.begin();
        assert!(old_token.is_cancelled());

        assert!(!controller.apply(old_id, true, |view| {
            view.error = Some("stale".to_string())
        }));
        let snapshot = controller.snapshot();
        assert!(snapshot.loading);
        assert_eq!(snapshot.error, None);

        assert!(controller.apply(new_id, true, |_| {}));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_fatal_failure_surfaces_message() {
        let controller = controller(ScriptedBackend::always(Scripted::Fail(Some(
            "Prompt is required".to_string(),
        ))));
        assert!(controller.generate(sunset()).await.is_none());
        assert_eq!(controller.backend().calls(), 1);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("Prompt is required"));
        assert!(!snapshot.loading);
        assert_eq!(snapshot.attempts, 0);
    }

    #[tokio::test]
    async fn test_fatal_failure_without_message_uses_fallback() {
        let controller = controller(ScriptedBackend::always(Scripted::Fail(None)));
        assert!(controller.generate(sunset()).await.is_none());
        assert_eq!(
            controller.snapshot().error.as_deref(),
            Some("Generation failed")
        );
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let controller = controller(ScriptedBackend::always(Scripted::Succeed));
        controller.generate(sunset()).await.unwrap();
        assert!(controller.snapshot().result.is_some());

        controller.reset();
        let once = controller.snapshot();
        controller.reset();
        let twice = controller.snapshot();

        assert_eq!(once, twice);
        assert_eq!(twice, ControllerSnapshot::default());
    }

    #[tokio::test]
    async fn test_new_session_keeps_previous_result_visible() {
        let backend = ScriptedBackend::sequence(
            vec![step(Scripted::Succeed)],
            step(Scripted::Fail(Some("Style is required".to_string()))),
        );
        let controller = controller(backend);
        let first = controller.generate(sunset()).await.unwrap();

        assert!(controller.generate(sunset()).await.is_none());
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.result, Some(first));
        assert_eq!(snapshot.error.as_deref(), Some("Style is required"));
    }
}
