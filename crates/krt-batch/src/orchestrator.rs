//! Batch orchestrator
//!
//! Runs the extraction pipeline over many articles on a bounded worker
//! pool. Every submitted article ends with exactly one outcome; a failure
//! in one article never aborts the others.
//!
//! Per article:
//!
//! ```text
//! Pending -> Extracting -> Normalizing -> Done
//!               |              |
//!               +--------------+--------> Failed
//! ```
//!
//! External extractor calls go through the shared rate limiter, a per-call
//! timeout and the retry state machine. Cancellation (explicit or by the
//! batch deadline) leaves finished articles intact and fails the rest with
//! a cancellation reason.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use krt_core::{
    BatchConfig, CandidateExtractor, ExtractionError, ExtractionMode, RawCandidate, Sections,
};
use krt_extractor::{assemble_document, ArticleMeta, PatternExtractor, RuleRegistry};
use krt_parser::{article_id, parse_article, ParsedArticle};

use crate::limiter::CallRateLimiter;
use crate::report::{ArticleOutcome, ArticleStatus, BatchReport, FailureReason};
use crate::retry::{RetryMachine, RetryPolicy, RetryState};
use crate::sink::OutputSink;
use crate::BatchError;

// ============================================================================
// Inputs
// ============================================================================

/// One article submitted to a batch
#[derive(Debug, Clone)]
pub enum ArticleInput {
    /// A JATS file, parsed by the worker that picks it up
    File(PathBuf),
    /// An article already split into sections
    Parsed(ParsedArticle),
}

impl ArticleInput {
    pub fn id(&self) -> String {
        match self {
            Self::File(path) => article_id(path),
            Self::Parsed(article) => article.id.clone(),
        }
    }

    pub fn source(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Parsed(article) => article.source.clone(),
        }
    }

    fn load(self) -> Result<ParsedArticle, FailureReason> {
        match self {
            Self::File(path) => parse_article(&path).map_err(|e| FailureReason::Input {
                message: e.to_string(),
            }),
            Self::Parsed(article) => Ok(article),
        }
    }
}

impl From<PathBuf> for ArticleInput {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<ParsedArticle> for ArticleInput {
    fn from(article: ParsedArticle) -> Self {
        Self::Parsed(article)
    }
}

// ============================================================================
// Article state machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleState {
    Pending,
    Extracting,
    Normalizing,
    Done,
    Failed,
}

impl ArticleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Normalizing => "normalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Legal transitions. Pending may fail directly (unreadable input or
    /// cancellation before start); normalizing may fail on output.
    pub fn can_transition_to(&self, next: ArticleState) -> bool {
        use ArticleState::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Pending, Failed)
                | (Extracting, Normalizing)
                | (Extracting, Failed)
                | (Normalizing, Done)
                | (Normalizing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for ArticleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one article through its states
#[derive(Debug)]
struct ArticleRun {
    id: String,
    source: String,
    state: ArticleState,
}

impl ArticleRun {
    fn new(id: String, source: String) -> Self {
        Self {
            id,
            source,
            state: ArticleState::Pending,
        }
    }

    fn advance(&mut self, next: ArticleState) {
        if self.state.can_transition_to(next) {
            debug!(article = %self.id, from = %self.state, to = %next, "Article state");
            self.state = next;
        } else {
            warn!(article = %self.id, from = %self.state, to = %next, "Ignored illegal article transition");
        }
    }

    fn done(mut self, row_count: usize, output: String, fell_back: bool) -> ArticleOutcome {
        self.advance(ArticleState::Done);
        ArticleOutcome {
            id: self.id,
            source: self.source,
            status: ArticleStatus::Done {
                row_count,
                output,
                fell_back,
            },
        }
    }

    fn fail(mut self, reason: FailureReason) -> ArticleOutcome {
        self.advance(ArticleState::Failed);
        warn!(article = %self.id, reason = %reason, "Article failed");
        ArticleOutcome::failed(self.id, self.source, reason)
    }
}

fn cancelled() -> FailureReason {
    FailureReason::Cancelled {
        message: "batch cancelled or deadline reached before the article finished".to_string(),
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Settings and collaborators shared by all workers of one batch
struct Shared {
    extractor: Arc<dyn CandidateExtractor>,
    fallback: Option<Arc<dyn CandidateExtractor>>,
    limiter: Option<Arc<CallRateLimiter>>,
    policy: RetryPolicy,
    call_timeout: Duration,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
}

/// Outcome of the extraction stage
struct Extracted {
    candidates: Vec<RawCandidate>,
    mode: ExtractionMode,
    fell_back: bool,
}

pub struct BatchOrchestrator {
    extractor: Arc<dyn CandidateExtractor>,
    fallback: Option<Arc<dyn CandidateExtractor>>,
    limiter: Option<Arc<CallRateLimiter>>,
    policy: RetryPolicy,
    max_workers: usize,
    call_timeout: Duration,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    /// Build an orchestrator around `extractor`.
    ///
    /// External extractors get a rate limiter. With `fallback_to_patterns`
    /// set, an exhausted external extractor falls back to the built-in
    /// pattern engine unless `with_fallback` supplies another one.
    pub fn new(
        extractor: Arc<dyn CandidateExtractor>,
        config: &BatchConfig,
    ) -> Result<Self, BatchError> {
        if config.max_workers == 0 {
            return Err(BatchError::InvalidConfig(
                "max_workers must be > 0".to_string(),
            ));
        }

        let limiter = if extractor.is_external() {
            Some(Arc::new(CallRateLimiter::per_minute(
                config.requests_per_minute,
            )?))
        } else {
            None
        };

        let fallback: Option<Arc<dyn CandidateExtractor>> = if config.fallback_to_patterns {
            let registry = RuleRegistry::shared().map_err(BatchError::Setup)?;
            Some(Arc::new(PatternExtractor::new(registry)))
        } else {
            None
        };

        Ok(Self {
            extractor,
            fallback,
            limiter,
            policy: RetryPolicy::from_config(config),
            max_workers: config.max_workers,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            deadline: config.deadline_secs.map(Duration::from_secs),
            cancel: CancellationToken::new(),
        })
    }

    /// Fall back to this extractor when the primary one is exhausted
    pub fn with_fallback(mut self, fallback: Arc<dyn CandidateExtractor>) -> Self {
        self.fallback = Some(fallback);
        self.policy.fallback = true;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<CallRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Use an externally owned token, e.g. one tied to Ctrl-C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels the running batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every article and write each finished document to `sink`.
    ///
    /// Fails only on batch preconditions (duplicate article ids); per-article
    /// problems are reported in the returned outcomes.
    pub async fn run(
        &self,
        articles: Vec<ArticleInput>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<BatchReport, BatchError> {
        let mut seen = HashSet::new();
        for article in &articles {
            let id = article.id();
            if !seen.insert(id.clone()) {
                return Err(BatchError::DuplicateArticleId(id));
            }
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = articles.len();

        info!(
            run_id = %run_id,
            articles = total,
            workers = self.max_workers,
            mode = %self.extractor.mode(),
            fallback = self.fallback.is_some() && self.policy.fallback,
            "Starting batch"
        );

        let cancel = self.cancel.child_token();
        let deadline_task = self.deadline.map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        warn!(deadline_secs = deadline.as_secs_f64(), "Batch deadline reached, cancelling");
                        cancel.cancel();
                    }
                }
            })
        });

        let shared = Arc::new(Shared {
            extractor: self.extractor.clone(),
            fallback: self.fallback.clone().filter(|_| self.policy.fallback),
            limiter: self.limiter.clone(),
            policy: self.policy.clone(),
            call_timeout: self.call_timeout,
            sink,
            cancel: cancel.clone(),
        });

        let identities: Vec<(String, String)> =
            articles.iter().map(|a| (a.id(), a.source())).collect();
        let mut outcomes: Vec<Option<ArticleOutcome>> = vec![None; total];

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut workers = JoinSet::new();

        for (index, article) in articles.into_iter().enumerate() {
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let (id, source) = &identities[index];
                outcomes[index] = Some(ArticleOutcome::failed(id, source, cancelled()));
                continue;
            };

            let shared = shared.clone();
            workers.spawn(async move {
                let outcome = process_article(&shared, article).await;
                drop(permit);
                (index, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!(error = %e, "Worker task ended abnormally"),
            }
        }

        if let Some(task) = deadline_task {
            task.abort();
        }

        let outcomes: Vec<ArticleOutcome> = outcomes
            .into_iter()
            .zip(identities)
            .map(|(outcome, (id, source))| {
                outcome.unwrap_or_else(|| {
                    ArticleOutcome::failed(
                        id,
                        source,
                        FailureReason::Internal {
                            message: "worker task aborted".to_string(),
                        },
                    )
                })
            })
            .collect();

        let report = BatchReport {
            run_id,
            mode: self.extractor.mode(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        info!(
            run_id = %run_id,
            done = report.done_count(),
            failed = report.failed_count(),
            "Batch finished"
        );
        Ok(report)
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn process_article(shared: &Shared, input: ArticleInput) -> ArticleOutcome {
    let mut run = ArticleRun::new(input.id(), input.source());

    if shared.cancel.is_cancelled() {
        return run.fail(cancelled());
    }

    let article = match input.load() {
        Ok(article) => article,
        Err(reason) => return run.fail(reason),
    };

    run.advance(ArticleState::Extracting);
    let extracted = match extract_with_retry(shared, &run.id, &article.sections).await {
        Ok(extracted) => extracted,
        Err(reason) => return run.fail(reason),
    };

    run.advance(ArticleState::Normalizing);
    let meta = ArticleMeta::new(article.title(), article.abstract_text(), article.source.as_str());
    let document = assemble_document(meta, extracted.mode, extracted.candidates);
    let row_count = document.rows.len();

    match shared.sink.write(&run.id, &document).await {
        Ok(output) => {
            info!(article = %run.id, rows = row_count, fell_back = extracted.fell_back, "Article done");
            run.done(row_count, output, extracted.fell_back)
        }
        Err(e) => run.fail(FailureReason::Output {
            message: e.to_string(),
        }),
    }
}

/// Drive the retry machine until it reaches a terminal state
async fn extract_with_retry(
    shared: &Shared,
    article: &str,
    sections: &Sections,
) -> Result<Extracted, FailureReason> {
    let mut machine = RetryMachine::new(shared.policy.clone());

    loop {
        match machine.state().clone() {
            RetryState::Attempting { attempt } => {
                let result = tokio::select! {
                    _ = shared.cancel.cancelled() => return Err(cancelled()),
                    result = attempt_once(shared, sections) => result,
                };
                match result {
                    Ok(candidates) => {
                        machine.record_success();
                        debug!(article, attempt, candidates = candidates.len(), "Extraction succeeded");
                        return Ok(Extracted {
                            candidates,
                            mode: shared.extractor.mode(),
                            fell_back: false,
                        });
                    }
                    Err(error) => {
                        warn!(article, attempt, error = %error, "Extraction attempt failed");
                        machine.record_failure(error);
                    }
                }
            }
            RetryState::BackingOff { attempt, delay, .. } => {
                debug!(article, attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::select! {
                    _ = shared.cancel.cancelled() => return Err(cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
                machine.backoff_elapsed();
            }
            RetryState::FallingBack {
                attempts,
                last_error,
            } => {
                let Some(fallback) = &shared.fallback else {
                    return Err(exhausted(attempts, last_error));
                };
                warn!(article, attempts, error = %last_error, "External extractor exhausted, using pattern fallback");
                let candidates = fallback
                    .extract(sections)
                    .await
                    .map_err(|e| exhausted(attempts, e))?;
                return Ok(Extracted {
                    candidates,
                    mode: fallback.mode(),
                    fell_back: true,
                });
            }
            RetryState::Failed {
                attempts,
                last_error,
            } => return Err(exhausted(attempts, last_error)),
            RetryState::Succeeded { .. } => {
                // Success returns from the Attempting arm
                return Err(FailureReason::Internal {
                    message: "retry machine finished without candidates".to_string(),
                });
            }
        }
    }
}

/// One call: rate limit permit, then the extractor under the per-call timeout
async fn attempt_once(
    shared: &Shared,
    sections: &Sections,
) -> Result<Vec<RawCandidate>, ExtractionError> {
    if !shared.extractor.is_external() {
        return shared.extractor.extract(sections).await;
    }

    if let Some(limiter) = &shared.limiter {
        limiter.acquire().await;
    }

    match tokio::time::timeout(shared.call_timeout, shared.extractor.extract(sections)).await {
        Ok(result) => result,
        Err(_) => Err(ExtractionError::timeout(format!(
            "no response within {:.1}s",
            shared.call_timeout.as_secs_f64()
        ))),
    }
}

fn exhausted(attempts: u32, error: ExtractionError) -> FailureReason {
    FailureReason::Extraction {
        error: error.kind,
        message: error.message,
        attempts,
    }
}
