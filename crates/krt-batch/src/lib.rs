//! KRT Batch - Orchestration over many articles
//!
//! - `orchestrator`: bounded worker pool, per-article state machine,
//!   cancellation and deadline
//! - `retry`: explicit retry/backoff state machine with pattern fallback
//! - `limiter`: shared rate limiter in front of external extractors
//! - `sink` / `report`: where documents go and what the run reports

pub mod limiter;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod sink;

pub use limiter::CallRateLimiter;
pub use orchestrator::{ArticleInput, ArticleState, BatchOrchestrator};
pub use report::{ArticleOutcome, ArticleStatus, BatchReport, FailureReason};
pub use retry::{RetryMachine, RetryPolicy, RetryState};
pub use sink::{DirectorySink, MemorySink, OutputSink};

use thiserror::Error;

/// Batch preconditions. Per-article failures are outcomes, not errors.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Duplicate article id in batch: {0}")]
    DuplicateArticleId(String),

    #[error("Invalid batch configuration: {0}")]
    InvalidConfig(String),

    #[error("Batch setup failed: {0}")]
    Setup(#[source] krt_core::KrtError),
}
