//! Per-article outcomes and the batch summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use krt_core::{ExtractionErrorKind, ExtractionMode};

/// Why an article produced no document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailureReason {
    /// External extractor exhausted its retry budget
    Extraction {
        error: ExtractionErrorKind,
        message: String,
        attempts: u32,
    },
    /// Batch cancelled or its deadline passed before the article finished
    Cancelled { message: String },
    /// The article could not be read
    Input { message: String },
    /// The document could not be written
    Output { message: String },
    /// The worker task died
    Internal { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extraction {
                error,
                message,
                attempts,
            } => write!(f, "{error} after {attempts} attempt(s): {message}"),
            Self::Cancelled { message } => write!(f, "cancelled: {message}"),
            Self::Input { message } => write!(f, "input error: {message}"),
            Self::Output { message } => write!(f, "output error: {message}"),
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ArticleStatus {
    #[serde(rename_all = "camelCase")]
    Done {
        row_count: usize,
        /// Where the document was written
        output: String,
        /// Produced by the pattern engine after the external extractor gave up
        fell_back: bool,
    },
    Failed { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleOutcome {
    pub id: String,
    pub source: String,
    #[serde(flatten)]
    pub status: ArticleStatus,
}

impl ArticleOutcome {
    pub fn failed(id: impl Into<String>, source: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            status: ArticleStatus::Failed { reason },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, ArticleStatus::Done { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub run_id: Uuid,
    pub mode: ExtractionMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per submitted article, in submission order
    pub outcomes: Vec<ArticleOutcome>,
}

impl BatchReport {
    pub fn done_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.done_count()
    }

    pub fn get(&self, id: &str) -> Option<&ArticleOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary, one line per article
    pub fn summary(&self) -> String {
        let elapsed = self.finished_at - self.started_at;
        let mut out = format!(
            "Batch {} ({} mode): {} done, {} failed in {:.1}s\n",
            self.run_id,
            self.mode,
            self.done_count(),
            self.failed_count(),
            elapsed.num_milliseconds() as f64 / 1000.0,
        );
        for outcome in &self.outcomes {
            match &outcome.status {
                ArticleStatus::Done {
                    row_count,
                    output,
                    fell_back,
                } => {
                    let note = if *fell_back { " (pattern fallback)" } else { "" };
                    out.push_str(&format!(
                        "  [done]   {}: {} rows -> {}{}\n",
                        outcome.id, row_count, output, note
                    ));
                }
                ArticleStatus::Failed { reason } => {
                    out.push_str(&format!("  [failed] {}: {}\n", outcome.id, reason));
                }
            }
        }
        out
    }
}
