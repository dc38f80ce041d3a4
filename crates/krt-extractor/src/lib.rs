//! KRT Extractor - Pattern extraction and row assembly
//!
//! - `rules`: the declarative rule table and its compiled registry
//! - `pattern`: the deterministic extraction engine
//! - `normalize` / `merge`: raw candidates to compliant, deduplicated rows
//! - `pipeline`: the path shared by the pattern and AI extractors
//! - `quality` / `evaluation`: guideline checks and corpus metrics

pub mod evaluation;
pub mod merge;
pub mod normalize;
pub mod pattern;
pub mod pipeline;
pub mod quality;
pub mod rules;

pub use evaluation::{evaluate, EvaluationReport, MatchCounts};
pub use merge::merge_rows;
pub use normalize::{normalize, normalize_all};
pub use pattern::PatternExtractor;
pub use pipeline::{assemble_document, build_document, ArticleMeta};
pub use quality::{assess, QualityReport};
pub use rules::{FieldMapping, PatternRule, RuleRegistry, RuleSpec};
