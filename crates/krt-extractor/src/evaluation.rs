//! Labeled-corpus evaluation
//!
//! Compares predicted rows with gold rows to calibrate the rules table.
//! Rows match on `(resource type, identifier)` when the gold row has an
//! identifier, otherwise on `(resource type, lowercase name)`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use krt_core::{ResourceRow, ResourceType};

// ============================================================================
// Metrics
// ============================================================================

/// Match counts for one slice of the evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl MatchCounts {
    /// TP / (TP + FP)
    pub fn precision(&self) -> f32 {
        if self.true_positives + self.false_positives == 0 {
            0.0
        } else {
            self.true_positives as f32 / (self.true_positives + self.false_positives) as f32
        }
    }

    /// TP / (TP + FN)
    pub fn recall(&self) -> f32 {
        if self.true_positives + self.false_negatives == 0 {
            0.0
        } else {
            self.true_positives as f32 / (self.true_positives + self.false_negatives) as f32
        }
    }

    pub fn f1_score(&self) -> f32 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn add(&mut self, other: &MatchCounts) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
    }
}

/// Overall and per-type results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub overall: MatchCounts,
    pub per_type: BTreeMap<ResourceType, MatchCounts>,
    pub documents: usize,
}

impl EvaluationReport {
    /// Fold another document's results into this report
    pub fn merge(&mut self, other: &EvaluationReport) {
        self.overall.add(&other.overall);
        for (resource_type, counts) in &other.per_type {
            self.per_type.entry(*resource_type).or_default().add(counts);
        }
        self.documents += other.documents;
    }

    pub fn report(&self) -> String {
        let mut out = format!(
            "=== KRT Evaluation Report ===\n\n\
             Documents evaluated: {}\n\n\
             Overall:\n\
               Precision: {:.1}%\n\
               Recall:    {:.1}%\n\
               F1 Score:  {:.1}%\n\
               TP: {} | FP: {} | FN: {}\n\n\
             Per type:\n",
            self.documents,
            self.overall.precision() * 100.0,
            self.overall.recall() * 100.0,
            self.overall.f1_score() * 100.0,
            self.overall.true_positives,
            self.overall.false_positives,
            self.overall.false_negatives,
        );
        for (resource_type, counts) in &self.per_type {
            out.push_str(&format!(
                "  {:<45} P {:>5.1}%  R {:>5.1}%  F1 {:>5.1}%\n",
                resource_type.as_str(),
                counts.precision() * 100.0,
                counts.recall() * 100.0,
                counts.f1_score() * 100.0,
            ));
        }
        out
    }
}

// ============================================================================
// Evaluator
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MatchKey {
    Identifier(ResourceType, String),
    Name(ResourceType, String),
}

fn identifier_key(row: &ResourceRow) -> Option<MatchKey> {
    row.has_identifier().then(|| {
        MatchKey::Identifier(row.resource_type, row.identifier.trim().to_lowercase())
    })
}

fn name_key(row: &ResourceRow) -> MatchKey {
    MatchKey::Name(row.resource_type, row.resource_name.trim().to_lowercase())
}

/// Evaluate one document's predicted rows against its gold rows
pub fn evaluate(gold: &[ResourceRow], predicted: &[ResourceRow]) -> EvaluationReport {
    let mut remaining: HashMap<MatchKey, usize> = HashMap::new();
    for row in gold {
        let key = identifier_key(row).unwrap_or_else(|| name_key(row));
        *remaining.entry(key).or_default() += 1;
    }

    let mut report = EvaluationReport {
        documents: 1,
        ..Default::default()
    };

    for row in predicted {
        let counts = report.per_type.entry(row.resource_type).or_default();
        let matched = [identifier_key(row), Some(name_key(row))]
            .into_iter()
            .flatten()
            .find(|key| remaining.get(key).is_some_and(|n| *n > 0));

        match matched {
            Some(key) => {
                if let Some(n) = remaining.get_mut(&key) {
                    *n -= 1;
                }
                counts.true_positives += 1;
                report.overall.true_positives += 1;
            }
            None => {
                counts.false_positives += 1;
                report.overall.false_positives += 1;
            }
        }
    }

    for row in gold {
        let key = identifier_key(row).unwrap_or_else(|| name_key(row));
        if let Some(n) = remaining.get_mut(&key) {
            if *n > 0 {
                *n -= 1;
                report.per_type.entry(row.resource_type).or_default().false_negatives += 1;
                report.overall.false_negatives += 1;
            }
        }
    }

    report
}
