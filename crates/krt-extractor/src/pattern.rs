//! Pattern Extraction Engine
//!
//! Runs every rule over every section and resolves overlapping matches
//! between rules. Within one rule, matches are leftmost-first and
//! non-overlapping (the regex crate's `captures_iter` semantics). Across
//! rules, overlapping matches are settled greedily by:
//!
//! 1. higher effective priority
//! 2. longer match
//! 3. earlier start
//! 4. earlier rule in the table
//!
//! Effective priority is the rule priority minus `SUMMARY_SECTION_PENALTY`
//! for reagent-like types found in the title or abstract, where such
//! mentions are usually background rather than materials used.
//!
//! The output is a pure function of the registry and the input text.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;

use krt_core::{
    CandidateExtractor, ExtractionError, ExtractionMode, RawCandidate, Result, SectionName,
    Sections,
};

use crate::rules::{PatternRule, RuleRegistry};

/// Priority deducted from reagent-like rules in title/abstract text
pub const SUMMARY_SECTION_PENALTY: i32 = 50;

/// A candidate match before overlap resolution
#[derive(Debug)]
struct RuleMatch {
    span: Range<usize>,
    priority: i32,
    rule_index: usize,
    candidate: RawCandidate,
}

impl RuleMatch {
    fn len(&self) -> usize {
        self.span.end - self.span.start
    }

    fn overlaps(&self, other: &RuleMatch) -> bool {
        self.span.start < other.span.end && other.span.start < self.span.end
    }
}

/// Deterministic rule-driven candidate extractor
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    registry: Arc<RuleRegistry>,
}

impl PatternExtractor {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    /// Extractor over the built-in rule table
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(RuleRegistry::shared()?))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Candidates for every section, in document order
    pub fn extract_sections(&self, sections: &Sections) -> Vec<RawCandidate> {
        sections
            .iter()
            .flat_map(|(name, text)| self.extract_section(name, text))
            .collect()
    }

    /// Candidates for one section, ordered by match start
    pub fn extract_section(&self, section: SectionName, text: &str) -> Vec<RawCandidate> {
        let matches: Vec<RuleMatch> = self
            .registry
            .rules()
            .iter()
            .flat_map(|rule| collect_matches(rule, section, text))
            .collect();
        let total = matches.len();

        let winners = select_non_overlapping(matches);
        tracing::debug!(
            section = %section,
            matches = total,
            candidates = winners.len(),
            "Pattern extraction"
        );

        winners.into_iter().map(|m| m.candidate).collect()
    }
}

#[async_trait]
impl CandidateExtractor for PatternExtractor {
    async fn extract(
        &self,
        sections: &Sections,
    ) -> std::result::Result<Vec<RawCandidate>, ExtractionError> {
        Ok(self.extract_sections(sections))
    }

    fn mode(&self) -> ExtractionMode {
        ExtractionMode::Regex
    }
}

fn effective_priority(rule: &PatternRule, section: SectionName) -> i32 {
    if section.is_summary() && rule.resource_type.is_reagent_like() {
        rule.priority - SUMMARY_SECTION_PENALTY
    } else {
        rule.priority
    }
}

fn collect_matches(rule: &PatternRule, section: SectionName, text: &str) -> Vec<RuleMatch> {
    let priority = effective_priority(rule, section);

    rule.regex
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            if whole.as_str().is_empty() {
                return None;
            }
            let mut candidate = rule
                .candidate(&captures)
                .with_span(section, whole.range());
            candidate.priority = priority;
            Some(RuleMatch {
                span: whole.range(),
                priority,
                rule_index: rule.index,
                candidate,
            })
        })
        .collect()
}

/// Greedy selection: best match first, then every match that does not
/// overlap one already kept. Returned in start order.
fn select_non_overlapping(mut matches: Vec<RuleMatch>) -> Vec<RuleMatch> {
    matches.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.len().cmp(&a.len()))
            .then(a.span.start.cmp(&b.span.start))
            .then(a.rule_index.cmp(&b.rule_index))
    });

    let mut kept: Vec<RuleMatch> = Vec::new();
    for candidate in matches {
        if !kept.iter().any(|k| k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }

    kept.sort_by_key(|m| (m.span.start, m.rule_index));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleFields, RuleSpec};
    use proptest::prelude::*;

    fn rule(name: &str, resource_type: &str, pattern: &str, priority: i32) -> RuleSpec {
        RuleSpec {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            pattern: pattern.to_string(),
            priority,
            fields: RuleFields {
                name: Some(crate::rules::FieldMapping::Group(0)),
                ..Default::default()
            },
        }
    }

    fn extractor(rules: Vec<RuleSpec>) -> PatternExtractor {
        PatternExtractor::new(Arc::new(RuleRegistry::from_specs(rules).unwrap()))
    }

    fn names(candidates: &[RawCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.raw_name.as_str()).collect()
    }

    #[test]
    fn test_longer_match_wins_on_equal_priority() {
        let ex = extractor(vec![
            rule("short", "Other", "ABC", 10),
            rule("long", "Other", r"ABC-\d+", 10),
        ]);
        let found = ex.extract_section(SectionName::Methods, "see ABC-123 here");
        assert_eq!(names(&found), vec!["ABC-123"]);
    }

    #[test]
    fn test_higher_priority_beats_length() {
        let ex = extractor(vec![
            rule("short", "Other", "ABC", 10),
            rule("long", "Other", r"ABC-\d+", 10),
            rule("digits", "Dataset", r"\d+", 50),
        ]);
        let found = ex.extract_section(SectionName::Methods, "ABC-123");
        // "digits" wins, which knocks out "long"; "short" no longer overlaps
        assert_eq!(names(&found), vec!["ABC", "123"]);
    }

    #[test]
    fn test_earlier_start_wins_on_full_tie() {
        let ex = extractor(vec![
            rule("later", "Other", "BC", 10),
            rule("earlier", "Other", "AB", 10),
        ]);
        let found = ex.extract_section(SectionName::Methods, "ABC");
        assert_eq!(names(&found), vec!["AB"]);
    }

    #[test]
    fn test_summary_sections_demote_reagents() {
        let ex = extractor(vec![
            rule("reagent", "Antibody", "GFP", 60),
            rule("dataset", "Dataset", r"GFP-\d", 40),
        ]);

        let methods = ex.extract_section(SectionName::Methods, "GFP-1");
        assert_eq!(methods[0].resource_type, "Antibody");

        let abstract_text = ex.extract_section(SectionName::Abstract, "GFP-1");
        assert_eq!(abstract_text[0].resource_type, "Dataset");
        assert_eq!(abstract_text[0].priority, 40);
    }

    #[test]
    fn test_candidates_carry_span_and_section() {
        let ex = extractor(vec![rule("geo", "Dataset", r"GSE\d+", 70)]);
        let text = "Data: GSE1234 and GSE5678.";
        let found = ex.extract_section(SectionName::Results, text);

        assert_eq!(found.len(), 2);
        let span = found[1].source_span.clone().unwrap();
        assert_eq!(&text[span], "GSE5678");
        assert_eq!(found[1].source_section, Some(SectionName::Results));
    }

    #[test]
    fn test_sections_in_document_order() {
        let ex = extractor(vec![rule("geo", "Dataset", r"GSE\d+", 70)]);
        let sections = Sections::new()
            .with(SectionName::Results, "GSE2")
            .with(SectionName::Methods, "GSE1");
        let found = ex.extract_sections(&sections);
        assert_eq!(names(&found), vec!["GSE1", "GSE2"]);
    }

    #[test]
    fn test_builtin_antibody_with_rrid_is_single_candidate() {
        let ex = PatternExtractor::builtin().unwrap();
        let found = ex.extract_section(
            SectionName::Methods,
            "Cells were stained with anti-GFP antibody (RRID:AB_123456).",
        );

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_type, "Antibody");
        assert_eq!(found[0].raw_name, "anti-GFP antibody");
        assert_eq!(found[0].raw_identifier, "RRID:AB_123456");
    }

    #[test]
    fn test_builtin_code_availability_marks_new() {
        let ex = PatternExtractor::builtin().unwrap();
        let found = ex.extract_section(
            SectionName::Supplementary,
            "The code is available at https://github.com/lab/krt-tool.",
        );

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_type, "Software/code");
        assert_eq!(found[0].raw_name, "krt-tool");
        assert_eq!(found[0].raw_identifier, "https://github.com/lab/krt-tool");
        assert_eq!(found[0].raw_new_or_reuse.as_deref(), Some("New"));
    }

    #[test]
    fn test_builtin_accessions() {
        let ex = PatternExtractor::builtin().unwrap();
        let found = ex.extract_section(
            SectionName::Methods,
            "Reads from SRP123456 and series GSE98765 were reanalysed.",
        );

        let ids: Vec<&str> = found.iter().map(|c| c.raw_identifier.as_str()).collect();
        assert_eq!(ids, vec!["SRP123456", "GSE98765"]);
        assert!(found.iter().all(|c| c.resource_type == "Dataset"));
    }

    #[test]
    fn test_builtin_plain_prose_yields_nothing() {
        let ex = PatternExtractor::builtin().unwrap();
        let found = ex.extract_section(
            SectionName::Results,
            "these observations suggest that glia respond to stimulation",
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_trait_reports_regex_mode() {
        let ex = PatternExtractor::builtin().unwrap();
        assert_eq!(ex.mode(), ExtractionMode::Regex);
        assert!(!ex.is_external());

        let sections = Sections::new().with(SectionName::Methods, "GSE12345");
        let found = tokio_test::block_on(ex.extract(&sections)).unwrap();
        assert_eq!(found.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_extraction_is_deterministic(text in "[ -~]{0,200}") {
            let ex = PatternExtractor::builtin().unwrap();
            let first = ex.extract_section(SectionName::Methods, &text);
            let second = ex.extract_section(SectionName::Methods, &text);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_winners_never_overlap(text in "(GSE[0-9]{3,5} |anti-[A-Z]{2,4} antibody |RRID:AB_[0-9]{4} |Cat# [0-9]{3} |[a-z]{1,6} ){0,12}") {
            let ex = PatternExtractor::builtin().unwrap();
            let found = ex.extract_section(SectionName::Methods, &text);
            let spans: Vec<Range<usize>> = found.iter().filter_map(|c| c.source_span.clone()).collect();
            for (i, a) in spans.iter().enumerate() {
                for b in &spans[i + 1..] {
                    prop_assert!(a.end <= b.start, "overlap {:?} {:?}", a, b);
                }
            }
        }
    }
}
