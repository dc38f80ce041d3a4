//! JATS XML section extraction
//!
//! The markup goes through an HTML5 parser, which recovers from anything a
//! publisher can produce. Unknown JATS elements survive as generic elements,
//! so the tree can be walked by tag name.

use krt_core::{SectionName, Sections};
use scraper::node::Node;
use scraper::{ElementRef, Html};

use crate::{ArticleFormat, SectionExtractor};

/// Elements whose boundaries separate words
const BLOCK_TAGS: &[&str] = &[
    "p",
    "title",
    "sec",
    "td",
    "th",
    "tr",
    "list-item",
    "caption",
    "label",
    "table-wrap",
    "fig",
    "supplementary-material",
    "break",
    "def-item",
    "ack",
    "app",
    "boxed-text",
    "disp-quote",
];

/// Elements whose text is never useful for resource detection
const SKIPPED_TAGS: &[&str] = &["ref-list", "script", "style"];

const SUPPLEMENTARY_KEYWORDS: &[&str] = &[
    "supplement",
    "supporting information",
    "appendix",
    "appendices",
    "key resources",
    "resource table",
    "availability",
    "accession",
];

const METHODS_KEYWORDS: &[&str] = &[
    "method",
    "materials",
    "procedure",
    "experimental design",
    "experimental model",
    "study design",
    "data collection",
];

const RESULTS_KEYWORDS: &[&str] = &["result", "findings", "observations"];

/// Section extractor for JATS / NLM article XML
#[derive(Debug, Clone, Default)]
pub struct JatsSectionExtractor;

impl JatsSectionExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Map a top-level section heading to the section vocabulary.
    /// Introduction, discussion and similar headings map to nothing.
    pub fn classify(heading: &str) -> Option<SectionName> {
        let heading = heading.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| heading.contains(k));

        if matches(SUPPLEMENTARY_KEYWORDS) {
            Some(SectionName::Supplementary)
        } else if matches(METHODS_KEYWORDS) {
            Some(SectionName::Methods)
        } else if matches(RESULTS_KEYWORDS) {
            Some(SectionName::Results)
        } else {
            None
        }
    }
}

impl SectionExtractor for JatsSectionExtractor {
    fn extract(&self, markup: &str) -> Sections {
        let document = Html::parse_document(markup);
        let mut sections = Sections::new();

        if let Some(title) = elements(&document, "article-title")
            .map(text_of)
            .find(|t| !t.is_empty())
        {
            sections.set(SectionName::Title, title);
        }

        // Prefer the main abstract over teaser/graphical variants
        let abstracts: Vec<ElementRef<'_>> = elements(&document, "abstract").collect();
        if let Some(main) = abstracts
            .iter()
            .find(|a| a.value().attr("abstract-type").is_none())
            .or_else(|| abstracts.first())
        {
            sections.set(SectionName::Abstract, abstract_text(*main));
        }

        let mut unclassified = Vec::new();
        for sec in elements(&document, "sec")
            .filter(|s| !has_ancestor(*s, &["sec", "front", "abstract", "back", "floats-group"]))
        {
            let text = text_of(sec);
            match Self::classify(&heading_of(sec)) {
                Some(name) => sections.append(name, &text),
                None => unclassified.push(text),
            }
        }

        for back in elements(&document, "back") {
            for child in back.children().filter_map(ElementRef::wrap) {
                if !SKIPPED_TAGS.contains(&child.value().name()) {
                    sections.append(SectionName::Supplementary, &text_of(child));
                }
            }
        }

        // Tables and supplementary files floating outside any section
        for float in document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| matches!(e.value().name(), "table-wrap" | "supplementary-material"))
            .filter(|e| !has_ancestor(*e, &["sec", "back", "abstract"]))
        {
            sections.append(SectionName::Supplementary, &text_of(float));
        }

        let has_body_sections = !sections.get(SectionName::Methods).is_empty()
            || !sections.get(SectionName::Results).is_empty();
        if !has_body_sections {
            let loose_paragraphs = elements(&document, "p").filter(|p| {
                !has_ancestor(
                    *p,
                    &[
                        "sec",
                        "front",
                        "back",
                        "abstract",
                        "table-wrap",
                        "supplementary-material",
                        "floats-group",
                    ],
                )
            });
            for paragraph in loose_paragraphs {
                sections.append(SectionName::Methods, &text_of(paragraph));
            }
            for text in unclassified {
                sections.append(SectionName::Methods, &text);
            }
            tracing::debug!("No methods/results headings; body routed to methods");
        }

        sections
    }

    fn supported_formats(&self) -> &[ArticleFormat] {
        &[ArticleFormat::Jats]
    }
}

// ============================================================================
// Tree helpers
// ============================================================================

fn elements<'a>(document: &'a Html, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |e| e.value().name() == name)
}

fn has_ancestor(element: ElementRef<'_>, names: &[&str]) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| names.contains(&a.value().name()))
}

fn heading_of(sec: ElementRef<'_>) -> String {
    sec.children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == "title")
        .map(text_of)
        .unwrap_or_default()
}

/// Abstract paragraphs joined as paragraphs, without the "Abstract" heading
fn abstract_text(element: ElementRef<'_>) -> String {
    let paragraphs: Vec<String> = element
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "p")
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();

    if paragraphs.is_empty() {
        text_of(element)
    } else {
        paragraphs.join("\n\n")
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    let mut buffer = String::new();
    push_text(element, &mut buffer);
    collapse_whitespace(&buffer)
}

fn push_text(element: ElementRef<'_>, buffer: &mut String) {
    // `title` is raw text to an HTML parser, so its inline markup arrives as text
    let raw_text = element.value().name() == "title";
    for child in element.children() {
        match child.value() {
            Node::Text(text) if raw_text => push_without_tags(text, buffer),
            Node::Text(text) => buffer.push_str(text),
            Node::Element(el) => {
                if SKIPPED_TAGS.contains(&el.name()) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    buffer.push(' ');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    push_text(child_element, buffer);
                }
                if block {
                    buffer.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn push_without_tags(text: &str, buffer: &mut String) {
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => buffer.push(c),
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<article>
  <front>
    <article-meta>
      <title-group><article-title>Enteric glia regulate <italic>motility</italic></article-title></title-group>
      <abstract abstract-type="teaser"><p>Short teaser.</p></abstract>
      <abstract><title>Abstract</title><p>Glia talk to neurons.</p><p>Second paragraph.</p></abstract>
    </article-meta>
  </front>
  <body>
    <sec><title>Introduction</title><p>Background on glia.</p></sec>
    <sec><title>Materials and Methods</title>
      <sec><title>Antibodies</title><p>We used anti-GFP antibody (RRID:AB_123456).</p></sec>
    </sec>
    <sec><title>Results</title><p>Glia expand in GSE12345 data.</p></sec>
    <sec><title>Data availability</title><p>Code at github.com/lab/tool.</p></sec>
    <sec><title>Discussion</title><p>We speculate.</p></sec>
  </body>
  <back>
    <ack><p>We thank the core facility.</p></ack>
    <ref-list><ref><mixed-citation>Smith 2020, anti-Tau antibody</mixed-citation></ref></ref-list>
  </back>
</article>"#;

    #[test]
    fn test_title_and_main_abstract() {
        let sections = JatsSectionExtractor::new().extract(ARTICLE);
        assert_eq!(sections.get(SectionName::Title), "Enteric glia regulate motility");
        assert_eq!(
            sections.get(SectionName::Abstract),
            "Glia talk to neurons.\n\nSecond paragraph."
        );
    }

    #[test]
    fn test_sections_classified_by_heading() {
        let sections = JatsSectionExtractor::new().extract(ARTICLE);

        let methods = sections.get(SectionName::Methods);
        assert!(methods.contains("anti-GFP antibody (RRID:AB_123456)"));
        assert!(sections.get(SectionName::Results).contains("GSE12345"));

        let supplementary = sections.get(SectionName::Supplementary);
        assert!(supplementary.contains("github.com/lab/tool"));
        assert!(supplementary.contains("core facility"));
    }

    #[test]
    fn test_unclassified_and_references_dropped() {
        let sections = JatsSectionExtractor::new().extract(ARTICLE);
        let all: String = sections.iter().map(|(_, text)| text).collect();
        assert!(!all.contains("Background on glia"));
        assert!(!all.contains("We speculate"));
        assert!(!all.contains("anti-Tau"));
    }

    #[test]
    fn test_inline_markup_in_section_heading() {
        let markup = "<article><body><sec><title>Materials and <italic>Methods</italic></title>\
                      <p>Cells were HEK293T.</p></sec></body></article>";
        let sections = JatsSectionExtractor::new().extract(markup);
        let methods = sections.get(SectionName::Methods);
        assert!(methods.contains("Materials and Methods"), "{methods}");
        assert!(methods.contains("HEK293T"));
        assert!(!methods.contains('<'));
    }

    #[test]
    fn test_body_falls_back_to_methods() {
        let markup = "<article><body><sec><title>Overview</title>\
                      <p>Cells were HEK293T.</p></sec><p>Loose paragraph.</p></body></article>";
        let sections = JatsSectionExtractor::new().extract(markup);
        let methods = sections.get(SectionName::Methods);
        assert!(methods.contains("HEK293T"));
        assert!(methods.contains("Loose paragraph."));
    }

    #[test]
    fn test_malformed_markup_never_fails() {
        let sections = JatsSectionExtractor::new().extract("<article><sec><title>Methods<p>unclosed");
        assert!(sections.get(SectionName::Title).is_empty());

        let empty = JatsSectionExtractor::new().extract("");
        assert!(empty.is_empty());
    }

    #[test]
    fn test_classify_headings() {
        assert_eq!(
            JatsSectionExtractor::classify("STAR Methods"),
            Some(SectionName::Methods)
        );
        assert_eq!(
            JatsSectionExtractor::classify("Supplementary Methods"),
            Some(SectionName::Supplementary)
        );
        assert_eq!(
            JatsSectionExtractor::classify("Results and Discussion"),
            Some(SectionName::Results)
        );
        assert_eq!(JatsSectionExtractor::classify("Introduction"), None);
    }

    #[test]
    fn test_block_boundaries_separate_words() {
        let markup = "<article><body><sec><title>Methods</title><table-wrap><table>\
                      <tr><td>Abcam</td><td>ab290</td></tr></table></table-wrap></sec></body></article>";
        let sections = JatsSectionExtractor::new().extract(markup);
        assert!(sections.get(SectionName::Methods).contains("Abcam ab290"));
    }
}
