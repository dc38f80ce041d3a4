//! Prompt construction for AI extraction

use krt_core::{SectionName, Sections};

/// System instruction sent with every extraction request
pub const SYSTEM_PROMPT: &str = include_str!("../prompts/krt_system.txt");

const BODY_SECTIONS: [SectionName; 3] = [
    SectionName::Methods,
    SectionName::Results,
    SectionName::Supplementary,
];

const SUMMARY_SECTIONS: [SectionName; 2] = [SectionName::Title, SectionName::Abstract];

/// Build the user prompt from an article's sections.
///
/// Methods, results and supplementary text are sent when present. Articles
/// with none of them fall back to title and abstract. The article text is
/// cut to `max_chars` characters.
pub fn build_user_prompt(sections: &Sections, max_chars: usize, extra: Option<&str>) -> String {
    let mut prompt = String::from(
        "Extract a comprehensive Key Resources Table from the article sections below.\n\
         Return only a JSON array.\n\n",
    );

    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        prompt.push_str("Additional requirements: ");
        prompt.push_str(extra);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Article sections:\n");
    prompt.push_str(truncate_chars(&article_text(sections), max_chars));
    prompt
}

fn article_text(sections: &Sections) -> String {
    let labelled = |names: &[SectionName]| -> Vec<String> {
        names
            .iter()
            .map(|name| (name, sections.get(*name).trim()))
            .filter(|(_, text)| !text.is_empty())
            .map(|(name, text)| format!("{}:\n{}", name.as_str().to_uppercase(), text))
            .collect()
    };

    let mut parts = labelled(&BODY_SECTIONS);
    if parts.is_empty() {
        parts = labelled(&SUMMARY_SECTIONS);
    }
    parts.join("\n\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_sections_are_labelled() {
        let sections = Sections::new()
            .with(SectionName::Title, "A title")
            .with(SectionName::Methods, "We used HeLa cells.")
            .with(SectionName::Results, "Cells grew.");
        let prompt = build_user_prompt(&sections, 10_000, None);

        assert!(prompt.contains("METHODS:\nWe used HeLa cells."));
        assert!(prompt.contains("RESULTS:\nCells grew."));
        assert!(!prompt.contains("A title"));
        assert!(!prompt.contains("Additional requirements"));
    }

    #[test]
    fn test_summary_fallback() {
        let sections = Sections::new()
            .with(SectionName::Title, "Only a title")
            .with(SectionName::Abstract, "And an abstract.");
        let prompt = build_user_prompt(&sections, 10_000, Some("  focus on antibodies "));

        assert!(prompt.contains("TITLE:\nOnly a title"));
        assert!(prompt.contains("ABSTRACT:\nAnd an abstract."));
        assert!(prompt.contains("Additional requirements: focus on antibodies\n"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sections = Sections::new().with(SectionName::Methods, "αβγδε".repeat(10));
        let prompt = build_user_prompt(&sections, 12, None);
        let body = prompt.split("Article sections:\n").nth(1).unwrap();
        assert_eq!(body.chars().count(), 12);
        assert!(body.starts_with("METHODS:\nαβγ"));
    }
}
