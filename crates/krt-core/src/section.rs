//! Named plain-text sections of an article
//!
//! Section extractors produce a `Sections` map; extractors consume it.
//! Iteration follows document order (title, abstract, methods, results,
//! supplementary), which is the canonical first-occurrence order used for
//! deduplication and final row ordering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fixed section vocabulary, declared in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionName {
    Title,
    Abstract,
    Methods,
    Results,
    Supplementary,
}

impl SectionName {
    pub const ALL: [SectionName; 5] = [
        Self::Title,
        Self::Abstract,
        Self::Methods,
        Self::Results,
        Self::Supplementary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Abstract => "abstract",
            Self::Methods => "methods",
            Self::Results => "results",
            Self::Supplementary => "supplementary",
        }
    }

    /// Title and abstract carry summary prose rather than materials detail
    pub fn is_summary(&self) -> bool {
        matches!(self, Self::Title | Self::Abstract)
    }
}

impl std::fmt::Display for SectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SectionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "abstract" => Ok(Self::Abstract),
            "methods" => Ok(Self::Methods),
            "results" => Ok(Self::Results),
            "supplementary" => Ok(Self::Supplementary),
            other => Err(format!("unknown section: {other}")),
        }
    }
}

/// Mapping of section name to plain text. Missing sections read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sections {
    sections: BTreeMap<SectionName, String>,
}

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, name: SectionName, text: impl Into<String>) -> Self {
        self.set(name, text);
        self
    }

    /// Replace the text of a section
    pub fn set(&mut self, name: SectionName, text: impl Into<String>) {
        self.sections.insert(name, text.into());
    }

    /// Append a paragraph to a section, separated by a blank line
    pub fn append(&mut self, name: SectionName, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let entry = self.sections.entry(name).or_default();
        if !entry.is_empty() {
            entry.push_str("\n\n");
        }
        entry.push_str(text);
    }

    /// Text of a section, empty if absent
    pub fn get(&self, name: SectionName) -> &str {
        self.sections.get(&name).map(String::as_str).unwrap_or("")
    }

    /// Non-empty sections in document order
    pub fn iter(&self) -> impl Iterator<Item = (SectionName, &str)> {
        self.sections
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(name, text)| (*name, text.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Total characters across all sections
    pub fn char_count(&self) -> usize {
        self.sections.values().map(|s| s.chars().count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_follows_document_order() {
        let sections = Sections::new()
            .with(SectionName::Results, "r")
            .with(SectionName::Title, "t")
            .with(SectionName::Methods, "m");

        let order: Vec<SectionName> = sections.iter().map(|(name, _)| name).collect();
        assert_eq!(
            order,
            vec![SectionName::Title, SectionName::Methods, SectionName::Results]
        );
    }

    #[test]
    fn test_missing_section_is_empty() {
        let sections = Sections::new();
        assert_eq!(sections.get(SectionName::Abstract), "");
        assert!(sections.is_empty());
    }

    #[test]
    fn test_append_joins_paragraphs() {
        let mut sections = Sections::new();
        sections.append(SectionName::Methods, "first");
        sections.append(SectionName::Methods, "  ");
        sections.append(SectionName::Methods, "second");
        assert_eq!(sections.get(SectionName::Methods), "first\n\nsecond");
    }

    #[test]
    fn test_section_name_parse() {
        assert_eq!("Methods".parse::<SectionName>(), Ok(SectionName::Methods));
        assert!("discussion".parse::<SectionName>().is_err());
        assert!(SectionName::Abstract.is_summary());
        assert!(!SectionName::Results.is_summary());
    }
}
