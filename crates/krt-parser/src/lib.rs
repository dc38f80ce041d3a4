//! KRT Parser - Section extraction from article markup
//!
//! Turns a JATS XML article into the fixed section vocabulary consumed by
//! the extractors (title, abstract, methods, results, supplementary).
//! Markup is parsed leniently: malformed input yields fewer sections,
//! never an error. Only file access can fail.

pub mod jats;

pub use jats::JatsSectionExtractor;

use std::path::Path;

use krt_core::{SectionName, Sections};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading an article
#[derive(Error, Debug)]
pub enum ParserError {
    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File extension is not a recognised article format
    #[error("Unsupported article format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

impl From<ParserError> for krt_core::KrtError {
    fn from(err: ParserError) -> Self {
        match err {
            ParserError::Io { path, source } => Self::Io { path, source },
            other => Self::Parse(other.to_string()),
        }
    }
}

// ============================================================================
// Article Formats
// ============================================================================

/// Recognised article formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleFormat {
    /// JATS / NLM XML (`.xml`, `.nxml`)
    Jats,
    Unknown,
}

impl ArticleFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "xml" | "nxml" | "jats" => Self::Jats,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

// ============================================================================
// Parsed Article
// ============================================================================

/// An article reduced to named sections
#[derive(Debug, Clone)]
pub struct ParsedArticle {
    /// Stable article id (file stem), used to name outputs
    pub id: String,

    /// Where the article came from (path, DOI or accession)
    pub source: String,

    pub sections: Sections,
}

impl ParsedArticle {
    pub fn new(id: impl Into<String>, source: impl Into<String>, sections: Sections) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            sections,
        }
    }

    pub fn title(&self) -> &str {
        self.sections.get(SectionName::Title)
    }

    pub fn abstract_text(&self) -> &str {
        self.sections.get(SectionName::Abstract)
    }
}

// ============================================================================
// Extractor Trait
// ============================================================================

/// Splits article markup into named sections
pub trait SectionExtractor: Send + Sync {
    /// Extract sections from markup. Never fails; unknown structure
    /// yields empty sections.
    fn extract(&self, markup: &str) -> Sections;

    /// Formats this extractor understands
    fn supported_formats(&self) -> &[ArticleFormat];

    fn can_parse(&self, format: ArticleFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}

/// Article id derived from a path: the file stem
pub fn article_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Read an article file and split it into sections.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
pub fn parse_article(path: &Path) -> Result<ParsedArticle> {
    let format = ArticleFormat::from_path(path);
    let extractor = JatsSectionExtractor::new();
    if !extractor.can_parse(format) {
        return Err(ParserError::UnsupportedFormat(path.display().to_string()));
    }

    let bytes = std::fs::read(path).map_err(|source| ParserError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let markup = String::from_utf8_lossy(&bytes);
    let sections = extractor.extract(&markup);

    tracing::debug!(
        path = %path.display(),
        chars = sections.char_count(),
        "Parsed article"
    );

    Ok(ParsedArticle::new(
        article_id(path),
        path.display().to_string(),
        sections,
    ))
}

// ============================================================================
// Tests
// ============================================================================
