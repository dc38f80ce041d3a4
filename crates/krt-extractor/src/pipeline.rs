//! Candidate-to-document pipeline shared by both extraction modes

use krt_core::{
    CandidateExtractor, ExtractionError, ExtractionMode, KrtDocument, RawCandidate, SectionName,
    Sections,
};

use crate::merge::merge_rows;
use crate::normalize::normalize_all;

/// Article metadata carried into the output document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleMeta {
    pub title: String,
    pub abstract_text: String,
    pub source: String,
}

impl ArticleMeta {
    pub fn new(
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
            source: source.into(),
        }
    }

    /// Title and abstract taken from the sections themselves
    pub fn from_sections(sections: &Sections, source: impl Into<String>) -> Self {
        Self::new(
            sections.get(SectionName::Title),
            sections.get(SectionName::Abstract),
            source,
        )
    }
}

/// Normalize and merge candidates into the final document
pub fn assemble_document(
    meta: ArticleMeta,
    mode: ExtractionMode,
    candidates: Vec<RawCandidate>,
) -> KrtDocument {
    let candidate_count = candidates.len();
    let rows = merge_rows(normalize_all(candidates));

    tracing::debug!(
        source = %meta.source,
        mode = %mode,
        candidates = candidate_count,
        rows = rows.len(),
        "Assembled document"
    );

    KrtDocument {
        title: meta.title,
        abstract_text: meta.abstract_text,
        mode,
        source: meta.source,
        rows,
    }
}

/// Run one extractor over an article and assemble its document
pub async fn build_document(
    extractor: &dyn CandidateExtractor,
    sections: &Sections,
    meta: ArticleMeta,
) -> Result<KrtDocument, ExtractionError> {
    let candidates = extractor.extract(sections).await?;
    Ok(assemble_document(meta, extractor.mode(), candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternExtractor;
    use krt_core::{NewOrReuse, ResourceType, NO_IDENTIFIER};

    #[test]
    fn test_antibody_scenario_yields_one_row() {
        let extractor = PatternExtractor::builtin().unwrap();
        let sections = Sections::new()
            .with(SectionName::Title, "Glial signalling")
            .with(
                SectionName::Methods,
                "Sections were stained with anti-GFP antibody (RRID:AB_123456).",
            );
        let meta = ArticleMeta::from_sections(&sections, "article.xml");

        let doc = tokio_test::block_on(build_document(&extractor, &sections, meta)).unwrap();

        assert_eq!(doc.mode, ExtractionMode::Regex);
        assert_eq!(doc.title, "Glial signalling");
        assert_eq!(doc.rows.len(), 1);

        let row = &doc.rows[0];
        assert_eq!(row.resource_type, ResourceType::Antibody);
        assert!(row.identifier.contains("AB_123456"));
        assert_eq!(row.new_or_reuse, NewOrReuse::Reuse);
    }

    #[test]
    fn test_repeated_accession_merges_across_sections() {
        let extractor = PatternExtractor::builtin().unwrap();
        let sections = Sections::new()
            .with(SectionName::Methods, "We reanalysed GSE45678.")
            .with(SectionName::Supplementary, "Accession: GSE45678.");

        let doc = tokio_test::block_on(build_document(
            &extractor,
            &sections,
            ArticleMeta::default(),
        ))
        .unwrap();

        assert_eq!(doc.rows.len(), 1);
        assert_eq!(doc.rows[0].identifier, "GSE45678");
        assert_eq!(doc.rows[0].source, "GEO");
    }

    #[test]
    fn test_versioned_software_with_rrid_yields_one_row() {
        let extractor = PatternExtractor::builtin().unwrap();
        let sections = Sections::new().with(
            SectionName::Methods,
            "Images were quantified in ImageJ version 1.53 (RRID:SCR_003070).",
        );

        let doc = tokio_test::block_on(build_document(
            &extractor,
            &sections,
            ArticleMeta::default(),
        ))
        .unwrap();

        assert_eq!(doc.rows.len(), 1, "rows: {:?}", doc.rows);
        assert_eq!(doc.rows[0].resource_type, ResourceType::SoftwareCode);
        assert_eq!(doc.rows[0].resource_name, "ImageJ version 1.53");
        assert_eq!(doc.rows[0].identifier, "RRID:SCR_003070");
    }

    #[test]
    fn test_strain_with_jax_stock_yields_one_row() {
        let extractor = PatternExtractor::builtin().unwrap();
        let sections = Sections::new().with(
            SectionName::Methods,
            "We used C57BL/6J mice (Jackson Laboratory, stock #000664) aged 8 weeks.",
        );

        let doc = tokio_test::block_on(build_document(
            &extractor,
            &sections,
            ArticleMeta::default(),
        ))
        .unwrap();

        assert_eq!(doc.rows.len(), 1, "rows: {:?}", doc.rows);
        let row = &doc.rows[0];
        assert_eq!(row.resource_type, ResourceType::OrganismStrain);
        assert_eq!(row.resource_name, "C57BL/6J");
        assert_eq!(row.source, "The Jackson Laboratory");
        assert_eq!(row.identifier, "RRID:IMSR_JAX:000664");
    }

    #[test]
    fn test_assemble_applies_defaults() {
        let doc = assemble_document(
            ArticleMeta::new("T", "A", "s"),
            ExtractionMode::Llm,
            vec![RawCandidate::new("Plasmid", "")],
        );
        assert_eq!(doc.rows[0].resource_type, ResourceType::Other);
        assert_eq!(doc.rows[0].identifier, NO_IDENTIFIER);
        assert_eq!(doc.abstract_text, "A");
    }

    #[test]
    fn test_empty_article_yields_empty_rows() {
        let doc = assemble_document(ArticleMeta::default(), ExtractionMode::Regex, Vec::new());
        assert!(doc.rows.is_empty());
    }
}
