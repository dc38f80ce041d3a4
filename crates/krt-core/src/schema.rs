//! Key Resources Table schema
//!
//! The output column names and resource type strings are part of the
//! downstream compliance contract and serialize verbatim.

use std::ops::Range;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::section::SectionName;

/// Identifier substituted when a resource has none
pub const NO_IDENTIFIER: &str = "No identifier exists";

/// Name substituted when extraction produced no usable name
pub const UNKNOWN_RESOURCE: &str = "Unknown resource";

pub const COLUMN_RESOURCE_TYPE: &str = "RESOURCE TYPE";
pub const COLUMN_RESOURCE_NAME: &str = "RESOURCE NAME";
pub const COLUMN_SOURCE: &str = "SOURCE";
pub const COLUMN_IDENTIFIER: &str = "IDENTIFIER";
pub const COLUMN_NEW_OR_REUSE: &str = "NEW/REUSE";
pub const COLUMN_ADDITIONAL_INFO: &str = "ADDITIONAL INFORMATION";

/// Canonical column order
pub const COLUMNS: [&str; 6] = [
    COLUMN_RESOURCE_TYPE,
    COLUMN_RESOURCE_NAME,
    COLUMN_SOURCE,
    COLUMN_IDENTIFIER,
    COLUMN_NEW_OR_REUSE,
    COLUMN_ADDITIONAL_INFO,
];

// ============================================================================
// Resource Types
// ============================================================================

/// The closed set of KRT resource categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceType {
    Dataset,
    SoftwareCode,
    Protocol,
    Antibody,
    BacterialStrain,
    ViralVector,
    BiologicalSample,
    ChemicalPeptideRecombinantProtein,
    CriticalCommercialAssay,
    CellLine,
    OrganismStrain,
    Oligonucleotide,
    RecombinantDna,
    Other,
}

impl ResourceType {
    pub const ALL: [ResourceType; 14] = [
        Self::Dataset,
        Self::SoftwareCode,
        Self::Protocol,
        Self::Antibody,
        Self::BacterialStrain,
        Self::ViralVector,
        Self::BiologicalSample,
        Self::ChemicalPeptideRecombinantProtein,
        Self::CriticalCommercialAssay,
        Self::CellLine,
        Self::OrganismStrain,
        Self::Oligonucleotide,
        Self::RecombinantDna,
        Self::Other,
    ];

    /// Canonical KRT label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "Dataset",
            Self::SoftwareCode => "Software/code",
            Self::Protocol => "Protocol",
            Self::Antibody => "Antibody",
            Self::BacterialStrain => "Bacterial strain",
            Self::ViralVector => "Viral vector",
            Self::BiologicalSample => "Biological sample",
            Self::ChemicalPeptideRecombinantProtein => "Chemical, peptide, or recombinant protein",
            Self::CriticalCommercialAssay => "Critical commercial assay",
            Self::CellLine => "Experimental model: Cell line",
            Self::OrganismStrain => "Experimental model: Organism/strain",
            Self::Oligonucleotide => "Oligonucleotide",
            Self::RecombinantDna => "Recombinant DNA",
            Self::Other => "Other",
        }
    }

    /// Case-insensitive exact match against the canonical labels
    /// (plus the slash-separated chemical alias)
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim();
        if wanted.eq_ignore_ascii_case("Chemical/peptide/recombinant protein") {
            return Some(Self::ChemicalPeptideRecombinantProtein);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
    }

    /// Total mapping: unrecognized labels become `Other`
    pub fn canonicalize(label: &str) -> Self {
        Self::from_label(label).unwrap_or(Self::Other)
    }

    /// Reagent-like types whose mentions in title/abstract are weak evidence
    pub fn is_reagent_like(&self) -> bool {
        matches!(
            self,
            Self::Antibody
                | Self::ChemicalPeptideRecombinantProtein
                | Self::CriticalCommercialAssay
                | Self::Oligonucleotide
                | Self::RecombinantDna
        )
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("unknown resource type: {s}"))
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// New / Reuse
// ============================================================================

/// Whether the resource was created by the study or reused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NewOrReuse {
    New,
    #[default]
    Reuse,
}

impl NewOrReuse {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Reuse => "Reuse",
        }
    }

    /// Case-insensitive exact parse of "new" / "reuse"
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "reuse" => Some(Self::Reuse),
            _ => None,
        }
    }
}

impl std::fmt::Display for NewOrReuse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Rows and Documents
// ============================================================================

/// One compliant KRT entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRow {
    #[serde(rename = "RESOURCE TYPE")]
    pub resource_type: ResourceType,

    #[serde(rename = "RESOURCE NAME")]
    pub resource_name: String,

    #[serde(rename = "SOURCE", default)]
    pub source: String,

    #[serde(rename = "IDENTIFIER")]
    pub identifier: String,

    #[serde(rename = "NEW/REUSE")]
    pub new_or_reuse: NewOrReuse,

    #[serde(rename = "ADDITIONAL INFORMATION", default)]
    pub additional_info: String,
}

impl ResourceRow {
    /// Whether this row carries a real identifier (and may be merged)
    pub fn has_identifier(&self) -> bool {
        self.identifier != NO_IDENTIFIER
    }
}

/// Which extractor produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Regex,
    Llm,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Llm => "llm",
        }
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The per-article output document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KrtDocument {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub mode: ExtractionMode,
    /// Identifier of the article source (path, DOI or accession)
    pub source: String,
    pub rows: Vec<ResourceRow>,
}

impl KrtDocument {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// Raw Candidates
// ============================================================================

/// Unvalidated resource detection, produced by either extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    /// Resource type as the extractor labelled it (canonicalized later)
    pub resource_type: String,
    pub raw_name: String,
    pub raw_identifier: String,
    pub raw_vendor: String,
    pub raw_new_or_reuse: Option<String>,
    pub raw_additional_info: String,
    /// Byte range of the match within its section text
    pub source_span: Option<Range<usize>>,
    pub source_section: Option<SectionName>,
    /// Effective (section-weighted) rule priority; zero for AI candidates
    pub priority: i32,
}

impl RawCandidate {
    pub fn new(resource_type: impl Into<String>, raw_name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            raw_name: raw_name.into(),
            raw_identifier: String::new(),
            raw_vendor: String::new(),
            raw_new_or_reuse: None,
            raw_additional_info: String::new(),
            source_span: None,
            source_section: None,
            priority: 0,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.raw_identifier = identifier.into();
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.raw_vendor = vendor.into();
        self
    }

    pub fn with_new_or_reuse(mut self, value: impl Into<String>) -> Self {
        self.raw_new_or_reuse = Some(value.into());
        self
    }

    pub fn with_additional_info(mut self, info: impl Into<String>) -> Self {
        self.raw_additional_info = info.into();
        self
    }

    pub fn with_span(mut self, section: SectionName, span: Range<usize>) -> Self {
        self.source_section = Some(section);
        self.source_span = Some(span);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_is_case_insensitive() {
        assert_eq!(ResourceType::canonicalize("antibody"), ResourceType::Antibody);
        assert_eq!(
            ResourceType::canonicalize("  SOFTWARE/CODE "),
            ResourceType::SoftwareCode
        );
        assert_eq!(
            ResourceType::canonicalize("experimental model: cell line"),
            ResourceType::CellLine
        );
    }

    #[test]
    fn test_unrecognized_type_maps_to_other() {
        assert_eq!(ResourceType::canonicalize("Kit"), ResourceType::Other);
        assert_eq!(ResourceType::canonicalize(""), ResourceType::Other);
        assert!("Kit".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_chemical_alias() {
        assert_eq!(
            ResourceType::canonicalize("Chemical/peptide/recombinant protein"),
            ResourceType::ChemicalPeptideRecombinantProtein
        );
    }

    #[test]
    fn test_labels_round_trip_through_parse() {
        for t in ResourceType::ALL {
            assert_eq!(t.as_str().parse::<ResourceType>(), Ok(t));
        }
    }

    #[test]
    fn test_row_serializes_with_exact_column_names() {
        let row = ResourceRow {
            resource_type: ResourceType::CellLine,
            resource_name: "HEK293".to_string(),
            source: "ATCC".to_string(),
            identifier: "CRL-1573".to_string(),
            new_or_reuse: NewOrReuse::Reuse,
            additional_info: String::new(),
        };

        let value = serde_json::to_value(&row).unwrap();
        let object = value.as_object().unwrap();
        for column in COLUMNS {
            assert!(object.contains_key(column), "missing column {column}");
        }
        assert_eq!(object.len(), 6);
        assert_eq!(value[COLUMN_RESOURCE_TYPE], "Experimental model: Cell line");
        assert_eq!(value[COLUMN_NEW_OR_REUSE], "Reuse");
    }

    #[test]
    fn test_document_keys() {
        let doc = KrtDocument {
            title: "T".to_string(),
            abstract_text: "A".to_string(),
            mode: ExtractionMode::Regex,
            source: "article.xml".to_string(),
            rows: vec![],
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["abstract"], "A");
        assert_eq!(value["mode"], "regex");
        assert_eq!(value["source"], "article.xml");
        assert!(value["rows"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_new_or_reuse_parse() {
        assert_eq!(NewOrReuse::parse_label("NEW"), Some(NewOrReuse::New));
        assert_eq!(NewOrReuse::parse_label(" reuse "), Some(NewOrReuse::Reuse));
        assert_eq!(NewOrReuse::parse_label("reused"), None);
    }
}
