//! KRT quality checks
//!
//! Guideline checks over finished rows: completeness warnings, a 100-point
//! quality score (completeness 40, identifier quality 30, guideline
//! adherence 30) and concrete improvement suggestions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use krt_core::{NewOrReuse, ResourceRow, ResourceType, UNKNOWN_RESOURCE};

const COMPLETENESS_POINTS: u32 = 40;
const IDENTIFIER_POINTS: u32 = 30;
const GUIDELINE_POINTS: u32 = 30;

static VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bv(?:ersion)?\.?\s*\d|\d+\.\d+").expect("version regex is valid")
});

static STRUCTURED_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)rrid:|\bdoi\b|\b10\.\d{4,9}/|https?://|github\.com|\bcat(?:alog)?\s*#|\bGSE\d|\bSR[APXR]\d|\bPRJ[A-Z]{2}\d|\bE-MTAB-|\bATCC\b",
    )
    .expect("identifier regex is valid")
});

/// Score with the notes explaining it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: u32,
    pub max_score: u32,
    pub notes: Vec<String>,
}

/// Everything `krt check` reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub warnings: Vec<String>,
    pub score: QualityScore,
    pub suggestions: Vec<String>,
}

pub fn assess(rows: &[ResourceRow]) -> QualityReport {
    QualityReport {
        warnings: completeness_warnings(rows),
        score: quality_score(rows),
        suggestions: suggest_improvements(rows),
    }
}

fn is_complete(row: &ResourceRow) -> bool {
    row.resource_name != UNKNOWN_RESOURCE && !row.resource_name.trim().is_empty()
}

fn has_version(name: &str) -> bool {
    VERSION.is_match(name)
}

fn has_new(rows: &[ResourceRow], resource_type: ResourceType) -> bool {
    rows.iter()
        .any(|r| r.resource_type == resource_type && r.new_or_reuse == NewOrReuse::New)
}

pub fn completeness_warnings(rows: &[ResourceRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec![
            "No KRT entries found. Please ensure all resources are properly extracted.".to_string(),
        ];
    }

    let mut warnings = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        if !is_complete(row) {
            warnings.push(format!("Row {}: Missing resource name", i + 1));
        }
    }

    if !has_new(rows, ResourceType::Dataset) {
        warnings.push(
            "This KRT does not include any new data. If you collected data, add a row for it; \
             otherwise state \"No new primary data were collected in this study\" in the \
             Data/Code Availability Statement."
                .to_string(),
        );
    }

    if !has_new(rows, ResourceType::SoftwareCode) {
        warnings.push(
            "This KRT does not include any new code. If you generated code, add a row for it; \
             otherwise state which programs were used for analysis in the Data/Code \
             Availability Statement."
                .to_string(),
        );
    }

    for (i, row) in rows.iter().enumerate() {
        if !row.has_identifier() {
            continue;
        }
        let identifier = row.identifier.to_lowercase();
        match row.resource_type {
            ResourceType::Antibody if !identifier.contains("rrid:") => {
                warnings.push(format!(
                    "Row {}: Antibody should include RRID identifier when available",
                    i + 1
                ));
            }
            ResourceType::SoftwareCode
                if !["rrid:", "doi", "http", "github"]
                    .iter()
                    .any(|m| identifier.contains(m)) =>
            {
                warnings.push(format!(
                    "Row {}: Software should include RRID, DOI, or URL identifier when available",
                    i + 1
                ));
            }
            _ => {}
        }
    }

    for (i, row) in rows.iter().enumerate() {
        if row.resource_type == ResourceType::SoftwareCode
            && row.new_or_reuse == NewOrReuse::Reuse
            && !has_version(&row.resource_name)
        {
            warnings.push(format!(
                "Row {}: Software '{}' should include version number",
                i + 1,
                row.resource_name
            ));
        }
    }

    warnings
}

pub fn quality_score(rows: &[ResourceRow]) -> QualityScore {
    if rows.is_empty() {
        return QualityScore {
            score: 0,
            max_score: COMPLETENESS_POINTS + IDENTIFIER_POINTS + GUIDELINE_POINTS,
            notes: vec!["No KRT data to evaluate".to_string()],
        };
    }

    let total = rows.len() as u32;
    let mut notes = Vec::new();

    let complete = rows.iter().filter(|r| is_complete(r)).count() as u32;
    let completeness = complete * COMPLETENESS_POINTS / total;
    notes.push(format!(
        "Completeness: {complete}/{total} entries complete ({completeness}/{COMPLETENESS_POINTS} points)"
    ));

    let structured = rows
        .iter()
        .filter(|r| r.has_identifier() && STRUCTURED_IDENTIFIER.is_match(&r.identifier))
        .count() as u32;
    let identifiers = structured * IDENTIFIER_POINTS / total;
    notes.push(format!(
        "Identifier quality: {structured}/{total} entries with structured IDs ({identifiers}/{IDENTIFIER_POINTS} points)"
    ));

    let mut guideline = GUIDELINE_POINTS;
    if !has_new(rows, ResourceType::Dataset) {
        guideline -= 10;
        notes.push("Missing new dataset (-10 points)".to_string());
    }
    if !has_new(rows, ResourceType::SoftwareCode) {
        guideline -= 10;
        notes.push("Missing new software/code (-10 points)".to_string());
    }
    let unversioned = rows
        .iter()
        .filter(|r| r.resource_type == ResourceType::SoftwareCode)
        .any(|r| r.new_or_reuse == NewOrReuse::Reuse && !has_version(&r.resource_name));
    if unversioned {
        guideline -= 5;
        notes.push("Some software entries missing version numbers (-5 points)".to_string());
    }
    notes.push(format!(
        "Guideline adherence: {guideline}/{GUIDELINE_POINTS} points"
    ));

    QualityScore {
        score: completeness + identifiers + guideline,
        max_score: COMPLETENESS_POINTS + IDENTIFIER_POINTS + GUIDELINE_POINTS,
        notes,
    }
}

pub fn suggest_improvements(rows: &[ResourceRow]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["Extract resources from the Methods section of your manuscript".to_string()];
    }

    let mut suggestions = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        if row.has_identifier() {
            continue;
        }
        let hint = match row.resource_type {
            ResourceType::Antibody => "Search antibodyregistry.org for an RRID",
            ResourceType::SoftwareCode => "Add the official website URL or RRID",
            ResourceType::CellLine => "Search cellosaurus.org for an RRID",
            _ => continue,
        };
        suggestions.push(format!("Row {}: {hint} for '{}'", i + 1, row.resource_name));
    }

    let present = |t: ResourceType| rows.iter().any(|r| r.resource_type == t);
    if !present(ResourceType::Protocol) {
        suggestions.push(
            "Consider adding protocols used in your study (e.g., immunohistochemistry, PCR)"
                .to_string(),
        );
    }
    if !present(ResourceType::Dataset) {
        suggestions.push("Add datasets generated or used in your study".to_string());
    }
    if !present(ResourceType::SoftwareCode) {
        suggestions
            .push("Add software used for analysis (e.g., ImageJ, R, Python scripts)".to_string());
    }

    suggestions
}
