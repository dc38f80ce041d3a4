//! Normalizer/Validator
//!
//! Total mapping from a raw candidate to a compliant row. Never fails:
//! unrecognized types become `Other`, empty names and identifiers get
//! their documented defaults, and anything but an explicit "new" is reuse.

use krt_core::{NewOrReuse, RawCandidate, ResourceRow, ResourceType, NO_IDENTIFIER, UNKNOWN_RESOURCE};

/// Values that mean "nothing here" when they appear as a name or identifier
const PLACEHOLDERS: &[&str] = &[
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not specified",
    "not available",
    "-",
];

pub fn normalize(candidate: RawCandidate) -> ResourceRow {
    let resource_type = ResourceType::canonicalize(&candidate.resource_type);

    let name = meaningful(&candidate.raw_name);
    let identifier = meaningful(&candidate.raw_identifier);

    let new_or_reuse = candidate
        .raw_new_or_reuse
        .as_deref()
        .and_then(NewOrReuse::parse_label)
        .unwrap_or_default();

    ResourceRow {
        resource_type,
        resource_name: name.unwrap_or_else(|| UNKNOWN_RESOURCE.to_string()),
        source: candidate.raw_vendor,
        identifier: identifier.unwrap_or_else(|| NO_IDENTIFIER.to_string()),
        new_or_reuse,
        additional_info: candidate.raw_additional_info,
    }
}

pub fn normalize_all(candidates: impl IntoIterator<Item = RawCandidate>) -> Vec<ResourceRow> {
    candidates.into_iter().map(normalize).collect()
}

/// Whitespace-collapsed value, or `None` when blank or a placeholder
fn meaningful(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || is_placeholder(&collapsed) {
        None
    } else {
        Some(collapsed)
    }
}

fn is_placeholder(value: &str) -> bool {
    let lowered = value.to_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_for_empty_fields() {
        let row = normalize(RawCandidate::new("Antibody", "  "));
        assert_eq!(row.resource_name, UNKNOWN_RESOURCE);
        assert_eq!(row.identifier, NO_IDENTIFIER);
        assert_eq!(row.new_or_reuse, NewOrReuse::Reuse);
        assert!(!row.has_identifier());
    }

    #[test]
    fn test_unknown_type_becomes_other() {
        let row = normalize(RawCandidate::new("Kit", "RNeasy"));
        assert_eq!(row.resource_type, ResourceType::Other);
        assert_eq!(row.resource_name, "RNeasy");
    }

    #[test]
    fn test_type_match_is_case_insensitive() {
        let row = normalize(RawCandidate::new("software/CODE", "Fiji"));
        assert_eq!(row.resource_type, ResourceType::SoftwareCode);
    }

    #[test]
    fn test_new_or_reuse_only_exact_labels() {
        let new = normalize(RawCandidate::new("Dataset", "x").with_new_or_reuse("NEW"));
        assert_eq!(new.new_or_reuse, NewOrReuse::New);

        let fuzzy = normalize(RawCandidate::new("Dataset", "x").with_new_or_reuse("newly made"));
        assert_eq!(fuzzy.new_or_reuse, NewOrReuse::Reuse);
    }

    #[test]
    fn test_placeholders_treated_as_empty() {
        let row = normalize(
            RawCandidate::new("Antibody", "N/A").with_identifier(" Not specified "),
        );
        assert_eq!(row.resource_name, UNKNOWN_RESOURCE);
        assert_eq!(row.identifier, NO_IDENTIFIER);
    }

    #[test]
    fn test_source_and_info_pass_through() {
        let row = normalize(
            RawCandidate::new("Antibody", "anti-GFP\n antibody")
                .with_identifier("RRID:AB_123456")
                .with_vendor("Abcam")
                .with_additional_info("1:500"),
        );
        assert_eq!(row.resource_name, "anti-GFP antibody");
        assert_eq!(row.source, "Abcam");
        assert_eq!(row.identifier, "RRID:AB_123456");
        assert_eq!(row.additional_info, "1:500");
    }

    proptest! {
        #[test]
        fn prop_rows_are_always_compliant(
            resource_type in ".{0,40}",
            name in ".{0,40}",
            identifier in ".{0,40}",
            new_or_reuse in proptest::option::of(".{0,10}"),
        ) {
            let mut candidate = RawCandidate::new(resource_type, name).with_identifier(identifier);
            candidate.raw_new_or_reuse = new_or_reuse;
            let row = normalize(candidate);

            prop_assert!(ResourceType::ALL.contains(&row.resource_type));
            prop_assert!(!row.resource_name.trim().is_empty());
            prop_assert!(!row.identifier.trim().is_empty());
        }
    }
}
