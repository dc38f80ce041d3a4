//! Pattern Rule Registry
//!
//! Rules are data: a TOML table of tagged records, compiled once at startup
//! into an immutable registry that workers share without locking. The
//! built-in table is embedded in the binary; a user file replaces it for
//! calibration.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use krt_core::{KrtError, RawCandidate, ResourceType, Result};

/// The built-in rule table
pub const BUILTIN_RULES: &str = include_str!("../rules/default.toml");

static TEMPLATE_SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\d+)\}").expect("template slot regex is valid"));

static BUILTIN_REGISTRY: OnceCell<Arc<RuleRegistry>> = OnceCell::new();

// ============================================================================
// Rule Records
// ============================================================================

/// How a candidate field is filled from a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMapping {
    /// Text of one capture group (0 is the whole match)
    Group(usize),
    /// A constant
    Fixed(String),
    /// Text with `{N}` slots replaced by capture groups
    Template(String),
}

impl FieldMapping {
    /// Capture group indexes this mapping reads
    pub fn referenced_groups(&self) -> Vec<usize> {
        match self {
            Self::Group(n) => vec![*n],
            Self::Fixed(_) => Vec::new(),
            Self::Template(template) => TEMPLATE_SLOT
                .captures_iter(template)
                .filter_map(|c| c[1].parse().ok())
                .collect(),
        }
    }

    /// Resolve against a match. A template renders empty when any slot's
    /// group did not participate, so optional groups never leave stubs.
    pub fn resolve(&self, captures: &Captures<'_>) -> String {
        match self {
            Self::Group(n) => captures.get(*n).map_or("", |m| m.as_str()).to_string(),
            Self::Fixed(value) => value.clone(),
            Self::Template(template) => {
                let complete = self
                    .referenced_groups()
                    .into_iter()
                    .all(|n| captures.get(n).is_some_and(|m| !m.as_str().is_empty()));
                if !complete {
                    return String::new();
                }
                TEMPLATE_SLOT
                    .replace_all(template, |slot: &Captures<'_>| {
                        slot[1]
                            .parse::<usize>()
                            .ok()
                            .and_then(|n| captures.get(n))
                            .map_or("", |m| m.as_str())
                            .to_string()
                    })
                    .into_owned()
            }
        }
    }
}

/// Field mappings of one rule; unmapped fields stay empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleFields {
    pub name: Option<FieldMapping>,
    pub identifier: Option<FieldMapping>,
    pub vendor: Option<FieldMapping>,
    pub additional_info: Option<FieldMapping>,
    pub new_or_reuse: Option<FieldMapping>,
}

impl RuleFields {
    fn mappings(&self) -> [(&'static str, Option<&FieldMapping>); 5] {
        [
            ("name", self.name.as_ref()),
            ("identifier", self.identifier.as_ref()),
            ("vendor", self.vendor.as_ref()),
            ("additional_info", self.additional_info.as_ref()),
            ("new_or_reuse", self.new_or_reuse.as_ref()),
        ]
    }
}

/// One uncompiled rule as written in the rules table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    pub resource_type: String,
    pub pattern: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub fields: RuleFields,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleTable {
    #[serde(rename = "rule", default)]
    rules: Vec<RuleSpec>,
}

// ============================================================================
// Compiled Rules
// ============================================================================

/// A compiled, validated rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: String,
    pub resource_type: ResourceType,
    pub regex: Regex,
    pub priority: i32,
    pub fields: RuleFields,
    /// Position in the table; the last tie-breaker between matches
    pub index: usize,
}

impl PatternRule {
    pub fn compile(spec: RuleSpec, index: usize) -> Result<Self> {
        let invalid = |reason: String| KrtError::Config(format!("rule '{}': {reason}", spec.name));

        let resource_type = ResourceType::from_label(&spec.resource_type)
            .ok_or_else(|| invalid(format!("unknown resource type '{}'", spec.resource_type)))?;

        let regex = Regex::new(&spec.pattern)
            .map_err(|e| invalid(format!("pattern does not compile: {e}")))?;

        if regex.is_match("") {
            return Err(invalid("pattern matches the empty string".to_string()));
        }

        let group_count = regex.captures_len();
        for (field, mapping) in spec.fields.mappings() {
            let Some(mapping) = mapping else { continue };
            if let Some(group) = mapping
                .referenced_groups()
                .into_iter()
                .find(|g| *g >= group_count)
            {
                return Err(invalid(format!(
                    "field '{field}' reads group {group} but the pattern has {} groups",
                    group_count - 1
                )));
            }
        }

        Ok(Self {
            name: spec.name,
            resource_type,
            regex,
            priority: spec.priority,
            fields: spec.fields,
            index,
        })
    }

    /// Build a candidate from one match. Span and priority are set by the engine.
    pub fn candidate(&self, captures: &Captures<'_>) -> RawCandidate {
        let resolve = |mapping: &Option<FieldMapping>| {
            mapping
                .as_ref()
                .map(|m| m.resolve(captures))
                .unwrap_or_default()
        };

        let mut candidate = RawCandidate::new(self.resource_type.as_str(), resolve(&self.fields.name))
            .with_identifier(resolve(&self.fields.identifier))
            .with_vendor(resolve(&self.fields.vendor))
            .with_additional_info(resolve(&self.fields.additional_info));

        let new_or_reuse = resolve(&self.fields.new_or_reuse);
        if !new_or_reuse.is_empty() {
            candidate = candidate.with_new_or_reuse(new_or_reuse);
        }
        candidate
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable, ordered set of compiled rules
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<PatternRule>,
}

impl RuleRegistry {
    /// Compile rule records. Any invalid record fails the whole table.
    pub fn from_specs(specs: Vec<RuleSpec>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());

        for (index, spec) in specs.into_iter().enumerate() {
            if !seen.insert(spec.name.clone()) {
                return Err(KrtError::Config(format!(
                    "duplicate rule name '{}'",
                    spec.name
                )));
            }
            rules.push(PatternRule::compile(spec, index)?);
        }

        Ok(Self { rules })
    }

    pub fn from_toml_str(table: &str) -> Result<Self> {
        let table: RuleTable = toml::from_str(table)
            .map_err(|e| KrtError::Config(format!("invalid rules table: {e}")))?;
        Self::from_specs(table.rules)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| KrtError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            rules = registry.len(),
            "Loaded rules table"
        );
        Ok(registry)
    }

    /// Compile the embedded table
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    /// Process-wide built-in registry, compiled on first use
    pub fn shared() -> Result<Arc<Self>> {
        BUILTIN_REGISTRY
            .get_or_try_init(|| Self::builtin().map(Arc::new))
            .cloned()
    }

    /// The user's table when given, the built-in one otherwise
    pub fn load(path: Option<&Path>) -> Result<Arc<Self>> {
        match path {
            Some(path) => Ok(Arc::new(Self::from_file(path)?)),
            None => Self::shared(),
        }
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, resource_type: &str, pattern: &str) -> RuleSpec {
        RuleSpec {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            pattern: pattern.to_string(),
            priority: 10,
            fields: RuleFields::default(),
        }
    }

    #[test]
    fn test_builtin_table_compiles() {
        let registry = RuleRegistry::builtin().unwrap();
        assert!(registry.len() > 30);
        assert!(registry.get("antibody-rrid").is_some());
        assert_eq!(
            registry.get("geo").unwrap().resource_type,
            ResourceType::Dataset
        );
    }

    #[test]
    fn test_shared_registry_is_reused() {
        let a = RuleRegistry::shared().unwrap();
        let b = RuleRegistry::shared().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let err = RuleRegistry::from_specs(vec![spec("broken", "Dataset", "GSE(\\d+")]).unwrap_err();
        assert!(matches!(err, KrtError::Config(msg) if msg.contains("broken")));
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let err = RuleRegistry::from_specs(vec![spec("kit", "Kit", "kit")]).unwrap_err();
        assert!(matches!(err, KrtError::Config(_)));
    }

    #[test]
    fn test_group_out_of_range_is_config_error() {
        let mut rule = spec("geo", "Dataset", r"GSE(\d+)");
        rule.fields.identifier = Some(FieldMapping::Template("GSE{2}".to_string()));
        let err = RuleRegistry::from_specs(vec![rule]).unwrap_err();
        assert!(matches!(err, KrtError::Config(msg) if msg.contains("group 2")));
    }

    #[test]
    fn test_empty_match_pattern_rejected() {
        let err = RuleRegistry::from_specs(vec![spec("empty", "Other", r"\d*")]).unwrap_err();
        assert!(matches!(err, KrtError::Config(_)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = RuleRegistry::from_specs(vec![
            spec("same", "Other", "a"),
            spec("same", "Other", "b"),
        ])
        .unwrap_err();
        assert!(matches!(err, KrtError::Config(_)));
    }

    #[test]
    fn test_toml_field_mappings() {
        let registry = RuleRegistry::from_toml_str(
            r#"
            [[rule]]
            name = "addgene"
            resource_type = "Recombinant DNA"
            priority = 5
            pattern = 'Addgene #(\d+)'
            [rule.fields]
            name = { template = "plasmid {1}" }
            identifier = { group = 1 }
            vendor = { fixed = "Addgene" }
            "#,
        )
        .unwrap();

        let rule = &registry.rules()[0];
        let captures = rule.regex.captures("from Addgene #52961 here").unwrap();
        let candidate = rule.candidate(&captures);
        assert_eq!(candidate.raw_name, "plasmid 52961");
        assert_eq!(candidate.raw_identifier, "52961");
        assert_eq!(candidate.raw_vendor, "Addgene");
        assert_eq!(candidate.raw_new_or_reuse, None);
    }

    #[test]
    fn test_unknown_table_key_rejected() {
        let err = RuleRegistry::from_toml_str(
            r#"
            [[rule]]
            name = "x"
            resource_type = "Other"
            pattern = "x"
            colour = "blue"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, KrtError::Config(_)));
    }

    #[test]
    fn test_template_with_missing_group_renders_empty() {
        let regex = Regex::new(r"kit(?: #(\d+))?").unwrap();
        let mapping = FieldMapping::Template("Cat# {1}".to_string());

        let with = regex.captures("kit #42").unwrap();
        assert_eq!(mapping.resolve(&with), "Cat# 42");

        let without = regex.captures("kit").unwrap();
        assert_eq!(mapping.resolve(&without), "");
    }
}
