//! Declarative field rule tables.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::RuleError;

use super::convert::ConverterKind;

/// Rule table compiled into the library.
const BUILTIN_RULES: &str = include_str!("../../rules/default.toml");

/// Table format version this build reads.
pub const RULES_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    version: u32,
    #[serde(default)]
    categories: Vec<CategorySpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CategorySpec {
    name: String,
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldSpec {
    name: String,
    converter: ConverterKind,
    patterns: Vec<PatternSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PatternSpec {
    Plain(String),
    Grouped {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
    },
}

fn default_group() -> usize {
    1
}

/// One compiled pattern and the capture group holding the value.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    regex: Regex,
    group: usize,
}

impl FieldPattern {
    /// The capture from this pattern's first match, trimmed, if non-blank.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(self.group))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn group(&self) -> usize {
        self.group
    }
}

/// How to find and convert one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub converter: ConverterKind,
    pub patterns: Vec<FieldPattern>,
}

/// Ordered field rules for one bill category.
#[derive(Debug, Clone)]
pub struct CategoryRules {
    pub name: String,
    pub fields: Vec<FieldRule>,
}

/// The complete, compiled rule table. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct RuleSet {
    categories: Vec<CategoryRules>,
}

impl RuleSet {
    /// The rule table shipped with the library.
    pub fn builtin() -> Result<Self, RuleError> {
        Self::from_toml(BUILTIN_RULES)
    }

    /// Load a rule table from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path)?;
        let rules = Self::from_toml(&content)?;
        info!(
            "Loaded {} categories from {}",
            rules.categories.len(),
            path.display()
        );
        Ok(rules)
    }

    /// The built-in table, or the one at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, RuleError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Parse and compile a rule table.
    pub fn from_toml(source: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(source)?;
        if file.version != RULES_VERSION {
            return Err(RuleError::UnsupportedVersion(file.version));
        }

        let mut seen = HashSet::new();
        let mut categories = Vec::with_capacity(file.categories.len());
        for category in file.categories {
            if !seen.insert(category.name.clone()) {
                return Err(RuleError::DuplicateCategory(category.name));
            }
            categories.push(compile_category(category)?);
        }

        debug!("Compiled rule table with {} categories", categories.len());
        Ok(Self { categories })
    }

    pub fn category(&self, name: &str) -> Option<&CategoryRules> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryRules> {
        self.categories.iter()
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }
}

fn compile_category(spec: CategorySpec) -> Result<CategoryRules, RuleError> {
    let mut fields = Vec::with_capacity(spec.fields.len());
    for field in spec.fields {
        let mut patterns = Vec::with_capacity(field.patterns.len());
        for pattern in field.patterns {
            patterns.push(compile_pattern(&spec.name, &field.name, pattern)?);
        }
        fields.push(FieldRule {
            name: field.name,
            converter: field.converter,
            patterns,
        });
    }

    Ok(CategoryRules {
        name: spec.name,
        fields,
    })
}

fn compile_pattern(
    category: &str,
    field: &str,
    spec: PatternSpec,
) -> Result<FieldPattern, RuleError> {
    let (pattern, group) = match spec {
        PatternSpec::Plain(pattern) => (pattern, 1),
        PatternSpec::Grouped { pattern, group } => (pattern, group),
    };

    let regex = Regex::new(&format!("(?is){}", pattern)).map_err(|source| {
        RuleError::InvalidPattern {
            category: category.to_string(),
            field: field.to_string(),
            source,
        }
    })?;

    // captures_len counts the implicit whole-match group 0.
    if group >= regex.captures_len() {
        return Err(RuleError::MissingGroup {
            category: category.to_string(),
            field: field.to_string(),
            group,
        });
    }

    Ok(FieldPattern { regex, group })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_table_covers_all_categories() {
        let rules = RuleSet::builtin().unwrap();
        assert_eq!(
            rules.category_names(),
            vec!["agua", "energia", "telefone", "internet", "semparar"]
        );
    }

    #[test]
    fn test_builtin_energia_field_order() {
        let rules = RuleSet::builtin().unwrap();
        let energia = rules.category("energia").unwrap();
        let names: Vec<_> = energia.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "valor",
                "data_vencimento",
                "consumo",
                "pn",
                "seu_codigo",
                "conta_mes",
                "discriminacao_fisco",
                "total_consolidado",
            ]
        );
        assert_eq!(energia.fields[0].patterns.len(), 4);
        assert_eq!(energia.fields[0].converter, ConverterKind::Monetary);
    }

    #[test]
    fn test_grouped_pattern() {
        let rules = RuleSet::from_toml(
            r#"
            version = 1
            [[categories]]
            name = "gas"
            [[categories.fields]]
            name = "cliente"
            converter = "identity"
            patterns = [{ pattern = '(cliente|conta)\s*(\d+)', group = 2 }]
            "#,
        )
        .unwrap();

        let pattern = &rules.category("gas").unwrap().fields[0].patterns[0];
        assert_eq!(pattern.group(), 2);
        assert_eq!(pattern.capture("CLIENTE 4411"), Some("4411"));
    }

    #[test]
    fn test_patterns_are_case_insensitive_and_span_lines() {
        let rules = RuleSet::builtin().unwrap();
        let pattern = &rules.category("agua").unwrap().fields[0].patterns[0];
        assert_eq!(pattern.capture("total\na\npagar\nR$\n 87,10"), Some("87,10"));
    }

    #[test]
    fn test_blank_capture_is_no_match() {
        let rules = RuleSet::from_toml(
            r#"
            version = 1
            [[categories]]
            name = "x"
            [[categories.fields]]
            name = "nota"
            converter = "identity"
            patterns = ['Nota:([ ]*)fim']
            "#,
        )
        .unwrap();
        let pattern = &rules.category("x").unwrap().fields[0].patterns[0];
        assert_eq!(pattern.capture("Nota:   fim"), None);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = RuleSet::from_toml(
            r#"
            version = 1
            [[categories]]
            name = "agua"
            [[categories.fields]]
            name = "valor"
            converter = "monetary"
            patterns = ['TOTAL ([\d.,+)']
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { ref field, .. } if field == "valor"));
    }

    #[test]
    fn test_missing_capture_group_is_rejected() {
        let err = RuleSet::from_toml(
            r#"
            version = 1
            [[categories]]
            name = "agua"
            [[categories.fields]]
            name = "valor"
            converter = "monetary"
            patterns = ['TOTAL [\d.,]+']
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::MissingGroup { group: 1, .. }));
    }

    #[test]
    fn test_duplicate_category_is_rejected() {
        let err = RuleSet::from_toml(
            r#"
            version = 1
            [[categories]]
            name = "agua"
            [[categories]]
            name = "agua"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateCategory(name) if name == "agua"));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let err = RuleSet::from_toml("version = 2").unwrap_err();
        assert!(matches!(err, RuleError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_unknown_converter_is_parse_error() {
        let err = RuleSet::from_toml(
            r#"
            version = 1
            [[categories]]
            name = "agua"
            [[categories.fields]]
            name = "valor"
            converter = "roman"
            patterns = ['(x)']
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(
            &path,
            "version = 1\n[[categories]]\nname = \"gas\"\n",
        )
        .unwrap();

        let rules = RuleSet::load(Some(&path)).unwrap();
        assert_eq!(rules.category_names(), vec!["gas"]);
        assert!(rules.category("gas").unwrap().fields.is_empty());

        assert!(matches!(
            RuleSet::from_file(&dir.path().join("missing.toml")),
            Err(RuleError::Io(_))
        ));
    }
}
