//! Grammar emitter
//!
//! Serializes a validated [`Repository`] into the static description consumed
//! by the host scanning runtime. The field names and nesting of [`RawGrammar`]
//! and [`RawRule`] are the runtime's contract:
//!
//! ```text
//! { "name", "scopeName", "fileTypes", "patterns": [..], "repository": { name: rule } }
//!
//! match rule:   { "name"?, "match", "captures"? }
//! region rule:  { "name"?, "contentName"?, "begin", "beginCaptures"?,
//!                 "end", "endCaptures"?, "patterns"? }
//! disjunction:  { "patterns": [..] }
//! include:      { "include": "#name" }
//! ```
//!
//! Capture maps are keyed by group index: `{ "1": { "name": "scope" } }`.
//! The raw shape also deserializes, so an emitted artifact can be read back.

use super::config::{load_defaults, GrammarConfig, OutputFormat};
use super::error::GrammarError;
use super::repository::Repository;
use super::rule::{Captures, Pattern, Rule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Top-level record of the emitted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrammar {
    pub name: String,
    pub scope_name: String,
    pub file_types: Vec<String>,
    pub patterns: Vec<RawRule>,
    pub repository: BTreeMap<String, RawRule>,
}

/// One rule or include in the emitted artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captures: Option<BTreeMap<usize, RawCapture>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_captures: Option<BTreeMap<usize, RawCapture>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_captures: Option<BTreeMap<usize, RawCapture>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<RawRule>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCapture {
    pub name: String,
}

impl From<&Pattern> for RawRule {
    fn from(pattern: &Pattern) -> Self {
        match pattern {
            Pattern::Include(name) => RawRule {
                include: Some(format!("#{}", name)),
                ..RawRule::default()
            },
            Pattern::Inline(rule) => RawRule::from(rule.as_ref()),
        }
    }
}

impl From<&Rule> for RawRule {
    fn from(rule: &Rule) -> Self {
        match rule {
            Rule::Match(rule) => RawRule {
                name: rule.scope.clone(),
                match_pattern: Some(rule.pattern.to_string()),
                captures: raw_captures(&rule.captures),
                ..RawRule::default()
            },
            Rule::Region(region) => RawRule {
                name: region.scope.clone(),
                content_name: region.content_scope.clone(),
                begin: Some(region.begin.to_string()),
                begin_captures: raw_captures(&region.begin_captures),
                end: Some(region.end.to_string()),
                end_captures: raw_captures(&region.end_captures),
                patterns: if region.patterns.is_empty() {
                    None
                } else {
                    Some(raw_patterns(&region.patterns))
                },
                ..RawRule::default()
            },
            // Always present, even when empty: a disjunction is only its list
            Rule::AnyOf(patterns) => RawRule {
                patterns: Some(raw_patterns(patterns)),
                ..RawRule::default()
            },
        }
    }
}

fn raw_patterns(patterns: &[Pattern]) -> Vec<RawRule> {
    patterns.iter().map(RawRule::from).collect()
}

fn raw_captures(captures: &Captures) -> Option<BTreeMap<usize, RawCapture>> {
    if captures.is_empty() {
        return None;
    }
    let map = captures
        .iter()
        .map(|(index, scope)| {
            (
                index,
                RawCapture {
                    name: scope.to_string(),
                },
            )
        })
        .collect();
    Some(map)
}

/// Walks a repository once and renders the external description.
#[derive(Debug, Clone)]
pub struct GrammarEmitter {
    config: GrammarConfig,
}

impl GrammarEmitter {
    pub fn new(config: GrammarConfig) -> Self {
        Self { config }
    }

    /// An emitter using the embedded default configuration.
    pub fn with_defaults() -> Result<Self, GrammarError> {
        Ok(Self::new(load_defaults()?))
    }

    pub fn config(&self) -> &GrammarConfig {
        &self.config
    }

    /// Build the raw record, applying any configured metadata overrides.
    pub fn to_raw(&self, repository: &Repository) -> RawGrammar {
        let metadata = repository.metadata();
        let overrides = &self.config.metadata;
        RawGrammar {
            name: overrides
                .name
                .clone()
                .unwrap_or_else(|| metadata.name.clone()),
            scope_name: overrides
                .scope_name
                .clone()
                .unwrap_or_else(|| metadata.scope_name.clone()),
            file_types: overrides
                .file_types
                .clone()
                .unwrap_or_else(|| metadata.file_types.clone()),
            patterns: raw_patterns(repository.entry()),
            repository: repository
                .rules()
                .map(|(name, rule)| (name.to_string(), RawRule::from(rule)))
                .collect(),
        }
    }

    /// Render the artifact in the configured format.
    pub fn emit(&self, repository: &Repository) -> Result<String, GrammarError> {
        let raw = self.to_raw(repository);
        if self.config.metadata.scope_name.is_some() {
            super::repository::check_scope("metadata.scope_name", Some(&raw.scope_name))?;
        }
        let output = match (self.config.output.format, self.config.output.pretty) {
            (OutputFormat::Json, true) => serde_json::to_string_pretty(&raw)?,
            (OutputFormat::Json, false) => serde_json::to_string(&raw)?,
            (OutputFormat::Yaml, _) => serde_yaml::to_string(&raw)?,
        };
        debug!(
            scope = %raw.scope_name,
            rules = raw.repository.len(),
            bytes = output.len(),
            format = ?self.config.output.format,
            "emitted grammar"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textmate::config::{Loader, MetadataOverrides, OutputConfig};
    use crate::textmate::repository::{Metadata, RepositoryBuilder};
    use crate::textmate::rule::{include, MatchRule, RegionRule};

    fn repository() -> Repository {
        let mut builder = RepositoryBuilder::new(Metadata {
            name: "Test".to_string(),
            scope_name: "source.test".to_string(),
            file_types: vec![".test".to_string()],
        });
        builder
            .register("root", Rule::any_of([include("string"), include("todo")]))
            .unwrap()
            .register(
                "string",
                RegionRule::new("\"", "\"")
                    .scope("string.quoted.double.test")
                    .begin_capture(0, "punctuation.definition.string.begin.test")
                    .patterns([include("escape")]),
            )
            .unwrap()
            .register(
                "escape",
                MatchRule::new("\\\\.").scope("constant.character.escape.test"),
            )
            .unwrap()
            .register("todo", Rule::placeholder())
            .unwrap();
        builder.build([include("root")]).unwrap()
    }

    fn compact() -> GrammarEmitter {
        GrammarEmitter::new(GrammarConfig {
            output: OutputConfig {
                format: OutputFormat::Json,
                pretty: false,
            },
            metadata: MetadataOverrides::default(),
        })
    }

    #[test]
    fn test_raw_grammar_shape() {
        let raw = compact().to_raw(&repository());
        assert_eq!(raw.scope_name, "source.test");
        assert_eq!(raw.file_types, vec![".test"]);
        assert_eq!(raw.patterns.len(), 1);
        assert_eq!(raw.patterns[0].include.as_deref(), Some("#root"));
        assert_eq!(raw.repository.len(), 4);
        assert_eq!(raw.repository["todo"].patterns, Some(vec![]));
    }

    #[test]
    fn test_region_serializes_with_host_field_names() {
        let raw = compact().to_raw(&repository());
        let json = serde_json::to_string(&raw.repository["string"]).unwrap();
        insta::assert_snapshot!(json, @r##"{"name":"string.quoted.double.test","begin":"\"","beginCaptures":{"0":{"name":"punctuation.definition.string.begin.test"}},"end":"\"","patterns":[{"include":"#escape"}]}"##);
    }

    #[test]
    fn test_match_rule_uses_match_key() {
        let raw = compact().to_raw(&repository());
        let json = serde_json::to_string(&raw.repository["escape"]).unwrap();
        insta::assert_snapshot!(json, @r#"{"name":"constant.character.escape.test","match":"\\\\."}"#);
    }

    #[test]
    fn test_json_round_trip() {
        let repo = repository();
        let emitter = compact();
        let json = emitter.emit(&repo).unwrap();
        let parsed: RawGrammar = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, emitter.to_raw(&repo));
    }

    #[test]
    fn test_yaml_output() {
        let config = Loader::new()
            .set_override("output.format", "yaml")
            .unwrap()
            .build()
            .unwrap();
        let yaml = GrammarEmitter::new(config).emit(&repository()).unwrap();
        assert!(yaml.contains("scopeName: source.test"));
        let parsed: RawGrammar = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.repository.len(), 4);
    }

    #[test]
    fn test_metadata_overrides_applied() {
        let config = Loader::new()
            .set_override("metadata.name", "Renamed")
            .unwrap()
            .build()
            .unwrap();
        let raw = GrammarEmitter::new(config).to_raw(&repository());
        assert_eq!(raw.name, "Renamed");
        assert_eq!(raw.scope_name, "source.test");
    }

    #[test]
    fn test_invalid_scope_override_rejected() {
        let config = Loader::new()
            .set_override("metadata.scope_name", "not a..scope")
            .unwrap()
            .build()
            .unwrap();
        let err = GrammarEmitter::new(config).emit(&repository()).unwrap_err();
        assert!(matches!(err, GrammarError::InvalidScope { .. }));
    }
}
