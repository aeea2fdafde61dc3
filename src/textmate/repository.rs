//! Rule repository
//!
//! Rules are registered by name into a [`RepositoryBuilder`] in any order and
//! reference each other only by name, so recursive and mutually recursive
//! rule graphs are built without eager expansion. [`RepositoryBuilder::build`]
//! then performs the structural checks once:
//!
//! 1. every include resolves to a registered rule (referential closure)
//! 2. every pattern compiles in the host regex dialect
//! 3. every capture tag names a group that exists in its own pattern
//! 4. every scope name is well formed
//!
//! A [`Repository`] therefore only exists in a validated, immutable state.

use super::error::GrammarError;
use super::pattern::Fragment;
use super::rule::{Captures, Pattern, Rule};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, trace, warn};

static RULE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static SCOPE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_+-]+(?:\.[A-Za-z0-9_+-]+)*$").unwrap());

/// Static description of the grammar as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Display name
    pub name: String,
    /// Root scope identifier, e.g. `source.wasm.wat`
    pub scope_name: String,
    /// File-name suffixes the grammar applies to
    pub file_types: Vec<String>,
}

/// Collects named rules before validation.
#[derive(Debug, Clone)]
pub struct RepositoryBuilder {
    metadata: Metadata,
    rules: BTreeMap<String, Rule>,
}

impl RepositoryBuilder {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            rules: BTreeMap::new(),
        }
    }

    /// Register `rule` under a unique `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        rule: impl Into<Rule>,
    ) -> Result<&mut Self, GrammarError> {
        let name = name.into();
        if !RULE_NAME.is_match(&name) {
            return Err(GrammarError::InvalidRuleName { name });
        }
        if self.rules.contains_key(&name) {
            return Err(GrammarError::DuplicateRule { name });
        }
        trace!(rule = %name, "registered rule");
        self.rules.insert(name, rule.into());
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Validate the rule graph and freeze it with `entry` as root pattern list.
    pub fn build<I>(self, entry: I) -> Result<Repository, GrammarError>
    where
        I: IntoIterator,
        I::Item: Into<Pattern>,
    {
        let entry: Vec<Pattern> = entry.into_iter().map(Into::into).collect();
        if entry.is_empty() {
            return Err(GrammarError::EmptyEntryPoint);
        }
        check_scope("metadata", Some(self.metadata.scope_name.as_str()))?;

        let validator = Validator { rules: &self.rules };
        validator.patterns("patterns", &entry)?;
        for (name, rule) in &self.rules {
            validator.rule(name, rule)?;
            trace!(rule = %name, "validated rule");
        }

        let repository = Repository {
            metadata: self.metadata,
            entry,
            rules: self.rules,
        };
        for name in repository.unreachable() {
            warn!(rule = %name, "rule is not reachable from the entry patterns");
        }
        debug!(
            rules = repository.len(),
            placeholders = repository.placeholders().len(),
            scope = %repository.metadata.scope_name,
            "repository validated"
        );
        Ok(repository)
    }
}

/// A validated, reference-closed, immutable set of named rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    metadata: Metadata,
    entry: Vec<Pattern>,
    rules: BTreeMap<String, Rule>,
}

impl Repository {
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Root pattern list the scan starts with.
    pub fn entry(&self) -> &[Pattern] {
        &self.entry
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Rules in name order.
    pub fn rules(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Names of rules declared without patterns.
    pub fn placeholders(&self) -> Vec<&str> {
        self.rules()
            .filter(|(_, rule)| rule.is_placeholder())
            .map(|(name, _)| name)
            .collect()
    }

    /// Names of rules no include chain from the entry patterns reaches.
    pub fn unreachable(&self) -> Vec<&str> {
        let reached = self.reachable();
        self.rules()
            .map(|(name, _)| name)
            .filter(|name| !reached.contains(name))
            .collect()
    }

    fn reachable(&self) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&Pattern> = self.entry.iter().collect();
        while let Some(pattern) = queue.pop_front() {
            match pattern {
                Pattern::Include(name) => {
                    if seen.insert(name.as_str()) {
                        if let Some(rule) = self.rules.get(name) {
                            queue.extend(rule.children());
                        }
                    }
                }
                Pattern::Inline(rule) => queue.extend(rule.children()),
            }
        }
        seen
    }
}

struct Validator<'a> {
    rules: &'a BTreeMap<String, Rule>,
}

impl Validator<'_> {
    fn patterns(&self, location: &str, patterns: &[Pattern]) -> Result<(), GrammarError> {
        for (index, pattern) in patterns.iter().enumerate() {
            let location = format!("{} > patterns[{}]", location, index);
            match pattern {
                Pattern::Include(name) => {
                    if !self.rules.contains_key(name) {
                        return Err(GrammarError::unresolved(location, name.as_str()));
                    }
                }
                Pattern::Inline(rule) => self.rule(&location, rule)?,
            }
        }
        Ok(())
    }

    fn rule(&self, location: &str, rule: &Rule) -> Result<(), GrammarError> {
        match rule {
            Rule::Match(rule) => {
                let groups = compile(location, "match", &rule.pattern)?;
                check_captures(location, "captures", &rule.captures, groups)?;
                check_scope(location, rule.scope.as_deref())
            }
            Rule::Region(region) => {
                let begin_groups = compile(location, "begin", &region.begin)?;
                let end_groups = compile(location, "end", &region.end)?;
                check_captures(
                    location,
                    "beginCaptures",
                    &region.begin_captures,
                    begin_groups,
                )?;
                check_captures(location, "endCaptures", &region.end_captures, end_groups)?;
                check_scope(location, region.scope.as_deref())?;
                check_scope(location, region.content_scope.as_deref())?;
                self.patterns(location, &region.patterns)
            }
            Rule::AnyOf(patterns) => self.patterns(location, patterns),
        }
    }
}

/// Compile in the host dialect and return the number of capture groups.
fn compile(
    location: &str,
    field: &'static str,
    fragment: &Fragment,
) -> Result<usize, GrammarError> {
    if fragment.is_empty() {
        return Err(GrammarError::invalid_pattern(location, field, "empty pattern"));
    }
    let regex = fancy_regex::Regex::new(fragment.as_str())
        .map_err(|e| GrammarError::invalid_pattern(location, field, e.to_string()))?;
    Ok(regex.captures_len() - 1)
}

fn check_captures(
    location: &str,
    field: &'static str,
    captures: &Captures,
    groups: usize,
) -> Result<(), GrammarError> {
    for (index, scope) in captures.iter() {
        if index > groups {
            return Err(GrammarError::CaptureOutOfRange {
                location: location.to_string(),
                field,
                index,
                groups,
            });
        }
        check_scope(location, Some(scope))?;
    }
    Ok(())
}

/// A scope attribute may hold several space-separated scope names.
pub(crate) fn check_scope(location: &str, scope: Option<&str>) -> Result<(), GrammarError> {
    let Some(scope) = scope else {
        return Ok(());
    };
    let mut names = scope.split(' ').peekable();
    if names.peek().is_none() || !names.all(|name| SCOPE_NAME.is_match(name)) {
        return Err(GrammarError::InvalidScope {
            location: location.to_string(),
            scope: scope.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textmate::rule::{include, MatchRule, RegionRule};

    fn metadata() -> Metadata {
        Metadata {
            name: "Test".to_string(),
            scope_name: "source.test".to_string(),
            file_types: vec![".test".to_string()],
        }
    }

    fn parens() -> RegionRule {
        RegionRule::new("\\(", "\\)").delimiter_capture(0, "meta.brace.round.test")
    }

    #[test]
    fn test_self_and_mutual_references_are_valid() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder
            .register(
                "list",
                parens().patterns([include("item"), include("list")]),
            )
            .unwrap()
            .register("item", Rule::any_of([include("atom"), include("list")]))
            .unwrap()
            .register("atom", MatchRule::new("[a-z]+").scope("variable.test"))
            .unwrap();

        let repo = builder
            .build([include("list")])
            .expect("cyclic graph to validate");
        assert_eq!(repo.len(), 3);
        assert!(repo.unreachable().is_empty());
    }

    #[test]
    fn test_duplicate_rule_name_rejected() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder.register("atom", MatchRule::new("a")).unwrap();
        let err = builder.register("atom", MatchRule::new("b")).unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule { ref name } if name == "atom"));
    }

    #[test]
    fn test_rule_name_must_be_identifier() {
        let mut builder = RepositoryBuilder::new(metadata());
        let err = builder.register("#atom", MatchRule::new("a")).unwrap_err();
        assert!(matches!(err, GrammarError::InvalidRuleName { .. }));
    }

    #[test]
    fn test_dangling_reference_inside_inline_rule() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder
            .register(
                "list",
                parens().patterns([Rule::any_of([include("missing")])]),
            )
            .unwrap();

        let err = builder.build([include("list")]).unwrap_err();
        match err {
            GrammarError::UnresolvedReference { location, reference } => {
                assert_eq!(reference, "missing");
                assert_eq!(location, "list > patterns[0] > patterns[0]");
            }
            other => panic!("expected unresolved reference, got {:?}", other),
        }
    }

    #[test]
    fn test_dangling_entry_reference() {
        let builder = RepositoryBuilder::new(metadata());
        let err = builder.build([include("root")]).unwrap_err();
        assert!(matches!(err, GrammarError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_capture_index_must_exist_in_own_pattern() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder
            .register(
                "string",
                RegionRule::new("\"", "(\")|((?:[^\\\\\\n])$)")
                    .begin_capture(1, "punctuation.definition.string.begin.test")
                    .end_capture(2, "invalid.illegal.newline.test"),
            )
            .unwrap();

        let err = builder.build([include("string")]).unwrap_err();
        match err {
            GrammarError::CaptureOutOfRange {
                field,
                index,
                groups,
                ..
            } => {
                assert_eq!(field, "beginCaptures");
                assert_eq!(index, 1);
                assert_eq!(groups, 0);
            }
            other => panic!("expected capture error, got {:?}", other),
        }
    }

    #[test]
    fn test_lookbehind_patterns_compile() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder
            .register("after", RegionRule::new("(?<=\\()", "(?=\\))"))
            .unwrap();
        assert!(builder.build([include("after")]).is_ok());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder.register("broken", MatchRule::new("(a")).unwrap();
        let err = builder.build([include("broken")]).unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { field: "match", .. }));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder.register("empty", RegionRule::new("", "x")).unwrap();
        let err = builder.build([include("empty")]).unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { field: "begin", .. }));
    }

    #[test]
    fn test_scope_names_validated() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder
            .register(
                "atom",
                MatchRule::new("a").scope("meta.atom.test  bad..scope"),
            )
            .unwrap();
        let err = builder.build([include("atom")]).unwrap_err();
        assert!(matches!(err, GrammarError::InvalidScope { .. }));

        let mut builder = RepositoryBuilder::new(metadata());
        builder
            .register(
                "atom",
                MatchRule::new("a").scope("meta.atom.test constant.other.test"),
            )
            .unwrap();
        assert!(builder.build([include("atom")]).is_ok());
    }

    #[test]
    fn test_empty_entry_point_rejected() {
        let builder = RepositoryBuilder::new(metadata());
        let err = builder.build(Vec::<Pattern>::new()).unwrap_err();
        assert!(matches!(err, GrammarError::EmptyEntryPoint));
    }

    #[test]
    fn test_placeholders_and_unreachable_reported() {
        let mut builder = RepositoryBuilder::new(metadata());
        builder
            .register("root", Rule::any_of([include("expr")]))
            .unwrap()
            .register("expr", Rule::placeholder())
            .unwrap()
            .register("orphan", MatchRule::new("o"))
            .unwrap();

        let repo = builder.build([include("root")]).unwrap();
        assert_eq!(repo.placeholders(), vec!["expr"]);
        assert_eq!(repo.unreachable(), vec!["orphan"]);
    }
}
