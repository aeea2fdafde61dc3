//! Rule node model
//!
//! A rule is one of:
//! - [`MatchRule`]: a single pattern tagging one contiguous span, no children
//! - [`RegionRule`]: a begin/end delimited span with ordered child patterns
//! - a disjunction ([`Rule::AnyOf`]): ordered alternatives, first applicable wins
//!
//! Children are [`Pattern`]s. A child is either a by-name [`include`] of a
//! repository rule, resolved when the repository is validated and again by the
//! consuming runtime, or an inline rule owned by its parent. Naming is what
//! lets a region list its own ancestors among its children.

use super::pattern::Fragment;
use std::collections::BTreeMap;

/// Scope tags keyed by capture-group index (0 is the whole match).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(BTreeMap<usize, String>);

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: usize, scope: impl Into<String>) {
        self.0.insert(index, scope.into());
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(&index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0.iter().map(|(index, scope)| (*index, scope.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>, const N: usize> From<[(usize, S); N]> for Captures {
    fn from(entries: [(usize, S); N]) -> Self {
        let mut captures = Captures::new();
        for (index, scope) in entries {
            captures.insert(index, scope);
        }
        captures
    }
}

/// A child of a region or disjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Reference to a repository rule by name
    Include(String),
    /// Rule owned by its parent
    Inline(Box<Rule>),
}

impl Pattern {
    /// The referenced rule name, for includes.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Pattern::Include(name) => Some(name),
            Pattern::Inline(_) => None,
        }
    }
}

/// Reference a repository rule by name.
pub fn include(name: impl Into<String>) -> Pattern {
    Pattern::Include(name.into())
}

impl From<Rule> for Pattern {
    fn from(rule: Rule) -> Self {
        Pattern::Inline(Box::new(rule))
    }
}

impl From<MatchRule> for Pattern {
    fn from(rule: MatchRule) -> Self {
        Rule::from(rule).into()
    }
}

impl From<RegionRule> for Pattern {
    fn from(rule: RegionRule) -> Self {
        Rule::from(rule).into()
    }
}

/// Terminal rule consuming one contiguous span.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRule {
    pub pattern: Fragment,
    pub scope: Option<String>,
    pub captures: Captures,
}

impl MatchRule {
    pub fn new(pattern: impl Into<Fragment>) -> Self {
        Self {
            pattern: pattern.into(),
            scope: None,
            captures: Captures::new(),
        }
    }

    /// Tag the whole match.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Tag capture group `index`.
    pub fn capture(mut self, index: usize, scope: impl Into<String>) -> Self {
        self.captures.insert(index, scope);
        self
    }
}

/// Delimited region with nested child patterns.
///
/// `scope` covers the whole region including its delimiters,
/// `content_scope` only the text between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRule {
    pub begin: Fragment,
    pub end: Fragment,
    pub scope: Option<String>,
    pub content_scope: Option<String>,
    pub begin_captures: Captures,
    pub end_captures: Captures,
    pub patterns: Vec<Pattern>,
}

impl RegionRule {
    pub fn new(begin: impl Into<Fragment>, end: impl Into<Fragment>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
            scope: None,
            content_scope: None,
            begin_captures: Captures::new(),
            end_captures: Captures::new(),
            patterns: Vec::new(),
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn content_scope(mut self, scope: impl Into<String>) -> Self {
        self.content_scope = Some(scope.into());
        self
    }

    pub fn begin_capture(mut self, index: usize, scope: impl Into<String>) -> Self {
        self.begin_captures.insert(index, scope);
        self
    }

    pub fn end_capture(mut self, index: usize, scope: impl Into<String>) -> Self {
        self.end_captures.insert(index, scope);
        self
    }

    /// Tag the same group index on both delimiters.
    pub fn delimiter_capture(self, index: usize, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        self.begin_capture(index, scope.clone())
            .end_capture(index, scope)
    }

    /// Children in priority order.
    pub fn patterns<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Pattern>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }
}

/// The unit of a repository.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Match(MatchRule),
    Region(RegionRule),
    /// Ordered alternatives with no delimiters of their own
    AnyOf(Vec<Pattern>),
}

impl Rule {
    pub fn any_of<I>(patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Pattern>,
    {
        Rule::AnyOf(patterns.into_iter().map(Into::into).collect())
    }

    /// A declared construct whose patterns are not yet specified.
    ///
    /// Emitted as an empty disjunction, which never matches.
    pub fn placeholder() -> Self {
        Rule::AnyOf(Vec::new())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Rule::AnyOf(patterns) if patterns.is_empty())
    }

    /// Child patterns; empty for match rules.
    pub fn children(&self) -> &[Pattern] {
        match self {
            Rule::Match(_) => &[],
            Rule::Region(region) => &region.patterns,
            Rule::AnyOf(patterns) => patterns,
        }
    }
}

impl From<MatchRule> for Rule {
    fn from(rule: MatchRule) -> Self {
        Rule::Match(rule)
    }
}

impl From<RegionRule> for Rule {
    fn from(rule: RegionRule) -> Self {
        Rule::Region(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_builder_keeps_child_order() {
        let region = RegionRule::new("\\(", "\\)")
            .delimiter_capture(0, "meta.brace.round")
            .patterns([include("comment"), include("string")]);

        assert_eq!(region.begin_captures.get(0), Some("meta.brace.round"));
        assert_eq!(region.end_captures.get(0), Some("meta.brace.round"));
        let names: Vec<_> = region
            .patterns
            .iter()
            .filter_map(Pattern::reference)
            .collect();
        assert_eq!(names, vec!["comment", "string"]);
    }

    #[test]
    fn test_mixed_children_become_patterns() {
        let rule = Rule::any_of([
            include("comment"),
            MatchRule::new("\\$[a-z]+").scope("variable").into(),
        ]);
        assert_eq!(rule.children().len(), 2);
        assert!(matches!(rule.children()[1], Pattern::Inline(_)));
    }

    #[test]
    fn test_placeholder_is_empty_disjunction() {
        assert!(Rule::placeholder().is_placeholder());
        assert!(!Rule::any_of([include("x")]).is_placeholder());
        assert!(!Rule::from(MatchRule::new("x")).is_placeholder());
    }

    #[test]
    fn test_captures_from_array() {
        let captures = Captures::from([(1, "a"), (3, "b")]);
        assert_eq!(captures.len(), 2);
        assert_eq!(captures.get(2), None);
        let indices: Vec<_> = captures.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 3]);
    }
}
