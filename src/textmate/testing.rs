//! Testing utilities for grammar verification
//!
//! The host runtime that executes an emitted grammar is not part of this crate.
//! To verify the behavior a rule graph describes, [`Scanner`] replays the
//! runtime's consumer contract on sample text:
//!
//! - input is scanned line by line, each line with a trailing `\n` appended,
//!   and patterns only ever see the current line
//! - at each position the current region's end pattern is tried first, then
//!   its children in priority order (the root pattern list at top level)
//! - the leftmost match wins; ties go to the earlier candidate
//! - a match rule tags its span; a region begin pushes the region; an end
//!   match pops it
//! - a line that pushes and pops, or pushes the same region twice, without
//!   advancing is stopped and reported in [`ScanResult::stalled_lines`]
//!
//! ## Assertions
//!
//! ```rust-example
//! use wat_grammar::textmate::testing::{assert_scan, Scanner};
//!
//! let scan = Scanner::new(&repo).scan("(module)")?;
//! assert_scan(&scan)
//!     .closed()
//!     .token("module", |t| {
//!         t.has_scope("storage.type.module.wasm").in_rule("module");
//!     });
//! ```
//!
//! Tokens for tagged capture groups are reported next to the token of the
//! whole match when that one carries a scope of its own, so tokens may
//! overlap.

use super::error::GrammarError;
use super::pattern::Fragment;
use super::repository::Repository;
use super::rule::{Captures, Pattern, RegionRule, Rule};
use fancy_regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

/// Upper bound on matches attempted within one line.
const MAX_STEPS_PER_LINE: usize = 10_000;

/// A tagged span of the scanned input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedToken {
    /// Zero-based line number
    pub line: usize,
    /// Byte offsets within the line
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Scope stack, root scope first
    pub scopes: Vec<String>,
    /// Named repository rules enclosing or producing the span, outermost first
    pub rules: Vec<String>,
}

impl ScopedToken {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes
            .iter()
            .any(|entry| entry.split(' ').any(|name| name == scope))
    }

    pub fn has_rule(&self, rule: &str) -> bool {
        self.rules.iter().any(|name| name == rule)
    }
}

/// Outcome of scanning a complete input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub tokens: Vec<ScopedToken>,
    /// Regions still open at end of input, outermost first
    pub open_regions: Vec<String>,
    /// Lines cut short by the endless-loop guard
    pub stalled_lines: Vec<usize>,
}

impl ScanResult {
    /// Every region closed and no line stalled.
    pub fn is_closed(&self) -> bool {
        self.open_regions.is_empty() && self.stalled_lines.is_empty()
    }

    pub fn tokens_with_text<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a ScopedToken> {
        self.tokens.iter().filter(move |token| token.text == text)
    }

    pub fn tokens_with_scope<'a>(
        &'a self,
        scope: &'a str,
    ) -> impl Iterator<Item = &'a ScopedToken> {
        self.tokens
            .iter()
            .filter(move |token| token.has_scope(scope))
    }
}

/// Rule reachable at a scan position, with the named rules it was included through.
struct Candidate<'r> {
    rule: &'r Rule,
    rules: Vec<&'r str>,
}

struct Frame<'r> {
    region: &'r RegionRule,
    label: String,
    enter_line: usize,
    enter_pos: usize,
    scopes: Vec<String>,
    content_scopes: Vec<String>,
    rules: Vec<String>,
}

/// Match found by a pattern, as owned byte ranges.
struct Found {
    groups: Vec<Option<(usize, usize)>>,
}

impl Found {
    fn start(&self) -> usize {
        self.groups[0].map_or(0, |(start, _)| start)
    }

    fn end(&self) -> usize {
        self.groups[0].map_or(0, |(_, end)| end)
    }
}

enum Choice<'r> {
    End,
    Rule(Candidate<'r>),
}

/// Executes a repository against sample text the way the host runtime does.
pub struct Scanner<'r> {
    repository: &'r Repository,
    regexes: RefCell<HashMap<String, Regex>>,
}

impl<'r> Scanner<'r> {
    pub fn new(repository: &'r Repository) -> Self {
        Self {
            repository,
            regexes: RefCell::new(HashMap::new()),
        }
    }

    pub fn scan(&self, source: &str) -> Result<ScanResult, GrammarError> {
        let mut stack: Vec<Frame<'r>> = Vec::new();
        let mut result = ScanResult::default();
        for (line_no, line) in source.lines().enumerate() {
            let text = format!("{}\n", line);
            self.scan_line(line_no, &text, &mut stack, &mut result)?;
        }
        result.open_regions = stack.into_iter().map(|frame| frame.label).collect();
        Ok(result)
    }

    fn scan_line(
        &self,
        line_no: usize,
        text: &str,
        stack: &mut Vec<Frame<'r>>,
        result: &mut ScanResult,
    ) -> Result<(), GrammarError> {
        let content_len = text.len() - 1;
        let root_scopes = vec![self.repository.metadata().scope_name.clone()];
        let mut pos = 0;

        for _ in 0..MAX_STEPS_PER_LINE {
            let (patterns, end, content_scopes, context) = match stack.last() {
                Some(frame) => (
                    frame.region.patterns.as_slice(),
                    Some(&frame.region.end),
                    frame.content_scopes.clone(),
                    frame.rules.clone(),
                ),
                None => (self.repository.entry(), None, root_scopes.clone(), Vec::new()),
            };

            let mut best: Option<(Choice<'r>, Found)> = None;
            if let Some(end) = end {
                if let Some(found) = self.find(end, text, pos)? {
                    best = Some((Choice::End, found));
                }
            }
            for candidate in self.candidates(patterns) {
                let fragment = match candidate.rule {
                    Rule::Match(rule) => &rule.pattern,
                    Rule::Region(region) => &region.begin,
                    Rule::AnyOf(_) => continue,
                };
                if let Some(found) = self.find(fragment, text, pos)? {
                    let earlier = best
                        .as_ref()
                        .map_or(true, |(_, current)| found.start() < current.start());
                    if earlier {
                        best = Some((Choice::Rule(candidate), found));
                    }
                }
            }

            let Some((choice, found)) = best else {
                push_text(
                    result,
                    line_no,
                    text,
                    pos,
                    content_len,
                    &content_scopes,
                    &context,
                );
                return Ok(());
            };
            push_text(
                result,
                line_no,
                text,
                pos,
                found.start(),
                &content_scopes,
                &context,
            );
            let advanced = found.end() > pos;

            match choice {
                Choice::End => {
                    let Some(frame) = stack.pop() else {
                        return Ok(());
                    };
                    push_captures(
                        result,
                        line_no,
                        text,
                        &found,
                        &frame.region.end_captures,
                        false,
                        &frame.scopes,
                        &frame.rules,
                    );
                    if !advanced && frame.enter_line == line_no && frame.enter_pos == pos {
                        stack.push(frame);
                        result.stalled_lines.push(line_no);
                        return Ok(());
                    }
                }
                Choice::Rule(candidate) => {
                    let mut rules = context.clone();
                    rules.extend(candidate.rules.iter().map(|name| name.to_string()));
                    match candidate.rule {
                        Rule::Match(rule) => {
                            let scopes = with_scope(&content_scopes, rule.scope.as_deref());
                            push_captures(
                                result,
                                line_no,
                                text,
                                &found,
                                &rule.captures,
                                rule.scope.is_some(),
                                &scopes,
                                &rules,
                            );
                            if !advanced {
                                result.stalled_lines.push(line_no);
                                return Ok(());
                            }
                        }
                        Rule::Region(region) => {
                            let scopes = with_scope(&content_scopes, region.scope.as_deref());
                            push_captures(
                                result,
                                line_no,
                                text,
                                &found,
                                &region.begin_captures,
                                false,
                                &scopes,
                                &rules,
                            );
                            let repeated = stack
                                .iter()
                                .rev()
                                .take_while(|frame| {
                                    frame.enter_line == line_no && frame.enter_pos == pos
                                })
                                .any(|frame| std::ptr::eq(frame.region, region));
                            if !advanced && repeated {
                                result.stalled_lines.push(line_no);
                                return Ok(());
                            }
                            let label = candidate.rules.last().copied().unwrap_or("<inline>");
                            let content_scopes =
                                with_scope(&scopes, region.content_scope.as_deref());
                            stack.push(Frame {
                                region,
                                label: label.to_string(),
                                enter_line: line_no,
                                enter_pos: pos,
                                content_scopes,
                                scopes,
                                rules,
                            });
                        }
                        Rule::AnyOf(_) => {}
                    }
                }
            }
            pos = pos.max(found.end());
        }

        result.stalled_lines.push(line_no);
        Ok(())
    }

    /// Flatten `patterns` into match and region candidates, resolving includes.
    fn candidates(&self, patterns: &'r [Pattern]) -> Vec<Candidate<'r>> {
        let mut out = Vec::new();
        let mut via = Vec::new();
        self.collect(patterns, &mut via, &mut out);
        out
    }

    fn collect(
        &self,
        patterns: &'r [Pattern],
        via: &mut Vec<&'r str>,
        out: &mut Vec<Candidate<'r>>,
    ) {
        for pattern in patterns {
            match pattern {
                Pattern::Include(name) => {
                    if via.contains(&name.as_str()) {
                        continue;
                    }
                    let Some(rule) = self.repository.get(name) else {
                        continue;
                    };
                    via.push(name);
                    match rule {
                        Rule::AnyOf(children) => self.collect(children, via, out),
                        _ => out.push(Candidate {
                            rule,
                            rules: via.clone(),
                        }),
                    }
                    via.pop();
                }
                Pattern::Inline(rule) => match rule.as_ref() {
                    Rule::AnyOf(children) => self.collect(children, via, out),
                    rule => out.push(Candidate {
                        rule,
                        rules: via.clone(),
                    }),
                },
            }
        }
    }

    fn find(
        &self,
        fragment: &Fragment,
        text: &str,
        pos: usize,
    ) -> Result<Option<Found>, GrammarError> {
        let mut regexes = self.regexes.borrow_mut();
        if !regexes.contains_key(fragment.as_str()) {
            // The host dialect's `$` matches before the line's trailing newline
            let regex = Regex::new(&format!("(?m){}", fragment)).map_err(|e| {
                GrammarError::invalid_pattern("scanner", "match", e.to_string())
            })?;
            regexes.insert(fragment.to_string(), regex);
        }
        let regex = &regexes[fragment.as_str()];
        let captures = regex.captures_from_pos(text, pos).map_err(|e| {
            GrammarError::invalid_pattern("scanner", "match", e.to_string())
        })?;
        Ok(captures.map(|caps| Found {
            groups: (0..caps.len())
                .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
                .collect(),
        }))
    }
}

fn with_scope(base: &[String], scope: Option<&str>) -> Vec<String> {
    let mut scopes = base.to_vec();
    if let Some(scope) = scope {
        scopes.push(scope.to_string());
    }
    scopes
}

fn push_text(
    result: &mut ScanResult,
    line: usize,
    text: &str,
    start: usize,
    end: usize,
    scopes: &[String],
    rules: &[String],
) {
    let end = end.min(text.len() - 1);
    push_span(result, line, text, start, end, scopes, rules);
}

fn push_span(
    result: &mut ScanResult,
    line: usize,
    text: &str,
    start: usize,
    end: usize,
    scopes: &[String],
    rules: &[String],
) {
    if start < end {
        result.tokens.push(ScopedToken {
            line,
            start,
            end,
            text: text[start..end].to_string(),
            scopes: scopes.to_vec(),
            rules: rules.to_vec(),
        });
    }
}

/// Push every tagged group, and the whole match when `whole` is set, group 0
/// is tagged, or no group is.
#[allow(clippy::too_many_arguments)]
fn push_captures(
    result: &mut ScanResult,
    line: usize,
    text: &str,
    found: &Found,
    captures: &Captures,
    whole: bool,
    scopes: &[String],
    rules: &[String],
) {
    for (index, group) in found.groups.iter().enumerate() {
        let Some((start, end)) = *group else {
            continue;
        };
        let tag = captures.get(index);
        let untagged_whole = index == 0 && (whole || captures.is_empty());
        if tag.is_none() && !untagged_whole {
            continue;
        }
        let scopes = with_scope(scopes, tag);
        if tag.is_some() {
            // A tagged group keeps the line's trailing newline
            push_span(result, line, text, start, end, &scopes, rules);
        } else {
            push_text(result, line, text, start, end, &scopes, rules);
        }
    }
}

/// Create an assertion builder for a scan result
pub fn assert_scan(result: &ScanResult) -> ScanAssertion<'_> {
    ScanAssertion { result }
}

pub struct ScanAssertion<'a> {
    result: &'a ScanResult,
}

impl<'a> ScanAssertion<'a> {
    /// Assert every region closed and no line stalled
    pub fn closed(self) -> Self {
        assert!(
            self.result.is_closed(),
            "Expected a closed scan, open regions: {:?}, stalled lines: {:?}",
            self.result.open_regions,
            self.result.stalled_lines
        );
        self
    }

    /// Assert the regions left open at end of input, outermost first
    pub fn open_regions(self, expected: &[&str]) -> Self {
        assert_eq!(
            self.result.open_regions, expected,
            "Unexpected open regions"
        );
        self
    }

    /// Assert on the first token whose text is `text`
    pub fn token<F>(self, text: &str, assertion: F) -> Self
    where
        F: FnOnce(TokenAssertion<'a>),
    {
        self.nth_token(text, 0, assertion)
    }

    /// Assert on the `n`th token whose text is `text`
    pub fn nth_token<F>(self, text: &str, n: usize, assertion: F) -> Self
    where
        F: FnOnce(TokenAssertion<'a>),
    {
        let result: &'a ScanResult = self.result;
        let token = result
            .tokens
            .iter()
            .filter(|token| token.text == text)
            .nth(n)
            .unwrap_or_else(|| {
                panic!(
                    "No token #{} with text {:?}; tokens: {:?}",
                    n,
                    text,
                    summarize(result)
                )
            });
        assertion(TokenAssertion { token });
        self
    }

    /// Assert that some token carries `scope`
    pub fn some_scope(self, scope: &str) -> Self {
        assert!(
            self.result.tokens_with_scope(scope).next().is_some(),
            "No token tagged {:?}; tokens: {:?}",
            scope,
            summarize(self.result)
        );
        self
    }

    /// Assert that no token carries `scope`
    pub fn no_scope(self, scope: &str) -> Self {
        let tagged: Vec<_> = self.result
            .tokens_with_scope(scope)
            .map(|t| &t.text)
            .collect();
        assert!(
            tagged.is_empty(),
            "Unexpected {:?} tokens: {:?}",
            scope,
            tagged
        );
        self
    }
}

pub struct TokenAssertion<'a> {
    token: &'a ScopedToken,
}

impl<'a> TokenAssertion<'a> {
    pub fn has_scope(self, scope: &str) -> Self {
        assert!(
            self.token.has_scope(scope),
            "Token {:?} lacks scope {:?}: {:?}",
            self.token.text,
            scope,
            self.token.scopes
        );
        self
    }

    pub fn lacks_scope(self, scope: &str) -> Self {
        assert!(
            !self.token.has_scope(scope),
            "Token {:?} unexpectedly has scope {:?}",
            self.token.text,
            scope
        );
        self
    }

    pub fn in_rule(self, rule: &str) -> Self {
        assert!(
            self.token.has_rule(rule),
            "Token {:?} not produced within rule {:?}: {:?}",
            self.token.text,
            rule,
            self.token.rules
        );
        self
    }

    pub fn not_in_rule(self, rule: &str) -> Self {
        assert!(
            !self.token.has_rule(rule),
            "Token {:?} unexpectedly within rule {:?}: {:?}",
            self.token.text,
            rule,
            self.token.rules
        );
        self
    }

    pub fn at(self, line: usize, start: usize) -> Self {
        assert_eq!(
            (self.token.line, self.token.start),
            (line, start),
            "Token {:?} at unexpected position",
            self.token.text
        );
        self
    }
}

fn summarize(result: &ScanResult) -> Vec<String> {
    result
        .tokens
        .iter()
        .map(|t| {
            let scopes = t.scopes.join(" > ");
            format!("{:?}@{}:{} {}", t.text, t.line, t.start, scopes)
        })
        .collect()
}
