//! Pattern Combinators
//!
//! Composite match expressions are never written as hand-assembled regex strings.
//! They are built from [`Fragment`]s through the pure functions in this module,
//! which keep every result self-contained: a fragment can be embedded anywhere
//! (concatenated, quantified, alternated) without changing its meaning or the
//! numbering of the capture groups it declares.
//!
//! The produced dialect is the one the host scanning runtime understands
//! (Oniguruma-compatible): lookaround assertions are allowed, backreferences
//! are never generated.
//!
//! ## Example
//!
//! ```text
//! sequence([capture("\\("), capture(whole_word("func", &word_char))])
//!     => (\()((?<![a-z])func(?![a-z]))
//! ```

use std::borrow::Cow;
use std::fmt;

/// An immutable, self-contained regular-language pattern fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fragment(Cow<'static, str>);

impl Fragment {
    /// A fragment from regex source text, usable in `const` items.
    ///
    /// The caller vouches that the source is a valid sub-pattern; lexeme
    /// tables are written this way.
    pub const fn raw(source: &'static str) -> Self {
        Self(Cow::Borrowed(source))
    }

    /// A fragment from runtime regex source text.
    pub fn new(source: impl Into<String>) -> Self {
        Self(Cow::Owned(source.into()))
    }

    /// A fragment matching `text` literally, with every metacharacter escaped.
    pub fn literal(text: &str) -> Self {
        Self::new(regex::escape(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a postfix quantifier applies to the whole fragment.
    fn is_atomic(&self) -> bool {
        let source = self.as_str();
        let mut chars = source.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (None, _, _) => false,
            (Some(c), None, _) => !matches!(c, '\\' | '|' | '(' | ')' | '[' | ']'),
            (Some('\\'), Some(_), None) => true,
            _ => closing_index(source) == Some(source.len() - 1),
        }
    }

    /// Wrap in a non-capturing group unless already atomic.
    fn grouped(self) -> Self {
        if self.is_atomic() {
            self
        } else {
            Self::new(format!("(?:{})", self))
        }
    }

    /// Wrap in a non-capturing group if an alternation is exposed at top level.
    fn sealed(self) -> Self {
        if has_top_level_alternation(self.as_str()) {
            Self::new(format!("(?:{})", self))
        } else {
            self
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fragment {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&'static str> for Fragment {
    fn from(source: &'static str) -> Self {
        Self::raw(source)
    }
}

impl From<String> for Fragment {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

/// Concatenation. Operands exposing a bare alternation are sealed first.
pub fn sequence<I>(parts: I) -> Fragment
where
    I: IntoIterator,
    I::Item: Into<Fragment>,
{
    let source: String = parts
        .into_iter()
        .map(|part| part.into().sealed().0)
        .collect();
    Fragment::new(source)
}

/// Ordered alternation; the leftmost operand that matches wins.
pub fn alternative<I>(options: I) -> Fragment
where
    I: IntoIterator,
    I::Item: Into<Fragment>,
{
    let mut options: Vec<Fragment> = options.into_iter().map(Into::into).collect();
    if options.len() == 1 {
        return options.remove(0).sealed();
    }
    let joined = options
        .iter()
        .map(Fragment::as_str)
        .collect::<Vec<_>>()
        .join("|");
    Fragment::new(format!("(?:{})", joined))
}

/// Non-capturing group.
pub fn group(inner: impl Into<Fragment>) -> Fragment {
    inner.into().grouped()
}

/// Capturing group. Adds exactly one group to the enclosing pattern.
pub fn capture(inner: impl Into<Fragment>) -> Fragment {
    let inner = inner.into();
    let source = inner.as_str();
    let body = match source.strip_prefix("(?:") {
        Some(rest) if inner.is_atomic() => &rest[..rest.len() - 1],
        _ => source,
    };
    Fragment::new(format!("({})", body))
}

pub fn optional(inner: impl Into<Fragment>) -> Fragment {
    Fragment::new(format!("{}?", inner.into().grouped()))
}

pub fn one_or_more(inner: impl Into<Fragment>) -> Fragment {
    Fragment::new(format!("{}+", inner.into().grouped()))
}

pub fn zero_or_more(inner: impl Into<Fragment>) -> Fragment {
    Fragment::new(format!("{}*", inner.into().grouped()))
}

/// Character class from its members, e.g. `set([" ", "\\t"])` is `[ \t]`.
pub fn set<I, S>(members: I) -> Fragment
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let body: String = members
        .into_iter()
        .map(|m| m.as_ref().to_string())
        .collect();
    Fragment::new(format!("[{}]", body))
}

pub fn look_ahead(inner: impl Into<Fragment>) -> Fragment {
    Fragment::new(format!("(?={})", inner.into()))
}

pub fn negative_look_ahead(inner: impl Into<Fragment>) -> Fragment {
    Fragment::new(format!("(?!{})", inner.into()))
}

pub fn look_behind(inner: impl Into<Fragment>) -> Fragment {
    Fragment::new(format!("(?<={})", inner.into()))
}

pub fn negative_look_behind(inner: impl Into<Fragment>) -> Fragment {
    Fragment::new(format!("(?<!{})", inner.into()))
}

/// `word` not preceded nor followed by a character of `word_char`.
///
/// A plain `\b` is not enough for formats whose identifiers contain
/// punctuation: `$func` has a word boundary before `func`.
pub fn whole_word(word: impl Into<Fragment>, word_char: &Fragment) -> Fragment {
    sequence([
        negative_look_behind(word_char.clone()),
        group(word),
        negative_look_ahead(word_char.clone()),
    ])
}

/// Zero-width anchor placed right after the most recent whole-word occurrence
/// of `word` in text already consumed on the current line.
///
/// Used by a rule nested in a region whose begin pattern consumed the keyword,
/// possibly after comments, to start exactly where the keyword ended.
pub fn last_whole_word(word: impl Into<Fragment>, word_char: &Fragment) -> Fragment {
    look_behind(whole_word(word, word_char))
}

/// Index of the delimiter closing the group or class opened at byte 0.
fn closing_index(source: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    match bytes.first()? {
        b'[' => class_end(bytes, 0),
        b'(' => {
            let mut depth = 0usize;
            let mut i = 0;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' => i += 1,
                    b'[' => i = class_end(bytes, i)?,
                    b'(' => depth += 1,
                    b')' => {
                        depth = depth.checked_sub(1)?;
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            None
        }
        _ => None,
    }
}

fn class_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if bytes.get(i) == Some(&b'^') {
        i += 1;
    }
    // A leading `]` is a member, not the terminator
    if bytes.get(i) == Some(&b']') {
        i += 1;
    }
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => i = class_end(bytes, i)?,
            b']' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn has_top_level_alternation(source: &str) -> bool {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => match class_end(bytes, i) {
                Some(end) => i = end,
                None => return false,
            },
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'|' if depth == 0 => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use fancy_regex::Regex;

    const WORD: Fragment = Fragment::raw("[0-9A-Za-z_$.]");

    fn compile(fragment: &Fragment) -> Regex {
        Regex::new(fragment.as_str()).expect("fragment to compile")
    }

    #[test]
    fn test_alternation_is_sealed_under_sequence() {
        let frag = sequence([Fragment::raw("x"), alternative(["a", "b"])]);
        assert_eq!(frag.as_str(), "x(?:a|b)");

        let raw = sequence([Fragment::raw("x"), Fragment::raw("a|b")]);
        assert_eq!(raw.as_str(), "x(?:a|b)");
        assert!(!compile(&raw).is_match("a").unwrap());
    }

    #[test]
    fn test_quantifiers_group_non_atomic_operands() {
        assert_eq!(optional("a").as_str(), "a?");
        assert_eq!(optional("ab").as_str(), "(?:ab)?");
        assert_eq!(one_or_more(set([" ", "\\t"])).as_str(), "[ \\t]+");
        assert_eq!(zero_or_more("\\d").as_str(), "\\d*");
        assert_eq!(optional(capture("ab")).as_str(), "(ab)?");
    }

    #[test]
    fn test_capture_reuses_non_capturing_group() {
        assert_eq!(capture(alternative(["32", "64"])).as_str(), "(32|64)");
        // Not a single group: `(?:a)(?:b)` must stay intact inside the capture
        assert_eq!(capture("(?:a)(?:b)").as_str(), "((?:a)(?:b))");
    }

    #[test]
    fn test_capture_groups_counted_in_order() {
        let frag = sequence([
            optional(capture(sequence([
                Fragment::raw("^"),
                one_or_more(set([" ", "\\t"])),
            ]))),
            capture(capture(";;")),
        ]);
        assert_eq!(compile(&frag).captures_len(), 4);
    }

    #[test]
    fn test_literal_escapes_metacharacters() {
        let frag = Fragment::literal("i32.const");
        let re = compile(&frag);
        assert!(re.is_match("i32.const").unwrap());
        assert!(!re.is_match("i32xconst").unwrap());
    }

    #[test]
    fn test_class_with_leading_bracket_is_atomic() {
        assert_eq!(optional("[]a]").as_str(), "[]a]?");
        assert_eq!(optional("[a](b)").as_str(), "(?:[a](b))?");
    }

    #[test]
    fn test_whole_word_rejects_identifier_prefix_and_suffix() {
        let re = compile(&whole_word("func", &WORD));
        assert!(re.is_match("(func)").unwrap());
        assert!(!re.is_match("$func").unwrap());
        assert!(!re.is_match("funcs").unwrap());
        assert!(!re.is_match("my.func").unwrap());
    }

    #[test]
    fn test_last_whole_word_is_zero_width_after_keyword() {
        let re = compile(&last_whole_word("import", &WORD));
        let text = "(import \"m\" \"n\")";
        let found = re.find(text).unwrap().expect("anchor after keyword");
        assert_eq!(found.start(), 7);
        assert_eq!(found.end(), 7);
    }

    #[test]
    fn test_lookaround_assertions_consume_nothing() {
        let frag = sequence([Fragment::raw("\\("), look_ahead("@")]);
        let re = compile(&frag);
        let found = re.find("(@custom)").unwrap().expect("annotation open");
        assert_eq!(found.as_str(), "(");
        assert!(!re.is_match("(module)").unwrap());
    }
}
