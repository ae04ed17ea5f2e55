//! Qualified-name pattern classification and matching.
//!
//! A pattern is exactly one of four kinds:
//!
//! - `::View` — exact, global namespace only
//! - `View` — unqualified, matches the last component
//! - `ui::View` — suffix, component-aligned (`app::ui::View` yes,
//!   `myui::View` no)
//! - `app::.*::View` — regex, case-insensitive full match
//!
//! Whitespace around `*` and `&` is collapsed on both sides before
//! matching so `Container<Widget *>` and `Container<Widget*>` compare
//! equal.

use crate::{
    error::Result,
    search::validate,
};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Characters that make a pattern a regex.
const REGEX_METACHARACTERS: &[char] =
    &['.', '*', '+', '?', '[', ']', '{', '}', '(', ')', '|', '\\', '^', '$'];

static RE_SPACE_BEFORE_PTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([*&])").unwrap());
static RE_SPACE_AFTER_PTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"([*&])\s+").unwrap());

/// Collapses whitespace around pointer and reference operators, leaving
/// spaces inside type names (`unsigned int`) alone.
pub fn normalize_type_whitespace(name: &str) -> String {
    let name = RE_SPACE_BEFORE_PTR.replace_all(name, "$1");
    RE_SPACE_AFTER_PTR.replace_all(&name, "$1").into_owned()
}

/// The four pattern kinds; see the module docs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternKind {
    Exact,
    Regex,
    Unqualified,
    Suffix,
}

/// Classifies a pattern. Empty patterns classify as unqualified and
/// match everything.
pub fn classify(pattern: &str) -> PatternKind {
    if pattern.is_empty() {
        return PatternKind::Unqualified;
    }
    if pattern.starts_with("::") {
        return PatternKind::Exact;
    }
    if pattern.contains(REGEX_METACHARACTERS) {
        return PatternKind::Regex;
    }
    if !pattern.contains("::") {
        return PatternKind::Unqualified;
    }
    PatternKind::Suffix
}

/// A classified, validated and (for regexes) pre-compiled pattern.
#[derive(Debug)]
pub struct QualifiedPattern {
    normalized: String,
    kind: PatternKind,
    regex: Option<Regex>,
}

impl QualifiedPattern {
    /// Classifies and prepares the pattern. Regex patterns go through
    /// the safety validator first and fail with a structured error when
    /// refused.
    pub fn new(pattern: &str) -> Result<Self> {
        let kind = classify(pattern);
        let normalized = normalize_type_whitespace(pattern);
        let regex = if kind == PatternKind::Regex {
            validate::validate(&normalized)?;
            Some(
                RegexBuilder::new(&format!("^(?:{normalized})$"))
                    .case_insensitive(true)
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self { normalized, kind, regex })
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn is_regex(&self) -> bool {
        self.kind == PatternKind::Regex
    }

    /// Matches a qualified name, applying whitespace normalization to
    /// the name first.
    pub fn matches(&self, qualified_name: &str) -> bool {
        if self.normalized.is_empty() {
            return true;
        }
        let qualified_name = normalize_type_whitespace(qualified_name);

        match self.kind {
            PatternKind::Exact => qualified_name == self.normalized[2..],
            PatternKind::Regex => {
                self.regex.as_ref().is_some_and(|regex| regex.is_match(&qualified_name))
            }
            PatternKind::Unqualified => {
                let unqualified = qualified_name.rsplit("::").next().unwrap_or(&qualified_name);
                unqualified.eq_ignore_ascii_case(&self.normalized)
            }
            PatternKind::Suffix => {
                let name_parts: Vec<&str> = qualified_name.split("::").collect();
                let pattern_parts: Vec<&str> = self.normalized.split("::").collect();
                if pattern_parts.len() > name_parts.len() {
                    return false;
                }
                name_parts[name_parts.len() - pattern_parts.len()..]
                    .iter()
                    .zip(&pattern_parts)
                    .all(|(name, pattern)| name.eq_ignore_ascii_case(pattern))
            }
        }
    }
}

/// Namespace filter semantics: exact match, suffix match at a `::`
/// boundary, and the empty filter meaning global namespace only.
pub fn matches_namespace(symbol_namespace: &str, filter_namespace: &str) -> bool {
    if filter_namespace.is_empty() {
        return symbol_namespace.is_empty();
    }
    if symbol_namespace == filter_namespace {
        return true;
    }
    symbol_namespace
        .strip_suffix(filter_namespace)
        .is_some_and(|prefix| prefix.ends_with("::"))
}
