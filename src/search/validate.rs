//! Rejects regex patterns with catastrophic-backtracking shape before
//! they reach any matching engine.

use crate::error::{IndexError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Longest accepted pattern.
pub const MAX_PATTERN_LENGTH: usize = 1000;

/// Heuristic score above which a pattern is refused.
const MAX_COMPLEXITY_SCORE: u32 = 10;

/// Nested quantifiers: `(a+)+`, `(a*)*`, ..
static RE_NESTED_QUANTIFIERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*[+*]\)[+*]").unwrap());

/// Alternation under a quantifier: `(a|b)+`, ..
static RE_QUANTIFIED_ALTERNATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*\|[^()]*\)[+*]").unwrap());

/// A quantified group whose body itself quantifies: `(a{2}b+)*`, ..
static RE_QUANTIFIER_IN_QUANTIFIED_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*[+*{][^()]*\)[+*{]").unwrap());

/// Heuristic complexity score; higher means more backtracking risk.
pub fn complexity_score(pattern: &str) -> u32 {
    let mut max_nesting = 0i32;
    let mut current = 0i32;
    for c in pattern.chars() {
        match c {
            '(' => {
                current += 1;
                max_nesting = max_nesting.max(current);
            }
            ')' => current -= 1,
            _ => {}
        }
    }

    let quantifiers =
        pattern.chars().filter(|c| matches!(c, '+' | '*' | '{' | '|')).count() as u32;
    let mut score = (max_nesting.max(0) as u32) * 2 + quantifiers;

    if RE_NESTED_QUANTIFIERS.is_match(pattern) {
        score += 50;
    }
    if RE_QUANTIFIED_ALTERNATION.is_match(pattern) {
        score += 30;
    }
    score
}

/// Validates a pattern, returning the rejection reason on refusal.
pub fn check(pattern: &str) -> std::result::Result<(), String> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(format!("pattern too long ({} > {MAX_PATTERN_LENGTH})", pattern.len()));
    }

    for (dangerous, reason) in [
        (&*RE_NESTED_QUANTIFIERS, "nested quantifiers can cause exponential backtracking"),
        (&*RE_QUANTIFIED_ALTERNATION, "alternation with quantifiers can cause backtracking"),
        (&*RE_QUANTIFIER_IN_QUANTIFIED_GROUP, "quantified group containing quantifiers"),
    ] {
        if dangerous.is_match(pattern) {
            return Err(format!("dangerous pattern detected: {reason}"));
        }
    }

    let complexity = complexity_score(pattern);
    if complexity > MAX_COMPLEXITY_SCORE {
        return Err(format!("pattern too complex (score: {complexity} > {MAX_COMPLEXITY_SCORE})"));
    }

    if let Err(err) = Regex::new(pattern) {
        return Err(format!("invalid regex pattern: {err}"));
    }
    Ok(())
}

/// Validates a pattern, mapping refusal to [`IndexError::UnsafePattern`].
pub fn validate(pattern: &str) -> Result<()> {
    check(pattern).map_err(IndexError::UnsafePattern)
}

/// Returns the pattern unchanged when safe, or its literal-escaped form
/// so it degrades to a substring search.
pub fn sanitize(pattern: &str) -> Cow<'_, str> {
    if check(pattern).is_ok() {
        Cow::Borrowed(pattern)
    } else {
        Cow::Owned(regex::escape(pattern))
    }
}
