//! Rule-based sanitization of compiler arguments.
//!
//! The frontend's programmatic interface rejects or misbehaves on a number
//! of driver flags that are fine on a real compiler command line (PCH
//! plumbing, codegen tuning, diagnostics cosmetics). Rules describe which
//! argument shapes to drop; everything else passes through untouched.
//!
//! Rules are applied in document order and the first match consumes its
//! argument span. The built-in table ships embedded in the crate and an
//! optional user file appends to it.

use crate::{
    error::Result,
    utils,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The built-in rule table.
const DEFAULT_RULES: &str = include_str!("sanitization_rules.json");

/// One sanitization rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    #[serde(default)]
    pub description: String,
}

/// Matching behavior of a rule. See the module docs for the overall
/// algorithm; each variant documents how many arguments it consumes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// `arg == p` for any listed pattern; consumes 1.
    ExactMatch { patterns: Vec<String> },
    /// `arg.starts_with(p)` for any listed pattern; consumes 1.
    PrefixMatch { patterns: Vec<String> },
    /// `arg == pattern`; consumes 2 when the next argument is not
    /// flag-like, else 1.
    FlagWithOptionalValue { pattern: String },
    /// Exact positional match starting at `-Xclang`, with `<arg>` as a
    /// wildcard element; consumes the sequence length.
    XclangSequence { sequence: Vec<String> },
    /// Like `XclangSequence` plus a substring condition on one of the
    /// captured wildcards; consumes the sequence length iff it holds.
    XclangConditionalSequence { sequence: Vec<String>, condition: SequenceCondition },
    /// `-Xclang` followed by one of the listed options; consumes 3 when a
    /// bare value follows, else 2.
    XclangOptionWithValue { patterns: Vec<String> },
}

/// Condition on the wildcard captures of a conditional sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequenceCondition {
    /// Index into the captured `<arg>` wildcards.
    pub arg_index: usize,
    /// Lowercased substring alternatives; any hit satisfies the
    /// condition.
    pub contains: Vec<String>,
}

impl Rule {
    /// Number of arguments this rule consumes at `index`, 0 when it does
    /// not match.
    fn match_len(&self, args: &[String], index: usize) -> usize {
        let arg = &args[index];
        match &self.kind {
            RuleKind::ExactMatch { patterns } => {
                usize::from(patterns.iter().any(|p| p == arg))
            }
            RuleKind::PrefixMatch { patterns } => {
                usize::from(patterns.iter().any(|p| arg.starts_with(p.as_str())))
            }
            RuleKind::FlagWithOptionalValue { pattern } => {
                if arg != pattern {
                    return 0;
                }
                match args.get(index + 1) {
                    Some(next) if !next.starts_with('-') => 2,
                    _ => 1,
                }
            }
            RuleKind::XclangSequence { sequence } => {
                match_sequence(args, index, sequence).map_or(0, |_| sequence.len())
            }
            RuleKind::XclangConditionalSequence { sequence, condition } => {
                let Some(captured) = match_sequence(args, index, sequence) else { return 0 };
                let Some(capture) = captured.get(condition.arg_index) else { return 0 };
                let capture = capture.to_lowercase();
                if condition.contains.iter().any(|needle| capture.contains(needle.as_str())) {
                    sequence.len()
                } else {
                    0
                }
            }
            RuleKind::XclangOptionWithValue { patterns } => {
                if arg != "-Xclang" {
                    return 0;
                }
                let Some(option) = args.get(index + 1) else { return 0 };
                if !patterns.iter().any(|p| p == option) {
                    return 0;
                }
                match args.get(index + 2) {
                    Some(value) if !value.starts_with('-') => 3,
                    _ => 2,
                }
            }
        }
    }

    fn type_name(&self) -> &'static str {
        match self.kind {
            RuleKind::ExactMatch { .. } => "exact_match",
            RuleKind::PrefixMatch { .. } => "prefix_match",
            RuleKind::FlagWithOptionalValue { .. } => "flag_with_optional_value",
            RuleKind::XclangSequence { .. } => "xclang_sequence",
            RuleKind::XclangConditionalSequence { .. } => "xclang_conditional_sequence",
            RuleKind::XclangOptionWithValue { .. } => "xclang_option_with_value",
        }
    }
}

/// Matches an `-Xclang` sequence at `index` and returns the wildcard
/// captures on success.
fn match_sequence<'a>(
    args: &'a [String],
    index: usize,
    sequence: &[String],
) -> Option<Vec<&'a str>> {
    if args[index] != "-Xclang" || sequence.len() < 2 || index + sequence.len() > args.len() {
        return None;
    }
    let mut captured = Vec::new();
    for (offset, expected) in sequence.iter().enumerate() {
        let actual = &args[index + offset];
        if expected == "<arg>" {
            captured.push(actual.as_str());
        } else if actual != expected {
            return None;
        }
    }
    Some(captured)
}

/// On-disk shape of a rules file.
#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    rules: Vec<Rule>,
}

/// Summary of the loaded rule set for introspection.
#[derive(Clone, Debug, Serialize)]
pub struct RulesInfo {
    pub version: String,
    pub rule_count: usize,
    pub rules: Vec<RuleSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RuleSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: &'static str,
    pub description: String,
}

/// An ordered rule table.
#[derive(Clone, Debug)]
pub struct RuleSet {
    version: String,
    rules: Vec<Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleSet {
    /// The embedded default rules.
    pub fn builtin() -> Self {
        let file: RulesFile =
            serde_json::from_str(DEFAULT_RULES).expect("embedded sanitization rules are valid");
        Self { version: file.version, rules: file.rules }
    }

    /// Loads the built-in rules and appends the user file when given.
    ///
    /// A malformed user file is logged and ignored; the built-in table
    /// keeps working.
    pub fn load(custom_rules: Option<&Path>) -> Self {
        let mut set = Self::builtin();
        if let Some(path) = custom_rules {
            match set.append_file(path) {
                Ok(count) => debug!("loaded {count} sanitization rules from \"{}\"", path.display()),
                Err(err) => {
                    warn!(
                        "failed to load sanitization rules from \"{}\": {err}, using built-in rules",
                        path.display()
                    );
                }
            }
        }
        set
    }

    /// Appends rules from a JSON file, in file order.
    pub fn append_file(&mut self, path: &Path) -> Result<usize> {
        let file: RulesFile = utils::read_json_file(path)?;
        let count = file.rules.len();
        self.rules.extend(file.rules);
        Ok(count)
    }

    /// Applies all rules to the argument list. The first matching rule
    /// consumes its span; non-matching arguments pass through.
    pub fn sanitize(&self, args: &[String]) -> Vec<String> {
        let mut sanitized = Vec::with_capacity(args.len());
        let mut index = 0;
        while index < args.len() {
            let skip = self
                .rules
                .iter()
                .find_map(|rule| match rule.match_len(args, index) {
                    0 => None,
                    len => Some(len),
                })
                .unwrap_or(0);
            if skip == 0 {
                sanitized.push(args[index].clone());
                index += 1;
            } else {
                index += skip;
            }
        }
        sanitized
    }

    pub fn info(&self) -> RulesInfo {
        RulesInfo {
            version: self.version.clone(),
            rule_count: self.rules.len(),
            rules: self
                .rules
                .iter()
                .map(|rule| RuleSummary {
                    id: rule.id.clone(),
                    rule_type: rule.type_name(),
                    description: rule.description.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builtin_rules_parse() {
        let set = RuleSet::builtin();
        assert!(set.info().rule_count > 0);
        assert!(set.info().rules.iter().any(|r| r.id == "pch-winvalid"));
    }

    #[test]
    fn exact_match_removes_debug_and_optimization() {
        let set = RuleSet::builtin();
        let result = set.sanitize(&args(&["-std=c++17", "-g", "-Wall", "-O0", "-Werror"]));
        assert_eq!(result, args(&["-std=c++17", "-Wall", "-Werror"]));
    }

    #[test]
    fn prefix_match_removes_codegen_limits() {
        let set = RuleSet::builtin();
        let result = set.sanitize(&args(&[
            "-std=c++17",
            "-fconstexpr-steps=10000",
            "-fconstexpr-depth=512",
            "-ftemplate-depth=768",
            "-Wall",
        ]));
        assert_eq!(result, args(&["-std=c++17", "-Wall"]));
    }

    #[test]
    fn flag_with_optional_value_takes_its_value() {
        let set = RuleSet::builtin();
        let result =
            set.sanitize(&args(&["-std=c++17", "-include-pch", "/path/to/file.pch", "-Wall"]));
        assert_eq!(result, args(&["-std=c++17", "-Wall"]));

        // trailing flag without a value
        let result = set.sanitize(&args(&["-std=c++17", "-Wall", "-include-pch"]));
        assert_eq!(result, args(&["-std=c++17", "-Wall"]));
    }

    #[test]
    fn xclang_sequence_removes_pch_plumbing() {
        let set = RuleSet::builtin();
        let result = set.sanitize(&args(&[
            "-std=c++17",
            "-Xclang",
            "-include-pch",
            "-Xclang",
            "/path/to/file.pch",
            "-Wall",
        ]));
        assert_eq!(result, args(&["-std=c++17", "-Wall"]));
    }

    #[test]
    fn conditional_sequence_checks_the_capture() {
        let set = RuleSet::builtin();
        // pch include is dropped
        let result = set.sanitize(&args(&[
            "-std=c++17",
            "-Xclang",
            "-include",
            "-Xclang",
            "cmake_pch.hxx",
        ]));
        assert_eq!(result, args(&["-std=c++17"]));

        // a regular forced include through -Xclang stays
        let result =
            set.sanitize(&args(&["-std=c++17", "-Xclang", "-include", "-Xclang", "config.h"]));
        assert_eq!(
            result,
            args(&["-std=c++17", "-Xclang", "-include", "-Xclang", "config.h"])
        );
    }

    #[test]
    fn xclang_option_with_value_spans_three() {
        let set = RuleSet::builtin();
        let result = set.sanitize(&args(&[
            "-std=c++17",
            "-Xclang",
            "-fmodules-cache-path",
            "/path/to/cache",
            "-Wall",
        ]));
        assert_eq!(result, args(&["-std=c++17", "-Wall"]));
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut set = RuleSet::builtin();
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("rules.json");
        std::fs::write(
            &custom,
            r#"{
                "version": "test",
                "rules": [
                    { "id": "custom", "type": "exact_match", "patterns": ["-my-custom-flag"] }
                ]
            }"#,
        )
        .unwrap();
        set.append_file(&custom).unwrap();

        let result = set.sanitize(&args(&["-std=c++17", "-my-custom-flag", "-Wall"]));
        assert_eq!(result, args(&["-std=c++17", "-Wall"]));
    }

    #[test]
    fn essentials_are_preserved() {
        let set = RuleSet::builtin();
        let input = args(&[
            "-std=c++20",
            "-I/abs/include",
            "-isystem",
            "/abs/sys",
            "-DNDEBUG",
            "-DFOO=bar",
            "-Wall",
            "-Wextra",
            "-include",
            "/abs/prefix.h",
        ]);
        assert_eq!(set.sanitize(&input), input);
    }

    #[test]
    fn malformed_user_file_keeps_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        let set = RuleSet::load(Some(&bad));
        assert!(set.info().rule_count > 0);
    }
}
