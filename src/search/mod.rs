//! Pattern queries over the in-memory indexes.
//!
//! All queries run against the analyzer's indexes under the shared
//! reader lock and never touch the cache backend, so they can run
//! concurrently with parsing.

use crate::{
    analyzer::SymbolIndexes,
    error::Result,
    extract::strip_template_args,
    symbols::{Access, Symbol, SymbolKind, TemplateKind, TemplateParameter},
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

pub mod pattern;
pub mod validate;
pub use pattern::{classify, matches_namespace, normalize_type_whitespace, PatternKind, QualifiedPattern};

/// Filters applied on top of the name pattern.
#[derive(Clone, Debug)]
pub struct SearchFilters {
    /// Restrict to symbols from files under the project root.
    pub project_only: bool,
    /// Suffix match on the symbol's file path. When set, the search runs
    /// over the per-file index so header declarations shadowed by
    /// definition-wins still surface.
    pub file_name: Option<String>,
    /// Namespace filter; empty string means global namespace only.
    pub namespace: Option<String>,
    /// Class filter for methods, simple or qualified.
    pub class_name: Option<String>,
    /// Case-insensitive substring over the callable signature. Symbols
    /// without a signature never match a non-empty filter.
    pub signature_pattern: Option<String>,
    /// Truncate the result list, reporting the pre-truncation count.
    pub max_results: Option<usize>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            project_only: true,
            file_name: None,
            namespace: None,
            class_name: None,
            signature_pattern: None,
            max_results: None,
        }
    }
}

/// One search hit, flattened for tool output.
#[derive(Clone, Debug, Serialize)]
pub struct SymbolMatch {
    pub name: String,
    pub qualified_name: String,
    pub namespace: String,
    pub kind: SymbolKind,
    pub file: PathBuf,
    pub line: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub is_definition: bool,
    pub is_project: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub base_classes: Vec<String>,
    pub is_virtual: bool,
    pub is_pure_virtual: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub is_template: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_kind: Option<TemplateKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_parameters: Vec<TemplateParameter>,
    /// Qualified name of the primary template for specializations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
}

/// A possibly truncated result list with its pre-truncation count.
#[derive(Clone, Debug, Serialize)]
pub struct SearchResults {
    pub results: Vec<SymbolMatch>,
    pub total: usize,
}

/// Combined class and function results for `search_symbols`.
#[derive(Clone, Debug, Serialize)]
pub struct SymbolSearchResults {
    pub classes: Vec<SymbolMatch>,
    pub functions: Vec<SymbolMatch>,
    pub total: usize,
}

/// Full class record for `get_class_info`.
#[derive(Clone, Debug, Serialize)]
pub struct ClassInfo {
    #[serde(flatten)]
    pub class: SymbolMatch,
    pub methods: Vec<SymbolMatch>,
}

/// Structured ambiguity record instead of guessing among same-named
/// classes.
#[derive(Clone, Debug, Serialize)]
pub struct Ambiguity {
    pub error: String,
    pub is_ambiguous: bool,
    pub matches: Vec<AmbiguityCandidate>,
    pub suggestion: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct AmbiguityCandidate {
    pub name: String,
    pub qualified_name: String,
    pub namespace: String,
    pub kind: SymbolKind,
    pub file: PathBuf,
    pub line: u32,
}

/// Outcome of a class lookup.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ClassLookup {
    Found(Box<ClassInfo>),
    Ambiguous(Ambiguity),
}

/// Query engine over the shared in-memory indexes.
#[derive(Clone)]
pub struct SearchEngine {
    indexes: Arc<RwLock<SymbolIndexes>>,
}

impl SearchEngine {
    pub fn new(indexes: Arc<RwLock<SymbolIndexes>>) -> Self {
        Self { indexes }
    }

    /// Searches class-like symbols by qualified-name pattern.
    pub fn search_classes(&self, pattern: &str, filters: &SearchFilters) -> Result<SearchResults> {
        let compiled = QualifiedPattern::new(pattern)?;
        let indexes = self.indexes.read().unwrap();
        let mut results = Vec::new();

        let accept = |symbol: &Symbol| {
            self.accept_common(symbol, filters)
                && compiled.matches(qualified_or_name(symbol))
        };

        if let Some(file_name) = &filters.file_name {
            for (file, symbols) in &indexes.file_index {
                if !path_ends_with(file, file_name) {
                    continue;
                }
                for symbol in symbols {
                    if symbol.kind.is_class_like() && accept(symbol) {
                        results.push(to_match(symbol, &indexes));
                    }
                }
            }
        } else {
            for symbols in indexes.class_index.values() {
                for symbol in symbols {
                    if accept(symbol) {
                        results.push(to_match(symbol, &indexes));
                    }
                }
            }
        }

        Ok(finish(results, filters.max_results))
    }

    /// Searches callables by qualified-name pattern. Regex patterns also
    /// try the unqualified name, so `test.*` finds both `testFn` and
    /// `Suite::testMethod`.
    pub fn search_functions(
        &self,
        pattern: &str,
        filters: &SearchFilters,
    ) -> Result<SearchResults> {
        let compiled = QualifiedPattern::new(pattern)?;
        let class_name =
            filters.class_name.as_deref().map(|name| extract_simple_name(name).to_string());
        let indexes = self.indexes.read().unwrap();
        let mut results = Vec::new();

        let accept = |symbol: &Symbol| {
            if !self.accept_common(symbol, filters) {
                return false;
            }
            if let Some(class_name) = &class_name {
                if symbol.parent_class.as_deref() != Some(class_name.as_str()) {
                    return false;
                }
            }
            if let Some(signature_pattern) = &filters.signature_pattern {
                if !signature_contains(symbol.signature.as_deref(), signature_pattern) {
                    return false;
                }
            }
            compiled.matches(qualified_or_name(symbol))
                || (compiled.is_regex() && compiled.matches(&symbol.name))
        };

        if let Some(file_name) = &filters.file_name {
            for (file, symbols) in &indexes.file_index {
                if !path_ends_with(file, file_name) {
                    continue;
                }
                for symbol in symbols {
                    if symbol.kind.is_callable() && accept(symbol) {
                        results.push(to_match(symbol, &indexes));
                    }
                }
            }
        } else {
            for symbols in indexes.function_index.values() {
                for symbol in symbols {
                    if accept(symbol) {
                        results.push(to_match(symbol, &indexes));
                    }
                }
            }
        }

        Ok(finish(results, filters.max_results))
    }

    /// Searches classes and functions together, optionally restricted by
    /// symbol type names. Truncation keeps classes first.
    pub fn search_symbols(
        &self,
        pattern: &str,
        symbol_types: Option<&[String]>,
        filters: &SearchFilters,
    ) -> Result<SymbolSearchResults> {
        let wants = |kinds: &[&str]| {
            symbol_types
                .map(|types| types.iter().any(|t| kinds.contains(&t.as_str())))
                .unwrap_or(true)
        };
        let untruncated = SearchFilters { max_results: None, ..filters.clone() };

        let mut classes = if wants(&["class", "struct"]) {
            self.search_classes(pattern, &untruncated)?.results
        } else {
            Vec::new()
        };
        let mut functions = if wants(&["function", "method"]) {
            self.search_functions(pattern, &untruncated)?.results
        } else {
            Vec::new()
        };

        let total = classes.len() + functions.len();
        if let Some(max_results) = filters.max_results {
            classes.truncate(max_results);
            functions.truncate(max_results.saturating_sub(classes.len()));
        }
        Ok(SymbolSearchResults { classes, functions, total })
    }

    /// Resolves a class by simple or (partially) qualified name,
    /// returning its full record or a structured ambiguity.
    pub fn get_class_info(&self, class_name: &str) -> Result<Option<ClassLookup>> {
        let indexes = self.indexes.read().unwrap();

        let has_template_args = class_name.contains('<');
        let lookup_name = strip_template_args(class_name);
        let is_qualified = lookup_name.contains("::");
        let mut simple_name = extract_simple_name(lookup_name).to_string();

        let mut candidates = indexes.class_index.get(&simple_name);
        if candidates.is_none() {
            // case-insensitive fallback over the index keys
            if let Some((key, bucket)) = indexes
                .class_index
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(&simple_name))
            {
                simple_name = key.clone();
                candidates = Some(bucket);
            }
        }
        let Some(candidates) = candidates else { return Ok(None) };

        let chosen: Arc<Symbol> = if is_qualified {
            let compiled = QualifiedPattern::new(lookup_name)?;
            let matching: Vec<&Arc<Symbol>> = candidates
                .iter()
                .filter(|candidate| compiled.matches(qualified_or_name(candidate)))
                .collect();
            if matching.is_empty() {
                return Ok(None);
            }
            richest_definition(&matching).clone()
        } else {
            if candidates.len() > 1 {
                if has_template_args {
                    let specializations: Vec<&Arc<Symbol>> = candidates
                        .iter()
                        .filter(|candidate| candidate.is_template_specialization())
                        .collect();
                    match specializations.len() {
                        1 => specializations[0].clone(),
                        0 => {
                            return Ok(Some(ambiguity(class_name, candidates, false)));
                        }
                        _ => {
                            return Ok(Some(ambiguity(
                                class_name,
                                &specializations.into_iter().cloned().collect::<Vec<_>>(),
                                true,
                            )));
                        }
                    }
                } else {
                    return Ok(Some(ambiguity(class_name, candidates, false)));
                }
            } else {
                let all: Vec<&Arc<Symbol>> = candidates.iter().collect();
                richest_definition(&all).clone()
            }
        };

        let methods = collect_methods(&indexes, &chosen, &simple_name);
        Ok(Some(ClassLookup::Found(Box::new(ClassInfo {
            class: to_match(&chosen, &indexes),
            methods,
        }))))
    }

    /// Signatures of all callables matching the name, optionally
    /// filtered by class. Class scope is injected into the rendered
    /// signature.
    pub fn get_function_signature(
        &self,
        function_name: &str,
        class_name: Option<&str>,
    ) -> Vec<String> {
        let indexes = self.indexes.read().unwrap();

        let lookup_name = strip_template_args(function_name);
        let is_qualified = lookup_name.contains("::");
        let simple_name = extract_simple_name(lookup_name).to_string();
        let class_name = class_name.map(|name| extract_simple_name(name).to_string());

        let compiled = if is_qualified { QualifiedPattern::new(lookup_name).ok() } else { None };
        if is_qualified && compiled.is_none() {
            return Vec::new();
        }

        let candidates = indexes
            .function_index
            .get(&simple_name)
            .or_else(|| {
                indexes
                    .function_index
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&simple_name))
                    .map(|(_, bucket)| bucket)
            });
        let Some(candidates) = candidates else { return Vec::new() };

        let mut signatures = Vec::new();
        for info in candidates {
            if let Some(compiled) = &compiled {
                if !compiled.matches(qualified_or_name(info)) {
                    continue;
                }
            }
            if let Some(class_name) = &class_name {
                if info.parent_class.as_deref() != Some(class_name.as_str()) {
                    // out-of-line methods may carry an empty parent, the
                    // qualified name decides then
                    let scoped = format!("{class_name}::");
                    let qualified = &info.qualified_name;
                    if !(qualified.starts_with(&scoped)
                        || qualified.contains(&format!("::{scoped}")))
                    {
                        continue;
                    }
                }
            }
            let Some(signature) = &info.signature else { continue };
            if class_name.is_some() || info.parent_class.is_some() {
                let scope = info
                    .parent_class
                    .clone()
                    .or_else(|| class_name.clone())
                    .unwrap_or_default();
                signatures.push(inject_scope(signature, &info.name, &scope));
            } else {
                signatures.push(signature.clone());
            }
        }
        signatures
    }

    /// Classes whose base list names the target, template
    /// specializations of a base included.
    pub fn get_derived_classes(&self, class_name: &str) -> Vec<SymbolMatch> {
        let indexes = self.indexes.read().unwrap();
        let target = extract_simple_name(class_name);

        let mut derived = Vec::new();
        for symbols in indexes.class_index.values() {
            for symbol in symbols {
                let inherits = symbol.base_classes.iter().any(|base| {
                    let base = base.trim_start_matches("class ").trim_start_matches("struct ");
                    extract_simple_name(base) == target
                });
                if inherits {
                    derived.push(to_match(symbol, &indexes));
                }
            }
        }
        derived.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        derived
    }

    /// All symbols owned by files whose path ends with `file_name`,
    /// straight from the per-file index.
    pub fn find_symbols_in_file(&self, file_name: &str) -> Vec<SymbolMatch> {
        let indexes = self.indexes.read().unwrap();
        let mut results = Vec::new();
        for (file, symbols) in &indexes.file_index {
            if path_ends_with(file, file_name) {
                results.extend(symbols.iter().map(|symbol| to_match(symbol, &indexes)));
            }
        }
        results.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
        results
    }

    /// Indexed file names similar to the query, for error suggestions.
    pub fn similar_file_names(&self, file_name: &str) -> Vec<PathBuf> {
        let indexes = self.indexes.read().unwrap();
        let needle = Path::new(file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| file_name.to_lowercase());
        let mut similar: Vec<PathBuf> = indexes
            .file_index
            .keys()
            .filter(|file| {
                file.file_name()
                    .map(|name| name.to_string_lossy().to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        similar.sort();
        similar
    }

    fn accept_common(&self, symbol: &Symbol, filters: &SearchFilters) -> bool {
        if filters.project_only && !symbol.is_project {
            return false;
        }
        if let Some(namespace) = &filters.namespace {
            if !matches_namespace(&symbol.namespace, namespace) {
                return false;
            }
        }
        true
    }
}

fn qualified_or_name(symbol: &Symbol) -> &str {
    if symbol.qualified_name.is_empty() { &symbol.name } else { &symbol.qualified_name }
}

fn path_ends_with(path: &Path, suffix: &str) -> bool {
    path.to_string_lossy().ends_with(suffix)
}

fn signature_contains(signature: Option<&str>, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    match signature {
        Some(signature) => normalize_type_whitespace(signature)
            .to_lowercase()
            .contains(&normalize_type_whitespace(pattern).to_lowercase()),
        None => false,
    }
}

/// `void f(int)` with scope `C` becomes `void C::f(int)`.
fn inject_scope(signature: &str, name: &str, scope: &str) -> String {
    if scope.is_empty() {
        return signature.to_string();
    }
    let target = format!("{name}(");
    match signature.find(&target) {
        Some(idx) => format!("{}{scope}::{}", &signature[..idx], &signature[idx..]),
        None => format!("{scope}::{signature}"),
    }
}

fn extract_simple_name(name: &str) -> &str {
    let name = strip_template_args(name);
    name.rsplit("::").next().unwrap_or(name)
}

/// Prefers the richest definition among candidates, falling back to the
/// first.
fn richest_definition<'a>(candidates: &[&'a Arc<Symbol>]) -> &'a Arc<Symbol> {
    let mut best: Option<&'a Arc<Symbol>> = None;
    for candidate in candidates {
        if candidate.is_definition {
            match best {
                Some(current) if !candidate.is_richer_than(current) => {}
                _ => best = Some(candidate),
            }
        }
    }
    best.unwrap_or(candidates[0])
}

fn ambiguity(class_name: &str, candidates: &[Arc<Symbol>], template: bool) -> ClassLookup {
    let what = if template { "template specialization" } else { "class name" };
    ClassLookup::Ambiguous(Ambiguity {
        error: format!("Ambiguous {what} '{class_name}'"),
        is_ambiguous: true,
        matches: candidates
            .iter()
            .map(|candidate| AmbiguityCandidate {
                name: candidate.name.clone(),
                qualified_name: qualified_or_name(candidate).to_string(),
                namespace: candidate.namespace.clone(),
                kind: candidate.kind,
                file: candidate.file.clone(),
                line: candidate.line,
            })
            .collect(),
        suggestion: "Use qualified name to disambiguate".to_string(),
    })
}

fn collect_methods(
    indexes: &SymbolIndexes,
    class: &Arc<Symbol>,
    simple_name: &str,
) -> Vec<SymbolMatch> {
    let class_qualified = &class.qualified_name;
    let prefix = format!("{class_qualified}::");
    let mut methods = Vec::new();

    for bucket in indexes.function_index.values() {
        for info in bucket {
            let belongs = if info.parent_class.as_deref() == Some(simple_name) {
                // same simple parent name: the qualified prefix
                // disambiguates between same-named classes
                class_qualified.is_empty()
                    || info.qualified_name.is_empty()
                    || info.qualified_name.starts_with(&prefix)
            } else if !class_qualified.is_empty() && !info.qualified_name.is_empty() {
                // out-of-line definitions may carry no parent class
                info.qualified_name.starts_with(&prefix)
            } else {
                false
            };
            if belongs {
                methods.push(to_match(info, indexes));
            }
        }
    }
    methods.sort_by_key(|method| method.line);
    methods
}

fn to_match(symbol: &Symbol, indexes: &SymbolIndexes) -> SymbolMatch {
    let specialization_of = symbol.primary_template_usr().and_then(|usr| {
        indexes.usr_index.get(usr).map(|primary| qualified_or_name(primary).to_string())
    });
    SymbolMatch {
        name: symbol.name.clone(),
        qualified_name: symbol.qualified_name.clone(),
        namespace: symbol.namespace.clone(),
        kind: symbol.kind,
        file: symbol.file.clone(),
        line: symbol.line,
        start_line: symbol.start_line,
        end_line: symbol.end_line,
        is_definition: symbol.is_definition,
        is_project: symbol.is_project,
        signature: symbol.signature.clone(),
        parent_class: symbol.parent_class.clone(),
        access: symbol.access,
        base_classes: symbol.base_classes.clone(),
        is_virtual: symbol.is_virtual,
        is_pure_virtual: symbol.is_pure_virtual,
        is_static: symbol.is_static,
        is_const: symbol.is_const,
        is_template: symbol.is_template(),
        template_kind: symbol.template_kind(),
        template_parameters: symbol
            .template
            .as_ref()
            .map(|template| template.parameters.clone())
            .unwrap_or_default(),
        specialization_of,
        brief: symbol.brief.clone(),
        doc_comment: symbol.doc_comment.clone(),
    }
}

fn finish(mut results: Vec<SymbolMatch>, max_results: Option<usize>) -> SearchResults {
    // hash map iteration order leaks otherwise
    results.sort_by(|a, b| {
        (&a.qualified_name, &a.file, a.line).cmp(&(&b.qualified_name, &b.file, b.line))
    });
    let total = results.len();
    if let Some(max_results) = max_results {
        results.truncate(max_results);
    }
    SearchResults { results, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{TemplateInfo, TemplateParameterKind};
    use pretty_assertions::assert_eq;

    fn symbol(
        name: &str,
        namespace: &str,
        kind: SymbolKind,
        file: &str,
        line: u32,
    ) -> Symbol {
        let qualified_name = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}::{name}")
        };
        Symbol {
            usr: format!("c:@{qualified_name}@{file}"),
            name: name.to_string(),
            qualified_name,
            namespace: namespace.to_string(),
            kind,
            file: PathBuf::from(file),
            line,
            column: 1,
            start_line: line,
            end_line: line + 3,
            signature: kind.is_callable().then(|| format!("void {name}(int)")),
            parent_class: None,
            access: None,
            base_classes: Vec::new(),
            is_virtual: false,
            is_pure_virtual: false,
            is_static: false,
            is_const: false,
            is_definition: true,
            is_project: true,
            template: None,
            brief: None,
            doc_comment: None,
        }
    }

    fn engine(symbols: Vec<Symbol>) -> SearchEngine {
        let mut indexes = SymbolIndexes::default();
        let mut by_file: std::collections::BTreeMap<PathBuf, Vec<Symbol>> = Default::default();
        for symbol in symbols {
            by_file.entry(symbol.file.clone()).or_default().push(symbol);
        }
        for (file, symbols) in by_file {
            indexes.replace_file(&file, symbols);
        }
        SearchEngine::new(Arc::new(RwLock::new(indexes)))
    }

    fn two_views() -> SearchEngine {
        engine(vec![
            symbol("View", "app::ui", SymbolKind::Class, "/p/app.h", 10),
            symbol("View", "legacy::ui", SymbolKind::Class, "/p/legacy.h", 20),
        ])
    }

    #[test]
    fn unqualified_pattern_finds_all_namespaces() {
        let results = two_views().search_classes("View", &SearchFilters::default()).unwrap();
        assert_eq!(results.total, 2);
    }

    #[test]
    fn suffix_pattern_matches_component_aligned() {
        let results = two_views().search_classes("ui::View", &SearchFilters::default()).unwrap();
        assert_eq!(results.total, 2);
    }

    #[test]
    fn global_pattern_matches_nothing_for_namespaced_classes() {
        let results = two_views().search_classes("::View", &SearchFilters::default()).unwrap();
        assert_eq!(results.total, 0);
    }

    #[test]
    fn regex_pattern_narrows_to_one_namespace() {
        let results =
            two_views().search_classes("app::.*::View", &SearchFilters::default()).unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.results[0].qualified_name, "app::ui::View");
    }

    #[test]
    fn unsafe_regex_is_a_structured_error() {
        let err = two_views().search_classes("(a+)+b", &SearchFilters::default()).unwrap_err();
        assert!(matches!(err, crate::error::IndexError::UnsafePattern(_)));

        assert!(two_views().search_classes("Test.*", &SearchFilters::default()).is_ok());
    }

    #[test]
    fn project_only_filter_hides_system_symbols() {
        let mut system = symbol("vector", "std", SymbolKind::Class, "/usr/include/vector", 100);
        system.is_project = false;
        let engine = engine(vec![
            system,
            symbol("View", "app::ui", SymbolKind::Class, "/p/app.h", 10),
        ]);

        let results = engine.search_classes("", &SearchFilters::default()).unwrap();
        assert_eq!(results.total, 1);

        let all = engine
            .search_classes("", &SearchFilters { project_only: false, ..Default::default() })
            .unwrap();
        assert_eq!(all.total, 2);
    }

    #[test]
    fn file_filter_searches_the_file_index() {
        // the header declaration loses definition-wins but must stay
        // reachable through the file filter
        let mut declaration = symbol("Q", "", SymbolKind::Class, "/p/fwd.h", 1);
        declaration.usr = "c:@S@Q".to_string();
        declaration.is_definition = false;
        declaration.end_line = 1;
        let mut definition = symbol("Q", "", SymbolKind::Class, "/p/q.h", 3);
        definition.usr = "c:@S@Q".to_string();

        let engine = engine(vec![declaration, definition]);

        let in_fwd = engine
            .search_classes(
                "Q",
                &SearchFilters { file_name: Some("fwd.h".to_string()), ..Default::default() },
            )
            .unwrap();
        assert_eq!(in_fwd.total, 1);
        assert!(!in_fwd.results[0].is_definition);

        // the name index serves the definition
        let by_name = engine.search_classes("Q", &SearchFilters::default()).unwrap();
        assert_eq!(by_name.total, 1);
        assert!(by_name.results[0].is_definition);
    }

    #[test]
    fn namespace_filter_with_empty_string_means_global() {
        let engine = engine(vec![
            symbol("Helper", "", SymbolKind::Class, "/p/a.h", 1),
            symbol("Helper", "app", SymbolKind::Class, "/p/b.h", 1),
        ]);
        let global = engine
            .search_classes(
                "Helper",
                &SearchFilters { namespace: Some(String::new()), ..Default::default() },
            )
            .unwrap();
        assert_eq!(global.total, 1);
        assert_eq!(global.results[0].namespace, "");
    }

    #[test]
    fn truncation_reports_the_full_count() {
        let engine = engine(
            (0..10)
                .map(|i| symbol("View", &format!("ns{i}"), SymbolKind::Class, "/p/a.h", i + 1))
                .collect(),
        );
        let results = engine
            .search_classes(
                "View",
                &SearchFilters { max_results: Some(3), ..Default::default() },
            )
            .unwrap();
        assert_eq!(results.results.len(), 3);
        assert_eq!(results.total, 10);
    }

    #[test]
    fn function_search_supports_class_and_signature_filters() {
        let mut method = symbol("resize", "ui::Widget", SymbolKind::Method, "/p/w.h", 5);
        method.parent_class = Some("Widget".to_string());
        method.signature = Some("void resize(int, int)".to_string());
        let mut free = symbol("resize", "", SymbolKind::Function, "/p/free.cpp", 9);
        free.signature = Some("void resize(Buffer &)".to_string());

        let engine = engine(vec![method, free]);

        let of_class = engine
            .search_functions(
                "resize",
                &SearchFilters { class_name: Some("ui::Widget".to_string()), ..Default::default() },
            )
            .unwrap();
        assert_eq!(of_class.total, 1);
        assert_eq!(of_class.results[0].parent_class.as_deref(), Some("Widget"));

        let by_signature = engine
            .search_functions(
                "resize",
                &SearchFilters {
                    signature_pattern: Some("buffer".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(by_signature.total, 1);
        assert_eq!(by_signature.results[0].kind, SymbolKind::Function);
    }

    #[test]
    fn signature_filter_never_matches_missing_signatures() {
        let mut no_signature = symbol("f", "", SymbolKind::Function, "/p/a.cpp", 1);
        no_signature.signature = None;
        let engine = engine(vec![no_signature]);
        let results = engine
            .search_functions(
                "f",
                &SearchFilters { signature_pattern: Some("int".to_string()), ..Default::default() },
            )
            .unwrap();
        assert_eq!(results.total, 0);
    }

    #[test]
    fn regex_function_search_also_tries_unqualified_names() {
        let mut method = symbol("testMethod", "TestSuite", SymbolKind::Method, "/p/t.h", 4);
        method.parent_class = Some("TestSuite".to_string());
        let engine = engine(vec![
            method,
            symbol("testFunction", "", SymbolKind::Function, "/p/t.cpp", 8),
        ]);
        let results = engine.search_functions("test.*", &SearchFilters::default()).unwrap();
        assert_eq!(results.total, 2);
    }

    #[test]
    fn search_symbols_combines_and_truncates_classes_first() {
        let engine = engine(vec![
            symbol("Thing", "a", SymbolKind::Class, "/p/a.h", 1),
            symbol("Thing", "b", SymbolKind::Function, "/p/b.cpp", 2),
        ]);
        let combined = engine.search_symbols("Thing", None, &SearchFilters::default()).unwrap();
        assert_eq!(combined.total, 2);
        assert_eq!(combined.classes.len(), 1);
        assert_eq!(combined.functions.len(), 1);

        let truncated = engine
            .search_symbols(
                "Thing",
                None,
                &SearchFilters { max_results: Some(1), ..Default::default() },
            )
            .unwrap();
        assert_eq!(truncated.total, 2);
        assert_eq!(truncated.classes.len(), 1);
        assert!(truncated.functions.is_empty());

        let only_functions = engine
            .search_symbols(
                "Thing",
                Some(&["function".to_string()]),
                &SearchFilters::default(),
            )
            .unwrap();
        assert!(only_functions.classes.is_empty());
        assert_eq!(only_functions.functions.len(), 1);
    }

    #[test]
    fn class_info_resolves_methods_and_prefers_definitions() {
        let mut class = symbol("Widget", "ui", SymbolKind::Class, "/p/w.h", 3);
        class.usr = "c:@S@Widget".to_string();
        let mut method = symbol("draw", "ui::Widget", SymbolKind::Method, "/p/w.h", 5);
        method.parent_class = Some("Widget".to_string());
        let engine = engine(vec![class, method]);

        let Some(ClassLookup::Found(info)) = engine.get_class_info("Widget").unwrap() else {
            panic!("expected a class record");
        };
        assert_eq!(info.class.qualified_name, "ui::Widget");
        assert_eq!(info.methods.len(), 1);
        assert_eq!(info.methods[0].name, "draw");
    }

    #[test]
    fn simple_name_collisions_return_a_structured_ambiguity() {
        let Some(ClassLookup::Ambiguous(ambiguity)) =
            two_views().get_class_info("View").unwrap()
        else {
            panic!("expected an ambiguity");
        };
        assert!(ambiguity.is_ambiguous);
        assert_eq!(ambiguity.matches.len(), 2);
        assert!(ambiguity.error.contains("Ambiguous class name"));

        // a qualified name disambiguates
        let Some(ClassLookup::Found(info)) =
            two_views().get_class_info("app::ui::View").unwrap()
        else {
            panic!("expected a class record");
        };
        assert_eq!(info.class.qualified_name, "app::ui::View");
    }

    #[test]
    fn case_insensitive_fallback_finds_the_class() {
        let engine = engine(vec![symbol("Widget", "ui", SymbolKind::Class, "/p/w.h", 3)]);
        let Some(ClassLookup::Found(info)) = engine.get_class_info("widget").unwrap() else {
            panic!("expected a class record");
        };
        assert_eq!(info.class.name, "Widget");
    }

    #[test]
    fn template_arguments_prefer_the_specialization() {
        let mut primary = symbol("Container", "", SymbolKind::ClassTemplate, "/p/c.h", 1);
        primary.usr = "c:@ST>1#T@Container".to_string();
        primary.template = Some(TemplateInfo {
            kind: TemplateKind::Primary,
            parameters: vec![TemplateParameter {
                name: "T".to_string(),
                kind: TemplateParameterKind::Type,
                ty: None,
            }],
            primary_usr: None,
        });
        let mut specialization = symbol("Container", "", SymbolKind::Class, "/p/c.h", 20);
        specialization.usr = "c:@S@Container>#I".to_string();
        specialization.template = Some(TemplateInfo {
            kind: TemplateKind::FullSpecialization,
            parameters: Vec::new(),
            primary_usr: Some("c:@ST>1#T@Container".to_string()),
        });

        let engine = engine(vec![primary, specialization]);
        let Some(ClassLookup::Found(info)) = engine.get_class_info("Container<int>").unwrap()
        else {
            panic!("expected the specialization");
        };
        assert_eq!(info.class.template_kind, Some(TemplateKind::FullSpecialization));
        assert_eq!(info.class.specialization_of.as_deref(), Some("Container"));
    }

    #[test]
    fn function_signatures_inject_class_scope() {
        let mut method = symbol("resize", "ui::Widget", SymbolKind::Method, "/p/w.h", 5);
        method.parent_class = Some("Widget".to_string());
        method.signature = Some("void resize(int, int)".to_string());
        let engine = engine(vec![method]);

        assert_eq!(
            engine.get_function_signature("resize", Some("Widget")),
            vec!["void Widget::resize(int, int)".to_string()]
        );
        assert_eq!(
            engine.get_function_signature("ui::Widget::resize", None),
            vec!["void Widget::resize(int, int)".to_string()]
        );
        assert!(engine.get_function_signature("resize", Some("Other")).is_empty());
    }

    #[test]
    fn derived_classes_cross_template_specializations() {
        let mut base = symbol("Shape", "geo", SymbolKind::Class, "/p/s.h", 1);
        base.usr = "c:@S@Shape".to_string();
        let mut circle = symbol("Circle", "geo", SymbolKind::Class, "/p/c.h", 1);
        circle.base_classes = vec!["geo::Shape".to_string()];
        let mut poly = symbol("Polygon", "geo", SymbolKind::Class, "/p/p.h", 1);
        poly.base_classes = vec!["Shape<3>".to_string()];
        let unrelated = symbol("Renderer", "gfx", SymbolKind::Class, "/p/r.h", 1);

        let engine = engine(vec![base, circle, poly, unrelated]);
        let derived = engine.get_derived_classes("Shape");
        let names: Vec<&str> = derived.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Circle", "Polygon"]);
    }

    #[test]
    fn file_symbol_listing_is_line_ordered() {
        let engine = engine(vec![
            symbol("B", "", SymbolKind::Class, "/p/x.h", 9),
            symbol("A", "", SymbolKind::Class, "/p/x.h", 2),
        ]);
        let listed = engine.find_symbols_in_file("x.h");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "A");
        assert_eq!(listed[1].name, "B");

        let similar = engine.similar_file_names("x.h");
        assert_eq!(similar, vec![PathBuf::from("/p/x.h")]);
    }
}
