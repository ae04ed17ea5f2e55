//! Turns a lowered translation unit into symbol records.
//!
//! The walk visits every node but emits only for files the walk has the
//! right to claim: the translation unit's own source always, any other
//! file only after winning the header tracker's first-win claim for its
//! current content hash. Losing claims drop the file's symbols silently;
//! the winner's claims are reported so the orchestrator can complete
//! them once the results are persisted.

use crate::{
    config::ProjectPathsConfig,
    frontend::{Node, NodeKind, ParsedUnit},
    headers::HeaderTracker,
    symbols::{Symbol, SymbolKind},
    utils,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// Result of extracting one translation unit.
#[derive(Debug, Default)]
pub struct Extraction {
    pub symbols: Vec<Symbol>,
    /// Headers this walk claimed, with the content hash observed at claim
    /// time. The orchestrator marks them completed after persisting.
    pub claimed_headers: Vec<(PathBuf, String)>,
}

#[derive(Clone, Copy, PartialEq)]
enum Verdict {
    Emit,
    Skip,
}

/// One walk over a lowered unit.
pub struct SymbolExtractor<'a> {
    source: &'a Path,
    paths: &'a ProjectPathsConfig,
    tracker: &'a HeaderTracker,
    verdicts: HashMap<PathBuf, Verdict>,
    out: Extraction,
}

impl<'a> SymbolExtractor<'a> {
    pub fn new(
        source: &'a Path,
        paths: &'a ProjectPathsConfig,
        tracker: &'a HeaderTracker,
    ) -> Self {
        Self { source, paths, tracker, verdicts: HashMap::new(), out: Extraction::default() }
    }

    /// Walks the unit and returns the emitted symbols plus the headers
    /// claimed along the way.
    pub fn extract(mut self, unit: &ParsedUnit) -> Extraction {
        let mut scope = Vec::new();
        for node in &unit.nodes {
            self.walk(node, &mut scope, None);
        }
        self.out
    }

    fn walk(&mut self, node: &Node, scope: &mut Vec<String>, parent_class: Option<&str>) {
        match node.kind {
            NodeKind::Namespace => {
                scope.push(node.name.clone());
                for child in &node.children {
                    self.walk(child, scope, None);
                }
                scope.pop();
            }
            NodeKind::Class
            | NodeKind::Struct
            | NodeKind::ClassTemplate
            | NodeKind::PartialSpecialization => {
                self.emit(node, scope, parent_class);
                let name = strip_template_args(&node.name).to_string();
                scope.push(name);
                for child in &node.children {
                    self.walk(child, scope, Some(&node.name));
                }
                scope.pop();
            }
            _ => self.emit(node, scope, parent_class),
        }
    }

    fn emit(&mut self, node: &Node, scope: &[String], parent_class: Option<&str>) {
        if self.verdict_for(&node.file) != Verdict::Emit {
            return;
        }
        let Some(kind) = symbol_kind(node.kind, parent_class.is_some()) else { return };

        let name = strip_template_args(&node.name).to_string();

        // out-of-line members carry their true scope on the node
        let (namespace, parent_class) = match &node.semantic_parent {
            Some(semantic) => {
                let parent = semantic.rsplit("::").next().map(|s| s.to_string());
                (semantic.clone(), parent)
            }
            None => (scope.join("::"), parent_class.map(|c| strip_template_args(c).to_string())),
        };
        let qualified_name =
            if namespace.is_empty() { name.clone() } else { format!("{namespace}::{name}") };

        self.out.symbols.push(Symbol {
            usr: node.usr.clone(),
            name,
            qualified_name,
            namespace,
            kind,
            file: node.file.clone(),
            line: node.line,
            column: node.column,
            start_line: node.start_line,
            end_line: node.end_line,
            signature: node.signature.clone(),
            parent_class,
            access: node.access,
            base_classes: node.base_classes.clone(),
            is_virtual: node.is_virtual,
            is_pure_virtual: node.is_pure_virtual,
            is_static: node.is_static,
            is_const: node.is_const,
            is_definition: node.is_definition,
            is_project: self.paths.is_project_file(&node.file),
            template: node.template.clone(),
            brief: node.brief.clone(),
            doc_comment: node.doc_comment.clone(),
        });
    }

    /// Decides once per file per walk whether its symbols are ours to
    /// emit.
    fn verdict_for(&mut self, file: &Path) -> Verdict {
        if let Some(verdict) = self.verdicts.get(file) {
            return *verdict;
        }
        let verdict = if file == self.source {
            Verdict::Emit
        } else {
            match utils::content_hash(file) {
                Ok(hash) => {
                    if self.tracker.try_claim(file, &hash) {
                        self.out.claimed_headers.push((file.to_path_buf(), hash));
                        Verdict::Emit
                    } else {
                        Verdict::Skip
                    }
                }
                Err(err) => {
                    warn!("cannot hash \"{}\": {err}, skipping its symbols", file.display());
                    Verdict::Skip
                }
            }
        };
        self.verdicts.insert(file.to_path_buf(), verdict);
        verdict
    }
}

fn symbol_kind(kind: NodeKind, has_parent_class: bool) -> Option<SymbolKind> {
    Some(match kind {
        NodeKind::Class => SymbolKind::Class,
        NodeKind::Struct => SymbolKind::Struct,
        NodeKind::Function => SymbolKind::Function,
        NodeKind::Method => SymbolKind::Method,
        NodeKind::ClassTemplate => SymbolKind::ClassTemplate,
        NodeKind::PartialSpecialization => SymbolKind::PartialSpecialization,
        NodeKind::FunctionTemplate => SymbolKind::FunctionTemplate,
        NodeKind::TypeAlias => SymbolKind::TypeAlias,
        NodeKind::Typedef => SymbolKind::Typedef,
        NodeKind::Namespace => return None,
    })
    .map(|kind| {
        // free functions lexically inside a class body are methods
        if kind == SymbolKind::Function && has_parent_class {
            SymbolKind::Method
        } else {
            kind
        }
    })
}

/// Strips a trailing template argument list: `Container<int>` becomes
/// `Container`. Names that merely contain `<`, like `operator<` and
/// `operator<=`, are left intact.
pub fn strip_template_args(name: &str) -> &str {
    if !name.ends_with('>') {
        return name;
    }
    match name.find('<') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ParsedUnit;
    use crate::symbols::{TemplateInfo, TemplateKind};

    fn setup() -> (tempfile::TempDir, ProjectPathsConfig, HeaderTracker) {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPathsConfig::new(dir.path()).unwrap();
        (dir, paths, HeaderTracker::new())
    }

    fn write(paths: &ProjectPathsConfig, name: &str, contents: &str) -> PathBuf {
        let path = paths.root.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn extract(
        source: &Path,
        paths: &ProjectPathsConfig,
        tracker: &HeaderTracker,
        nodes: Vec<Node>,
    ) -> Extraction {
        let unit = ParsedUnit { nodes, includes: Vec::new(), diagnostics: Vec::new() };
        SymbolExtractor::new(source, paths, tracker).extract(&unit)
    }

    #[test]
    fn qualified_names_follow_namespace_nesting() {
        let (_dir, paths, tracker) = setup();
        let source = write(&paths, "a.cpp", "");

        let mut outer = Node::new(NodeKind::Namespace, "app", &source, 1);
        let mut inner = Node::new(NodeKind::Namespace, "ui", &source, 2);
        let mut class = Node::new(NodeKind::Class, "View", &source, 3);
        class.is_definition = true;
        class.end_line = 7;
        let mut method = Node::new(NodeKind::Method, "draw", &source, 4);
        method.signature = Some("void draw()".to_string());
        class.children.push(method);
        inner.children.push(class);
        outer.children.push(inner);

        let extraction = extract(&source, &paths, &tracker, vec![outer]);
        let names: Vec<&str> =
            extraction.symbols.iter().map(|s| s.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["app::ui::View", "app::ui::View::draw"]);

        let view = &extraction.symbols[0];
        assert_eq!(view.namespace, "app::ui");
        assert_eq!(view.qualified_name, format!("{}::{}", view.namespace, view.name));

        let draw = &extraction.symbols[1];
        assert_eq!(draw.kind, SymbolKind::Method);
        assert_eq!(draw.parent_class.as_deref(), Some("View"));
        assert_eq!(draw.namespace, "app::ui::View");
    }

    #[test]
    fn header_symbols_require_a_winning_claim() {
        let (_dir, paths, tracker) = setup();
        let source = write(&paths, "a.cpp", "int x;");
        let header = write(&paths, "w.h", "class Widget {};");

        let mut class = Node::new(NodeKind::Class, "Widget", &header, 1);
        class.is_definition = true;

        let extraction = extract(&source, &paths, &tracker, vec![class.clone()]);
        assert_eq!(extraction.symbols.len(), 1);
        assert_eq!(extraction.claimed_headers.len(), 1);
        let (claimed, hash) = &extraction.claimed_headers[0];
        assert_eq!(claimed, &header);
        tracker.mark_completed(claimed, hash);

        // a second walk (another TU) loses the claim and emits nothing
        let source_b = write(&paths, "b.cpp", "int y;");
        let extraction = extract(&source_b, &paths, &tracker, vec![class]);
        assert!(extraction.symbols.is_empty());
        assert!(extraction.claimed_headers.is_empty());
    }

    #[test]
    fn own_source_symbols_always_emit() {
        let (_dir, paths, tracker) = setup();
        let source = write(&paths, "a.cpp", "void f();");
        let mut function = Node::new(NodeKind::Function, "f", &source, 1);
        function.signature = Some("void f()".to_string());

        let extraction = extract(&source, &paths, &tracker, vec![function]);
        assert_eq!(extraction.symbols.len(), 1);
        assert_eq!(extraction.symbols[0].kind, SymbolKind::Function);
        assert!(extraction.symbols[0].is_project);
        assert!(extraction.claimed_headers.is_empty());
    }

    #[test]
    fn out_of_line_definitions_use_their_semantic_scope() {
        let (_dir, paths, tracker) = setup();
        let source = write(&paths, "widget.cpp", "");
        let mut method = Node::new(NodeKind::Method, "resize", &source, 10);
        method.semantic_parent = Some("ui::Widget".to_string());
        method.is_definition = true;
        method.end_line = 14;

        let extraction = extract(&source, &paths, &tracker, vec![method]);
        let symbol = &extraction.symbols[0];
        assert_eq!(symbol.qualified_name, "ui::Widget::resize");
        assert_eq!(symbol.namespace, "ui::Widget");
        assert_eq!(symbol.parent_class.as_deref(), Some("Widget"));
    }

    #[test]
    fn template_argument_suffixes_are_stripped() {
        assert_eq!(strip_template_args("Container<int>"), "Container");
        assert_eq!(strip_template_args("std::map<int, std::string>"), "std::map");
        assert_eq!(strip_template_args("Widget"), "Widget");
        assert_eq!(strip_template_args("operator<"), "operator<");
        assert_eq!(strip_template_args("operator<="), "operator<=");
    }

    #[test]
    fn specializations_keep_their_template_metadata() {
        let (_dir, paths, tracker) = setup();
        let source = write(&paths, "a.cpp", "");

        let mut class = Node::new(NodeKind::Class, "Container<int>", &source, 1);
        class.template = Some(TemplateInfo {
            kind: TemplateKind::FullSpecialization,
            parameters: Vec::new(),
            primary_usr: Some("c:@ST>1#T@Container".to_string()),
        });

        let extraction = extract(&source, &paths, &tracker, vec![class]);
        let symbol = &extraction.symbols[0];
        assert_eq!(symbol.qualified_name, "Container");
        assert!(symbol.is_template_specialization());
        assert_eq!(symbol.primary_template_usr(), Some("c:@ST>1#T@Container"));
    }

    #[test]
    fn non_project_headers_are_flagged() {
        let (_dir, paths, tracker) = setup();
        let source = write(&paths, "a.cpp", "");
        let outside = tempfile::tempdir().unwrap();
        let system = outside.path().join("sys.h");
        std::fs::write(&system, "struct tm {};").unwrap();

        let mut class = Node::new(NodeKind::Struct, "tm", utils::normalized(&system), 1);
        class.is_definition = true;

        let extraction = extract(&source, &paths, &tracker, vec![class]);
        assert_eq!(extraction.symbols.len(), 1);
        assert!(!extraction.symbols[0].is_project);
    }
}
