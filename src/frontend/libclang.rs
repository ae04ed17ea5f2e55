//! Lowering of libclang translation units into the frontend-agnostic
//! declaration tree.
//!
//! Everything libclang lives in this module: the shared [`Clang`] handle,
//! per-parse [`Index`] instances, and the entity walk that produces owned
//! [`Node`]s. Live handles never escape a [`Frontend::parse`] call, so
//! they are released on every return path.

use crate::{
    error::{IndexError, Result},
    frontend::{
        DiagnosticSeverity, Frontend, Node, NodeKind, ParseDiagnostic, ParseOptions, ParsedUnit,
    },
    symbols::{Access, TemplateInfo, TemplateKind, TemplateParameter, TemplateParameterKind},
    utils,
};
use clang::{diagnostic::Severity, Clang, Entity, EntityKind, Index};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Frontend backed by a loadable libclang.
///
/// One instance exists per process; each parse creates its own [`Index`],
/// which is what makes parallel parsing from a worker pool safe.
pub struct ClangFrontend {
    clang: Clang,
    builtin_include: Option<PathBuf>,
}

impl ClangFrontend {
    /// Loads libclang and discovers the builtin header directory.
    pub fn new() -> Result<Self> {
        let clang =
            Clang::new().map_err(|err| IndexError::FrontendUnavailable(format!("{err:?}")))?;
        let builtin_include = discover_builtin_include();
        match &builtin_include {
            Some(dir) => debug!("builtin headers at \"{}\"", dir.display()),
            None => warn!("builtin header directory not found, stdint/stddef may not resolve"),
        }
        Ok(Self { clang, builtin_include })
    }
}

impl std::fmt::Debug for ClangFrontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClangFrontend")
            .field("builtin_include", &self.builtin_include)
            .finish_non_exhaustive()
    }
}

impl Frontend for ClangFrontend {
    fn parse(&self, file: &Path, args: &[String], options: ParseOptions) -> Result<ParsedUnit> {
        let index = Index::new(&self.clang, false, false);
        let mut parser = index.parser(file);
        parser.arguments(args);
        parser.detailed_preprocessing_record(options.detailed_preprocessing);
        parser.skip_function_bodies(options.skip_function_bodies);

        let tu = parser.parse().map_err(|err| IndexError::parse(file, err))?;

        let mut unit = ParsedUnit::default();
        let mut seen_includes = HashSet::new();
        lower_children(
            &tu.get_entity(),
            &mut unit.nodes,
            &mut unit.includes,
            &mut seen_includes,
        );
        for diagnostic in tu.get_diagnostics() {
            unit.diagnostics.push(ParseDiagnostic {
                severity: map_severity(diagnostic.get_severity()),
                message: diagnostic.get_text(),
            });
        }
        Ok(unit)
    }

    fn builtin_include_dir(&self) -> Option<&Path> {
        self.builtin_include.as_deref()
    }
}

fn map_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Ignored => DiagnosticSeverity::Ignored,
        Severity::Note => DiagnosticSeverity::Note,
        Severity::Warning => DiagnosticSeverity::Warning,
        Severity::Error => DiagnosticSeverity::Error,
        Severity::Fatal => DiagnosticSeverity::Fatal,
    }
}

fn lower_children(
    entity: &Entity<'_>,
    nodes: &mut Vec<Node>,
    includes: &mut Vec<PathBuf>,
    seen_includes: &mut HashSet<PathBuf>,
) {
    for child in entity.get_children() {
        match child.get_kind() {
            EntityKind::InclusionDirective => {
                if let Some(file) = child.get_file() {
                    let path = utils::normalized(file.get_path());
                    if seen_includes.insert(path.clone()) {
                        includes.push(path);
                    }
                }
            }
            // transparent scopes: no qualification, lower their contents
            EntityKind::LinkageSpec | EntityKind::UnexposedDecl => {
                lower_children(&child, nodes, includes, seen_includes);
            }
            _ => {
                if let Some(node) = lower_entity(&child) {
                    nodes.push(node);
                }
            }
        }
    }
}

fn lower_entity(entity: &Entity<'_>) -> Option<Node> {
    let kind = map_kind(entity.get_kind())?;
    let name = entity.get_name()?;
    let location = entity.get_location()?.get_file_location();
    let file = location.file?.get_path();

    let mut node = Node::new(kind, name, utils::normalized(file), location.line);
    node.column = location.column;
    if let Some(range) = entity.get_range() {
        node.start_line = range.get_start().get_file_location().line;
        node.end_line = range.get_end().get_file_location().line;
    }
    node.usr = entity.get_usr().map(|usr| usr.0).unwrap_or_default();
    node.is_definition = entity.is_definition();
    node.access = entity.get_accessibility().map(|access| match access {
        clang::Accessibility::Public => Access::Public,
        clang::Accessibility::Protected => Access::Protected,
        clang::Accessibility::Private => Access::Private,
    });

    match kind {
        NodeKind::Function | NodeKind::Method | NodeKind::FunctionTemplate => {
            node.is_virtual = entity.is_virtual_method();
            node.is_pure_virtual = entity.is_pure_virtual_method();
            node.is_static = entity.is_static_method();
            node.is_const = entity.is_const_method();
            node.signature = build_signature(entity);
            node.semantic_parent = out_of_line_scope(entity);
        }
        NodeKind::Class
        | NodeKind::Struct
        | NodeKind::ClassTemplate
        | NodeKind::PartialSpecialization => {
            node.base_classes = entity
                .get_children()
                .into_iter()
                .filter(|child| child.get_kind() == EntityKind::BaseSpecifier)
                .filter_map(|base| {
                    base.get_type()
                        .map(|ty| ty.get_display_name())
                        .or_else(|| base.get_name())
                })
                .collect();
        }
        _ => {}
    }

    node.template = lower_template(entity, kind);
    node.brief = entity.get_comment_brief();
    node.doc_comment = entity.get_comment();

    // descend into scopes that contribute qualified names or members
    if matches!(
        kind,
        NodeKind::Namespace
            | NodeKind::Class
            | NodeKind::Struct
            | NodeKind::ClassTemplate
            | NodeKind::PartialSpecialization
    ) {
        let mut seen = HashSet::new();
        let mut ignored_includes = Vec::new();
        lower_children(entity, &mut node.children, &mut ignored_includes, &mut seen);
    }

    Some(node)
}

fn map_kind(kind: EntityKind) -> Option<NodeKind> {
    Some(match kind {
        EntityKind::Namespace => NodeKind::Namespace,
        EntityKind::ClassDecl => NodeKind::Class,
        EntityKind::StructDecl => NodeKind::Struct,
        EntityKind::FunctionDecl => NodeKind::Function,
        EntityKind::Method | EntityKind::Constructor | EntityKind::Destructor => NodeKind::Method,
        EntityKind::ClassTemplate => NodeKind::ClassTemplate,
        EntityKind::ClassTemplatePartialSpecialization => NodeKind::PartialSpecialization,
        EntityKind::FunctionTemplate => NodeKind::FunctionTemplate,
        EntityKind::TypeAliasDecl => NodeKind::TypeAlias,
        EntityKind::TypedefDecl => NodeKind::Typedef,
        _ => return None,
    })
}

/// Renders `return_type display_name` with a trailing `const` for const
/// methods, e.g. `void resize(int, int) const`.
fn build_signature(entity: &Entity<'_>) -> Option<String> {
    let display = entity.get_display_name()?;
    let mut signature = match entity.get_result_type() {
        Some(result) => format!("{} {display}", result.get_display_name()),
        None => display,
    };
    if entity.is_const_method() {
        signature.push_str(" const");
    }
    Some(signature)
}

fn lower_template(entity: &Entity<'_>, kind: NodeKind) -> Option<TemplateInfo> {
    match kind {
        NodeKind::ClassTemplate | NodeKind::FunctionTemplate => Some(TemplateInfo {
            kind: TemplateKind::Primary,
            parameters: collect_template_parameters(entity),
            primary_usr: None,
        }),
        NodeKind::PartialSpecialization => Some(TemplateInfo {
            kind: TemplateKind::PartialSpecialization,
            parameters: collect_template_parameters(entity),
            primary_usr: primary_template_usr(entity),
        }),
        // a plain record or callable produced from a template is a full
        // specialization
        NodeKind::Class | NodeKind::Struct | NodeKind::Function | NodeKind::Method => {
            let primary = primary_template_usr(entity)?;
            Some(TemplateInfo {
                kind: TemplateKind::FullSpecialization,
                parameters: Vec::new(),
                primary_usr: Some(primary),
            })
        }
        _ => None,
    }
}

/// Qualified scope of the declaring context when the entity is defined
/// outside of it, `None` for declarations in place.
fn out_of_line_scope(entity: &Entity<'_>) -> Option<String> {
    let semantic = entity.get_semantic_parent()?;
    let lexical = entity.get_lexical_parent();
    if lexical.map_or(false, |lexical| lexical == semantic) {
        return None;
    }

    let mut components = Vec::new();
    let mut current = Some(semantic);
    while let Some(parent) = current {
        match parent.get_kind() {
            EntityKind::TranslationUnit => break,
            EntityKind::Namespace
            | EntityKind::ClassDecl
            | EntityKind::StructDecl
            | EntityKind::ClassTemplate
            | EntityKind::ClassTemplatePartialSpecialization => {
                if let Some(name) = parent.get_name() {
                    components.push(name);
                }
            }
            _ => {}
        }
        current = parent.get_semantic_parent();
    }
    if components.is_empty() {
        return None;
    }
    components.reverse();
    Some(components.join("::"))
}

fn primary_template_usr(entity: &Entity<'_>) -> Option<String> {
    entity.get_template().and_then(|primary| primary.get_usr()).map(|usr| usr.0)
}

fn collect_template_parameters(entity: &Entity<'_>) -> Vec<TemplateParameter> {
    entity
        .get_children()
        .into_iter()
        .filter_map(|child| {
            let kind = match child.get_kind() {
                EntityKind::TemplateTypeParameter => TemplateParameterKind::Type,
                EntityKind::NonTypeTemplateParameter => TemplateParameterKind::NonType,
                EntityKind::TemplateTemplateParameter => TemplateParameterKind::Template,
                _ => return None,
            };
            let ty = (kind == TemplateParameterKind::NonType)
                .then(|| child.get_type().map(|ty| ty.get_display_name()))
                .flatten();
            Some(TemplateParameter { name: child.get_name().unwrap_or_default(), kind, ty })
        })
        .collect()
}

/// Finds the directory with the compiler-intrinsic headers.
///
/// Resolution order: explicit env override, `clang -print-resource-dir`,
/// well-known install locations.
pub fn discover_builtin_include() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("CLANG_INDEX_BUILTIN_INCLUDE") {
        let dir = PathBuf::from(dir);
        if dir.is_dir() {
            return Some(dir);
        }
        warn!("CLANG_INDEX_BUILTIN_INCLUDE=\"{}\" is not a directory", dir.display());
    }

    if let Ok(output) = std::process::Command::new("clang").arg("-print-resource-dir").output() {
        if output.status.success() {
            let resource = String::from_utf8_lossy(&output.stdout);
            let dir = PathBuf::from(resource.trim()).join("include");
            if dir.is_dir() {
                return Some(dir);
            }
        }
    }

    let well_known: &[&str] = &[
        "/usr/lib/clang",
        "/usr/lib64/clang",
        "/usr/local/lib/clang",
        "/Library/Developer/CommandLineTools/usr/lib/clang",
    ];
    for base in well_known {
        let Ok(entries) = std::fs::read_dir(base) else { continue };
        let mut versions: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        versions.sort();
        for version in versions.iter().rev() {
            let dir = version.join("include");
            if dir.is_dir() {
                return Some(dir);
            }
        }
    }
    None
}
