//! The seam between the indexer and the Clang frontend.
//!
//! Parsing is isolated behind the [`Frontend`] trait. A frontend turns one
//! translation unit into a fully lowered, owned declaration tree
//! ([`Node`]) plus the transitive include closure, so nothing downstream
//! ever touches a live libclang handle. This keeps the extractor and the
//! orchestrator testable without a loadable libclang and keeps all
//! frontend resources scoped to the parse call.

use crate::{
    error::Result,
    symbols::{Access, TemplateInfo},
};
use std::path::{Path, PathBuf};

pub mod libclang;
pub use libclang::ClangFrontend;

/// Options for a single parse, forming the retry ladder of
/// [`ParseOptions::retry_ladder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// Keep the detailed preprocessing record; required for include
    /// extraction.
    pub detailed_preprocessing: bool,
    /// Last-resort option that gives up on function bodies.
    pub skip_function_bodies: bool,
}

impl ParseOptions {
    pub const FULL: Self =
        Self { detailed_preprocessing: true, skip_function_bodies: false };

    /// Progressively laxer options: full, without the preprocessing
    /// record, and a minimal last resort.
    pub fn retry_ladder() -> [Self; 3] {
        [
            Self::FULL,
            Self { detailed_preprocessing: false, skip_function_bodies: false },
            Self { detailed_preprocessing: false, skip_function_bodies: true },
        ]
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::FULL
    }
}

/// Kind of a lowered declaration node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Namespace,
    Class,
    Struct,
    Function,
    Method,
    ClassTemplate,
    PartialSpecialization,
    FunctionTemplate,
    TypeAlias,
    Typedef,
}

/// One lowered declaration.
///
/// Carries everything the extractor needs: location, extent, flags,
/// access, signature, base specifiers, template metadata and children in
/// declaration order. The `file` is the file physically containing the
/// declaration, which for headers differs from the translation unit's
/// main file.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
    /// USR when the frontend provides one, empty otherwise.
    pub usr: String,
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub is_definition: bool,
    pub is_virtual: bool,
    pub is_pure_virtual: bool,
    pub is_static: bool,
    pub is_const: bool,
    pub access: Option<Access>,
    /// Rendered signature for callables.
    pub signature: Option<String>,
    /// Raw base specifier texts for records.
    pub base_classes: Vec<String>,
    /// Qualified scope of the declaring record or namespace when it
    /// differs from the lexical position, e.g. `ui::Widget` for an
    /// out-of-line `void Widget::resize()` definition.
    pub semantic_parent: Option<String>,
    pub template: Option<TemplateInfo>,
    pub brief: Option<String>,
    pub doc_comment: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(
        kind: NodeKind,
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        line: u32,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            usr: String::new(),
            file: file.into(),
            line,
            column: 1,
            start_line: line,
            end_line: line,
            is_definition: false,
            is_virtual: false,
            is_pure_virtual: false,
            is_static: false,
            is_const: false,
            access: None,
            signature: None,
            base_classes: Vec::new(),
            semantic_parent: None,
            template: None,
            brief: None,
            doc_comment: None,
            children: Vec::new(),
        }
    }
}

/// Severity of a parse diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

/// A diagnostic emitted while parsing a translation unit.
#[derive(Clone, Debug)]
pub struct ParseDiagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
}

/// A fully lowered translation unit.
#[derive(Clone, Debug, Default)]
pub struct ParsedUnit {
    /// Top-level declarations of the whole unit, across all files it
    /// pulls in.
    pub nodes: Vec<Node>,
    /// Transitive include closure as absolute paths, de-duplicated.
    pub includes: Vec<PathBuf>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParsedUnit {
    /// `true` when the unit carries error-or-worse diagnostics. Symbols
    /// from such units are still usable; the analyzer records the
    /// failure.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity >= DiagnosticSeverity::Error)
    }

    /// Messages of error-or-worse diagnostics, for the parse error
    /// registry.
    pub fn error_messages(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity >= DiagnosticSeverity::Error)
            .map(|d| d.message.clone())
            .collect()
    }
}

/// A parser for translation units.
pub trait Frontend: Send + Sync {
    /// Parses one translation unit with the given argument vector.
    fn parse(&self, file: &Path, args: &[String], options: ParseOptions) -> Result<ParsedUnit>;

    /// Directory carrying the compiler-intrinsic headers, when known.
    /// Injected as `-isystem` by the argument normalizer.
    fn builtin_include_dir(&self) -> Option<&Path> {
        None
    }
}
