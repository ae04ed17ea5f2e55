//! The symbol record emitted by the extractor and shared across indexes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of an indexed declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Struct,
    Function,
    Method,
    ClassTemplate,
    FunctionTemplate,
    PartialSpecialization,
    TypeAlias,
    Typedef,
}

impl SymbolKind {
    /// Returns `true` for kinds that carry a callable signature.
    pub fn is_callable(self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method | SymbolKind::FunctionTemplate)
    }

    /// Returns `true` for record-like kinds listed in the class index.
    pub fn is_class_like(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::ClassTemplate
                | SymbolKind::PartialSpecialization
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::ClassTemplate => "class_template",
            SymbolKind::FunctionTemplate => "function_template",
            SymbolKind::PartialSpecialization => "partial_specialization",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Typedef => "typedef",
        }
    }
}

/// Member access of a declaration inside a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Protected,
    Private,
}

/// Template entity classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Primary,
    FullSpecialization,
    PartialSpecialization,
}

/// Kind of a single template parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateParameterKind {
    Type,
    NonType,
    Template,
}

/// One declared template parameter, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    pub kind: TemplateParameterKind,
    /// Type string for non-type parameters (`int`, `std::size_t`, ..).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
}

/// Template metadata attached to template entities and specializations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub kind: TemplateKind,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
    /// USR of the primary template, set on specializations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_usr: Option<String>,
}

/// Immutable record of one extracted symbol.
///
/// Identity is the USR when the frontend provides one; anonymous and
/// builtin declarations fall back to `(file, line, qualified_name)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Unified Symbol Resolution string, empty when unavailable.
    #[serde(default)]
    pub usr: String,
    /// Unqualified name.
    pub name: String,
    /// Fully qualified name without template argument lists.
    pub qualified_name: String,
    /// Namespace prefix of the qualified name, empty for the global
    /// namespace.
    #[serde(default)]
    pub namespace: String,
    pub kind: SymbolKind,
    /// File physically containing the declaration.
    pub file: PathBuf,
    /// 1-based line of the declaration.
    pub line: u32,
    /// 1-based column of the declaration.
    pub column: u32,
    /// First line of the declaration extent.
    pub start_line: u32,
    /// Last line of the declaration extent.
    pub end_line: u32,
    /// Rendered signature for callables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Simple name of the enclosing record for members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
    /// Raw textual base specifiers, template arguments preserved.
    #[serde(default)]
    pub base_classes: Vec<String>,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_pure_virtual: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_definition: bool,
    /// `true` iff the owning file lives under the project root.
    #[serde(default)]
    pub is_project: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateInfo>,
    /// Documentation brief, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    /// Full documentation comment, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
}

impl Symbol {
    pub fn is_template(&self) -> bool {
        self.template.is_some()
    }

    pub fn template_kind(&self) -> Option<TemplateKind> {
        self.template.as_ref().map(|t| t.kind)
    }

    pub fn is_template_specialization(&self) -> bool {
        matches!(
            self.template_kind(),
            Some(TemplateKind::FullSpecialization | TemplateKind::PartialSpecialization)
        )
    }

    /// USR of the primary template for specializations.
    pub fn primary_template_usr(&self) -> Option<&str> {
        self.template.as_ref()?.primary_usr.as_deref()
    }

    /// Identity used for de-duplication across declarations.
    pub fn identity(&self) -> SymbolIdentity<'_> {
        if self.usr.is_empty() {
            SymbolIdentity::Location(&self.file, self.line, &self.qualified_name)
        } else {
            SymbolIdentity::Usr(&self.usr)
        }
    }

    /// Returns `true` if `self` carries strictly more definition detail
    /// than `other`.
    ///
    /// Used by the merge step: a record with a body extent beats one
    /// without, then base classes, then a signature.
    pub fn is_richer_than(&self, other: &Symbol) -> bool {
        if self.is_definition != other.is_definition {
            return self.is_definition;
        }
        let extent = |s: &Symbol| s.end_line > s.start_line;
        if extent(self) != extent(other) {
            return extent(self);
        }
        if self.base_classes.is_empty() != other.base_classes.is_empty() {
            return !self.base_classes.is_empty();
        }
        if self.signature.is_some() != other.signature.is_some() {
            return self.signature.is_some();
        }
        false
    }
}

/// Identity key for a symbol record, see [`Symbol::identity`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolIdentity<'a> {
    Usr(&'a str),
    Location(&'a std::path::Path, u32, &'a str),
}
