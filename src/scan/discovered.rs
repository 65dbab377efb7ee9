use crate::error::Location;
use crate::model::RecordType;
use core::fmt::{self, Display};
use serde::Serialize;
use std::path::PathBuf;

/// A dependency written in a declaration, as far as it is statically known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DependencyRef {
    /// A job name written as a string literal.
    Name(String),

    /// A reference to another top-level binding, such as `&BUILD` or `MATRIX[1]`.
    Binding(String),
}

impl Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name:?}"),
            Self::Binding(binding) => f.write_str(binding),
        }
    }
}

/// A top-level declaration found by the scanner, before any evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDeclaration {
    /// The binding name; `NAME[i]` for elements of an array declaration.
    pub binding: String,
    /// Job or pipeline.
    pub kind: DeclarationKind,

    /// Source file, relative to the scanned root.
    pub file: PathBuf,
    /// The 1-based line of the item.
    pub line: usize,

    /// The `name` field, when written as a string literal.
    pub name: Option<String>,

    /// The `stage` field, when written as a string literal.
    pub stage: Option<String>,

    /// Statically visible `needs` and `extends` entries.
    pub dependencies: Vec<DependencyRef>,

    /// Position within an array declaration.
    pub index: Option<usize>,
}

impl DiscoveredDeclaration {
    /// Where the declaration is, for error messages.
    #[must_use]
    pub fn location(&self) -> Location {
        Location::new(self.file.clone(), self.line)
    }

    /// The binding of the top-level item, without any array index.
    #[must_use]
    pub fn item(&self) -> &str {
        self.binding.split('[').next().unwrap_or(&self.binding)
    }
}

/// What a discovered declaration declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    /// A `Job { .. }`.
    Job,
    /// The `Pipeline { .. }`.
    Pipeline,
}

impl DeclarationKind {
    /// The record type this kind declares.
    #[must_use]
    pub const fn record_type(self) -> RecordType {
        match self {
            Self::Job => RecordType::Job,
            Self::Pipeline => RecordType::Pipeline,
        }
    }

    /// The declaration kind for `kind`, if it is one.
    #[must_use]
    pub const fn from_record_type(kind: RecordType) -> Option<Self> {
        match kind {
            RecordType::Job => Some(Self::Job),
            RecordType::Pipeline => Some(Self::Pipeline),
            _ => None,
        }
    }
}

impl Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_type().name())
    }
}
