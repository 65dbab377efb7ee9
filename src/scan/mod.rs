//! Static discovery of pipeline declarations.
//!
//! The scanner parses source files with `syn` and looks at top-level `const` and
//! `static` items only. Declarations built inside functions or behind conditionals
//! are invisible to it.

mod discovered;
mod imports;
mod scanner;

pub use discovered::{DeclarationKind, DependencyRef, DiscoveredDeclaration};
pub use imports::{ImportTable, UserImport};
pub use scanner::{DEFAULT_MODELING_CRATE, ScanOutput, Scanner};

pub(crate) use scanner::parse;
