//! Compile typed, declarative GitLab CI pipeline definitions into `.gitlab-ci.yml`, and back.
//!
//! Pipelines are declared as top-level Rust `const` and `static` items built from the
//! records in [`prelude`]. The declaration files are parsed, never compiled or run:
//!
//! ```rust,ignore
//! use ci_forge::prelude::*;
//!
//! const PIPELINE: Pipeline = Pipeline { stages: &["build", "test"] };
//!
//! const BUILD: Job = Job { name: "build", stage: "build", script: &["make"] };
//! const TEST: Job = Job {
//!     name: "test",
//!     stage: "test",
//!     needs: &[&BUILD],
//!     rules: &[Rule { if_: "$CI_COMMIT_BRANCH == $CI_DEFAULT_BRANCH" }],
//!     script: &["make test"],
//! };
//! ```
//!
//! The forward direction lives in [`compile`]: the declarations are discovered statically,
//! evaluated by a restricted interpreter, checked for missing references and cycles, ordered
//! and rendered. The reverse direction lives in [`import`], and [`equivalence`] checks that
//! a round trip preserved the document.

pub mod compile;
pub mod equivalence;
pub mod error;
pub mod expression;
pub mod graph;
pub mod host;
pub mod import;
pub mod manifest;
pub mod model;
pub mod prelude;
pub mod resolve;
pub mod scan;
pub mod serialize;
pub mod validate;

pub use compile::{Compilation, CompileOptions, compile, compile_to_file};
pub use error::{Diagnostic, Error, Location, Result, Severity};
pub use serialize::Format;

#[doc(hidden)]
pub use serde_yaml;
