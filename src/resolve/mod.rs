//! Evaluation of declaration modules and reconciliation with the static scan.
//!
//! Values come from a [`ModuleEvaluator`]. The default [`SourceEvaluator`] interprets
//! a restricted expression language; nothing in a declaration file is ever executed.

mod cache;
mod evaluator;
mod format;
mod module;
mod resolver;
mod values;

pub use cache::ModuleCache;
pub use evaluator::{ModuleEvaluator, SourceEvaluator};
pub use module::{Module, module_path};
pub use resolver::{Resolution, ResolvedJob, ResolvedPipeline, Resolver};
pub use values::ModuleValues;
