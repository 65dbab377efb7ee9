//! Rendering resolved declarations as a wire document.
//!
//! Documents are built as ordered [`serde_yaml::Mapping`] trees first, so key order is
//! fixed before any text is produced. Unset fields are omitted and never render as null.

mod document;
mod job;

pub use document::{Format, HEADER, document, render};
pub use job::job_mapping;
