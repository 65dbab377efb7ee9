//! The declaration model: typed records for jobs, pipelines and their nested configuration.

mod constants;
mod declaration;
mod intrinsic;
mod job;
mod need;
mod pipeline;
mod record_type;
mod rule;
mod value;

pub use constants::{ENUM_CONSTANTS, Marker, When, enum_constant, is_enum_namespace};
pub use declaration::{Declaration, ReferenceResolver};
pub use intrinsic::{INTRINSICS, Intrinsic};
pub use job::{DEFAULT_STAGE, Job, OneOrMany};
pub use need::Need;
pub use pipeline::{DEFAULT_STAGES, POST_STAGE, PRE_STAGE, Passthrough, Pipeline};
pub use record_type::{RecordType, field_name, wire_key};
pub use rule::{PREDEFINED_RULES, Rule, predefined_rule};
pub use value::{Origin, Record, Value};

/// Names exported by the modeling package that declaration source may refer to.
///
/// Record types, intrinsic namespaces, enum namespaces, the predefined `Rules` and the
/// `yaml!` macro.
#[must_use]
pub fn is_model_name(name: &str) -> bool {
    RecordType::from_name(name).is_some()
        || Intrinsic::is_namespace(name)
        || is_enum_namespace(name)
        || matches!(name, "Rules" | "yaml" | "prelude" | "model")
}
