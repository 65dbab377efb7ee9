//! The names declaration files import with `use ci_forge::prelude::*;`.
//!
//! Declaration source is read by the scanner and the evaluator, which recognize these
//! names by path. The re-exports below are the same types the compiler builds from them.

pub use crate::model::{DEFAULT_STAGE, DEFAULT_STAGES, Intrinsic, Job, Marker, Need, OneOrMany, Passthrough, Pipeline, RecordType, Rule, When};
pub use crate::yaml;

/// Parses a raw wire-format fragment, as the evaluator does for `yaml!(..)` in declaration source.
///
/// ```
/// let value = ci_forge::yaml!("{a: [1, 2]}").unwrap();
/// assert!(value.is_mapping());
/// ```
#[macro_export]
macro_rules! yaml {
    ($text:expr) => {
        $crate::serde_yaml::from_str::<$crate::serde_yaml::Value>($text)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn yaml_fragments_parse() {
        assert_eq!(yaml!("null").unwrap(), serde_yaml::Value::Null);
        assert!(yaml!("[").is_err());
    }
}
